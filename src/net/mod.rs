//! TCP accept loop and length-prefixed framing.
//!
//! One task per connection; a connection's requests are serviced strictly
//! in received order because the task awaits a full request/response
//! cycle before reading the next frame.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::store::Store;

/// Bind and serve forever, spawning one task per accepted connection.
pub async fn run(host: &str, port: u16, store: Store) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    info!(%host, port, "listening");

    let store = Arc::new(store);

    loop {
        let (socket, peer) = listener.accept().await?;
        let store = Arc::clone(&store);

        tokio::spawn(async move {
            debug!(%peer, "connection accepted");
            if let Err(err) = serve_connection(socket, &store).await {
                warn!(%peer, error = %err, "connection closed with error");
            } else {
                debug!(%peer, "connection closed");
            }
        });
    }
}

async fn serve_connection(socket: TcpStream, store: &Store) -> std::io::Result<()> {
    let mut reader = BufReader::new(socket);

    loop {
        let payload = match read_frame(&mut reader).await? {
            Some(payload) => payload,
            None => return Ok(()),
        };

        let response = crate::wire::process(store, &payload).await;
        write_frame(reader.get_mut(), &response).await?;
    }
}

/// Read one `<decimal byte length>\n<payload>` frame. Returns `Ok(None)`
/// on a clean EOF between frames (the client closed the connection).
async fn read_frame(
    reader: &mut BufReader<TcpStream>,
) -> std::io::Result<Option<String>> {
    let mut len_line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let n = reader.read(&mut byte).await?;
        if n == 0 {
            if len_line.is_empty() {
                return Ok(None);
            }
            return Err(malformed_frame("connection closed mid-frame"));
        }
        if byte[0] == b'\n' {
            break;
        }
        len_line.push(byte[0]);
    }

    let len: usize = std::str::from_utf8(&len_line)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| malformed_frame("invalid frame length"))?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    let payload = String::from_utf8(payload).map_err(|_| malformed_frame("non-UTF-8 payload"))?;
    Ok(Some(payload))
}

async fn write_frame(socket: &mut TcpStream, payload: &str) -> std::io::Result<()> {
    let framed = format!("{}\n{}", payload.len(), payload);
    socket.write_all(framed.as_bytes()).await?;
    socket.flush().await
}

fn malformed_frame(msg: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg.to_string())
}
