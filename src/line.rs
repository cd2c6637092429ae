//! Line transport
//!
//! Frames a TCP connection into newline-delimited UTF-8 lines using
//! `tokio-util`'s `LinesCodec`, with an inactivity timeout on reads.
//!
//! Reads distinguish three outcomes:
//! - `Ok(Some(line))`: one received line (malformed UTF-8 and oversized
//!   lines are recovered locally as an empty line, never a crash)
//! - `Ok(None)`: inactivity timeout or clean disconnect (EOF) - an absence
//!   signal, not an error
//! - `Err(_)`: an unexpected IO failure

use std::io;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

/// Maximum accepted line length in bytes
pub const MAX_LINE_LENGTH: usize = 1024;

/// Default read inactivity timeout for sessions
pub const READ_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Reading half of a line-framed connection
pub type LineReader = FramedRead<OwnedReadHalf, LinesCodec>;
/// Writing half of a line-framed connection
pub type LineWriter = FramedWrite<OwnedWriteHalf, LinesCodec>;

/// Split a TCP stream into line-framed reader and writer halves.
pub fn split(stream: TcpStream) -> (LineReader, LineWriter) {
    let (read_half, write_half) = stream.into_split();
    let reader = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    let writer = FramedWrite::new(write_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    (reader, writer)
}

/// Read one line, waiting at most `limit`.
///
/// Timeout and EOF both yield `Ok(None)`; undecodable input yields an empty
/// line so a single bad client message never tears the connection down.
pub async fn read_line(reader: &mut LineReader, limit: Duration) -> io::Result<Option<String>> {
    match timeout(limit, reader.next()).await {
        // Inactivity timeout
        Err(_) => Ok(None),
        // Clean disconnect
        Ok(None) => Ok(None),
        Ok(Some(Ok(line))) => Ok(Some(line)),
        // LinesCodec discards up to the next newline, so the stream stays usable
        Ok(Some(Err(LinesCodecError::MaxLineLengthExceeded))) => Ok(Some(String::new())),
        Ok(Some(Err(LinesCodecError::Io(e)))) => {
            if e.kind() == io::ErrorKind::InvalidData {
                Ok(Some(String::new()))
            } else {
                Err(e)
            }
        }
    }
}

/// Write one newline-terminated line.
pub async fn write_line(writer: &mut LineWriter, line: &str) -> io::Result<()> {
    writer.send(line).await.map_err(|e| match e {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidInput, "line too long")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    /// Loopback connection pair: (client stream, accepted server stream)
    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (client, server) = socket_pair().await;
        let (mut reader, _writer) = split(server);
        let (_client_reader, mut client_writer) = split(client);

        write_line(&mut client_writer, "hello").await.unwrap();

        let line = read_line(&mut reader, Duration::from_secs(1)).await.unwrap();
        assert_eq!(line.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_timeout_yields_absence() {
        let (_client, server) = socket_pair().await;
        let (mut reader, _writer) = split(server);

        let line = read_line(&mut reader, Duration::from_millis(50)).await.unwrap();
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn test_eof_yields_absence() {
        let (client, server) = socket_pair().await;
        let (mut reader, _writer) = split(server);

        drop(client);

        let line = read_line(&mut reader, Duration::from_secs(1)).await.unwrap();
        assert_eq!(line, None);
    }

    #[tokio::test]
    async fn test_malformed_utf8_yields_empty_line() {
        let (mut client, server) = socket_pair().await;
        let (mut reader, _writer) = split(server);

        client.write_all(&[0xff, 0xfe, 0xfd, b'\n']).await.unwrap();

        let line = read_line(&mut reader, Duration::from_secs(1)).await.unwrap();
        assert_eq!(line.as_deref(), Some(""));
    }
}
