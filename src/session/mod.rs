//! Session module - per-connection lifecycle.
//!
//! - [`Connection`] - shared handle: writer task, close signal, bound id
//! - [`run_session`] - read loop: decode frames, answer heartbeats, hand
//!   everything else to a [`FrameHandler`]
//!
//! Heartbeats never reach the frame handler. Every HEARTBEAT received is
//! answered with exactly one HEARTBEAT; neither side originates them on its
//! own.

mod connection;
mod signal;

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

pub use connection::Connection;
pub(crate) use signal::Signal;

use crate::error::Result;
use crate::handler::BoxFuture;
use crate::protocol::{Frame, FrameBuffer};

/// Socket read chunk size.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Receives every non-heartbeat frame read from a connection.
///
/// Returning an error closes the connection.
pub trait FrameHandler: Send + Sync {
    fn handle_frame<'a>(&'a self, conn: &'a Connection, frame: Frame)
        -> BoxFuture<'a, Result<()>>;
}

/// Run the read loop until EOF, a read or protocol error, or until the
/// connection is closed from elsewhere. Closes the connection on exit.
pub async fn run_session<R, H>(reader: R, conn: Connection, handler: &H) -> Result<()>
where
    R: AsyncRead + Unpin,
    H: FrameHandler + ?Sized,
{
    let result = read_loop(reader, &conn, handler).await;
    conn.close();
    result
}

async fn read_loop<R, H>(mut reader: R, conn: &Connection, handler: &H) -> Result<()>
where
    R: AsyncRead + Unpin,
    H: FrameHandler + ?Sized,
{
    let mut buffer = FrameBuffer::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = tokio::select! {
            _ = conn.closed() => return Ok(()),
            read = reader.read(&mut chunk) => read?,
        };

        if n == 0 {
            debug!("Connection {} reached EOF", conn.id());
            return Ok(());
        }

        for frame in buffer.push(&chunk[..n])? {
            if frame.is_heartbeat() {
                on_heartbeat(conn).await?;
            } else {
                handler.handle_frame(conn, frame).await?;
            }
        }
    }
}

async fn on_heartbeat(conn: &Connection) -> Result<()> {
    debug!("Heartbeat on connection {}", conn.id());
    conn.send(&Frame::heartbeat()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::Registration;
    use crate::protocol::encode_frame;
    use crate::writer::WriterConfig;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    #[derive(Default)]
    struct Recorder {
        frames: Mutex<Vec<Frame>>,
    }

    impl FrameHandler for Recorder {
        fn handle_frame<'a>(
            &'a self,
            _conn: &'a Connection,
            frame: Frame,
        ) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.frames.lock().unwrap().push(frame);
                Ok(())
            })
        }
    }

    /// Session side (reader + connection) and the peer's stream.
    fn link() -> (tokio::io::ReadHalf<DuplexStream>, Connection, DuplexStream) {
        let (local, remote) = duplex(64 * 1024);
        let (read_half, write_half) = tokio::io::split(local);
        let conn = Connection::spawn(write_half, WriterConfig::default());
        (read_half, conn, remote)
    }

    async fn read_frame(stream: &mut DuplexStream, buffer: &mut FrameBuffer) -> Frame {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(frame) = buffer.next_frame().unwrap() {
                return frame;
            }
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "peer closed");
            buffer.extend(&chunk[..n]);
        }
    }

    #[tokio::test]
    async fn test_heartbeat_echoed_once_and_not_dispatched() {
        let (reader, conn, mut remote) = link();
        let recorder = std::sync::Arc::new(Recorder::default());
        let task = {
            let recorder = recorder.clone();
            tokio::spawn(async move { run_session(reader, conn, &*recorder).await })
        };

        remote
            .write_all(&encode_frame(&Frame::heartbeat()).unwrap())
            .await
            .unwrap();

        let mut buffer = FrameBuffer::new();
        let reply = read_frame(&mut remote, &mut buffer).await;
        assert_eq!(reply, Frame::heartbeat());
        assert!(!reply.has_payload());

        // Nothing else follows the single echo.
        let mut chunk = [0u8; 16];
        let extra =
            tokio::time::timeout(Duration::from_millis(50), remote.read(&mut chunk)).await;
        assert!(extra.is_err());

        assert!(recorder.frames.lock().unwrap().is_empty());

        drop(remote);
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_every_heartbeat_is_echoed() {
        let (reader, conn, mut remote) = link();
        let observer = conn.clone();
        let recorder = Recorder::default();
        let task = tokio::spawn(async move { run_session(reader, conn, &recorder).await });

        let mut buffer = FrameBuffer::new();
        for _ in 0..3 {
            remote
                .write_all(&encode_frame(&Frame::heartbeat()).unwrap())
                .await
                .unwrap();
            assert_eq!(read_frame(&mut remote, &mut buffer).await, Frame::heartbeat());
        }

        // Back-to-back heartbeats get one echo each.
        let mut burst = encode_frame(&Frame::heartbeat()).unwrap();
        burst.extend(encode_frame(&Frame::heartbeat()).unwrap());
        remote.write_all(&burst).await.unwrap();
        assert_eq!(read_frame(&mut remote, &mut buffer).await, Frame::heartbeat());
        assert_eq!(read_frame(&mut remote, &mut buffer).await, Frame::heartbeat());

        observer.close();
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_frames_reach_handler_in_order() {
        let (reader, conn, mut remote) = link();
        let recorder = std::sync::Arc::new(Recorder::default());
        let task = {
            let recorder = recorder.clone();
            tokio::spawn(async move { run_session(reader, conn, &*recorder).await })
        };

        let first = Frame::register(Registration::new("a").unwrap());
        let second = Frame::register(Registration::new("b").unwrap());
        let mut bytes = encode_frame(&first).unwrap();
        bytes.extend(encode_frame(&second).unwrap());

        // Byte at a time.
        for byte in bytes {
            remote.write_all(&[byte]).await.unwrap();
        }
        drop(remote);

        assert!(task.await.unwrap().is_ok());
        assert_eq!(*recorder.frames.lock().unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_corrupt_stream_closes_connection() {
        let (reader, conn, mut remote) = link();
        let observer = conn.clone();
        let recorder = Recorder::default();
        let task = tokio::spawn(async move { run_session(reader, conn, &recorder).await });

        remote.write_all(&[7, 0, 0, 0, 0]).await.unwrap();

        assert!(task.await.unwrap().is_err());
        assert!(!observer.is_open());
    }
}
