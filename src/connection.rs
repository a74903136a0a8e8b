use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time;
use tokio_util::codec::FramedRead;
use tracing::debug;
use uuid::Uuid;

use crate::codec::ValueCodec;

/// One live socket for one logical connection attempt. The read half is
/// wrapped in a frame decoder and polled by the engine; the write half
/// performs batched sends.
pub(crate) struct Connection {
    pub id: Uuid,
    pub reader: FramedRead<OwnedReadHalf, ValueCodec>,
    pub writer: Writer,
}

impl Connection {
    /// Opens a TCP connection to a single candidate address. Failures are
    /// reported without retrying; retry policy belongs to the engine.
    pub async fn connect(addr: SocketAddr, limit: Option<Duration>) -> io::Result<Connection> {
        let stream = match limit {
            Some(limit) => time::timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, "connection attempt timed out")
                })??,
            None => TcpStream::connect(addr).await?,
        };
        stream.set_nodelay(true)?;

        let id = Uuid::new_v4();
        debug!(connection_id = %id, "connected to {}", addr);

        let (read_half, write_half) = stream.into_split();
        Ok(Connection {
            id,
            reader: FramedRead::new(read_half, ValueCodec),
            writer: Writer { half: write_half },
        })
    }
}

pub(crate) struct Writer {
    half: OwnedWriteHalf,
}

impl Writer {
    /// Concatenates the buffers into one contiguous send and completes only
    /// once everything has been handed to the socket. Consuming `self` keeps
    /// a second write from starting while one is in flight.
    pub async fn write_batch(mut self, buffers: Vec<Bytes>) -> (Writer, io::Result<()>) {
        let mut batch = Vec::with_capacity(buffers.iter().map(Bytes::len).sum());
        for buffer in &buffers {
            batch.extend_from_slice(buffer);
        }
        let result = self.half.write_all(&batch).await;
        (self, result)
    }
}
