use crate::Result;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

pub mod pacing;
pub mod ts;

/// Consumer of serialized 188-byte transport packets, in emission order
#[async_trait::async_trait]
pub trait PacketSink: Send {
    /// Hands one packet to the sink
    async fn send_packet(&mut self, packet: &[u8]) -> Result<()>;

    /// Flush any buffered packets
    async fn flush(&mut self) -> Result<()>;
}

/// Buffered sink over any async writer (file, socket, pipe)
pub struct WriterSink<W: AsyncWrite + Unpin + Send> {
    writer: BufWriter<W>,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            bytes_written: 0,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Returns the underlying writer. Call [`PacketSink::flush`] first or
    /// buffered packets are lost.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send> PacketSink for WriterSink<W> {
    async fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.writer.write_all(packet).await?;
        self.bytes_written += packet.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }
}

/// Sink keeping every packet in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    pub packets: Vec<Bytes>,
    pub flushes: usize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All packets concatenated
    pub fn data(&self) -> Vec<u8> {
        self.packets.iter().flat_map(|p| p.iter().copied()).collect()
    }
}

#[async_trait::async_trait]
impl PacketSink for MemorySink {
    async fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.packets.push(Bytes::copy_from_slice(packet));
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writer_sink_buffers_until_flush() {
        let mut sink = WriterSink::new(Vec::new());
        sink.send_packet(&[0x47; 188]).await.unwrap();
        sink.send_packet(&[0x47; 188]).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.bytes_written(), 376);
        assert_eq!(sink.into_inner().len(), 376);
    }

    #[tokio::test]
    async fn test_writer_sink_writes_packets_in_order() {
        let first = [0x47, 0x00, 0x00, 0x10];
        let second = [0x47, 0x01, 0x00, 0x11];
        let writer = tokio_test::io::Builder::new()
            .write(&first)
            .write(&second)
            .build();
        let mut sink = WriterSink::new(writer);
        sink.send_packet(&first).await.unwrap();
        sink.send_packet(&second).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.bytes_written(), 8);
    }

    #[tokio::test]
    async fn test_memory_sink() {
        let mut sink = MemorySink::new();
        sink.send_packet(&[1, 2]).await.unwrap();
        sink.send_packet(&[3]).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.data(), vec![1, 2, 3]);
        assert_eq!(sink.flushes, 1);
    }
}
