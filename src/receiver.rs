//! Datagram receiver stage
//!
//! Waits on socket readiness, decodes each datagram into unsigned 16-bit
//! samples and forwards the chunk downstream without ever blocking on a full
//! ingest channel.

use crate::channel::Sender;
use crate::error::{PipelineError, PipelineResult};
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

/// Largest payload read per datagram; longer datagrams are truncated by the kernel
pub const MAX_DATAGRAM_SIZE: usize = 16384;

/// Samples decoded from a single datagram, in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleChunk {
    samples: Vec<u16>,
}

impl SampleChunk {
    /// Decode little-endian u16 samples; an odd trailing byte is ignored
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self { samples }
    }

    pub fn samples(&self) -> &[u16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Vec<u16>> for SampleChunk {
    fn from(samples: Vec<u16>) -> Self {
        Self { samples }
    }
}

pub struct UdpReceiver {
    socket: UdpSocket,
    max_datagram: usize,
}

impl UdpReceiver {
    /// Bind the receive socket; failure here is fatal for the pipeline
    pub async fn bind(addr: SocketAddr, max_datagram: usize) -> PipelineResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| PipelineError::Bind { addr, source })?;

        info!(
            addr = %socket.local_addr()?,
            max_datagram,
            "UDP receiver bound"
        );

        Ok(Self {
            socket,
            max_datagram: max_datagram.max(2),
        })
    }

    pub fn local_addr(&self) -> PipelineResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive datagrams until the downstream channel is dropped
    pub async fn run(self, ingest: Sender<SampleChunk>) -> PipelineResult<()> {
        let mut buf = vec![0u8; self.max_datagram];

        loop {
            self.socket.readable().await?;

            let (len, peer) = match self.socket.try_recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(e) => {
                    warn!(error = %e, "Failed to receive datagram");
                    continue;
                }
            };

            if len % 2 != 0 {
                trace!(%peer, len, "Odd datagram length, trailing byte dropped");
            }

            let chunk = SampleChunk::from_le_bytes(&buf[..len]);
            if chunk.is_empty() {
                trace!(%peer, "Empty datagram forwarded");
            } else {
                trace!(%peer, samples = chunk.len(), "Chunk received");
            }

            match ingest.push(chunk) {
                Ok(Some(_)) => trace!("Ingest channel full, dropped oldest chunk"),
                Ok(None) => {}
                Err(_) => {
                    debug!("Ingest channel closed, stopping receiver");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use std::time::Duration;

    async fn next_chunk(rx: &mut channel::Receiver<SampleChunk>) -> SampleChunk {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for chunk")
            .expect("ingest channel closed")
    }

    #[test]
    fn test_decode_little_endian() {
        let chunk = SampleChunk::from_le_bytes(&[0x01, 0x00, 0xff, 0x03, 0x00, 0x80]);
        assert_eq!(chunk.samples(), &[1, 1023, 32768]);
    }

    #[test]
    fn test_decode_drops_trailing_odd_byte() {
        let chunk = SampleChunk::from_le_bytes(&[0x02, 0x00, 0x07]);
        assert_eq!(chunk.samples(), &[2]);
        assert!(SampleChunk::from_le_bytes(&[0x07]).is_empty());
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(SampleChunk::from_le_bytes(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let first = UdpReceiver::bind("127.0.0.1:0".parse().unwrap(), MAX_DATAGRAM_SIZE)
            .await
            .unwrap();
        let taken = first.local_addr().unwrap();

        let second = UdpReceiver::bind(taken, MAX_DATAGRAM_SIZE).await;
        assert!(matches!(second, Err(PipelineError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_datagrams_become_chunks() {
        let receiver = UdpReceiver::bind("127.0.0.1:0".parse().unwrap(), MAX_DATAGRAM_SIZE)
            .await
            .unwrap();
        let addr = receiver.local_addr().unwrap();
        let (tx, mut rx) = channel::bounded(16);
        let task = tokio::spawn(receiver.run(tx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[1, 0, 2, 0], addr).await.unwrap();
        sender.send_to(&[], addr).await.unwrap();
        sender.send_to(&[3, 0, 9], addr).await.unwrap();

        assert_eq!(next_chunk(&mut rx).await.samples(), &[1, 2]);
        assert!(next_chunk(&mut rx).await.is_empty());
        assert_eq!(next_chunk(&mut rx).await.samples(), &[3]);

        task.abort();
    }

    #[tokio::test]
    async fn test_oversized_datagram_is_truncated() {
        let receiver = UdpReceiver::bind("127.0.0.1:0".parse().unwrap(), 8)
            .await
            .unwrap();
        let addr = receiver.local_addr().unwrap();
        let (tx, mut rx) = channel::bounded(4);
        let task = tokio::spawn(receiver.run(tx));

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let payload: Vec<u8> = (1..=8u16).flat_map(|v| v.to_le_bytes()).collect();
        sender.send_to(&payload, addr).await.unwrap();

        assert_eq!(next_chunk(&mut rx).await.samples(), &[1, 2, 3, 4]);

        task.abort();
    }
}
