//! Chunked UDP sink for frame + motion payloads.
//!
//! Each payload is split into MTU-sized datagrams so it can cross the
//! wire without IP fragmentation: one header datagram describing the
//! frame, then data chunks covering the video bytes followed by the
//! motion bytes.
//!
//! ## Wire format
//!
//! **Payload header packet** (49 bytes, little-endian):
//! ```text
//! sequence:      u32  (4)
//! frame:         u64  (8)
//! timestamp_us:  u64  (8)
//! width:         u32  (4)
//! height:        u32  (4)
//! motion_cols:   u32  (4)
//! motion_rows:   u32  (4)
//! residency:     u8   (1)
//! video_len:     u32  (4)
//! motion_len:    u32  (4)
//! total_chunks:  u32  (4)
//! ```
//!
//! **Chunk packet** (12 byte header + payload):
//! ```text
//! sequence:      u32  (4)
//! chunk_index:   u32  (4)
//! chunk_size:    u32  (4)
//! data:          [u8] (variable, ≤ MTU − 12)
//! ```

use std::net::SocketAddr;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{info, warn};

use crate::capture::frame::Residency;
use crate::net::sink::{FrameSink, TransmitPayload};

/// Maximum transmission unit minus IP (20) + UDP (8) headers.
pub const DEFAULT_MTU: usize = 1400;

const CHUNK_HEADER: usize = 12;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("payload header too short: {0} < {1}")]
    HeaderTooShort(usize, usize),

    #[error("unknown residency tag {0:#x}")]
    BadResidency(u8),
}

/// Per-payload metadata sent as the first datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub sequence: u32,
    pub frame: u64,
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    pub motion_cols: u32,
    pub motion_rows: u32,
    pub residency: Residency,
    pub video_len: u32,
    pub motion_len: u32,
    pub total_chunks: u32,
}

impl PayloadHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 49;

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.sequence.to_le_bytes());
        buf[4..12].copy_from_slice(&self.frame.to_le_bytes());
        buf[12..20].copy_from_slice(&self.timestamp_us.to_le_bytes());
        buf[20..24].copy_from_slice(&self.width.to_le_bytes());
        buf[24..28].copy_from_slice(&self.height.to_le_bytes());
        buf[28..32].copy_from_slice(&self.motion_cols.to_le_bytes());
        buf[32..36].copy_from_slice(&self.motion_rows.to_le_bytes());
        buf[36] = match self.residency {
            Residency::Host => 0,
            Residency::Device => 1,
        };
        buf[37..41].copy_from_slice(&self.video_len.to_le_bytes());
        buf[41..45].copy_from_slice(&self.motion_len.to_le_bytes());
        buf[45..49].copy_from_slice(&self.total_chunks.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < Self::SIZE {
            return Err(WireError::HeaderTooShort(data.len(), Self::SIZE));
        }
        let residency = match data[36] {
            0 => Residency::Host,
            1 => Residency::Device,
            other => return Err(WireError::BadResidency(other)),
        };
        Ok(Self {
            sequence: u32::from_le_bytes(data[0..4].try_into().unwrap()),
            frame: u64::from_le_bytes(data[4..12].try_into().unwrap()),
            timestamp_us: u64::from_le_bytes(data[12..20].try_into().unwrap()),
            width: u32::from_le_bytes(data[20..24].try_into().unwrap()),
            height: u32::from_le_bytes(data[24..28].try_into().unwrap()),
            motion_cols: u32::from_le_bytes(data[28..32].try_into().unwrap()),
            motion_rows: u32::from_le_bytes(data[32..36].try_into().unwrap()),
            residency,
            video_len: u32::from_le_bytes(data[37..41].try_into().unwrap()),
            motion_len: u32::from_le_bytes(data[41..45].try_into().unwrap()),
            total_chunks: u32::from_le_bytes(data[45..49].try_into().unwrap()),
        })
    }
}

/// How many chunk datagrams a payload of `len` bytes needs.
pub fn chunk_count(len: usize, mtu: usize) -> u32 {
    let capacity = mtu - CHUNK_HEADER;
    len.div_ceil(capacity) as u32
}

/// UDP sink streaming to a fixed destination.
pub struct UdpSink {
    dest: SocketAddr,
    mtu: usize,
    socket: Option<UdpSocket>,
    sequence: u32,
}

impl UdpSink {
    pub fn new(dest: SocketAddr, mtu: usize) -> Self {
        Self {
            dest,
            mtu,
            socket: None,
            sequence: 0,
        }
    }

    async fn send_all(&self, payload: &TransmitPayload) -> std::io::Result<()> {
        let socket = match &self.socket {
            Some(s) => s,
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotConnected,
                    "sink not opened",
                ))
            }
        };

        let total = payload.video.len() + payload.motion.len();
        let header = PayloadHeader {
            sequence: self.sequence,
            frame: payload.frame,
            timestamp_us: payload.timestamp_us,
            width: payload.width,
            height: payload.height,
            motion_cols: payload.motion_cols,
            motion_rows: payload.motion_rows,
            residency: payload.residency,
            video_len: payload.video.len() as u32,
            motion_len: payload.motion.len() as u32,
            total_chunks: chunk_count(total, self.mtu),
        };
        socket.send(&header.encode()).await?;

        let capacity = self.mtu - CHUNK_HEADER;
        let mut datagram = Vec::with_capacity(self.mtu);
        let mut index = 0u32;
        let stream = payload.video.iter().chain(payload.motion.iter());
        let mut chunk: Vec<u8> = Vec::with_capacity(capacity);
        for byte in stream {
            chunk.push(*byte);
            if chunk.len() == capacity {
                Self::send_chunk(socket, &mut datagram, self.sequence, index, &chunk).await?;
                index += 1;
                chunk.clear();
            }
        }
        if !chunk.is_empty() {
            Self::send_chunk(socket, &mut datagram, self.sequence, index, &chunk).await?;
        }
        Ok(())
    }

    async fn send_chunk(
        socket: &UdpSocket,
        datagram: &mut Vec<u8>,
        sequence: u32,
        index: u32,
        data: &[u8],
    ) -> std::io::Result<()> {
        datagram.clear();
        datagram.extend_from_slice(&sequence.to_le_bytes());
        datagram.extend_from_slice(&index.to_le_bytes());
        datagram.extend_from_slice(&(data.len() as u32).to_le_bytes());
        datagram.extend_from_slice(data);
        socket.send(datagram).await?;
        Ok(())
    }
}

#[async_trait]
impl FrameSink for UdpSink {
    async fn open(&mut self) -> bool {
        let bind_addr: SocketAddr = if self.dest.is_ipv4() {
            (std::net::Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = match UdpSocket::bind(bind_addr).await {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to bind transmit socket: {e}");
                return false;
            }
        };
        if let Err(e) = socket.connect(self.dest).await {
            warn!("Failed to connect transmit socket to {}: {e}", self.dest);
            return false;
        }
        info!("Streaming to {}", self.dest);
        self.socket = Some(socket);
        true
    }

    async fn transmit(&mut self, payload: &TransmitPayload) -> bool {
        match self.send_all(payload).await {
            Ok(()) => {
                self.sequence = self.sequence.wrapping_add(1);
                true
            }
            Err(e) => {
                warn!("Transmit to {} failed: {e}", self.dest);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn payload(video: usize, motion: usize) -> TransmitPayload {
        TransmitPayload {
            video: Bytes::from(vec![0xAB; video]),
            motion: Bytes::from(vec![0xCD; motion]),
            width: 64,
            height: 48,
            motion_cols: 4,
            motion_rows: 3,
            residency: Residency::Device,
            frame: 12,
            timestamp_us: 777,
        }
    }

    #[test]
    fn header_roundtrip() {
        let header = PayloadHeader {
            sequence: 3,
            frame: 99,
            timestamp_us: 123_456,
            width: 640,
            height: 480,
            motion_cols: 40,
            motion_rows: 30,
            residency: Residency::Device,
            video_len: 640 * 480 * 3,
            motion_len: 40 * 30 * 8,
            total_chunks: 700,
        };
        let decoded = PayloadHeader::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn short_header_is_rejected() {
        let err = PayloadHeader::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, WireError::HeaderTooShort(10, _)));
    }

    #[test]
    fn chunk_count_covers_remainder() {
        assert_eq!(chunk_count(0, 1400), 0);
        assert_eq!(chunk_count(1, 1400), 1);
        assert_eq!(chunk_count(1388, 1400), 1);
        assert_eq!(chunk_count(1389, 1400), 2);
        assert_eq!(chunk_count(2776, 1400), 2);
    }

    #[tokio::test]
    async fn loopback_transmit_reassembles() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dest = receiver.local_addr().unwrap();

        let mut sink = UdpSink::new(dest, 64);
        assert!(sink.open().await);

        let sent = payload(100, 24);
        assert!(sink.transmit(&sent).await);

        let mut buf = [0u8; 2048];
        let n = receiver.recv(&mut buf).await.unwrap();
        let header = PayloadHeader::decode(&buf[..n]).unwrap();
        assert_eq!(header.sequence, 0);
        assert_eq!(header.frame, 12);
        assert_eq!(header.video_len, 100);
        assert_eq!(header.motion_len, 24);
        assert_eq!(header.total_chunks, chunk_count(124, 64));

        let mut assembled = Vec::new();
        for expected_index in 0..header.total_chunks {
            let n = receiver.recv(&mut buf).await.unwrap();
            assert!(n >= 12);
            let seq = u32::from_le_bytes(buf[0..4].try_into().unwrap());
            let index = u32::from_le_bytes(buf[4..8].try_into().unwrap());
            let len = u32::from_le_bytes(buf[8..12].try_into().unwrap()) as usize;
            assert_eq!(seq, 0);
            assert_eq!(index, expected_index);
            assert_eq!(n, 12 + len);
            assembled.extend_from_slice(&buf[12..12 + len]);
        }

        assert_eq!(assembled.len(), 124);
        assert!(assembled[..100].iter().all(|b| *b == 0xAB));
        assert!(assembled[100..].iter().all(|b| *b == 0xCD));
    }

    #[tokio::test]
    async fn transmit_without_open_fails() {
        let mut sink = UdpSink::new("127.0.0.1:5004".parse().unwrap(), DEFAULT_MTU);
        assert!(!sink.transmit(&payload(10, 8)).await);
    }
}
