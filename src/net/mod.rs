pub mod sink;
pub mod udp;

pub use sink::{FrameSink, TransmitPayload};
pub use udp::UdpSink;
