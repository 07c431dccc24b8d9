//! V4L2 source adapter with memory-mapped capture buffers.

use std::time::Duration;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use tracing::{error, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::decoder;
use crate::capture::frame::{Frame, PixelFormat};
use crate::capture::source::{FrameSource, SourceStatus};
use crate::SourceConfig;

/// Live camera source backed by V4L2.
///
/// Fetch waits are bounded by the driver's dequeue deadline rather than
/// the caller-supplied timeout; a dequeue that reports `WouldBlock` or
/// `TimedOut` surfaces as `SourceStatus::Timeout` so the controller
/// retries the same slot.
pub struct V4l2Source {
    config: SourceConfig,
    device: Option<Box<Device>>,
    stream: Option<MmapStream<'static>>,
    sequence: u64,
}

impl V4l2Source {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            device: None,
            stream: None,
            sequence: 0,
        }
    }

    fn open_device(&mut self) -> Result<()> {
        info!("Opening capture device {}", self.config.device);

        let device = Device::with_path(&self.config.device)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(eyre!("{} does not support video capture", self.config.device));
        }

        let mut fmt = device.format()?;
        fmt.width = self.config.width;
        fmt.height = self.config.height;
        fmt.fourcc = match self.config.format {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
            PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
            other => return Err(eyre!("unsupported capture format {other}")),
        };
        device.set_format(&fmt)?;

        let device = Box::new(device);
        let stream =
            MmapStream::with_buffers(&device, Type::VideoCapture, self.config.buffer_count)?;

        self.device = Some(device);
        self.stream = Some(stream);
        self.sequence = 0;
        info!(
            "Capture stream started with {} buffers",
            self.config.buffer_count
        );
        Ok(())
    }

    fn close_device(&mut self) {
        self.stream = None;
        self.device = None;
    }
}

#[async_trait]
impl FrameSource for V4l2Source {
    async fn open(&mut self) -> bool {
        match self.open_device() {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to open capture source: {e:#}");
                false
            }
        }
    }

    async fn fetch(&mut self, slot: &mut Frame, _timeout: Duration) -> SourceStatus {
        let Some(stream) = self.stream.as_mut() else {
            return SourceStatus::Closed;
        };

        // The mmap dequeue blocks inside the driver, so keep it off the
        // async worker threads.
        let dequeued = tokio::task::block_in_place(|| match stream.next() {
            Ok((buf, _meta)) => Ok(buf.to_vec()),
            Err(e) => Err(e),
        });

        let raw = match dequeued {
            Ok(raw) => raw,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                return SourceStatus::Timeout;
            }
            Err(e) => {
                warn!("Capture dequeue failed: {e}");
                return SourceStatus::Closed;
            }
        };

        if let Err(e) = decoder::decode_into(&raw, self.config.format, slot) {
            warn!("Frame decode failed: {e}");
            return SourceStatus::Closed;
        }

        self.sequence += 1;
        slot.meta.sequence = self.sequence;
        SourceStatus::Ok
    }

    async fn reopen(&mut self) -> bool {
        self.close_device();
        self.open().await
    }

    fn frame_dimensions(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn pixel_format(&self) -> PixelFormat {
        self.config.format
    }
}

/// Auto-detect the first usable capture device, preferring MJPEG.
pub fn auto_detect_device() -> Result<(String, PixelFormat)> {
    use std::path::Path;

    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{i}");
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            continue;
        }

        if let Ok(formats) = dev.enum_formats() {
            for fmt in formats {
                if fmt.fourcc == FourCC::new(b"MJPG") {
                    info!("Found MJPEG device: {} - {}", path, caps.card);
                    return Ok((path, PixelFormat::Mjpeg));
                } else if fmt.fourcc == FourCC::new(b"YUYV") {
                    info!("Found YUYV device: {} - {}", path, caps.card);
                    return Ok((path, PixelFormat::Yuyv4));
                }
            }
        }
    }

    Err(eyre!("No suitable capture device found"))
}
