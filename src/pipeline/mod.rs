pub mod controller;
pub mod events;
pub mod pacer;
pub mod packager;
pub mod ring;
pub mod state;
pub mod stats;

pub use controller::{ControllerSettings, PipelineController};
pub use events::{control_pair, ControlHandle, ControlView, EventSnapshot};
pub use pacer::Pacer;
pub use packager::{PackageError, ResultPackager};
pub use ring::FrameRing;
pub use state::PipelineState;
pub use stats::{IterationReport, PipelineStats, StatsSnapshot};
