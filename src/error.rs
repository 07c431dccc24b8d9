//! Error taxonomy and process exit mapping.
//!
//! Every fatal outcome maps to a distinct exit code so an operator can
//! tell a dead camera from a bad config from a failed reconnect.

use thiserror::Error;

use crate::engine::EstimatorError;

/// Exit codes reported by the binary.
pub mod exit_code {
    pub const SUCCESS: u8 = 0;
    /// Unexpected collaborator failure
    pub const FAILURE: u8 = 1;
    pub const INVALID_CONFIG: u8 = 2;
    pub const NO_SOURCE: u8 = 3;
    pub const NO_FRAMES: u8 = 4;
    pub const RECOVERY_FAILED: u8 = 5;
    pub const TRANSMIT_SETUP: u8 = 6;
}

/// Configuration rejected before the pipeline starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidParam {
        field: &'static str,
        reason: String,
    },

    #[error("cannot load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Fatal pipeline outcomes surfaced by the controller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("cannot open frame source")]
    SourceUnavailable,

    #[error("source produced no frames")]
    NoFrames,

    #[error("source recovery failed: {0}")]
    RecoveryFailed(&'static str),

    #[error("cannot open network sink")]
    TransmitSetup,

    #[error("estimation engine failed: {0}")]
    Estimator(#[from] EstimatorError),
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::SourceUnavailable => exit_code::NO_SOURCE,
            PipelineError::NoFrames => exit_code::NO_FRAMES,
            PipelineError::RecoveryFailed(_) => exit_code::RECOVERY_FAILED,
            PipelineError::TransmitSetup => exit_code::TRANSMIT_SETUP,
            PipelineError::Estimator(_) => exit_code::FAILURE,
        }
    }
}
