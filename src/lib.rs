pub mod capture;
pub mod engine;
pub mod error;
pub mod input;
pub mod net;
pub mod pipeline;

use std::time::Duration;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use capture::frame::{PixelFormat, Residency};
use error::ConfigError;
use pipeline::controller::ControllerSettings;

/// Global configuration that can be atomically swapped at runtime
pub static CONFIG: once_cell::sync::Lazy<ArcSwap<Config>> =
    once_cell::sync::Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub estimator: EstimatorParams,
    pub pipeline: PipelineConfig,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Capture device path; empty means auto-detect.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
    /// Per-fetch wait ceiling handed to the source adapter.
    pub fetch_timeout_ms: u64,
    /// Residency tag carried by frames from this source.
    pub residency: Residency,
}

/// Estimation engine parameters, re-applied verbatim on every engine
/// (re)initialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorParams {
    pub bias_weight: f32,
    pub mv_div_factor: u32,
    pub smoothness_factor: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub target_fps: u32,
    pub report_channel_depth: usize,
    pub report_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Destination as host:port.
    pub address: String,
    pub mtu: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            estimator: EstimatorParams::default(),
            pipeline: PipelineConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            width: 640,
            height: 480,
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
            fetch_timeout_ms: 50,
            residency: Residency::Device,
        }
    }
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            bias_weight: 0.5,
            mv_div_factor: 4,
            smoothness_factor: 1.0,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_fps: 25,
            report_channel_depth: 64,
            report_interval_secs: 5,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5004".into(),
            mtu: net::udp::DEFAULT_MTU,
        }
    }
}

impl EstimatorParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bias_weight.is_finite() || self.bias_weight < 0.0 {
            return Err(ConfigError::InvalidParam {
                field: "estimator.bias_weight",
                reason: format!("must be a finite value >= 0, got {}", self.bias_weight),
            });
        }
        if self.mv_div_factor > 16 {
            return Err(ConfigError::InvalidParam {
                field: "estimator.mv_div_factor",
                reason: format!("must be in 0..=16, got {}", self.mv_div_factor),
            });
        }
        if !self.smoothness_factor.is_finite() || self.smoothness_factor < 0.0 {
            return Err(ConfigError::InvalidParam {
                field: "estimator.smoothness_factor",
                reason: format!("must be a finite value >= 0, got {}", self.smoothness_factor),
            });
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from an optional TOML file plus `KINESIS_*`
    /// environment overrides (e.g. `KINESIS_PIPELINE__TARGET_FPS=30`).
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("KINESIS")
                .separator("__")
                .try_parsing(true),
        );
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }

    /// Reject invalid values before the pipeline starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.estimator.validate()?;
        if self.source.width == 0 || self.source.height == 0 {
            return Err(ConfigError::InvalidParam {
                field: "source.width/height",
                reason: format!(
                    "dimensions must be nonzero, got {}x{}",
                    self.source.width, self.source.height
                ),
            });
        }
        if self.source.buffer_count == 0 {
            return Err(ConfigError::InvalidParam {
                field: "source.buffer_count",
                reason: "at least one capture buffer is required".into(),
            });
        }
        if self.pipeline.target_fps == 0 {
            return Err(ConfigError::InvalidParam {
                field: "pipeline.target_fps",
                reason: "target frame rate must be nonzero".into(),
            });
        }
        if self.sink.mtu <= 64 {
            return Err(ConfigError::InvalidParam {
                field: "sink.mtu",
                reason: format!("must exceed 64 bytes, got {}", self.sink.mtu),
            });
        }
        if self.sink.address.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidParam {
                field: "sink.address",
                reason: format!("not a host:port address: {:?}", self.sink.address),
            });
        }
        Ok(())
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            params: self.estimator,
            fetch_timeout: Duration::from_millis(self.source.fetch_timeout_ms),
            interval: Duration::from_secs_f64(1.0 / self.pipeline.target_fps as f64),
            residency: self.source.residency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn negative_bias_names_the_field() {
        let mut config = Config::default();
        config.estimator.bias_weight = -0.1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("estimator.bias_weight"));
    }

    #[test]
    fn div_factor_over_sixteen_is_rejected() {
        let mut config = Config::default();
        config.estimator.mv_div_factor = 17;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("estimator.mv_div_factor"));
    }

    #[test]
    fn nan_smoothness_is_rejected() {
        let mut config = Config::default();
        config.estimator.smoothness_factor = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_sink_address_is_rejected() {
        let mut config = Config::default();
        config.sink.address = "nowhere".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sink.address"));
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = Config::from_toml(
            r#"
            [estimator]
            bias_weight = 0.25
            mv_div_factor = 2

            [pipeline]
            target_fps = 30
            "#,
        )
        .unwrap();
        assert_eq!(config.estimator.bias_weight, 0.25);
        assert_eq!(config.estimator.mv_div_factor, 2);
        assert_eq!(config.pipeline.target_fps, 30);
        // Untouched sections keep their defaults.
        assert_eq!(config.sink.address, "127.0.0.1:5004");
    }

    #[test]
    fn settings_derive_interval_from_fps() {
        let config = Config::default();
        let settings = config.controller_settings();
        assert_eq!(settings.interval, Duration::from_secs_f64(1.0 / 25.0));
        assert_eq!(settings.fetch_timeout, Duration::from_millis(50));
    }
}
