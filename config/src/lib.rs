#[macro_use]
extern crate tracing;

mod app_config;
mod args;
mod network_config;
mod quality_profile;

pub use app_config::get_config_dir;
pub use args::Args;
use eyre::{
    ensure,
    Context as _,
    Result,
};
pub use network_config::{
    Codec,
    CodecIter,
    NetworkThresholds,
    QualityThreshold,
};
pub use quality_profile::{
    QualityProfile,
    Resolution,
    ResolutionIter,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    path::Path,
    time::Duration,
};

/// Tunables of the session core: retry bound, bandwidth headroom, loop
/// cadences, conflict-resolution windows and the quality catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_retries: u32,
    pub safety_margin: f64,
    pub control_cycle_interval_ms: u64,
    pub liveness_timeout_ms: u64,
    pub sample_interval_ms: u64,
    pub sample_window: usize,
    pub clock_skew_tolerance_ms: u64,
    pub replay_window: usize,
    pub retry_base_delay_ms: u64,
    pub retry_ceiling_delay_ms: u64,
    pub codec_preference: Vec<Codec>,
    #[serde(default)]
    pub network: NetworkThresholds,
    pub quality_catalog: Vec<QualityProfile>,
}

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");
const ENV_PREFIX: &str = "HUDDLE";

impl Default for EngineConfig {
    fn default() -> Self {
        serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
    }
}

impl EngineConfig {
    /// Defaults, then `config.yaml` in the user config dir, then the file
    /// passed with `--config`, then `HUDDLE__*` env vars, then the args.
    pub fn new(args: Args) -> Result<Self> {
        Self::load(&get_config_dir(), args)
    }

    pub fn load(config_dir: &Path, args: Args) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Yaml))
            .add_source(
                config::File::from(config_dir.join("config.yaml"))
                    .format(config::FileFormat::Yaml)
                    .required(false),
            );

        if let Some(path) = &args.config_file {
            debug!(?path, "Layering explicit config file");
            builder = builder.add_source(config::File::from(path.as_path()).format(config::FileFormat::Yaml));
        }

        builder = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .add_source(args);

        let cfg: Self = builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(!self.quality_catalog.is_empty(), "quality_catalog must not be empty");
        for pair in self.quality_catalog.windows(2) {
            ensure!(
                pair[0].tier_rank < pair[1].tier_rank,
                "quality_catalog must be sorted by strictly increasing tier_rank ({} before {})",
                pair[0],
                pair[1]
            );
            ensure!(
                pair[0].target_bitrate_kbps < pair[1].target_bitrate_kbps,
                "higher tiers must have a higher bitrate ({} before {})",
                pair[0],
                pair[1]
            );
        }
        ensure!(
            self.safety_margin > 0.0 && self.safety_margin <= 1.0,
            "safety_margin must be in (0, 1], got {}",
            self.safety_margin
        );
        ensure!(self.control_cycle_interval_ms > 0, "control_cycle_interval_ms must be positive");
        ensure!(self.sample_interval_ms > 0, "sample_interval_ms must be positive");
        ensure!(self.liveness_timeout_ms > 0, "liveness_timeout_ms must be positive");
        ensure!(self.sample_window > 0, "sample_window must be positive");
        ensure!(self.replay_window > 0, "replay_window must be positive");
        ensure!(!self.codec_preference.is_empty(), "codec_preference must not be empty");
        ensure!(
            self.retry_base_delay_ms <= self.retry_ceiling_delay_ms,
            "retry_base_delay_ms ({}) must not exceed retry_ceiling_delay_ms ({})",
            self.retry_base_delay_ms,
            self.retry_ceiling_delay_ms
        );
        Ok(())
    }

    pub fn control_cycle_interval(&self) -> Duration {
        Duration::from_millis(self.control_cycle_interval_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn clock_skew_tolerance(&self) -> Duration {
        Duration::from_millis(self.clock_skew_tolerance_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_ceiling_delay(&self) -> Duration {
        Duration::from_millis(self.retry_ceiling_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.safety_margin, 0.8);
        assert_eq!(config.control_cycle_interval(), Duration::from_secs(5));
        assert_eq!(config.liveness_timeout(), Duration::from_secs(30));
        assert_eq!(config.sample_window, 10);
        assert_eq!(config.codec_preference, vec![Codec::Vp9, Codec::Vp8, Codec::H264]);
        assert_eq!(config.quality_catalog.len(), 6);
    }

    #[test]
    fn load_layers_user_file_then_args() {
        let dir = temp_dir::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.yaml"),
            "max_retries: 3\nsafety_margin: 0.5\nsample_window: 4\n",
        )
        .unwrap();

        let args = Args {
            safety_margin: Some(0.7),
            ..Default::default()
        };
        let config = EngineConfig::load(dir.path(), args).unwrap();

        assert_eq!(config.max_retries, 3);
        assert_eq!(config.sample_window, 4);
        assert_eq!(config.safety_margin, 0.7);
        assert_eq!(config.quality_catalog, EngineConfig::default().quality_catalog);
    }

    #[test]
    fn load_rejects_invalid_margin() {
        let dir = temp_dir::TempDir::new().unwrap();
        let args = Args {
            safety_margin: Some(1.5),
            ..Default::default()
        };
        assert!(EngineConfig::load(dir.path(), args).is_err());
    }

    #[test]
    fn validate_rejects_unordered_catalog() {
        let mut config = EngineConfig::default();
        config.quality_catalog.swap(0, 1);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.quality_catalog.clear();
        assert!(config.validate().is_err());
    }
}
