use std::{
    collections::HashMap,
    path::PathBuf,
};

/// Command line overrides for the engine configuration.
/// Flattened into the binary's argument parser and layered last.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct Args {
    /// Extra configuration file (yaml) layered over the user config.
    #[arg(long = "config", env = "HUDDLE_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Retry attempts before a stream is marked failed.
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Fraction of the per-stream bandwidth a tier may use.
    #[arg(long)]
    pub safety_margin: Option<f64>,

    /// Interval of the adaptive quality control loop.
    #[arg(long)]
    pub control_cycle_interval_ms: Option<u64>,

    /// Time without events after which a participant is dropped.
    #[arg(long)]
    pub liveness_timeout_ms: Option<u64>,
}

impl config::Source for Args {
    fn clone_into_box(&self) -> Box<dyn config::Source + Send + Sync> {
        Box::new((*self).clone())
    }

    fn collect(&self) -> Result<config::Map<String, config::Value>, config::ConfigError> {
        let mut cache = HashMap::<String, config::Value>::new();
        if let Some(value) = self.max_retries {
            cache.insert("max_retries".to_string(), (value as u64).into());
        }
        if let Some(value) = self.safety_margin {
            cache.insert("safety_margin".to_string(), value.into());
        }
        if let Some(value) = self.control_cycle_interval_ms {
            cache.insert("control_cycle_interval_ms".to_string(), value.into());
        }
        if let Some(value) = self.liveness_timeout_ms {
            cache.insert("liveness_timeout_ms".to_string(), value.into());
        }
        Ok(cache)
    }
}
