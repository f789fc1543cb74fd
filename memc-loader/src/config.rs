use std::time::Duration;

use envconfig::Envconfig;

use crate::error::ConfigError;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "INPUT_DIR", default = ".")]
    pub input_dir: String,

    // Files already consumed are dot-renamed, so hidden files never match
    #[envconfig(from = "PATTERN", default = "[!.]*.tsv.gz")]
    pub pattern: String,

    // Defaults to the number of CPUs when unset
    #[envconfig(from = "WORKERS")]
    pub workers: Option<usize>,

    #[envconfig(from = "LOADERS", default = "4")]
    pub loaders: usize,

    #[envconfig(nested = true)]
    pub addresses: TargetAddresses,

    #[envconfig(from = "WRITE_TIMEOUT_MS", default = "1000")]
    pub write_timeout_ms: u64,

    #[envconfig(from = "RETRIES", default = "5")]
    pub retries: u32,

    #[envconfig(from = "RETRY_DELAY_SECS", default = "1")]
    pub retry_delay_secs: u64,

    #[envconfig(from = "QUEUE_CAPACITY", default = "1024")]
    pub queue_capacity: usize,

    // Files loaded at or above this errors/processed ratio are reported as failed loads
    #[envconfig(from = "NORMAL_ERR_RATE", default = "0.01")]
    pub normal_err_rate: f64,

    #[envconfig(from = "TEST_MODE", default = "false")]
    pub test_mode: bool,
}

/// One store address per recognised device type. The set of device types is closed.
#[derive(Envconfig, Clone, Debug)]
pub struct TargetAddresses {
    #[envconfig(from = "IDFA_ADDRESS", default = "127.0.0.1:33013")]
    pub idfa: String,
    #[envconfig(from = "GAID_ADDRESS", default = "127.0.0.1:33014")]
    pub gaid: String,
    #[envconfig(from = "ADID_ADDRESS", default = "127.0.0.1:33015")]
    pub adid: String,
    #[envconfig(from = "DVID_ADDRESS", default = "127.0.0.1:33016")]
    pub dvid: String,
}

impl TargetAddresses {
    pub fn entries(&self) -> [(&'static str, &str); 4] {
        [
            ("idfa", self.idfa.as_str()),
            ("gaid", self.gaid.as_str()),
            ("adid", self.adid.as_str()),
            ("dvid", self.dvid.as_str()),
        ]
    }
}

impl Config {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker_count() == 0 {
            return Err(ConfigError::Zero("WORKERS"));
        }
        if self.loaders == 0 {
            return Err(ConfigError::Zero("LOADERS"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Zero("QUEUE_CAPACITY"));
        }
        if !self.normal_err_rate.is_finite() || self.normal_err_rate < 0.0 {
            return Err(ConfigError::ErrorRate(self.normal_err_rate));
        }
        globset::Glob::new(&self.pattern)?;
        Ok(())
    }
}
