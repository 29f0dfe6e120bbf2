use std::{env, path::PathBuf, str::FromStr};

use crate::{Error, Result};

pub const ENV_DUMP_IR: &str = "TENSORTRACE_DUMP_IR";
pub const ENV_DUMP_DIR: &str = "TENSORTRACE_DUMP_DIR";
pub const ENV_NUM_THREADS: &str = "TENSORTRACE_NUM_THREADS";
pub const ENV_SEED: &str = "TENSORTRACE_SEED";

/// Knobs of the evaluation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalConfig {
    /// Write the lowered program of every evaluation to `dump_dir`.
    pub dump_ir: bool,
    pub dump_dir: Option<PathBuf>,
    /// Worker threads of the reference backend.
    pub num_threads: usize,
    /// Seed of the reference backend's random initializers.
    pub seed: u64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            dump_ir: false,
            dump_dir: dirs::cache_dir().map(|dir| dir.join("tensortrace").join("ir")),
            num_threads: num_cpus::get(),
            seed: 0,
        }
    }
}

impl EvalConfig {
    /// Defaults overridden by the `TENSORTRACE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(flag) = lookup(ENV_DUMP_IR) {
            config.dump_ir = match flag.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(Error::invalid_argument(format!(
                        "{ENV_DUMP_IR} must be a boolean, got `{other}`"
                    )))
                }
            };
        }
        if let Some(dir) = lookup(ENV_DUMP_DIR) {
            config.dump_dir = Some(PathBuf::from(dir));
        }
        if let Some(threads) = lookup(ENV_NUM_THREADS) {
            config.num_threads = parse(ENV_NUM_THREADS, &threads)?;
            if config.num_threads == 0 {
                return Err(Error::invalid_argument(format!(
                    "{ENV_NUM_THREADS} must be at least 1"
                )));
            }
        }
        if let Some(seed) = lookup(ENV_SEED) {
            config.seed = parse(ENV_SEED, &seed)?;
        }

        Ok(config)
    }

    pub fn with_dump_ir(mut self, dump_ir: bool) -> Self {
        self.dump_ir = dump_ir;
        self
    }

    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| Error::invalid_argument(format!("{key}=`{raw}`: {e}")))
}
