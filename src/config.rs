//! Run configuration
//!
//! A [`RunConfig`] is resolved once at startup from three sources, highest
//! precedence first:
//!
//! 1. command-line flags ([`Cli`]),
//! 2. the YAML file named by `--config_yaml`,
//! 3. built-in defaults.
//!
//! YAML keys the launcher does not know about (model and trainer settings)
//! are kept verbatim in [`RunConfig::extra`] for the external trainer.
//! The resolved value is immutable and handed to each component that needs it.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::{batch::RepeatSpec, error::RunError, optim::GradientClipper};

pub const DEFAULT_BATCH_SIZE: usize = 64;
pub const DEFAULT_INSTANCE_REPEATS: usize = 1;
pub const DEFAULT_SEED: u64 = 1234;
pub const DEFAULT_EPOCHS: usize = 100;

/// Run settings that come from the command line or are derived at startup,
/// never from the YAML file.
pub const RESERVED_KEYS: [&str; 4] = ["config_yaml", "test_only", "start_time", "result_dir"];

/// Format of the run timestamp that names the result directory.
pub const RUN_STAMP_FORMAT: &str = "%Y-%m%d-%H%M%S";

/// Command-line flags. Every setting is optional so that an absent flag
/// falls through to the YAML file.
#[derive(Parser, Debug, Clone)]
#[command(name = "multistart", about = "Multi-start rollout training launcher")]
pub struct Cli {
    /// Training batch size
    #[arg(long = "batch_size")]
    pub batch_size: Option<usize>,

    /// Number of times to clone each instance
    #[arg(long = "instance_repeats")]
    pub instance_repeats: Option<usize>,

    /// Path to the problem generator config
    #[arg(long = "config_file")]
    pub config_file: Option<PathBuf>,

    /// Path to the model/training config YAML
    #[arg(long = "config_yaml", default_value = "config.yaml")]
    pub config_yaml: PathBuf,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Only run test/inference
    #[arg(long = "test_only")]
    pub test_only: bool,

    /// Path to a saved model checkpoint
    #[arg(long = "load_path")]
    pub load_path: Option<PathBuf>,

    /// Maximum gradient norm per parameter group (<= 0 disables clipping)
    #[arg(long = "max_grad_norm", allow_negative_numbers = true)]
    pub max_grad_norm: Option<f64>,

    /// Number of training epochs
    #[arg(long)]
    pub epochs: Option<usize>,

    /// Directory under which per-run result directories are created
    #[arg(long = "result_root", default_value = "result")]
    pub result_root: PathBuf,
}

/// Settings read from the YAML file.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub batch_size: Option<usize>,
    pub instance_repeats: Option<usize>,
    pub config_file: Option<PathBuf>,
    pub seed: Option<u64>,
    pub load_path: Option<PathBuf>,
    pub max_grad_norm: Option<f64>,
    pub epochs: Option<usize>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl FileConfig {
    /// Parses YAML text. An empty document yields the defaults; a
    /// [reserved](RESERVED_KEYS) key is an error.
    pub fn from_yaml(text: &str, path: &Path) -> Result<Self, RunError> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|source| RunError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;

        match value {
            serde_yaml::Value::Null => Ok(Self::default()),
            serde_yaml::Value::Mapping(_) => {
                let file: Self = serde_yaml::from_value(value).map_err(|source| RunError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?;
                if let Some(key) = RESERVED_KEYS.iter().find(|k| file.extra.contains_key(**k)) {
                    return Err(RunError::ReservedKey {
                        path: path.to_path_buf(),
                        key: key.to_string(),
                    });
                }
                Ok(file)
            }
            _ => Err(RunError::NotAMapping {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn load(path: &Path) -> Result<Self, RunError> {
        let text = fs::read_to_string(path).map_err(|source| RunError::File {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text, path)
    }
}

/// Whether the run trains or only evaluates a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
pub enum Mode {
    Train,
    Test,
}

/// Fully resolved settings of one run.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub batch_size: usize,
    pub instance_repeats: usize,
    pub config_file: PathBuf,
    pub config_yaml: PathBuf,
    pub seed: u64,
    pub test_only: bool,
    pub load_path: Option<PathBuf>,
    /// `f64::INFINITY` when unbounded; serialized as `null`.
    pub max_grad_norm: f64,
    pub epochs: usize,
    pub start_time: String,
    pub result_dir: PathBuf,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl RunConfig {
    /// Merges flags over file settings over defaults.
    pub fn resolve(cli: &Cli, file: FileConfig, started: DateTime<Local>) -> Self {
        let start_time = started.format(RUN_STAMP_FORMAT).to_string();
        let result_dir = cli.result_root.join(&start_time);

        Self {
            batch_size: cli
                .batch_size
                .or(file.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            instance_repeats: cli
                .instance_repeats
                .or(file.instance_repeats)
                .unwrap_or(DEFAULT_INSTANCE_REPEATS),
            config_file: cli
                .config_file
                .clone()
                .or(file.config_file)
                .unwrap_or_else(|| PathBuf::from("config.json")),
            config_yaml: cli.config_yaml.clone(),
            seed: cli.seed.or(file.seed).unwrap_or(DEFAULT_SEED),
            test_only: cli.test_only,
            load_path: cli.load_path.clone().or(file.load_path),
            max_grad_norm: cli
                .max_grad_norm
                .or(file.max_grad_norm)
                .unwrap_or(f64::INFINITY),
            epochs: cli.epochs.or(file.epochs).unwrap_or(DEFAULT_EPOCHS),
            start_time,
            result_dir,
            extra: file.extra,
        }
    }

    /// Reads the YAML file named by `cli` and resolves against the current time.
    pub fn load(cli: &Cli) -> Result<Self, RunError> {
        let file = FileConfig::load(&cli.config_yaml)?;
        Ok(Self::resolve(cli, file, Local::now()))
    }

    pub fn mode(&self) -> Mode {
        if self.test_only {
            Mode::Test
        } else {
            Mode::Train
        }
    }

    /// Repeat specification for multi-start batching.
    pub fn repeat_spec(&self) -> RepeatSpec {
        RepeatSpec::from(self.instance_repeats as i64)
    }

    pub fn clipper(&self) -> GradientClipper {
        GradientClipper::new(self.max_grad_norm)
    }

    /// Pretty JSON for the run log.
    pub fn to_json(&self) -> Result<String, RunError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
