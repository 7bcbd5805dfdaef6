//! Run preparation
//!
//! Everything the launcher does before handing control to the trainer:
//! resolve the configuration, create the result directory, install the run
//! logger, dump the configuration to the log and seed the random number
//! generator.

use std::fs;

use log::info;
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    config::{Cli, Mode, RunConfig},
    error::RunError,
    logging,
};

/// A prepared run, ready for the trainer.
#[derive(Debug)]
pub struct RunContext {
    pub config: RunConfig,
    pub rng: StdRng,
}

impl RunContext {
    /// Resolves the configuration named by `cli` and prepares the run.
    pub fn prepare(cli: &Cli) -> Result<Self, RunError> {
        Self::from_config(RunConfig::load(cli)?)
    }

    /// Prepares a run from an already resolved configuration.
    pub fn from_config(config: RunConfig) -> Result<Self, RunError> {
        fs::create_dir_all(&config.result_dir).map_err(|source| RunError::File {
            path: config.result_dir.clone(),
            source,
        })?;
        logging::init(&config.result_dir)?;

        info!("{}", config.to_json()?);
        info!(
            "Mode: {}, {} starts per instance",
            config.mode(),
            config.instance_repeats
        );

        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self { config, rng })
    }

    pub fn mode(&self) -> Mode {
        self.config.mode()
    }
}
