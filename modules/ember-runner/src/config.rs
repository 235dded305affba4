use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

/// Runner configuration loaded from environment variables, then overridden
/// by command-line flags.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub max_epochs: u64,
    pub epoch_length: u64,
    /// Save a checkpoint every this many steps. 0 disables checkpointing.
    pub checkpoint_every: u64,
    pub checkpoint_dir: PathBuf,
    /// Snapshot file, or a directory to take the latest checkpoint from.
    pub resume: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_epochs: 2,
            epoch_length: 3,
            checkpoint_every: 0,
            checkpoint_dir: PathBuf::from("checkpoints"),
            resume: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_epochs: number_env("EMBER_MAX_EPOCHS", defaults.max_epochs)?,
            epoch_length: number_env("EMBER_EPOCH_LENGTH", defaults.epoch_length)?,
            checkpoint_every: number_env("EMBER_CHECKPOINT_EVERY", defaults.checkpoint_every)?,
            checkpoint_dir: env::var("EMBER_CHECKPOINT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.checkpoint_dir),
            resume: None,
        })
    }

    /// Flags win over the environment.
    pub fn with_cli(mut self, cli: Cli) -> Self {
        if let Some(n) = cli.max_epochs {
            self.max_epochs = n;
        }
        if let Some(n) = cli.epoch_length {
            self.epoch_length = n;
        }
        if let Some(n) = cli.checkpoint_every {
            self.checkpoint_every = n;
        }
        if let Some(dir) = cli.checkpoint_dir {
            self.checkpoint_dir = dir;
        }
        self.resume = cli.resume;
        self
    }

    pub fn log_summary(&self) {
        info!(
            max_epochs = self.max_epochs,
            epoch_length = self.epoch_length,
            checkpoint_every = self.checkpoint_every,
            checkpoint_dir = %self.checkpoint_dir.display(),
            resume = ?self.resume,
            "Config loaded"
        );
    }
}

fn number_env(key: &str, default: u64) -> Result<u64> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(default),
    }
}

#[derive(Parser, Debug, Default)]
#[command(name = "ember-runner", about = "Drive an ember training loop over synthetic batches")]
pub struct Cli {
    /// Stop after this many epochs [env: EMBER_MAX_EPOCHS]
    #[arg(long)]
    pub max_epochs: Option<u64>,

    /// Iterations per epoch [env: EMBER_EPOCH_LENGTH]
    #[arg(long)]
    pub epoch_length: Option<u64>,

    /// Checkpoint every N steps, 0 to disable [env: EMBER_CHECKPOINT_EVERY]
    #[arg(long)]
    pub checkpoint_every: Option<u64>,

    /// Where checkpoints go [env: EMBER_CHECKPOINT_DIR]
    #[arg(long)]
    pub checkpoint_dir: Option<PathBuf>,

    /// Resume from a snapshot file, or from the latest checkpoint in a directory
    #[arg(long)]
    pub resume: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::parse_from([
            "ember-runner",
            "--max-epochs",
            "5",
            "--checkpoint-dir",
            "/tmp/ckpt",
            "--resume",
            "/tmp/ckpt/step-3.json",
        ]);
        let config = Config::default().with_cli(cli);

        assert_eq!(config.max_epochs, 5);
        assert_eq!(config.epoch_length, 3);
        assert_eq!(config.checkpoint_dir, PathBuf::from("/tmp/ckpt"));
        assert_eq!(config.resume, Some(PathBuf::from("/tmp/ckpt/step-3.json")));
    }

    #[test]
    fn no_flags_keeps_config() {
        let config = Config::default().with_cli(Cli::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn unset_number_env_uses_default() {
        assert_eq!(number_env("EMBER_TEST_SURELY_UNSET_VAR", 7).unwrap(), 7);
    }
}
