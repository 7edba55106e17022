use std::path::PathBuf;

use clap::Parser;

use pawflow_models::errors::SendableError;

#[derive(Parser, Debug, Clone)]
pub struct Config {
    /// Base directory for snapshots and per-execution logs.
    #[arg(long, default_value = "./pawflow-data")]
    pub data_dir: PathBuf,

    #[arg(long, default_value_t = 60)]
    pub scheduler_frequency_seconds: u64,

    #[arg(long, default_value_t = 8)]
    pub max_workers: usize,

    /// What to do when the worker pool is full: "reject" or "queue".
    #[arg(long, default_value = "reject")]
    pub pool_policy: String,

    #[arg(long, default_value_t = 1000)]
    pub max_history: usize,

    #[arg(long, default_value_t = 50)]
    pub max_logs_per_task: usize,

    #[arg(long, default_value = "output.log")]
    pub log_file: PathBuf,
}

impl Config {
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn schedules_file(&self) -> PathBuf {
        self.state_dir().join("schedules.json")
    }

    pub fn triggers_file(&self) -> PathBuf {
        self.state_dir().join("triggers.json")
    }

    pub fn history_file(&self) -> PathBuf {
        self.state_dir().join("history.json")
    }
}

pub fn parse_config() -> Result<Config, SendableError> {
    Ok(Config::try_parse()?)
}
