//! Per-run CSV reports
//!
//! Each run writes `<log_dir>/<run_name>.csv` with one row per completed
//! epoch. The file is rewritten in full after every epoch so a crash never
//! leaves a partially appended row, and re-running a name starts its log
//! fresh.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::training::trainer::RunState;

/// CSV log writer for one training run
#[derive(Debug, Clone)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    /// Create the log directory and target `<run_name>.csv` path.
    pub fn new(dir: &Path, run_name: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("{run_name}.csv")),
        })
    }

    /// Rewrite the full log from the run history.
    pub fn write(&self, state: &RunState) -> Result<()> {
        let mut out = String::from("train_loss,train_dice,val_loss,val_dice\n");
        for i in 0..state.epochs_completed {
            out.push_str(&format!(
                "{},{},{},{}\n",
                state.train.loss[i], state.train.dice[i], state.val.loss[i], state.val.dice[i],
            ));
        }
        fs::write(&self.path, out)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
