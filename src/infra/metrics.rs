// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per logged training step or evaluation
// run, so loss curves and perplexity can be plotted afterwards.
//
//   train/metrics.csv:   step,loss,learning_rate
//   eval/perplexity.csv: global_step,perplexity,num_words
//
// The header is written once; later runs append to the same file.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Anything that can be written as one CSV row.
pub trait CsvRow {
    const HEADER: &'static str;
    fn to_row(&self) -> String;
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepMetrics {
    pub step:          usize,
    pub loss:          f64,
    pub learning_rate: f64,
}

impl CsvRow for StepMetrics {
    const HEADER: &'static str = "step,loss,learning_rate";

    fn to_row(&self) -> String {
        format!("{},{:.6},{:.6}", self.step, self.loss, self.learning_rate)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalMetrics {
    pub global_step: usize,
    pub perplexity:  f64,
    pub num_words:   f64,
}

impl CsvRow for EvalMetrics {
    const HEADER: &'static str = "global_step,perplexity,num_words";

    fn to_row(&self) -> String {
        format!("{},{:.6},{}", self.global_step, self.perplexity, self.num_words)
    }
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Open `dir/file_name`, writing `R::HEADER` if the file is new.
    pub fn new<R: CsvRow>(dir: impl AsRef<Path>, file_name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let csv_path = dir.join(file_name);

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{}", R::HEADER)?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log<R: CsvRow>(&self, row: &R) -> Result<()> {
        let mut f = OpenOptions::new().append(true).open(&self.csv_path)?;
        writeln!(f, "{}", row.to_row())?;
        Ok(())
    }
}
