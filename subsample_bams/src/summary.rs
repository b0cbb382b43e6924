use std::{fmt, path::PathBuf, sync::Arc};

use crate::error::JobError;

/// Phases of a normalization run.  Transitions only go forward; Failed can be
/// reached from Counting or Sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Counting,
    Fractions,
    Sampling,
    Done,
    Failed,
}

impl Phase {
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Counting)
                | (Counting, Fractions)
                | (Fractions, Sampling)
                | (Sampling, Done)
                | (Counting, Failed)
                | (Sampling, Failed)
        )
    }
}

/// Final state of one input file
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not (yet) processed; at the end of a run this means the phase was aborted
    Pending,
    Copied(PathBuf),
    Subsampled { output: PathBuf, digits: String },
    Failed(JobError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Copied(_) | Self::Subsampled { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FileSummary {
    pub id: Arc<str>,
    pub count: Option<u64>,
    pub outcome: Outcome,
}

/// Per-file outcomes of a run, in input order
#[derive(Debug)]
pub struct RunSummary {
    pub phase: Phase,
    pub files: Vec<FileSummary>,
    pub pool_error: Option<JobError>,
}

impl RunSummary {
    pub fn n_succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.outcome.is_success()).count()
    }

    pub fn n_failed(&self) -> usize {
        self.files.len() - self.n_succeeded()
    }

    /// True only if the run completed and every file produced an output
    pub fn is_success(&self) -> bool {
        self.phase == Phase::Done && self.pool_error.is_none() && self.n_failed() == 0
    }

    #[cfg(test)]
    pub fn get(&self, id: &str) -> Option<&FileSummary> {
        self.files.iter().find(|f| &*f.id == id)
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "Summary: {} file(s) succeeded, {} failed",
            self.n_succeeded(),
            self.n_failed()
        )?;
        if let Some(e) = &self.pool_error {
            writeln!(f, "  Run aborted: {}", e)?;
        }
        for fs in self.files.iter() {
            let ct = fs
                .count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "NA".to_string());
            match &fs.outcome {
                Outcome::Copied(p) => {
                    writeln!(f, "  OK\t{}\t{}\tcopied\t{}", fs.id, ct, p.display())?
                }
                Outcome::Subsampled { output, digits } => writeln!(
                    f,
                    "  OK\t{}\t{}\tsampled 0.{}\t{}",
                    fs.id,
                    ct,
                    digits,
                    output.display()
                )?,
                Outcome::Failed(e) => {
                    writeln!(f, "  FAILED\t{}\t{}\t{}\t{}", fs.id, ct, e.kind(), e)?
                }
                Outcome::Pending => writeln!(f, "  FAILED\t{}\t{}\tnot processed", fs.id, ct)?,
            }
        }
        Ok(())
    }
}
