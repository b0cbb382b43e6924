use std::{collections::BTreeMap, fmt, sync::Arc};

use crate::error::JobError;

/// Primary read counts per input identifier
pub type ReadCounts = BTreeMap<Arc<str>, u64>;

/// Sampling fraction (or the reason none could be computed) per input identifier
pub type SamplingPlan = BTreeMap<Arc<str>, Result<Fraction, JobError>>;

/// How the target depth for each file is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationPolicy {
    /// Sample every file down to (at most) this many reads
    AbsoluteTarget(u64),
    /// Sample every file down to the smallest read count in the set
    MatchMinimum,
}

impl NormalizationPolicy {
    /// An explicit target takes precedence over a request to match the minimum depth
    pub fn from_options(number_reads: Option<u64>, same_depth: bool) -> Result<Self, JobError> {
        match (number_reads, same_depth) {
            (Some(n), true) => {
                warn!(
                    "Both --number-reads and --same-depth given; ignoring --same-depth and sampling to {} reads",
                    n
                );
                Ok(Self::AbsoluteTarget(n))
            }
            (Some(n), false) => Ok(Self::AbsoluteTarget(n)),
            (None, true) => Ok(Self::MatchMinimum),
            (None, false) => Err(JobError::Argument(
                "one of --number-reads or --same-depth must be given".to_string(),
            )),
        }
    }
}

impl fmt::Display for NormalizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::AbsoluteTarget(n) => write!(f, "target of {} reads", n),
            Self::MatchMinimum => f.write_str("minimum depth across inputs"),
        }
    }
}

/// A sampling fraction kept as an exact ratio of read counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    num: u64,
    den: u64,
}

/// What the sampling executor should do with one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sampling {
    /// Keep all reads
    Copy,
    /// Keep the given fraction, as three fractional digits ("500" for 0.5)
    Subsample(String),
}

impl Fraction {
    /// None if `den` is zero
    fn new(num: u64, den: u64) -> Option<Self> {
        (den > 0).then_some(Self { num, den })
    }

    pub fn value(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn is_copy(&self) -> bool {
        self.num >= self.den
    }

    /// Fraction rounded to thousandths, half away from zero, using exact integer arithmetic
    pub fn thousandths(&self) -> u64 {
        let num = self.num as u128 * 2000 + self.den as u128;
        (num / (2 * self.den as u128)) as u64
    }

    /// A fraction below one that rounds up to 1.000 cannot be expressed as a
    /// sampler fraction and is treated as a full copy
    pub fn sampling(&self) -> Sampling {
        let t = self.thousandths();
        if self.is_copy() || t >= 1000 {
            Sampling::Copy
        } else {
            Sampling::Subsample(format!("{:03}", t))
        }
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:.3}", self.value())
    }
}

impl Sampling {
    /// Argument for the seeded sampler: the seed followed by the fractional digits
    pub fn sampler_arg(&self, seed: u64) -> Option<String> {
        match self {
            Self::Copy => None,
            Self::Subsample(digits) => Some(format!("{}.{}", seed, digits)),
        }
    }
}

/// Compute the sampling fraction for every counted file
///
/// For MatchMinimum the minimum is taken over the non-zero counts.  Files with
/// a zero count get a DivisionByZero error under either policy
pub fn compute_fractions(counts: &ReadCounts, policy: NormalizationPolicy) -> SamplingPlan {
    let target = match policy {
        NormalizationPolicy::AbsoluteTarget(n) => Some(n),
        NormalizationPolicy::MatchMinimum => {
            let min = counts.values().copied().filter(|c| *c > 0).min();
            if counts.values().any(|c| *c == 0) {
                warn!("Some input files have no primary reads; they are excluded from the minimum depth")
            }
            debug!("Minimum read count across inputs: {:?}", min);
            min
        }
    };

    counts
        .iter()
        .map(|(id, c)| {
            let res = target
                .and_then(|t| Fraction::new(t, *c))
                .ok_or_else(|| JobError::DivisionByZero { id: Arc::clone(id) });
            (Arc::clone(id), res)
        })
        .collect()
}
