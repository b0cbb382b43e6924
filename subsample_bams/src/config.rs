use std::path::{Path, PathBuf};

use crate::{fraction::NormalizationPolicy, input::InputFile};

pub const DEFAULT_SUFFIX: &str = "subsampled";
pub const DEFAULT_SEED: u64 = 42;

/// Config
///
/// Configuration info for the program
/// This is generated from the command line arguments
/// Once set it is read only
///
/// inputs - input alignment files (identifiers are unique)
/// policy - how the target depth is chosen
/// suffix - inserted between identifier and extension of output files
/// output_dir - output directory (default: directory of each input)
/// seed - seed for the sampler
/// threads - size of the worker pools
/// samtools - samtools executable
///
#[derive(Debug)]
pub struct Config {
    inputs: Vec<InputFile>,
    policy: NormalizationPolicy,
    suffix: String,
    output_dir: Option<PathBuf>,
    seed: u64,
    threads: usize,
    samtools: PathBuf,
}

impl Config {
    pub fn new(inputs: Vec<InputFile>, policy: NormalizationPolicy) -> Self {
        Self {
            inputs,
            policy,
            suffix: DEFAULT_SUFFIX.to_string(),
            output_dir: None,
            seed: DEFAULT_SEED,
            threads: 1,
            samtools: PathBuf::from("samtools"),
        }
    }

    pub fn set_output_dir<P: AsRef<Path>>(&mut self, dir: P) {
        self.output_dir = Some(dir.as_ref().to_owned())
    }

    pub fn set_suffix(&mut self, s: &str) {
        self.suffix = s.to_owned()
    }

    pub fn set_seed(&mut self, x: u64) {
        self.seed = x
    }

    pub fn set_threads(&mut self, x: usize) {
        self.threads = x.max(1)
    }

    pub fn set_samtools<P: AsRef<Path>>(&mut self, p: P) {
        self.samtools = p.as_ref().to_owned()
    }

    pub fn inputs(&self) -> &[InputFile] {
        &self.inputs
    }

    pub fn policy(&self) -> NormalizationPolicy {
        self.policy
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn samtools(&self) -> &Path {
        &self.samtools
    }
}
