use std::{
    collections::{hash_map::Entry, HashMap},
    env, fs,
    path::{Component, Path, PathBuf},
    sync::atomic::AtomicBool,
};

use anyhow::Context;

use crate::{error::JobError, fraction::Sampling, input::InputFile, tools::AlignmentTools};

/// One unit of work for the sampling phase
#[derive(Debug, Clone)]
pub struct SampleJob<'a> {
    pub input: &'a InputFile,
    pub output: PathBuf,
    pub sampling: Sampling,
}

/// `{dir}/{identifier}.{suffix}.bam`, where dir defaults to the input's directory
pub fn output_path(input: &InputFile, output_dir: Option<&Path>, suffix: &str) -> PathBuf {
    let dir = output_dir.unwrap_or_else(|| input.dir());
    dir.join(format!("{}.{}.bam", input.id(), suffix))
}

/// Absolute form of `p` with `.` components removed, so that `A.bam` and
/// `./A.bam` compare equal
fn path_key(p: &Path) -> PathBuf {
    let abs = if p.is_relative() {
        env::current_dir()
            .map(|d| d.join(p))
            .unwrap_or_else(|_| p.to_owned())
    } else {
        p.to_owned()
    };
    abs.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Check that no output file would overwrite an input file or the output of
/// another input
pub fn check_output_paths(
    inputs: &[InputFile],
    output_dir: Option<&Path>,
    suffix: &str,
) -> Result<(), JobError> {
    let in_paths: HashMap<PathBuf, &Path> =
        inputs.iter().map(|f| (path_key(f.path()), f.path())).collect();
    let mut out_paths: HashMap<PathBuf, &Path> = HashMap::with_capacity(inputs.len());
    for f in inputs {
        let out = output_path(f, output_dir, suffix);
        let key = path_key(&out);
        if let Some(p) = in_paths.get(&key) {
            return Err(JobError::Argument(format!(
                "Output file {} for {} would overwrite input file {}",
                out.display(),
                f.path().display(),
                p.display()
            )));
        }
        match out_paths.entry(key) {
            Entry::Occupied(e) => {
                return Err(JobError::Argument(format!(
                    "Input files {} and {} would both be written to {}",
                    e.get().display(),
                    f.path().display(),
                    out.display()
                )))
            }
            Entry::Vacant(e) => {
                e.insert(f.path());
            }
        }
    }
    Ok(())
}

/// Subsample (or copy) one file and index the result.  Returns the output path.
pub fn run_sample_job<T: AlignmentTools + ?Sized>(
    tools: &T,
    job: &SampleJob,
    seed: u64,
    cancel: &AtomicBool,
) -> Result<PathBuf, JobError> {
    let id = job.input.id();
    sample_and_index(tools, job, seed, cancel).map_err(|e| JobError::sampling(id, e))?;
    Ok(job.output.clone())
}

fn sample_and_index<T: AlignmentTools + ?Sized>(
    tools: &T,
    job: &SampleJob,
    seed: u64,
    cancel: &AtomicBool,
) -> anyhow::Result<()> {
    let input = job.input.path();
    let output = job.output.as_path();

    // create_dir_all succeeds if another task creates the directory concurrently
    if let Some(d) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(d)
            .with_context(|| format!("Error creating output directory {}", d.display()))?;
    }

    match job.sampling.sampler_arg(seed) {
        None => {
            debug!("Copying {} to {}", input.display(), output.display());
            fs::copy(input, output).with_context(|| {
                format!("Error copying {} to {}", input.display(), output.display())
            })?;
        }
        Some(arg) => {
            debug!(
                "Sampling {} to {} with {}",
                input.display(),
                output.display(),
                arg
            );
            tools.subsample(input, output, &arg, cancel)?;
        }
    }
    tools
        .index(output, cancel)
        .with_context(|| format!("Error indexing {}", output.display()))
}
