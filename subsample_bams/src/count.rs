use std::sync::atomic::AtomicBool;

use crate::{error::JobError, input::InputFile, tools::AlignmentTools};

/// Count primary, non-supplementary reads for one input file
pub fn count_reads<T: AlignmentTools + ?Sized>(
    tools: &T,
    input: &InputFile,
    cancel: &AtomicBool,
) -> Result<u64, JobError> {
    let path = input.path();
    if !path.is_file() {
        return Err(JobError::count(
            input.id(),
            anyhow!("Input file {} not found", path.display()),
        ));
    }
    trace!("Counting reads in {}", path.display());
    let n = tools
        .count_primary(path, cancel)
        .map_err(|e| JobError::count(input.id(), e))?;
    debug!("{}: {} primary reads", input.id(), n);
    Ok(n)
}
