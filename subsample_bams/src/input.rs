use std::{
    collections::{hash_map::Entry, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use compress_io::compress::CompressIo;
use utils::get_next_line;

use crate::error::JobError;

/// An input alignment file and the identifier used to key it across phases
#[derive(Debug, Clone)]
pub struct InputFile {
    path: PathBuf,
    id: Arc<str>,
}

impl InputFile {
    /// The identifier is the base name of the file without its (last) extension
    pub fn new<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_owned();
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                JobError::Argument(format!("Cannot derive identifier from {}", path.display()))
            })?;
        Ok(Self {
            id: Arc::from(id),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    /// Directory holding the input (used when no output directory is given)
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Check that no two inputs share an identifier
pub fn check_unique_ids(inputs: &[InputFile]) -> Result<(), JobError> {
    let mut h: HashMap<&str, &Path> = HashMap::with_capacity(inputs.len());
    for f in inputs {
        match h.entry(&**f.id()) {
            Entry::Occupied(e) => {
                return Err(JobError::Argument(format!(
                    "Input files {} and {} have the same identifier {}",
                    e.get().display(),
                    f.path().display(),
                    f.id()
                )))
            }
            Entry::Vacant(e) => {
                e.insert(f.path());
            }
        }
    }
    Ok(())
}

/// Read a list of input paths, one per line (first column); empty lines and
/// lines starting with '#' are skipped
pub fn read_input_list<P: AsRef<Path>>(fname: P) -> anyhow::Result<Vec<PathBuf>> {
    let fname = fname.as_ref();
    debug!("Reading in input list from {}", fname.display());

    let mut rdr = CompressIo::new().path(fname).bufreader()?;
    let mut buf = String::new();
    let mut line = 0;
    let mut v = Vec::new();

    while let Some(fields) = get_next_line(&mut rdr, &mut buf).with_context(|| {
        format!(
            "Error after reading {} lines from {}",
            line,
            fname.display()
        )
    })? {
        line += 1;
        match fields.first() {
            Some(s) if !s.is_empty() && !s.starts_with('#') => v.push(PathBuf::from(*s)),
            _ => (),
        }
    }

    debug!(
        "Finished reading in {} lines; found {} input files",
        line,
        v.len()
    );
    Ok(v)
}
