use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use regex::Regex;

/// Matches files such as atacseq.1.fq.gz or atacseq.2.fastq.gz
pub const FASTQ_RE: &str = r"^(.+)\.([12])\.(?:fastq|fq)(?:\..*)?$";

/// Default pattern for the lane tag removed from a readgroup name to get the library name
pub const LANE_RE: &str = r"_L[0-9]+$";

/// Which read of a pair a FASTQ file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mate {
    First,
    Second,
}

impl Mate {
    fn idx(self) -> usize {
        match self {
            Self::First => 0,
            Self::Second => 1,
        }
    }
}

/// FASTQ file name parser
pub struct NameParser {
    fastq_re: Regex,
    lane_re: Regex,
}

impl NameParser {
    pub fn new(lane_re: &str) -> anyhow::Result<Self> {
        Ok(Self {
            fastq_re: Regex::new(FASTQ_RE)?,
            lane_re: Regex::new(lane_re)?,
        })
    }

    /// Returns readgroup name and mate from the base name of `p`
    pub fn parse_fastq_name(&self, p: &Path) -> anyhow::Result<(String, Mate)> {
        let name = p
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("Illegal file name {}", p.display()))?;
        let c = self
            .fastq_re
            .captures(name)
            .ok_or_else(|| anyhow!("Could not parse FASTQ file name {}", name))?;
        let mate = if &c[2] == "1" {
            Mate::First
        } else {
            Mate::Second
        };
        Ok((c[1].to_owned(), mate))
    }

    /// Library name is the readgroup name without its lane tag
    pub fn library_name<'a>(&self, readgroup: &'a str) -> &'a str {
        match self.lane_re.find(readgroup) {
            Some(m) if m.start() > 0 => &readgroup[..m.start()],
            _ => readgroup,
        }
    }
}

#[derive(Debug, Default)]
pub struct Readgroup {
    files: [Option<PathBuf>; 2],
}

impl Readgroup {
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().flatten().map(|p| p.as_path())
    }
}

#[derive(Debug, Default)]
pub struct Library {
    readgroups: BTreeMap<String, Readgroup>,
}

impl Library {
    pub fn readgroups(&self) -> &BTreeMap<String, Readgroup> {
        &self.readgroups
    }
}

/// Experiment configuration: libraries -> readgroups -> FASTQ files
#[derive(Debug)]
pub struct LibraryConfig {
    genome: String,
    libraries: BTreeMap<String, Library>,
}

impl LibraryConfig {
    pub fn new(genome: &str) -> Self {
        Self {
            genome: genome.to_owned(),
            libraries: BTreeMap::new(),
        }
    }

    pub fn genome(&self) -> &str {
        &self.genome
    }

    pub fn libraries(&self) -> &BTreeMap<String, Library> {
        &self.libraries
    }

    pub fn add_fastq(&mut self, parser: &NameParser, p: &Path) -> anyhow::Result<()> {
        let (rg, mate) = parser.parse_fastq_name(p)?;
        let lib = parser.library_name(&rg).to_owned();
        trace!("Adding {} as mate {:?} of {} ({})", p.display(), mate, rg, lib);
        let slot = &mut self
            .libraries
            .entry(lib)
            .or_default()
            .readgroups
            .entry(rg.clone())
            .or_default()
            .files[mate.idx()];
        if let Some(q) = slot.as_ref() {
            Err(anyhow!(
                "Files {} and {} are both mate {} of readgroup {}",
                q.display(),
                p.display(),
                mate.idx() + 1,
                rg
            ))
        } else {
            *slot = Some(p.to_owned());
            Ok(())
        }
    }

    /// Every readgroup needs a first mate; single-end readgroups are allowed
    pub fn validate(&self) -> anyhow::Result<()> {
        for (lib, l) in self.libraries.iter() {
            for (rg, r) in l.readgroups.iter() {
                match &r.files {
                    [Some(_), Some(_)] => (),
                    [Some(_), None] => warn!("Readgroup {} of {} is single-end", rg, lib),
                    _ => {
                        return Err(anyhow!(
                            "Readgroup {} of {} has a second mate but no first mate",
                            rg,
                            lib
                        ))
                    }
                }
            }
        }
        Ok(())
    }
}

/// Build the configuration for a set of FASTQ files
pub fn make_config<P: AsRef<Path>>(
    genome: &str,
    parser: &NameParser,
    files: &[P],
) -> anyhow::Result<LibraryConfig> {
    let mut cfg = LibraryConfig::new(genome);
    for f in files {
        cfg.add_fastq(parser, f.as_ref())?
    }
    cfg.validate()?;
    debug!(
        "Found {} libraries from {} files",
        cfg.libraries.len(),
        files.len()
    );
    Ok(cfg)
}
