use std::{fmt, io::Write, path::Path};

use anyhow::Context;
use compress_io::compress::CompressIo;

use crate::library::LibraryConfig;

const INDENT: &str = "    ";

/// YAML single quoted scalar
struct Quoted<'a>(&'a str);

impl<'a> fmt::Display for Quoted<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0.replace('\'', "''"))
    }
}

impl fmt::Display for LibraryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, lib) in self.libraries().iter() {
            writeln!(f, "{}:", Quoted(name))?;
            writeln!(f, "{}genome: {}", INDENT, Quoted(self.genome()))?;
            writeln!(f, "{}readgroups:", INDENT)?;
            for (rg, r) in lib.readgroups().iter() {
                writeln!(f, "{0}{0}{1}:", INDENT, Quoted(rg))?;
                for p in r.files() {
                    let s = p.to_string_lossy();
                    writeln!(f, "{0}{0}{0}- {1}", INDENT, Quoted(&s))?;
                }
            }
        }
        Ok(())
    }
}

/// Write configuration to `out` (stdout if None); compressed according to file extension
pub fn write_config(cfg: &LibraryConfig, out: Option<&Path>) -> anyhow::Result<()> {
    let mut wrt = CompressIo::new()
        .opt_path(out)
        .bufwriter()
        .with_context(|| "Failed to open output file")?;
    write!(wrt, "{}", cfg).with_context(|| "Error writing library configuration")?;
    wrt.flush()?;
    Ok(())
}
