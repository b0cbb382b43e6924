mod cli;
mod config;
mod controller;
mod count;
mod error;
mod fraction;
mod input;
mod process;
mod sampler;
mod summary;
mod tools;

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

use anyhow::Context;

use crate::tools::{AlignmentTools, Samtools};

fn main() -> anyhow::Result<()> {
    let cfg = cli::handle_cli().with_context(|| "Error processing command line arguments")?;

    let tools = Samtools::new(cfg.samtools());
    tools
        .check()
        .with_context(|| "Required external tools are missing")?;

    let interrupt = controller::interrupt_channel()?;
    let summary = process::process_inputs(&cfg, &tools, &interrupt);
    eprint!("{}", summary);

    if summary.is_success() {
        Ok(())
    } else if let Some(e) = &summary.pool_error {
        Err(e.clone().into())
    } else {
        Err(anyhow!(
            "{} of {} input file(s) failed",
            summary.n_failed(),
            summary.files.len()
        ))
    }
}
