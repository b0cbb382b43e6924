mod cli;
mod library;
mod output;

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let cfg = cli::handle_cli().with_context(|| "Error processing command line arguments")?;
    let parser = library::NameParser::new(&cfg.lane_re)
        .with_context(|| format!("Invalid lane pattern {}", cfg.lane_re))?;
    let lib_cfg = library::make_config(&cfg.genome, &parser, &cfg.fastqs)?;
    output::write_config(&lib_cfg, cfg.output.as_deref())
}
