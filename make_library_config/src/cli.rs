use std::path::PathBuf;

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_parser, Arg, ArgMatches,
    Command,
};

use utils::{add_log_args, init_log};

use crate::library::LANE_RE;

/// Config
///
/// genome - genome build recorded for every library
/// lane_re - pattern removed from readgroup names to give library names
/// output - output file (stdout if not set)
/// fastqs - input FASTQ files
#[derive(Debug)]
pub struct Config {
    pub genome: String,
    pub lane_re: String,
    pub output: Option<PathBuf>,
    pub fastqs: Vec<PathBuf>,
}

/// Set up definition of command options for clap
fn cli_model() -> Command {
    let cmd = Command::new(crate_name!())
        .about(crate_description!())
        .version(crate_version!())
        .author(crate_authors!());
    add_log_args(cmd)
        .arg(
            Arg::new("genome")
                .short('g')
                .long("genome")
                .value_parser(value_parser!(String))
                .value_name("STRING")
                .required(true)
                .help("Genome build (e.g., hg19)"),
        )
        .arg(
            Arg::new("lane_re")
                .long("lane-regex")
                .value_parser(value_parser!(String))
                .value_name("REGEX")
                .default_value(LANE_RE)
                .help("Pattern removed from readgroup names to get library names"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Output file [default: stdout]"),
        )
        .arg(
            Arg::new("fastq")
                .value_parser(value_parser!(PathBuf))
                .value_name("FASTQ")
                .num_args(1..)
                .required(true)
                .help("Input FASTQ files named <readgroup>.<1|2>.fastq[.gz]"),
        )
}

/// Handle command line options.  Set up Config structure
pub fn handle_cli() -> anyhow::Result<Config> {
    let m = cli_model().get_matches();
    init_log(&m)?;
    debug!("Processing command line options");
    config_from_matches(&m)
}

fn config_from_matches(m: &ArgMatches) -> anyhow::Result<Config> {
    let genome = m
        .try_get_one::<String>("genome")?
        .ok_or_else(|| anyhow!("Missing genome build"))?
        .clone();
    let lane_re = m
        .try_get_one::<String>("lane_re")?
        .ok_or_else(|| anyhow!("Missing lane pattern"))?
        .clone();
    let output = m.try_get_one::<PathBuf>("output")?.cloned();
    let fastqs: Vec<PathBuf> = m
        .try_get_many::<PathBuf>("fastq")?
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    if fastqs.is_empty() {
        return Err(anyhow!("No input FASTQ files specified"));
    }
    Ok(Config {
        genome,
        lane_re,
        output,
        fastqs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_args() {
        let m = cli_model()
            .try_get_matches_from(["make_library_config", "-g", "hg19", "a.1.fq", "a.2.fq"])
            .unwrap();
        let cfg = config_from_matches(&m).unwrap();
        assert_eq!(cfg.genome, "hg19");
        assert_eq!(cfg.lane_re, LANE_RE);
        assert!(cfg.output.is_none());
        assert_eq!(cfg.fastqs.len(), 2);
    }

    #[test]
    fn missing_values_are_errors() {
        // Matches lacking the options give an error rather than a panic
        let m = Command::new("make_library_config")
            .arg(Arg::new("genome").long("genome"))
            .try_get_matches_from(["make_library_config"])
            .unwrap();
        let e = config_from_matches(&m).unwrap_err();
        assert!(e.to_string().contains("Missing genome build"));
    }

    #[test]
    fn genome_required() {
        assert!(cli_model()
            .try_get_matches_from(["make_library_config", "a.1.fq"])
            .is_err());
    }
}
