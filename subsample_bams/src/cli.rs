use std::{num::NonZeroUsize, path::PathBuf};

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_parser, Arg, ArgAction,
    ArgMatches, Command,
};

use anyhow::Context;

use utils::{add_log_args, init_log};

use crate::{
    config::*,
    fraction::NormalizationPolicy,
    input::{check_unique_ids, read_input_list, InputFile},
    sampler::check_output_paths,
};

/// Set up definition of command options for clap
fn cli_model() -> Command {
    let cmd = Command::new(crate_name!())
        .about(crate_description!())
        .version(crate_version!())
        .author(crate_authors!());
    add_log_args(cmd)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Report progress (sets log level to at least info)"),
        )
        .arg(
            Arg::new("parallel")
                .short('j')
                .long("parallel")
                .value_parser(value_parser!(NonZeroUsize))
                .value_name("INT")
                .default_value("1")
                .help("Number of files to process in parallel"),
        )
        .arg(
            Arg::new("number_reads")
                .long("number-reads")
                .value_parser(value_parser!(u64).range(1..))
                .value_name("INT")
                .help("Subsample each file to this number of primary reads"),
        )
        .arg(
            Arg::new("same_depth")
                .long("same-depth")
                .action(ArgAction::SetTrue)
                .help("Subsample each file to the depth of the smallest file"),
        )
        .arg(
            Arg::new("suffix")
                .long("suffix")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .value_name("STRING")
                .default_value(DEFAULT_SUFFIX)
                .help("Output files are named <identifier>.<suffix>.bam"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("Set output directory [default: directory of each input file]"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_parser(value_parser!(u64))
                .value_name("INT")
                .default_value("42")
                .help("Seed for subsampling"),
        )
        .arg(
            Arg::new("samtools")
                .long("samtools")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .default_value("samtools")
                .help("samtools executable"),
        )
        .arg(
            Arg::new("input_list")
                .short('L')
                .long("input-list")
                .value_parser(value_parser!(PathBuf))
                .value_name("PATH")
                .help("File with list of input BAM files, one per line"),
        )
        .arg(
            Arg::new("input")
                .value_parser(value_parser!(PathBuf))
                .value_name("BAM")
                .num_args(1..)
                .required_unless_present("input_list")
                .help("Input BAM files"),
        )
}

/// Handle command line options.  Set up Config structure
pub fn handle_cli() -> anyhow::Result<Config> {
    // Get matches from command line
    let m = cli_model().get_matches();

    // Setup logging
    init_log(&m)?;

    debug!("Processing command line options");
    config_from_matches(&m)
}

fn config_from_matches(m: &ArgMatches) -> anyhow::Result<Config> {
    let policy = NormalizationPolicy::from_options(
        m.get_one::<u64>("number_reads").copied(),
        m.get_flag("same_depth"),
    )?;

    let mut paths: Vec<PathBuf> = m
        .get_many::<PathBuf>("input")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    if let Some(p) = m.get_one::<PathBuf>("input_list") {
        paths.extend(read_input_list(p).with_context(|| "Could not read input list")?);
    }
    if paths.is_empty() {
        return Err(anyhow!("No input files specified"));
    }

    let inputs = paths
        .iter()
        .map(InputFile::new)
        .collect::<anyhow::Result<Vec<_>>>()?;
    check_unique_ids(&inputs)?;
    debug!("Number of input files: {}", inputs.len());

    let nt = m
        .get_one::<NonZeroUsize>("parallel")
        .map(|x| usize::from(*x))
        .unwrap_or(1);
    let ncpus = num_cpus::get();
    if nt > ncpus {
        warn!(
            "Requested {} parallel jobs but only {} cores are available",
            nt, ncpus
        );
    }

    let mut cfg = Config::new(inputs, policy);
    cfg.set_threads(nt);

    if let Some(p) = m.get_one::<PathBuf>("output") {
        cfg.set_output_dir(p)
    }
    if let Some(s) = m.get_one::<String>("suffix") {
        cfg.set_suffix(s)
    }
    if let Some(x) = m.get_one::<u64>("seed") {
        cfg.set_seed(*x)
    }
    if let Some(p) = m.get_one::<PathBuf>("samtools") {
        cfg.set_samtools(p)
    }
    check_output_paths(cfg.inputs(), cfg.output_dir(), cfg.suffix())?;

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JobError;

    fn parse(args: &[&str]) -> anyhow::Result<Config> {
        let m = cli_model().try_get_matches_from(args)?;
        config_from_matches(&m)
    }

    #[test]
    fn defaults() {
        let cfg = parse(&["subsample_bams", "--same-depth", "a.bam", "b.bam"]).unwrap();
        assert_eq!(cfg.policy(), NormalizationPolicy::MatchMinimum);
        assert_eq!(cfg.inputs().len(), 2);
        assert_eq!(cfg.suffix(), "subsampled");
        assert_eq!(cfg.seed(), 42);
        assert_eq!(cfg.threads(), 1);
        assert!(cfg.output_dir().is_none());
    }

    #[test]
    fn all_options() {
        let cfg = parse(&[
            "subsample_bams",
            "--number-reads",
            "1000",
            "--suffix",
            "norm",
            "-o",
            "out",
            "--seed",
            "7",
            "-j",
            "3",
            "-v",
            "x/a.bam",
        ])
        .unwrap();
        assert_eq!(cfg.policy(), NormalizationPolicy::AbsoluteTarget(1000));
        assert_eq!(cfg.suffix(), "norm");
        assert_eq!(cfg.output_dir(), Some(std::path::Path::new("out")));
        assert_eq!(cfg.seed(), 7);
        assert_eq!(cfg.threads(), 3);
    }

    #[test]
    fn both_modes_uses_target() {
        let cfg = parse(&[
            "subsample_bams",
            "--number-reads",
            "10",
            "--same-depth",
            "a.bam",
        ])
        .unwrap();
        assert_eq!(cfg.policy(), NormalizationPolicy::AbsoluteTarget(10));
    }

    #[test]
    fn missing_mode_is_argument_error() {
        let e = parse(&["subsample_bams", "a.bam"]).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<JobError>(),
            Some(JobError::Argument(_))
        ));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(parse(&["subsample_bams", "--same-depth"]).is_err());
        assert!(parse(&["subsample_bams", "--same-depth", "-j", "0", "a.bam"]).is_err());
        assert!(parse(&["subsample_bams", "--number-reads", "0", "a.bam"]).is_err());
        assert!(parse(&["subsample_bams", "--same-depth", "--suffix", "", "a.bam"]).is_err());
    }

    #[test]
    fn duplicate_identifiers_rejected() {
        let e = parse(&["subsample_bams", "--same-depth", "x/a.bam", "y/a.bam"]).unwrap_err();
        assert!(e.to_string().contains("same identifier"));
    }

    #[test]
    fn previous_outputs_as_inputs_rejected() {
        let e = parse(&[
            "subsample_bams",
            "--same-depth",
            "x/A.bam",
            "x/A.subsampled.bam",
        ])
        .unwrap_err();
        assert!(matches!(
            e.downcast_ref::<JobError>(),
            Some(JobError::Argument(_))
        ));
        let cfg = parse(&[
            "subsample_bams",
            "--same-depth",
            "--suffix",
            "norm",
            "x/A.bam",
            "x/A.subsampled.bam",
        ])
        .unwrap();
        assert_eq!(cfg.inputs().len(), 2);
    }

    #[test]
    fn input_list_merged_with_positional() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        std::fs::write(&list, "b.bam\nc.bam\n").unwrap();
        let cfg = parse(&[
            "subsample_bams",
            "--same-depth",
            "-L",
            list.to_str().unwrap(),
            "a.bam",
        ])
        .unwrap();
        let ids: Vec<_> = cfg.inputs().iter().map(|f| f.id().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
