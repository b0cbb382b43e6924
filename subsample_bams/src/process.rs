use crossbeam_channel::Receiver;

use crate::{
    config::Config,
    controller::run_pool,
    count::count_reads,
    error::JobError,
    fraction::{compute_fractions, ReadCounts, Sampling},
    sampler::{output_path, run_sample_job, SampleJob},
    summary::{FileSummary, Outcome, Phase, RunSummary},
    tools::AlignmentTools,
};

/// State owned by the orchestrator for the lifetime of one run
struct Run {
    phase: Phase,
    files: Vec<FileSummary>,
    counts: ReadCounts,
}

impl Run {
    fn new(cfg: &Config) -> Self {
        let files = cfg
            .inputs()
            .iter()
            .map(|f| FileSummary {
                id: f.id().clone(),
                count: None,
                outcome: Outcome::Pending,
            })
            .collect();
        Self {
            phase: Phase::Idle,
            files,
            counts: ReadCounts::new(),
        }
    }

    fn advance(&mut self, next: Phase) {
        assert!(
            self.phase.can_advance_to(next),
            "Invalid phase transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!("Phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn record_failure(&mut self, ix: usize, e: JobError) {
        error!("{}", e);
        self.files[ix].outcome = Outcome::Failed(e)
    }

    fn finish(self, pool_error: Option<JobError>) -> RunSummary {
        RunSummary {
            phase: self.phase,
            files: self.files,
            pool_error,
        }
    }

    fn abort(mut self, e: JobError) -> RunSummary {
        error!("{}", e);
        self.advance(Phase::Failed);
        self.finish(Some(e))
    }
}

/// Strategy
///
/// Count primary reads for all inputs in parallel and wait for every count.
/// Compute sampling fractions from the valid counts, then sample (or copy)
/// every file that has a fraction, again in parallel.  Per-file failures are
/// recorded and never stop other files; a pool failure (including an interrupt)
/// stops the current phase.  A summary is always returned.
pub fn process_inputs<T: AlignmentTools + ?Sized>(
    cfg: &Config,
    tools: &T,
    interrupt: &Receiver<()>,
) -> RunSummary {
    let mut run = Run::new(cfg);
    let nt = cfg.threads();

    // Counting
    run.advance(Phase::Counting);
    info!(
        "Counting reads in {} input file(s) with {} task(s)",
        cfg.inputs().len(),
        nt
    );
    let out = run_pool(cfg.inputs(), nt, interrupt, |input, cancel| {
        count_reads(tools, input, cancel)
    });
    for (ix, res) in out.results {
        match res {
            Ok(c) => {
                run.files[ix].count = Some(c);
                run.counts.insert(cfg.inputs()[ix].id().clone(), c);
            }
            Err(e) => run.record_failure(ix, e),
        }
    }
    if let Some(e) = out.error {
        return run.abort(e);
    }

    // Fractions
    run.advance(Phase::Fractions);
    info!("Computing sampling fractions for {}", cfg.policy());
    let plan = compute_fractions(&run.counts, cfg.policy());
    let mut jobs = Vec::with_capacity(plan.len());
    let mut file_ix = Vec::with_capacity(plan.len());
    for (ix, input) in cfg.inputs().iter().enumerate() {
        match plan.get(input.id()) {
            // Count failed; already recorded
            None => (),
            Some(Err(e)) => run.record_failure(ix, e.clone()),
            Some(Ok(f)) => {
                let sampling = f.sampling();
                match &sampling {
                    Sampling::Copy => info!("{}: fraction {}, copying all reads", input.id(), f),
                    Sampling::Subsample(d) => {
                        if d.as_str() == "000" {
                            warn!(
                                "{}: fraction {} rounds to zero; output will be (nearly) empty",
                                input.id(),
                                f.value()
                            )
                        }
                        info!("{}: fraction {}, sampling", input.id(), f)
                    }
                }
                jobs.push(SampleJob {
                    input,
                    output: output_path(input, cfg.output_dir(), cfg.suffix()),
                    sampling,
                });
                file_ix.push(ix);
            }
        }
    }

    // Sampling
    run.advance(Phase::Sampling);
    info!("Sampling {} file(s) with {} task(s)", jobs.len(), nt);
    let seed = cfg.seed();
    let out = run_pool(&jobs, nt, interrupt, |job, cancel| {
        run_sample_job(tools, job, seed, cancel)
    });
    for (j, res) in out.results {
        let ix = file_ix[j];
        match res {
            Ok(p) => {
                run.files[ix].outcome = match &jobs[j].sampling {
                    Sampling::Copy => Outcome::Copied(p),
                    Sampling::Subsample(d) => Outcome::Subsampled {
                        output: p,
                        digits: d.clone(),
                    },
                }
            }
            Err(e) => run.record_failure(ix, e),
        }
    }
    if let Some(e) = out.error {
        return run.abort(e);
    }

    run.advance(Phase::Done);
    info!("Finished processing");
    run.finish(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fraction::NormalizationPolicy, input::InputFile, tools::fake::FakeTools};
    use crossbeam_channel::{bounded, Sender};
    use std::{fs, path::Path};

    fn write_input(dir: &Path, name: &str, n: usize) -> InputFile {
        let p = dir.join(name);
        let mut s = String::from("@HD\tVN:1.6\tSO:coordinate\n");
        for i in 0..n {
            s.push_str(&format!("read{}\t0\tchr1\t{}\t60\n", i, 100 + i));
        }
        fs::write(&p, s).unwrap();
        InputFile::new(p).unwrap()
    }

    fn config(inputs: Vec<InputFile>, policy: NormalizationPolicy, out: &Path) -> Config {
        let mut cfg = Config::new(inputs, policy);
        cfg.set_output_dir(out);
        cfg.set_threads(2);
        cfg
    }

    fn no_interrupt() -> (Sender<()>, Receiver<()>) {
        bounded(1)
    }

    #[test]
    fn same_depth_samples_larger_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "A.bam", 100);
        let b = write_input(dir.path(), "B.bam", 50);
        let out = dir.path().join("out");
        let cfg = config(vec![a.clone(), b.clone()], NormalizationPolicy::MatchMinimum, &out);
        let tools = FakeTools::default();
        let (_s, intr) = no_interrupt();

        let summary = process_inputs(&cfg, &tools, &intr);
        assert!(summary.is_success(), "{}", summary);
        assert_eq!(
            tools.sampler_calls(),
            vec![format!("subsample {} 42.500", a.path().display())]
        );
        assert_eq!(
            summary.get("A").unwrap().outcome,
            Outcome::Subsampled {
                output: out.join("A.subsampled.bam"),
                digits: "500".to_string()
            }
        );
        assert_eq!(
            summary.get("B").unwrap().outcome,
            Outcome::Copied(out.join("B.subsampled.bam"))
        );
        assert_eq!(
            fs::read(out.join("B.subsampled.bam")).unwrap(),
            fs::read(b.path()).unwrap()
        );
        assert!(out.join("A.subsampled.bam.bai").exists());
        assert!(out.join("B.subsampled.bam.bai").exists());
    }

    #[test]
    fn target_above_count_copies_without_sampling() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "S.bam", 10);
        let mut cfg = Config::new(vec![a.clone()], NormalizationPolicy::AbsoluteTarget(100));
        cfg.set_suffix("norm");
        let tools = FakeTools::default();
        let (_s, intr) = no_interrupt();

        let summary = process_inputs(&cfg, &tools, &intr);
        assert!(summary.is_success());
        assert!(tools.sampler_calls().is_empty());
        // Default output directory is that of the input
        let p = dir.path().join("S.norm.bam");
        assert_eq!(summary.get("S").unwrap().outcome, Outcome::Copied(p.clone()));
        assert_eq!(fs::read(p).unwrap(), fs::read(a.path()).unwrap());
    }

    #[test]
    fn explicit_target_overrides_same_depth() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "A.bam", 100);
        let b = write_input(dir.path(), "B.bam", 50);
        let policy = NormalizationPolicy::from_options(Some(25), true).unwrap();
        let cfg = config(vec![a.clone(), b.clone()], policy, &dir.path().join("out"));
        let tools = FakeTools::default();
        let (_s, intr) = no_interrupt();

        let summary = process_inputs(&cfg, &tools, &intr);
        assert!(summary.is_success());
        let mut calls = tools.sampler_calls();
        calls.sort();
        // Under same-depth B would have been copied
        assert_eq!(
            calls,
            vec![
                format!("subsample {} 42.250", a.path().display()),
                format!("subsample {} 42.500", b.path().display()),
            ]
        );
    }

    #[test]
    fn unreadable_input_fails_run_but_not_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "A.bam", 100);
        let missing = InputFile::new(dir.path().join("B.bam")).unwrap();
        let out = dir.path().join("out");
        let cfg = config(vec![a, missing], NormalizationPolicy::MatchMinimum, &out);
        let tools = FakeTools::default();
        let (_s, intr) = no_interrupt();

        let summary = process_inputs(&cfg, &tools, &intr);
        assert_eq!(summary.phase, Phase::Done);
        assert!(!summary.is_success());
        assert_eq!(summary.n_succeeded(), 1);
        assert!(matches!(
            summary.get("B").unwrap().outcome,
            Outcome::Failed(JobError::Count { .. })
        ));
        // Minimum is taken over valid counts only, so A is copied
        assert_eq!(
            summary.get("A").unwrap().outcome,
            Outcome::Copied(out.join("A.subsampled.bam"))
        );
        assert!(out.join("A.subsampled.bam").exists());
        assert!(!out.join("B.subsampled.bam").exists());
    }

    #[test]
    fn zero_count_under_target_is_local() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "A.bam", 0);
        let b = write_input(dir.path(), "B.bam", 40);
        let cfg = config(
            vec![a, b.clone()],
            NormalizationPolicy::AbsoluteTarget(10),
            &dir.path().join("out"),
        );
        let tools = FakeTools::default();
        let (_s, intr) = no_interrupt();

        let summary = process_inputs(&cfg, &tools, &intr);
        assert!(!summary.is_success());
        assert_eq!(summary.get("A").unwrap().count, Some(0));
        assert_eq!(
            summary.get("A").unwrap().outcome,
            Outcome::Failed(JobError::DivisionByZero {
                id: "A".into()
            })
        );
        assert!(summary.get("B").unwrap().outcome.is_success());
        assert_eq!(
            tools.sampler_calls(),
            vec![format!("subsample {} 42.250", b.path().display())]
        );
    }

    #[test]
    fn sampling_failure_is_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let inputs: Vec<_> = (0..6)
            .map(|i| write_input(dir.path(), &format!("S{}.bam", i), 20 + i))
            .collect();
        let mut cfg = config(
            inputs,
            NormalizationPolicy::MatchMinimum,
            &dir.path().join("out"),
        );
        cfg.set_threads(3);
        let tools = FakeTools {
            fail_index_for: Some("S3.subsampled.bam".to_string()),
            ..Default::default()
        };
        let (_s, intr) = no_interrupt();

        let summary = process_inputs(&cfg, &tools, &intr);
        assert_eq!(summary.phase, Phase::Done);
        assert_eq!(summary.n_succeeded(), 5);
        assert!(matches!(
            summary.get("S3").unwrap().outcome,
            Outcome::Failed(JobError::Sampling { .. })
        ));
        assert_eq!(tools.sampler_calls().len(), 5);
    }

    #[test]
    fn same_seed_gives_identical_output() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "A.bam", 300);
        let b = write_input(dir.path(), "B.bam", 100);
        let (_s, intr) = no_interrupt();
        let mut outputs = Vec::new();
        for run in ["run1", "run2"] {
            let out = dir.path().join(run);
            let cfg = config(vec![a.clone(), b.clone()], NormalizationPolicy::MatchMinimum, &out);
            assert!(process_inputs(&cfg, &FakeTools::default(), &intr).is_success());
            outputs.push(fs::read(out.join("A.subsampled.bam")).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn interrupt_fails_run_with_summary() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_input(dir.path(), "A.bam", 10);
        let out = dir.path().join("out");
        let cfg = config(vec![a], NormalizationPolicy::MatchMinimum, &out);
        let (s, intr) = no_interrupt();
        s.send(()).unwrap();

        let summary = process_inputs(&cfg, &FakeTools::default(), &intr);
        assert_eq!(summary.phase, Phase::Failed);
        assert_eq!(
            summary.pool_error,
            Some(JobError::Pool("interrupted".to_string()))
        );
        assert_eq!(summary.get("A").unwrap().outcome, Outcome::Pending);
        assert!(summary.to_string().contains("not processed"));
        assert!(!out.exists());
    }
}
