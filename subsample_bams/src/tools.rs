//! External alignment tools
//!
//! All record-level work (counting, seeded sampling, indexing) is delegated to
//! samtools.  Each call runs one child process; the child is placed in its own
//! process group so a terminal interrupt is only seen by this program, which then
//! decides whether outstanding children should be killed (via the cancel flag).
use std::{
    ffi::{OsStr, OsString},
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use anyhow::Context;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// SAM flags for secondary (0x100) and supplementary (0x800) alignments
const NOT_PRIMARY_FLAGS: &str = "0x900";

/// Operations needed from the external toolkit.  Implementations must be safe to
/// call concurrently for different files.
pub trait AlignmentTools: Sync {
    /// Verify that the tools can be run at all
    fn check(&self) -> anyhow::Result<()>;

    /// Number of primary, non-supplementary records in `input`
    fn count_primary(&self, input: &Path, cancel: &AtomicBool) -> anyhow::Result<u64>;

    /// Write a seeded subsample of `input` to `output`.  `sampler_arg` is the
    /// seed and fraction in the sampler's INT.FRAC form
    fn subsample(
        &self,
        input: &Path,
        output: &Path,
        sampler_arg: &str,
        cancel: &AtomicBool,
    ) -> anyhow::Result<()>;

    /// Build the index for `bam`
    fn index(&self, bam: &Path, cancel: &AtomicBool) -> anyhow::Result<()>;
}

pub struct Samtools {
    exe: PathBuf,
}

impl Samtools {
    pub fn new<P: AsRef<Path>>(exe: P) -> Self {
        Self {
            exe: exe.as_ref().to_owned(),
        }
    }

    /// Run samtools with `args`, returning stdout.  Fails on non-zero exit status,
    /// or if `cancel` is set while the child is running (the child is killed).
    fn run<I, S>(&self, args: I, cancel: &AtomicBool) -> anyhow::Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.exe);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let desc = describe(&cmd);
        debug!("Running {}", desc);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Could not start {}", self.exe.display()))?;

        // Drain pipes in the background so the child can never block on a full pipe
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = wait_or_cancel(&mut child, cancel)
            .with_context(|| format!("Error waiting for {}", desc))?;

        let out = join_reader(stdout)?;
        let err = join_reader(stderr)?;

        match status {
            Some(st) if st.success() => {
                trace!("{} finished", desc);
                Ok(out)
            }
            Some(st) => Err(anyhow!(
                "{} failed ({}): {}",
                desc,
                st,
                String::from_utf8_lossy(&err).trim()
            )),
            None => Err(anyhow!("{} interrupted", desc)),
        }
    }
}

impl AlignmentTools for Samtools {
    fn check(&self) -> anyhow::Result<()> {
        let cancel = AtomicBool::new(false);
        let out = self
            .run(["--version"], &cancel)
            .with_context(|| format!("{} is not available", self.exe.display()))?;
        let out = String::from_utf8_lossy(&out);
        debug!(
            "Found {}",
            out.lines().next().unwrap_or("samtools (unknown version)")
        );
        Ok(())
    }

    fn count_primary(&self, input: &Path, cancel: &AtomicBool) -> anyhow::Result<u64> {
        let args: [&OsStr; 5] = [
            "view".as_ref(),
            "-c".as_ref(),
            "-F".as_ref(),
            NOT_PRIMARY_FLAGS.as_ref(),
            input.as_os_str(),
        ];
        let out = self.run(args, cancel)?;
        parse_count(&out)
    }

    fn subsample(
        &self,
        input: &Path,
        output: &Path,
        sampler_arg: &str,
        cancel: &AtomicBool,
    ) -> anyhow::Result<()> {
        let args: [&OsStr; 7] = [
            "view".as_ref(),
            "-b".as_ref(),
            "-s".as_ref(),
            sampler_arg.as_ref(),
            "-o".as_ref(),
            output.as_os_str(),
            input.as_os_str(),
        ];
        self.run(args, cancel).map(|_| ())
    }

    fn index(&self, bam: &Path, cancel: &AtomicBool) -> anyhow::Result<()> {
        let args: [&OsStr; 2] = ["index".as_ref(), bam.as_os_str()];
        self.run(args, cancel).map(|_| ())
    }
}

fn parse_count(out: &[u8]) -> anyhow::Result<u64> {
    let s = String::from_utf8_lossy(out);
    let s = s.trim();
    s.parse::<u64>()
        .with_context(|| format!("Non-numeric read count output '{}'", s))
}

fn describe(cmd: &Command) -> String {
    let mut s: OsString = cmd.get_program().to_owned();
    for a in cmd.get_args() {
        s.push(" ");
        s.push(a);
    }
    s.to_string_lossy().into_owned()
}

/// Returns None if the child was killed because `cancel` was set
fn wait_or_cancel(
    child: &mut Child,
    cancel: &AtomicBool,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    loop {
        if let Some(st) = child.try_wait()? {
            return Ok(Some(st));
        }
        if cancel.load(Ordering::Relaxed) {
            debug!("Killing child process {}", child.id());
            // The child may have exited between the checks; errors here are of no interest
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

type Reader = Option<thread::JoinHandle<std::io::Result<Vec<u8>>>>;

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Reader {
    pipe.map(|mut p| {
        thread::spawn(move || {
            let mut v = Vec::new();
            p.read_to_end(&mut v).map(|_| v)
        })
    })
}

fn join_reader(r: Reader) -> anyhow::Result<Vec<u8>> {
    match r {
        Some(jh) => jh
            .join()
            .map_err(|_| anyhow!("Pipe reader thread panicked"))?
            .with_context(|| "Error reading child process output"),
        None => Ok(Vec::new()),
    }
}
