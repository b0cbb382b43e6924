/// Coordination of jobs between tasks
///
/// A pool of process tasks (threads) request jobs from and return results to the
/// controller.  A task returns the result of its previous job (if any) with each
/// request for a new job.  When no more jobs are available the controller replies
/// None and the task exits.  The controller finishes when all tasks have exited.
///
/// Jobs are independent and are handed out in submission order, but results come
/// back in completion order tagged with the index of the job.
///
/// The controller also listens for interrupts.  Tasks never handle an interrupt
/// themselves: on interrupt (or if the job channels break) the controller sets the
/// shared cancel flag, which makes tasks kill any running child process, and closes
/// the job channels without waiting for outstanding results.
use std::{
    fmt, mem,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use anyhow::Context;
use crossbeam_channel::{bounded, never, select, Receiver, Sender, TryRecvError};

use crate::error::JobError;

/// Sent from child tasks to request a new job
pub struct JobRequest<R> {
    pub prev_result: Option<(usize, R)>, // Result (with job index) from the previous job of this task
    pub task_idx: usize,                 // Id of task (used to select the channel to send the reply back to)
}

impl<R> fmt::Debug for JobRequest<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prev_result {
            Some((i, _)) => write!(f, "JobRequest(task {}, completed job {})", self.task_idx, i),
            None => write!(f, "JobRequest(task {})", self.task_idx),
        }
    }
}

/// Sent to child task in response to a JobRequest
#[derive(Debug)]
pub struct Job {
    pub job_idx: usize,
}

/// Keep track of pending Jobs (those that have been sent out and the results have not yet come back)
#[derive(Default, Debug)]
struct Tracker {
    n_sent: usize,
    n_pending: usize,
}

impl Tracker {
    fn update_at_send(&mut self) {
        self.n_sent += 1;
        self.n_pending += 1;
    }

    fn update_at_recv<R>(&mut self, jr: &JobRequest<R>) {
        if jr.prev_result.is_some() {
            assert!(self.n_pending > 0);
            self.n_pending -= 1;
        }
    }
}

enum Event<R> {
    Request(JobRequest<R>),
    Closed,
    Interrupt,
    Disconnected,
}

/// Results collected by one pool run.  If `error` is set the phase was aborted and
/// `results` holds only the jobs that completed before that happened.
pub struct PoolOutput<R> {
    pub results: Vec<(usize, R)>,
    pub error: Option<JobError>,
}

/// Create the channel through which an interrupt (Ctrl-C) reaches the controller
pub fn interrupt_channel() -> anyhow::Result<Receiver<()>> {
    let (s, r) = bounded(1);
    ctrlc::set_handler(move || {
        // A second interrupt while the first is still queued can be dropped
        let _ = s.try_send(());
    })
    .with_context(|| "Could not install interrupt handler")?;
    Ok(r)
}

fn process_task<J, R, F>(
    ix: usize,
    jobs: &[J],
    work: &F,
    cancel: &AtomicBool,
    snd: Sender<JobRequest<R>>,
    recv: Receiver<Option<Job>>,
) where
    F: Fn(&J, &AtomicBool) -> R,
{
    debug!("Process task {} starting up", ix);
    let mut prev_result = None;
    loop {
        if snd
            .send(JobRequest {
                prev_result: prev_result.take(),
                task_idx: ix,
            })
            .is_err()
        {
            debug!("Process task {}: controller has gone away", ix);
            break;
        }
        match recv.recv() {
            Ok(Some(job)) => {
                trace!("Task {} received job {:?}", ix, job);
                prev_result = Some((job.job_idx, work(&jobs[job.job_idx], cancel)));
            }
            _ => break,
        }
    }
    debug!("Process task {} closing down", ix);
}

/// Main loop.  Receives messages from child tasks and allocates jobs.  Will end
/// when channel r is closed (i.e., when all child tasks exit), on interrupt or if a
/// reply cannot be delivered
fn controller<R>(
    n_jobs: usize,
    r: Receiver<JobRequest<R>>,
    svec: Vec<Sender<Option<Job>>>,
    interrupt: &Receiver<()>,
    cancel: &AtomicBool,
) -> PoolOutput<R> {
    debug!("Controller starting up");
    let mut track = Tracker::default();
    let mut results = Vec::with_capacity(n_jobs);
    let mut error = None;
    let mut intr = interrupt.clone();

    loop {
        // Check for a pending interrupt first so it is acted on even when requests are queued
        match intr.try_recv() {
            Ok(()) => {
                error = Some(JobError::Pool("interrupted".to_string()));
                break;
            }
            Err(TryRecvError::Disconnected) => intr = never(),
            Err(TryRecvError::Empty) => (),
        }
        let event = select! {
            recv(r) -> msg => msg.map(Event::Request).unwrap_or(Event::Closed),
            recv(intr) -> msg => if msg.is_ok() { Event::Interrupt } else { Event::Disconnected },
        };
        match event {
            Event::Request(jr) => {
                trace!("Controller received request {:?}; pending: {:?}", jr, track);
                track.update_at_recv(&jr);
                let task_idx = jr.task_idx;
                if let Some(res) = jr.prev_result {
                    results.push(res)
                }
                let job = if track.n_sent < n_jobs {
                    track.update_at_send();
                    Some(Job {
                        job_idx: track.n_sent - 1,
                    })
                } else {
                    None
                };
                trace!("Controller sending back job {:?} for task {}", job, task_idx);
                if svec[task_idx].send(job).is_err() {
                    error = Some(JobError::Pool(format!(
                        "task {} stopped responding",
                        task_idx
                    )));
                    break;
                }
            }
            // All tasks have exited
            Event::Closed => break,
            Event::Interrupt => {
                error = Some(JobError::Pool("interrupted".to_string()));
                break;
            }
            Event::Disconnected => intr = never(),
        }
    }

    if error.is_some() {
        warn!(
            "Stopping worker pool with {} job(s) running and {} not started",
            track.n_pending,
            n_jobs - track.n_sent
        );
        cancel.store(true, Ordering::Relaxed);
    } else if track.n_pending > 0 {
        error = Some(JobError::Pool(format!(
            "{} job(s) lost: worker task exited unexpectedly",
            track.n_pending
        )));
    }
    // Closing the job channels releases any task waiting for a reply
    mem::drop(svec);
    debug!("Controller closing down");
    PoolOutput { results, error }
}

/// Run `work` on every job using a pool of `n_tasks` threads.
///
/// Results are returned tagged with the job index, in completion order
pub fn run_pool<J, R, F>(
    jobs: &[J],
    n_tasks: usize,
    interrupt: &Receiver<()>,
    work: F,
) -> PoolOutput<R>
where
    J: Sync,
    R: Send,
    F: Fn(&J, &AtomicBool) -> R + Sync,
{
    if jobs.is_empty() {
        return PoolOutput {
            results: Vec::new(),
            error: None,
        };
    }
    let nt = n_tasks.clamp(1, jobs.len());
    let cancel = AtomicBool::new(false);
    let work = &work;
    let cancel_ref = &cancel;

    thread::scope(|sc| {
        // Channel for a task to request a new job
        let (send_ctrl, recv_ctrl) = bounded(nt * 8);

        // Storage for channels by which a task receives a new job
        let mut send_job = Vec::with_capacity(nt);

        // Spawn task processes
        let join_handles: Vec<_> = (0..nt)
            .map(|ix| {
                let (s, r) = bounded(1);
                send_job.push(s);
                let s = send_ctrl.clone();
                sc.spawn(move || process_task(ix, jobs, work, cancel_ref, s, r))
            })
            .collect();
        mem::drop(send_ctrl);

        let mut out = controller(jobs.len(), recv_ctrl, send_job, interrupt, cancel_ref);

        for (ix, jh) in join_handles.into_iter().enumerate() {
            if jh.join().is_err() {
                error!("Process task {} panicked", ix);
                if out.error.is_none() {
                    out.error = Some(JobError::Pool(format!("worker task {} panicked", ix)))
                }
            }
        }
        out
    })
}
