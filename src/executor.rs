//! Background execution for the callback API
//!
//! A process-wide pool runs engine work on worker threads. Every callback
//! is then run on one dedicated completion thread, so callers see their
//! completions one at a time on a single thread and never inside the call
//! that registered them.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::OnceLock;
use std::thread;

use crossbeam::channel::{self, Sender};

use crate::error::{AtlasError, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

static EXECUTOR: OnceLock<Executor> = OnceLock::new();

/// The shared executor, started on first use
pub fn global() -> &'static Executor {
    EXECUTOR.get_or_init(|| {
        let workers = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2)
            .clamp(2, 8);
        Executor::start(workers)
    })
}

pub struct Executor {
    jobs: Sender<Job>,
    completions: Sender<Job>,
    workers: usize,
}

impl Executor {
    fn start(workers: usize) -> Self {
        let (jobs, job_rx) = channel::unbounded::<Job>();
        let (completions, completion_rx) = channel::unbounded::<Job>();

        let mut started = 0;
        for n in 0..workers {
            let rx = job_rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("atlasdown-worker-{}", n))
                .spawn(move || {
                    for job in rx.iter() {
                        job();
                    }
                });
            match spawned {
                Ok(_) => started += 1,
                Err(e) => tracing::error!(worker = n, "failed to spawn worker thread: {}", e),
            }
        }

        let spawned = thread::Builder::new()
            .name("atlasdown-completion".to_string())
            .spawn(move || {
                for callback in completion_rx.iter() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
                        tracing::error!(panic = %panic_message(&*payload), "completion callback panicked");
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::error!("failed to spawn completion thread: {}", e);
        }

        tracing::debug!(workers = started, "executor started");
        Self {
            jobs,
            completions,
            workers: started,
        }
    }

    /// Run `work` on a worker, then `callback` with its result on the
    /// completion thread
    ///
    /// A panic inside `work` is reported to the callback as an error.
    pub fn submit<T, W, C>(&self, work: W, callback: C)
    where
        T: Send + 'static,
        W: FnOnce() -> Result<T> + Send + 'static,
        C: FnOnce(Result<T>) + Send + 'static,
    {
        let completions = self.completions.clone();
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(work)).unwrap_or_else(|payload| {
                Err(AtlasError::Storage(format!(
                    "background operation panicked: {}",
                    panic_message(&*payload)
                )))
            });
            if completions.send(Box::new(move || callback(result))).is_err() {
                tracing::error!("completion queue closed; dropping callback");
            }
        });
        if self.jobs.send(job).is_err() {
            tracing::error!("worker queue closed; dropping job");
        }
    }

    /// Run `callback` on the completion thread without any engine work
    pub fn complete<C>(&self, callback: C)
    where
        C: FnOnce() + Send + 'static,
    {
        if self.completions.send(Box::new(callback)).is_err() {
            tracing::error!("completion queue closed; dropping callback");
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
