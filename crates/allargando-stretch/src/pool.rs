//! Channel worker threads.
//!
//! One named worker per channel. A batch moves each `ChannelState` to its
//! worker over a bounded channel, the worker runs every planned frame, and
//! the state comes back over a shared result channel. The caller blocks until
//! all channels have returned, so no state is ever touched from two threads.
//!
//! A panic inside a worker is caught, carried back, and resumed on the
//! calling thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::channel::ChannelState;
use crate::plan::FramePlan;

type Panic = Box<dyn Any + Send + 'static>;
type JobResult = std::result::Result<Box<ChannelState>, Panic>;

/// One channel's share of a batch.
pub(crate) struct ChannelJob {
    pub channel: Box<ChannelState>,
    pub plans: Arc<Vec<FramePlan>>,
}

pub(crate) enum WorkerCommand {
    Run(ChannelJob),
    Shutdown,
}

struct Worker {
    command_tx: Sender<WorkerCommand>,
    handle: Option<JoinHandle<()>>,
}

pub(crate) struct WorkerPool {
    workers: Vec<Worker>,
    result_rx: Receiver<JobResult>,
}

impl WorkerPool {
    pub fn new(count: usize) -> std::io::Result<Self> {
        let (result_tx, result_rx) = unbounded();
        let mut workers = Vec::with_capacity(count);

        for index in 0..count.max(1) {
            let (command_tx, command_rx) = bounded(1);
            let result_tx = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("allargando-ch{index}"))
                .spawn(move || worker_loop(command_rx, result_tx))?;
            workers.push(Worker {
                command_tx,
                handle: Some(handle),
            });
        }

        tracing::debug!("Started {} channel workers", workers.len());
        Ok(Self { workers, result_rx })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Run `plans` on every channel in parallel and wait for all of them.
    pub fn run(&self, channels: &mut Vec<Box<ChannelState>>, plans: &Arc<Vec<FramePlan>>) {
        let count = channels.len();
        for (i, channel) in channels.drain(..).enumerate() {
            let job = ChannelJob {
                channel,
                plans: Arc::clone(plans),
            };
            self.workers[i % self.workers.len()]
                .command_tx
                .send(WorkerCommand::Run(job))
                .expect("channel worker exited while the pool was alive");
        }

        let mut first_panic: Option<Panic> = None;
        for _ in 0..count {
            match self.result_rx.recv() {
                Ok(Ok(channel)) => channels.push(channel),
                Ok(Err(payload)) => {
                    first_panic.get_or_insert(payload);
                }
                Err(_) => panic!("channel workers disconnected"),
            }
        }
        if let Some(payload) = first_panic {
            panic::resume_unwind(payload);
        }

        channels.sort_by_key(|c| c.index());
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for worker in &self.workers {
            let _ = worker.command_tx.send(WorkerCommand::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
        tracing::debug!("Stopped {} channel workers", self.workers.len());
    }
}

fn worker_loop(command_rx: Receiver<WorkerCommand>, result_tx: Sender<JobResult>) {
    while let Ok(WorkerCommand::Run(job)) = command_rx.recv() {
        let ChannelJob { mut channel, plans } = job;
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
            channel.run(&plans);
            channel
        }));
        if result_tx.send(outcome).is_err() {
            break;
        }
    }
}
