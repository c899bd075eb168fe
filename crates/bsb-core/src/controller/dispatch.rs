//! Ordered callback dispatch
//!
//! One worker thread runs submitted jobs in submission order, so slow
//! callbacks never hold up the monitor loop.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tracing::warn;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct Dispatcher {
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub(crate) fn spawn() -> io::Result<Self> {
        let (jobs, rx) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name("bsb-dispatch".to_string())
            .spawn(move || dispatch_main(rx))?;
        Ok(Self {
            jobs: Some(jobs),
            worker: Some(worker),
        })
    }

    pub(crate) fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(jobs) = &self.jobs {
            if jobs.send(Box::new(job)).is_err() {
                warn!("Dispatch worker is gone, dropping callback");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the channel lets the worker finish queued jobs and exit
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Dispatch worker panicked");
            }
        }
    }
}

fn dispatch_main(rx: Receiver<Job>) {
    while let Ok(job) = rx.recv() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("Callback panicked");
        }
    }
}
