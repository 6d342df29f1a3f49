//! The dedicated I/O thread.
//!
//! A single-threaded tokio runtime runs on its own OS thread and drives
//! every connection task. Callers never block on it; they submit work
//! through channels and collect results with `Client::poll`.

use crate::base::neterror::NetError;
use std::future::Future;
use std::thread::{self, JoinHandle, ThreadId};
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

pub struct IoRuntime {
    handle: Handle,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl IoRuntime {
    pub fn start(name: &str) -> Result<Self, NetError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (shutdown, stopped) = oneshot::channel::<()>();

        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            tracing::debug!("I/O loop started");
            runtime.block_on(async {
                // Resolves on an explicit stop or when the sender is dropped.
                let _ = stopped.await;
            });
            runtime.shutdown_background();
            tracing::debug!("I/O loop stopped");
        })?;
        let thread_id = thread.thread().id();

        Ok(Self {
            handle,
            shutdown: Some(shutdown),
            thread: Some(thread),
            thread_id,
        })
    }

    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn is_io_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for IoRuntime {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        // The last client handle can be released from a completion running on
        // the loop itself; joining there would deadlock.
        if self.is_io_thread() {
            return;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("I/O thread panicked");
            }
        }
    }
}
