//! Single-threaded event loop
//!
//! Every request issued against the in-memory host is resolved here, one
//! task at a time, in submission order. Observers attached by the adapter
//! therefore run on this thread and never concurrently with each other.

use crate::error::MemoryError;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, warn};

/// Unit of work executed on the loop thread
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Command sent to the loop thread
enum LoopCommand {
    /// Run a task
    Run(Task),

    /// Graceful shutdown
    Shutdown,
}

/// Handle to the loop thread
pub(crate) struct EventLoop {
    sender: Sender<LoopCommand>,
    thread_handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl EventLoop {
    /// Spawn the loop thread
    pub(crate) fn new() -> Result<Self, MemoryError> {
        let (sender, receiver) = unbounded::<LoopCommand>();

        let thread_handle = thread::Builder::new()
            .name("idb-event-loop".to_string())
            .spawn(move || Self::run(receiver))?;
        let thread_id = thread_handle.thread().id();

        Ok(Self {
            sender,
            thread_handle: Some(thread_handle),
            thread_id,
        })
    }

    /// Queue a task. Returns `false` if the loop has stopped.
    pub(crate) fn schedule(&self, task: Task) -> bool {
        if self.sender.send(LoopCommand::Run(task)).is_err() {
            warn!("event loop stopped; task dropped");
            return false;
        }
        true
    }

    pub(crate) fn is_loop_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    fn run(receiver: Receiver<LoopCommand>) {
        debug!("event loop started");

        loop {
            match receiver.recv() {
                Ok(LoopCommand::Run(task)) => task(),
                Ok(LoopCommand::Shutdown) => {
                    debug!("shutdown signal received");
                    break;
                }
                Err(_) => {
                    debug!("channel disconnected, shutting down");
                    break;
                }
            }
        }

        debug!("event loop stopped");
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        let _ = self.sender.send(LoopCommand::Shutdown);

        // The last handle can be released by a task running on the loop itself
        if self.is_loop_thread() {
            return;
        }

        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                error!("Failed to join event loop thread: {:?}", e);
            }
        }
    }
}
