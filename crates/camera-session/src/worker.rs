//! Worker execution context
//!
//! A dedicated OS thread draining a message queue. Camera callbacks post
//! events here so that all session work runs on one thread, away from the
//! caller. One worker lives for one preview lifetime.

use std::io;
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::mpsc;
use tracing::{debug, warn};

enum Message<E> {
    Event(E),
    Quit,
}

/// Cloneable handle for posting events to a worker
pub struct WorkerSender<E> {
    tx: mpsc::UnboundedSender<Message<E>>,
}

impl<E> Clone for WorkerSender<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> WorkerSender<E> {
    /// Queue an event. Returns false once the worker has exited.
    pub fn post(&self, event: E) -> bool {
        self.try_post(event).is_ok()
    }

    /// Queue an event, handing it back if the worker has exited
    pub fn try_post(&self, event: E) -> Result<(), E> {
        match self.tx.send(Message::Event(event)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(Message::Event(event))) => Err(event),
            Err(mpsc::error::SendError(Message::Quit)) => Ok(()),
        }
    }
}

/// Background thread with its own event queue
pub struct Worker<E> {
    name: String,
    sender: WorkerSender<E>,
    handle: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl<E: Send + 'static> Worker<E> {
    /// Start a worker thread running `handler` for each posted event
    pub fn spawn<F>(name: &str, mut handler: F) -> io::Result<Self>
    where
        F: FnMut(E) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message<E>>();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!("Worker {} started", thread_name);
                while let Some(message) = rx.blocking_recv() {
                    match message {
                        Message::Event(event) => handler(event),
                        Message::Quit => break,
                    }
                }
                debug!("Worker {} exiting", thread_name);
            })?;

        Ok(Self {
            name: name.to_string(),
            thread_id: handle.thread().id(),
            sender: WorkerSender { tx },
            handle: Some(handle),
        })
    }
}

impl<E> Worker<E> {
    pub fn sender(&self) -> WorkerSender<E> {
        self.sender.clone()
    }

    pub fn post(&self, event: E) -> bool {
        self.sender.post(event)
    }

    /// Whether the calling code runs on this worker's thread
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Stop the worker after the events already queued.
    ///
    /// Blocks until the thread exits, except when called from the worker
    /// itself, in which case the thread finishes on its own once the current
    /// event returns.
    pub fn quit(mut self) {
        let _ = self.sender.tx.send(Message::Quit);
        let Some(handle) = self.handle.take() else {
            return;
        };
        if self.is_current() {
            debug!("Worker {} quitting from its own thread", self.name);
            return;
        }
        if handle.join().is_err() {
            warn!("Worker {} panicked", self.name);
        }
    }
}

impl<E> Drop for Worker<E> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.sender.tx.send(Message::Quit);
        }
    }
}
