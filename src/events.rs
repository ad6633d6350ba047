//! Fan-out of live-session events to subscribers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{ClassificationResult, Item, ModerationOutcome};

/// Everything a live session reports
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    Started {
        session_id: Uuid,
        live_chat_id: String,
    },
    /// A newly seen message and its verdict
    Message {
        item: Item,
        verdict: ClassificationResult,
    },
    Deletion(ModerationOutcome),
    /// A tick failed with a transient error; the session keeps polling
    TickFailed { error: String },
    /// The session ended on a permanent error
    Halted {
        error: String,
        reauthorization_required: bool,
    },
    /// The session was stopped on request
    Stopped,
}

type Subscribers<E> = Mutex<Vec<(u64, mpsc::UnboundedSender<E>)>>;

struct Registry<E> {
    subscribers: Subscribers<E>,
    next_id: AtomicU64,
}

impl<E> Registry<E> {
    fn lock(&self) -> MutexGuard<'_, Vec<(u64, mpsc::UnboundedSender<E>)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, id: u64) {
        self.lock().retain(|(sub_id, _)| *sub_id != id);
    }
}

/// Cloneable handle that delivers each event to every live subscription
pub struct EventEmitter<E> {
    registry: Arc<Registry<E>>,
}

impl<E> Clone for EventEmitter<E> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Registry {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

impl<E: Clone + Send + 'static> EventEmitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription<E> {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.lock().push((id, tx));

        Subscription {
            id,
            receiver: rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver to all subscribers, pruning any whose receiver is gone
    pub fn emit(&self, event: E) {
        self.registry
            .lock()
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().len()
    }
}

/// Receiving end of a subscription; dropping it unsubscribes
pub struct Subscription<E> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<E>,
    registry: Weak<Registry<E>>,
}

impl<E: Send + 'static> Subscription<E> {
    /// Next event, or `None` once the emitter is gone and the queue is drained
    pub async fn recv(&mut self) -> Option<E> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.receiver.try_recv().ok()
    }

    pub fn cancel(self) {}

    /// Hand every event to `handler` on a background task
    pub fn forward_to<F>(mut self, mut handler: F) -> ListenerHandle
    where
        F: FnMut(E) + Send + 'static,
    {
        let task = tokio::spawn(async move {
            while let Some(event) = self.recv().await {
                handler(event);
            }
        });
        ListenerHandle { task }
    }
}

impl<E> Drop for Subscription<E> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

/// Cancels a forwarding listener
pub struct ListenerHandle {
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
