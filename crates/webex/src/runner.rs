use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::events::{Dispatcher, IncomingEvent};
use crate::webhooks::{EventHydrator, WebhookNotification};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("event runner is shut down")]
    ShutDown,
    #[error("event runner has no hydrator for webhook notifications")]
    NoHydrator,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Upper bound on dispatches in flight across all senders.
    pub max_concurrent_dispatches: usize,
    /// How long a sender's worker waits for more events before exiting.
    pub sender_idle: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self { max_concurrent_dispatches: 16, sender_idle: Duration::from_secs(60) }
    }
}

/// Work waiting in a sender's queue. Notifications are hydrated by the
/// sender's worker, so a slow fetch never lets a later event overtake it.
enum Queued {
    Event(IncomingEvent),
    Notification(WebhookNotification),
}

struct SenderQueue {
    worker_id: u64,
    events: UnboundedSender<Queued>,
}

struct RunnerShared {
    dispatcher: Arc<Dispatcher>,
    hydrator: Option<Arc<EventHydrator>>,
    permits: Arc<Semaphore>,
    queues: Mutex<HashMap<String, SenderQueue>>,
    next_worker_id: AtomicU64,
    settings: RunnerSettings,
}

/// Feeds events to the dispatcher: strictly in order per sender, concurrently
/// across senders. Submitting never waits on a dispatch.
#[derive(Clone)]
pub struct EventRunner {
    shared: Arc<RunnerShared>,
}

impl EventRunner {
    pub fn new(dispatcher: Arc<Dispatcher>, settings: RunnerSettings) -> Self {
        Self::build(dispatcher, None, settings)
    }

    /// A runner that also accepts raw webhook notifications.
    pub fn with_hydrator(
        dispatcher: Arc<Dispatcher>,
        hydrator: Arc<EventHydrator>,
        settings: RunnerSettings,
    ) -> Self {
        Self::build(dispatcher, Some(hydrator), settings)
    }

    fn build(
        dispatcher: Arc<Dispatcher>,
        hydrator: Option<Arc<EventHydrator>>,
        settings: RunnerSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_dispatches.max(1)));
        Self {
            shared: Arc::new(RunnerShared {
                dispatcher,
                hydrator,
                permits,
                queues: Mutex::new(HashMap::new()),
                next_worker_id: AtomicU64::new(0),
                settings,
            }),
        }
    }

    /// Must be called from within a tokio runtime.
    pub fn submit(&self, event: IncomingEvent) -> Result<(), RunnerError> {
        let sender_id = event.sender_id.clone();
        self.enqueue(sender_id, Queued::Event(event))
    }

    /// Queues a notification under the sender named in its envelope. The
    /// content is fetched later, in order with that sender's other events.
    pub fn submit_notification(&self, notification: WebhookNotification) -> Result<(), RunnerError> {
        if self.shared.hydrator.is_none() {
            return Err(RunnerError::NoHydrator);
        }
        let sender_id = notification.sender_key();
        self.enqueue(sender_id, Queued::Notification(notification))
    }

    fn enqueue(&self, sender_id: String, item: Queued) -> Result<(), RunnerError> {
        if self.shared.permits.is_closed() {
            return Err(RunnerError::ShutDown);
        }

        let mut queues = self.shared.queues.lock().unwrap_or_else(PoisonError::into_inner);
        let item = match queues.get(&sender_id) {
            Some(queue) => match queue.events.send(item) {
                Ok(()) => return Ok(()),
                // Worker died mid-dispatch; start a fresh one below.
                Err(mpsc::error::SendError(item)) => item,
            },
            None => item,
        };

        let worker_id = self.shared.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let (events, receiver) = mpsc::unbounded_channel();
        if events.send(item).is_err() {
            return Err(RunnerError::ShutDown);
        }
        queues.insert(sender_id.clone(), SenderQueue { worker_id, events });
        drop(queues);

        debug!(
            event_name = "webex.runner.worker_started",
            sender_id = %sender_id,
            worker_id,
            "sender worker started"
        );
        tokio::spawn(run_sender(self.shared.clone(), sender_id, worker_id, receiver));
        Ok(())
    }

    pub fn active_senders(&self) -> usize {
        self.shared.queues.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Stops accepting events. Workers finish what is already queued.
    pub fn shutdown(&self) {
        self.shared.permits.close();
        self.shared.queues.lock().unwrap_or_else(PoisonError::into_inner).clear();
        info!(event_name = "webex.runner.shutdown", "event runner shut down");
    }
}

async fn run_sender(
    shared: Arc<RunnerShared>,
    sender_id: String,
    worker_id: u64,
    mut receiver: UnboundedReceiver<Queued>,
) {
    loop {
        let item = match tokio::time::timeout(shared.settings.sender_idle, receiver.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => return,
            Err(_) => {
                // Re-checked under the lock so a concurrent submit either lands
                // here or finds no queue and starts a new worker.
                let mut queues = shared.queues.lock().unwrap_or_else(PoisonError::into_inner);
                match receiver.try_recv() {
                    Ok(item) => {
                        drop(queues);
                        item
                    }
                    Err(TryRecvError::Empty) => {
                        let ours =
                            queues.get(&sender_id).is_some_and(|queue| queue.worker_id == worker_id);
                        if ours {
                            queues.remove(&sender_id);
                        }
                        debug!(
                            event_name = "webex.runner.worker_idle",
                            sender_id = %sender_id,
                            worker_id,
                            "sender worker exiting"
                        );
                        return;
                    }
                    Err(TryRecvError::Disconnected) => return,
                }
            }
        };

        process(&shared, item).await;
    }
}

async fn process(shared: &RunnerShared, item: Queued) {
    // Closed permits still drain what was queued before shutdown.
    let _permit = match shared.permits.clone().acquire_owned().await {
        Ok(permit) => Some(permit),
        Err(_) => None,
    };

    let event = match item {
        Queued::Event(event) => event,
        Queued::Notification(notification) => match hydrate(shared, &notification).await {
            Some(event) => event,
            None => return,
        },
    };
    dispatch_one(shared, &event).await;
}

async fn hydrate(shared: &RunnerShared, notification: &WebhookNotification) -> Option<IncomingEvent> {
    let hydrator = shared.hydrator.as_ref()?;
    match hydrator.hydrate(notification).await {
        Ok(Some(event)) => Some(event),
        Ok(None) => {
            debug!(
                event_name = "webex.runner.notification_ignored",
                correlation_id = %notification.occurrence_id(),
                resource = %notification.resource,
                "notification does not carry a dispatchable event"
            );
            None
        }
        Err(error) => {
            warn!(
                event_name = "webex.runner.hydration_failed",
                correlation_id = %notification.occurrence_id(),
                sender_id = %notification.sender_key(),
                resource = %notification.resource,
                error = %error,
                "notification could not be hydrated"
            );
            None
        }
    }
}

async fn dispatch_one(shared: &RunnerShared, event: &IncomingEvent) {

    info!(
        event_name = "webex.runner.event_received",
        correlation_id = %event.event_id,
        sender_id = %event.sender_id,
        event_kind = event.kind_label(),
        "dispatching event"
    );

    let outcome = shared.dispatcher.dispatch(event).await;
    debug!(
        event_name = "webex.runner.event_done",
        correlation_id = %event.event_id,
        outcome = outcome.label(),
        "event dispatched"
    );
}
