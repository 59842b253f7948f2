//! Live Broadcaster: pushes a fresh snapshot to every WebSocket subscriber on a fixed
//! interval.
//!
//! The subscriber set lives inside one actor task and is only touched there. Handles talk
//! to it over a command channel, so joins and removals arriving in the same tick need no
//! locking. Each tick builds one snapshot, serializes it once, and hands the same
//! `Arc<str>` to every subscriber.
//!
//! Every snapshot after the join snapshot is built by the actor, one at a time, and
//! queued as soon as it is built, so `timestampMs` never goes backwards within one
//! subscriber's stream.

use crate::aggregator::StatusAggregator;
use crate::types::{BroadcastMessage, StatusSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// One serialized `system_status` message, shared by every subscriber of a tick.
pub type Payload = Arc<str>;

// Per-subscriber backlog. A subscriber this far behind skips ticks until it drains.
const SUBSCRIBER_BUFFER: usize = 8;

enum Command {
    Join {
        id: u64,
        tx: mpsc::Sender<Payload>,
        joined_at: Instant,
    },
    Leave {
        id: u64,
    },
    Refresh {
        id: u64,
    },
    Count(oneshot::Sender<usize>),
    Shutdown,
}

struct Subscriber {
    tx: mpsc::Sender<Payload>,
    joined_at: Instant,
}

#[derive(Clone)]
pub struct Broadcaster {
    commands: mpsc::UnboundedSender<Command>,
    aggregator: Arc<StatusAggregator>,
    next_id: Arc<AtomicU64>,
}

/// A live subscriber's receiving end. Dropping it leaves the broadcast set.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Payload>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Ask for a fresh snapshot for this subscriber alone. It arrives through `recv`
    /// behind anything already queued.
    pub fn request_snapshot(&self) {
        let _ = self.commands.send(Command::Refresh { id: self.id });
    }

    /// Next payload; `None` once the broadcaster has stopped.
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Leave { id: self.id });
    }
}

pub fn encode(snapshot: StatusSnapshot) -> serde_json::Result<Payload> {
    serde_json::to_string(&BroadcastMessage::SystemStatus(snapshot)).map(Payload::from)
}

impl Broadcaster {
    /// Start the actor. The first tick fires one `period` after spawning.
    pub fn spawn(aggregator: Arc<StatusAggregator>, period: Duration) -> (Self, JoinHandle<()>) {
        let (commands, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(rx, aggregator.clone(), period));
        (
            Self {
                commands,
                aggregator,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            task,
        )
    }

    /// Join the broadcast set. The new subscriber's first message is a snapshot built
    /// for it alone, so it does not wait for the next tick.
    pub async fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        match encode(self.aggregator.build_snapshot().await) {
            Ok(payload) => {
                let _ = tx.try_send(payload);
            }
            Err(e) => warn!("failed to encode initial snapshot for subscriber {id}: {e}"),
        }
        let _ = self.commands.send(Command::Join {
            id,
            tx,
            joined_at: Instant::now(),
        });
        Subscription {
            id,
            rx,
            commands: self.commands.clone(),
        }
    }

    /// Current number of subscribers; 0 once the actor has stopped.
    pub async fn subscriber_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Count(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Stop ticking and drop every subscriber. In-flight sends are not awaited.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

async fn run(
    mut commands: mpsc::UnboundedReceiver<Command>,
    aggregator: Arc<StatusAggregator>,
    period: Duration,
) {
    let mut subscribers: HashMap<u64, Subscriber> = HashMap::new();
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Join { id, tx, joined_at }) => {
                    subscribers.insert(id, Subscriber { tx, joined_at });
                    info!("client connected. Total clients: {}", subscribers.len());
                }
                Some(Command::Leave { id }) => {
                    if subscribers.remove(&id).is_some() {
                        info!("client disconnected. Total clients: {}", subscribers.len());
                    }
                }
                Some(Command::Refresh { id }) => {
                    let Some(sub) = subscribers.get(&id) else { continue };
                    match encode(aggregator.build_snapshot().await) {
                        Ok(payload) => {
                            if let Err(TrySendError::Full(_)) = sub.tx.try_send(payload) {
                                debug!("subscriber {id} is behind, dropping refresh");
                            }
                        }
                        Err(e) => warn!("failed to encode snapshot for subscriber {id}: {e}"),
                    }
                }
                Some(Command::Count(reply)) => {
                    let _ = reply.send(subscribers.len());
                }
                Some(Command::Shutdown) | None => break,
            },
            _ = ticker.tick() => {
                // nobody listening: skip sampling entirely
                if subscribers.is_empty() {
                    continue;
                }
                let snapshot = aggregator.build_snapshot().await;
                match encode(snapshot) {
                    Ok(payload) => deliver(&mut subscribers, &payload),
                    Err(e) => warn!("failed to encode snapshot, skipping tick: {e}"),
                }
            }
        }
    }
    info!(
        "broadcaster stopped with {} client(s) attached",
        subscribers.len()
    );
}

fn deliver(subscribers: &mut HashMap<u64, Subscriber>, payload: &Payload) {
    subscribers.retain(|id, sub| match sub.tx.try_send(payload.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            debug!("subscriber {id} is behind, skipping this tick");
            true
        }
        Err(TrySendError::Closed(_)) => {
            debug!(
                "subscriber {id} closed after {:?}, removing",
                sub.joined_at.elapsed()
            );
            false
        }
    });
}
