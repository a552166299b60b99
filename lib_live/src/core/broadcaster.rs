//! # Subscription Broadcaster
//!
//! Turns a pull-based data source into a push-based stream for many
//! simultaneous observers of the same logical resource.
//!
//! ## Core Design Principles:
//!
//! 1.  **One task per resource key**: each resource group is owned by a
//!     single async task holding the poll timer, the observer map and the
//!     cached payload. Subscribe/unsubscribe arrive over a command channel,
//!     so group state is only ever mutated by its own task and one slow
//!     resource's poll never blocks another's. No per-key locks.
//!
//! 2.  **Fingerprint deduplication**: every successful fetch is hashed; a
//!     payload is only fanned out when its fingerprint differs from the last
//!     broadcast one. Identical results produce zero network writes.
//!
//! 3.  **Cached replay for late subscribers**: an observer joining a group
//!     that already holds a payload receives it immediately instead of
//!     waiting out the poll interval.
//!
//! 4.  **Non-fatal upstream failures**: a fetch error is written to every
//!     observer as an error event and the cached last-known-good payload is
//!     left untouched. Observers are never evicted because the backend had a
//!     bad moment; the next scheduled tick is the retry.
//!
//! Ordering within one resource key follows poll order because broadcasts
//! only ever happen from the group task's own timer callback, never from a
//! stale in-flight fetch. Across resource keys there is no ordering.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};

use crate::core::events::{EventSender, Observer, StreamEvent};
use crate::core::fingerprint::fingerprint;

/// Boxed future returned by a fetch function.
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;

/// The external fetch function invoked on every poll tick for a resource.
///
/// Typically a closure over [`crate::core::coordinator::QueryCoordinator`],
/// but any async source works. The broadcaster never retries inside a tick;
/// retry policy belongs to the layer beneath it.
pub type FetchFn = Arc<dyn Fn(String) -> FetchFuture + Send + Sync>;

/// Timing knobs for the broadcaster.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Interval between fetches for each subscribed resource.
    pub poll_interval: Duration,
    /// Interval between keep-alive writes to each observer.
    pub heartbeat_interval: Duration,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

/// Returned by [`Broadcaster::subscribe`]; identifies one observer within
/// one resource group for later [`Broadcaster::unsubscribe`].
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    pub resource: String,
    pub observer_id: u64,
}

// Commands a group task accepts from subscribe/unsubscribe callers.
enum GroupCommand {
    Join {
        observer: Observer,
        ack: oneshot::Sender<()>,
    },
    Leave {
        observer_id: u64,
    },
}

type GroupSender = mpsc::UnboundedSender<GroupCommand>;

/// Fans out polled data to every observer of each resource key.
pub struct Broadcaster {
    groups: Arc<Mutex<HashMap<String, GroupSender>>>,
    fetch: FetchFn,
    config: BroadcasterConfig,
    next_observer_id: AtomicU64,
}

impl Broadcaster {
    pub fn new(fetch: FetchFn, config: BroadcasterConfig) -> Self {
        Self {
            groups: Arc::new(Mutex::new(HashMap::new())),
            fetch,
            config,
            next_observer_id: AtomicU64::new(0),
        }
    }

    /// Registers a sink under `resource` and returns its handle.
    ///
    /// The sink first receives a `connected` event carrying its assigned
    /// observer id. If this is the first observer for the key, a group task
    /// is spawned whose poll timer fires immediately, so the first payload
    /// does not wait out a full poll interval. If the group already holds a
    /// cached payload, the new observer receives it right away instead.
    pub async fn subscribe(
        &self,
        resource: &str,
        sender: EventSender,
        identity: Option<String>,
    ) -> SubscriptionHandle {
        let observer_id = self.next_observer_id.fetch_add(1, Ordering::Relaxed) + 1;
        let _ = sender.send(StreamEvent::Connected {
            observer_id,
            resource: resource.to_string(),
        });

        let observer = Observer::new(observer_id, identity, sender);

        // A group task that just emptied out may still own the map entry for
        // a moment. If the join is not acknowledged, the entry is stale:
        // drop it and spawn a fresh group.
        loop {
            let tx = self.group_sender(resource);
            let (ack_tx, ack_rx) = oneshot::channel();
            let sent = tx
                .send(GroupCommand::Join {
                    observer: observer.clone(),
                    ack: ack_tx,
                })
                .is_ok();
            if sent && ack_rx.await.is_ok() {
                break;
            }
            self.remove_group_entry(resource, &tx);
        }

        SubscriptionHandle {
            resource: resource.to_string(),
            observer_id,
        }
    }

    /// Removes the observer named by `handle` from its resource group.
    ///
    /// When the group's observer map becomes empty, the group task cancels
    /// its timers, discards the cached payload and fingerprint, and exits.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let tx = {
            let groups = self.groups.lock().expect("Broadcaster lock poisoned");
            groups.get(&handle.resource).cloned()
        };
        if let Some(tx) = tx {
            let _ = tx.send(GroupCommand::Leave {
                observer_id: handle.observer_id,
            });
        }
    }

    /// Resource keys that currently have a live group task. Monitoring only.
    pub fn active_resources(&self) -> Vec<String> {
        let groups = self.groups.lock().expect("Broadcaster lock poisoned");
        groups.keys().cloned().collect()
    }

    // Returns the command sender for `resource`, spawning the group task on
    // first subscribe for the key.
    fn group_sender(&self, resource: &str) -> GroupSender {
        let mut groups = self.groups.lock().expect("Broadcaster lock poisoned");
        if let Some(tx) = groups.get(resource) {
            return tx.clone();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        groups.insert(resource.to_string(), tx.clone());

        log::info!("Resource '{}': first observer, starting poll group", resource);
        tokio::spawn(run_group(
            resource.to_string(),
            rx,
            tx.clone(),
            Arc::clone(&self.fetch),
            self.config.clone(),
            Arc::clone(&self.groups),
        ));
        tx
    }

    fn remove_group_entry(&self, resource: &str, stale: &GroupSender) {
        let mut groups = self.groups.lock().expect("Broadcaster lock poisoned");
        if groups
            .get(resource)
            .is_some_and(|tx| tx.same_channel(stale))
        {
            groups.remove(resource);
        }
    }
}

// The single-owner task for one resource key. Holds the observer map, the
// cached payload and its fingerprint; exits when the last observer leaves.
async fn run_group(
    resource: String,
    mut rx: mpsc::UnboundedReceiver<GroupCommand>,
    self_tx: GroupSender,
    fetch: FetchFn,
    config: BroadcasterConfig,
    groups: Arc<Mutex<HashMap<String, GroupSender>>>,
) {
    let mut observers: HashMap<u64, Observer> = HashMap::new();
    let mut last_payload: Option<Arc<Value>> = None;
    let mut last_fingerprint: Option<u64> = None;
    // Guards against tearing down before the very first Join arrives.
    let mut joined_once = false;

    // The first poll tick fires immediately: a brand-new group fetches right
    // away instead of idling for a full interval.
    let mut poll = interval(config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut heartbeat = interval_at(
        Instant::now() + config.heartbeat_interval,
        config.heartbeat_interval,
    );
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(GroupCommand::Join { observer, ack }) => {
                    joined_once = true;
                    // Cached replay: a later subscriber gets the last payload
                    // immediately, no redundant fetch.
                    if let Some(payload) = &last_payload {
                        observer.send(StreamEvent::Data { payload: Arc::clone(payload) });
                    }
                    log::info!(
                        "Resource '{}': observer {} joined ({} total)",
                        resource, observer.id, observers.len() + 1
                    );
                    observers.insert(observer.id, observer);
                    let _ = ack.send(());
                }
                Some(GroupCommand::Leave { observer_id }) => {
                    if observers.remove(&observer_id).is_some() {
                        log::info!(
                            "Resource '{}': observer {} left ({} remain)",
                            resource, observer_id, observers.len()
                        );
                    }
                    if joined_once && observers.is_empty() {
                        break;
                    }
                }
                None => break,
            },
            _ = poll.tick() => {
                tick(&resource, &fetch, &mut observers, &mut last_payload, &mut last_fingerprint).await;
                if joined_once && observers.is_empty() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                let ts = Utc::now();
                // A failed keep-alive write means the far end is gone; same
                // removal path as an explicit disconnect.
                observers.retain(|id, observer| {
                    let alive = observer.send(StreamEvent::Heartbeat { ts });
                    if !alive {
                        log::info!("Resource '{}': observer {} dropped on heartbeat", resource, id);
                    }
                    alive
                });
                if joined_once && observers.is_empty() {
                    break;
                }
            }
        }
    }

    // Release the map entry unless subscribe already replaced it with a
    // fresh group. Joins still queued in rx fail their ack and get retried
    // by the subscriber against the new entry.
    let mut map = groups.lock().expect("Broadcaster lock poisoned");
    if map
        .get(&resource)
        .is_some_and(|tx| tx.same_channel(&self_tx))
    {
        map.remove(&resource);
    }
    log::info!("Resource '{}': last observer gone, poll group stopped", resource);
}

// One poll cycle: fetch, fingerprint, fan out on change.
async fn tick(
    resource: &str,
    fetch: &FetchFn,
    observers: &mut HashMap<u64, Observer>,
    last_payload: &mut Option<Arc<Value>>,
    last_fingerprint: &mut Option<u64>,
) {
    match (fetch)(resource.to_string()).await {
        Ok(payload) => {
            let fp = fingerprint(&payload);
            if *last_fingerprint == Some(fp) {
                log::debug!("Resource '{}': payload unchanged, no broadcast", resource);
                return;
            }
            let payload = Arc::new(payload);
            *last_fingerprint = Some(fp);
            *last_payload = Some(Arc::clone(&payload));
            observers.retain(|id, observer| {
                let alive = observer.send(StreamEvent::Data {
                    payload: Arc::clone(&payload),
                });
                if !alive {
                    log::info!("Resource '{}': observer {} dropped on write", resource, id);
                }
                alive
            });
        }
        Err(message) => {
            // Transient upstream failure: surface it, keep the cached state,
            // let the next scheduled tick retry.
            log::warn!("Resource '{}': fetch failed: {}", resource, message);
            observers.retain(|_, observer| {
                observer.send(StreamEvent::Error {
                    message: message.clone(),
                })
            });
        }
    }
}
