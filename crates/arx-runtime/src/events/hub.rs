//! Fan-out of domain events to any number of observers.
//!
//! Publishers push into one bounded inbound queue; a single dispatch loop
//! copies each event into every subscriber's own bounded buffer. A full
//! subscriber buffer sheds events according to [`OverflowPolicy`] and never
//! slows down the dispatch loop, other subscribers, or publishers.
//!
//! ```text
//! Registry ─┐                                 ┌─► Subscription (ws client)
//! Monitor  ─┼─► inbound (mpsc) ─► dispatch ───┼─► Subscription (audit)
//! Routing  ─┘                                 └─► Subscription (...)
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use arx_core::config::EventsConfig;
use arx_core::error::{Result, SupervisorError};
use arx_core::event::{Event, OverflowPolicy};

/// Event hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Pending events kept per subscriber.
    pub subscriber_buffer: usize,
    /// Events queued between publishers and the dispatch loop.
    pub inbound_capacity: usize,
    /// What to drop when a subscriber buffer is full.
    pub overflow_policy: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from(&EventsConfig::default())
    }
}

impl From<&EventsConfig> for HubConfig {
    fn from(config: &EventsConfig) -> Self {
        Self {
            subscriber_buffer: config.subscriber_buffer.max(1),
            inbound_capacity: config.inbound_capacity.max(1),
            overflow_policy: config.overflow_policy,
        }
    }
}

/// Identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Hub counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct HubStats {
    /// Events accepted from publishers.
    pub published: u64,
    /// Event copies placed into subscriber buffers.
    pub delivered: u64,
    /// Event copies shed because a buffer or the inbound queue was full.
    pub dropped: u64,
    /// Events refused at publish time because the inbound queue was full.
    /// These reached no subscriber. Included in `dropped`.
    pub rejected: u64,
    /// Currently registered subscribers.
    pub subscribers: usize,
}

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    rejected: AtomicU64,
}

/// Bounded per-subscriber buffer.
struct SubscriberQueue {
    buffer: Mutex<VecDeque<Event>>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
            policy,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an event. Returns `false` if an event was shed.
    fn push(&self, event: Event) -> bool {
        let shed = {
            let mut buffer = lock(&self.buffer);
            if buffer.len() < self.capacity {
                buffer.push_back(event);
                false
            } else {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        buffer.pop_front();
                        buffer.push_back(event);
                    }
                    OverflowPolicy::DropNewest => {}
                }
                true
            }
        };

        if shed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        !shed
    }

    fn pop(&self) -> Option<Event> {
        lock(&self.buffer).pop_front()
    }

    fn len(&self) -> usize {
        lock(&self.buffer).len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Registered subscribers.
#[derive(Default)]
struct SubscriberSet {
    queues: RwLock<HashMap<SubscriberId, Arc<SubscriberQueue>>>,
    next_id: AtomicU64,
}

impl SubscriberSet {
    fn insert(&self, queue: Arc<SubscriberQueue>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        write(&self.queues).insert(id, queue);
        id
    }

    fn remove(&self, id: SubscriberId) -> bool {
        write(&self.queues).remove(&id).is_some()
    }

    fn len(&self) -> usize {
        read(&self.queues).len()
    }

    fn snapshot(&self) -> Vec<Arc<SubscriberQueue>> {
        read(&self.queues).values().cloned().collect()
    }

    fn close_all(&self) {
        let drained: Vec<_> = write(&self.queues).drain().map(|(_, q)| q).collect();
        for queue in drained {
            queue.close();
        }
    }
}

/// Publish/subscribe hub for [`Event`]s.
pub struct EventHub {
    config: HubConfig,
    inbound: mpsc::Sender<Event>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Event>>>,
    subscribers: Arc<SubscriberSet>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
}

impl EventHub {
    /// Create a hub. Events are queued until [`EventHub::start`] is called.
    pub fn new(config: HubConfig) -> Self {
        let (inbound, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        Self {
            config,
            inbound,
            inbound_rx: Mutex::new(Some(inbound_rx)),
            subscribers: Arc::new(SubscriberSet::default()),
            counters: Arc::new(Counters::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Spawn the dispatch loop. Fails if it is already running.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        let rx = lock(&self.inbound_rx).take().ok_or_else(|| {
            SupervisorError::InvalidState("event hub already started".to_string())
        })?;

        let subscribers = self.subscribers.clone();
        let counters = self.counters.clone();
        let shutdown = self.shutdown.clone();

        Ok(tokio::spawn(dispatch_loop(rx, subscribers, counters, shutdown)))
    }

    /// Stop dispatching and close every subscription.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Enqueue an event for distribution. Never waits.
    pub fn publish(&self, event: Event) {
        match self.inbound.try_send(event) {
            Ok(()) => {
                self.counters.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    kind = %event.kind(),
                    "Event hub inbound queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Event hub stopped, discarding event");
            }
        }
    }

    /// Register a new subscriber.
    ///
    /// The subscriber sees every event dispatched after this call. Dropping
    /// the returned [`Subscription`] deregisters it and frees its buffer.
    pub fn subscribe(&self) -> Subscription {
        let queue = Arc::new(SubscriberQueue::new(
            self.config.subscriber_buffer,
            self.config.overflow_policy,
        ));
        let id = self.subscribers.insert(queue.clone());
        // Checked after insertion: a shutdown racing with `insert` either
        // closes the queue in `close_all` or is seen here.
        if self.shutdown.is_cancelled() {
            queue.close();
        }
        tracing::debug!(subscriber = %id, "Subscriber registered");

        Subscription {
            id,
            queue,
            set: Arc::downgrade(&self.subscribers),
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            published: self.counters.published.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            subscribers: self.subscribers.len(),
        }
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

async fn dispatch_loop(
    mut rx: mpsc::Receiver<Event>,
    subscribers: Arc<SubscriberSet>,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
) {
    tracing::debug!("Event hub dispatch loop started");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = rx.recv() => {
                let Some(event) = event else { break };
                for queue in subscribers.snapshot() {
                    if queue.push(event.clone()) {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                    } else {
                        counters.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
    }

    subscribers.close_all();
    tracing::debug!("Event hub dispatch loop stopped");
}

/// Receiving end of one hub subscription.
pub struct Subscription {
    id: SubscriberId,
    queue: Arc<SubscriberQueue>,
    set: Weak<SubscriberSet>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the hub has shut down and the buffer is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            let notified = self.queue.notify.notified();
            if let Some(event) = self.queue.pop() {
                return Some(event);
            }
            if self.queue.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Take the next event if one is buffered.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.queue.pop()
    }

    /// Events currently buffered.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Events shed from this subscription so far.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Deregister explicitly. Equivalent to dropping.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            if set.remove(self.id) {
                tracing::debug!(subscriber = %self.id, "Subscriber removed");
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pending", &self.pending())
            .finish()
    }
}

// Poisoning only happens if a holder panicked mid-update of a plain buffer;
// the data is still structurally valid, so keep serving it.
fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(l: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(l: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use arx_core::cluster::NodeId;

    fn deleted() -> Event {
        Event::NodeDeleted {
            node_id: NodeId::new(),
        }
    }

    fn hub(buffer: usize, policy: OverflowPolicy) -> EventHub {
        EventHub::new(HubConfig {
            subscriber_buffer: buffer,
            inbound_capacity: 1024,
            overflow_policy: policy,
        })
    }

    async fn recv(sub: &mut Subscription) -> Event {
        tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timed out waiting for event")
            .expect("hub closed")
    }

    /// Wait until the dispatch loop has drained the inbound queue.
    async fn settle(hub: &EventHub, expected_published: u64) {
        for _ in 0..200 {
            let stats = hub.stats();
            if stats.published == expected_published
                && stats.delivered + stats.dropped >= expected_published
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("hub did not settle: {:?}", hub.stats());
    }

    #[tokio::test]
    async fn test_events_delivered_in_publish_order() {
        let hub = hub(16, OverflowPolicy::DropOldest);
        hub.start().unwrap();
        let mut sub = hub.subscribe();

        let events: Vec<Event> = (0..5).map(|_| deleted()).collect();
        for event in &events {
            hub.publish(event.clone());
        }

        for expected in &events {
            assert_eq!(&recv(&mut sub).await, expected);
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_gets_a_copy() {
        let hub = hub(16, OverflowPolicy::DropOldest);
        hub.start().unwrap();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let event = deleted();
        hub.publish(event.clone());

        assert_eq!(recv(&mut a).await, event);
        assert_eq!(recv(&mut b).await, event);
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_latest() {
        let hub = hub(2, OverflowPolicy::DropOldest);
        hub.start().unwrap();
        let mut sub = hub.subscribe();

        let events: Vec<Event> = (0..5).map(|_| deleted()).collect();
        for event in &events {
            hub.publish(event.clone());
        }
        settle(&hub, 5).await;

        assert_eq!(sub.pending(), 2);
        assert_eq!(sub.dropped(), 3);
        assert_eq!(sub.try_recv().unwrap(), events[3]);
        assert_eq!(sub.try_recv().unwrap(), events[4]);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_drop_newest_keeps_earliest() {
        let hub = hub(2, OverflowPolicy::DropNewest);
        hub.start().unwrap();
        let mut sub = hub.subscribe();

        let events: Vec<Event> = (0..5).map(|_| deleted()).collect();
        for event in &events {
            hub.publish(event.clone());
        }
        settle(&hub, 5).await;

        assert_eq!(sub.dropped(), 3);
        assert_eq!(sub.try_recv().unwrap(), events[0]);
        assert_eq!(sub.try_recv().unwrap(), events[1]);
        assert_eq!(hub.stats().dropped, 3);
    }

    #[tokio::test]
    async fn test_stalled_subscriber_does_not_block_others() {
        let hub = hub(4, OverflowPolicy::DropOldest);
        hub.start().unwrap();
        let stalled = hub.subscribe();
        let mut live = hub.subscribe();

        for i in 0..100u64 {
            hub.publish(deleted());
            // Keep the live subscriber drained; the stalled one never reads.
            let _ = recv(&mut live).await;
            assert_eq!(hub.stats().published, i + 1);
        }

        assert_eq!(stalled.pending(), 4);
        assert_eq!(stalled.dropped(), 96);
        assert_eq!(live.dropped(), 0);
    }

    #[tokio::test]
    async fn test_publish_never_blocks_without_dispatcher() {
        let hub = EventHub::new(HubConfig {
            subscriber_buffer: 4,
            inbound_capacity: 2,
            overflow_policy: OverflowPolicy::DropOldest,
        });

        for _ in 0..10 {
            hub.publish(deleted());
        }

        let stats = hub.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.dropped, 8);
        assert_eq!(stats.rejected, 8);
    }

    #[tokio::test]
    async fn test_unsubscribe_reclaims_subscriber() {
        let hub = hub(8, OverflowPolicy::DropOldest);
        hub.start().unwrap();

        let a = hub.subscribe();
        let b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        a.unsubscribe();
        assert_eq!(hub.subscriber_count(), 1);

        drop(b);
        assert_eq!(hub.subscriber_count(), 0);

        hub.publish(deleted());
        settle(&hub, 1).await;
        assert_eq!(hub.stats().delivered, 0);
    }

    #[tokio::test]
    async fn test_dropped_consumer_task_is_removed() {
        let hub = Arc::new(hub(8, OverflowPolicy::DropOldest));
        hub.start().unwrap();

        let mut sub = hub.subscribe();
        let consumer = tokio::spawn(async move {
            while sub.recv().await.is_some() {}
        });
        assert_eq!(hub.subscriber_count(), 1);

        consumer.abort();
        let _ = consumer.await;
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_many_subscribers_churn_does_not_leak() {
        let hub = hub(8, OverflowPolicy::DropOldest);
        hub.start().unwrap();

        for _ in 0..1000 {
            let sub = hub.subscribe();
            hub.publish(deleted());
            drop(sub);
        }
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscriptions() {
        let hub = hub(8, OverflowPolicy::DropOldest);
        let handle = hub.start().unwrap();
        let mut sub = hub.subscribe();

        hub.shutdown();
        handle.await.unwrap();

        let next = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap();
        assert!(next.is_none());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscribe_racing_shutdown_always_closes() {
        for _ in 0..50 {
            let hub = Arc::new(hub(8, OverflowPolicy::DropOldest));
            let handle = hub.start().unwrap();

            let subscribers: Vec<_> = (0..4)
                .map(|_| {
                    let hub = hub.clone();
                    tokio::spawn(async move {
                        let mut subs = Vec::new();
                        for _ in 0..25 {
                            subs.push(hub.subscribe());
                            tokio::task::yield_now().await;
                        }
                        subs
                    })
                })
                .collect();

            tokio::task::yield_now().await;
            hub.shutdown();
            handle.await.unwrap();

            for task in subscribers {
                for mut sub in task.await.unwrap() {
                    let next = tokio::time::timeout(Duration::from_secs(1), sub.recv())
                        .await
                        .expect("subscription left open after shutdown");
                    assert!(next.is_none());
                }
            }
        }
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let hub = hub(8, OverflowPolicy::DropOldest);
        hub.start().unwrap();
        assert!(matches!(hub.start(), Err(SupervisorError::InvalidState(_))));
    }
}
