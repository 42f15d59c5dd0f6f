//! Typed topic-addressed publish/subscribe bus.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                          MESSAGE BUS                               │
//! │                                                                    │
//! │  publishers                 processing thread        subscribers   │
//! │     │                            │                       │         │
//! │     │── publish ──► [queue] ────►│── priority order ────►│ cb(&M)  │
//! │     │── publish_after ─► [heap]──│   filter, once        │         │
//! │     │                  (due) ───►│                       │         │
//! │     │                            │                       │         │
//! │  history ring (bounded)  ◄───────┘                                 │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each bus instance is typed by its payload `M`: dispatch never inspects
//! runtime type identity, and a subscription's handler signature is fixed
//! at compile time. A bus owns one dedicated processing thread that
//! drains the queue under a wait/notify discipline (blocks when empty,
//! wakes on publish or shutdown) and invokes subscribers in descending
//! priority order. Handlers therefore never run on publisher threads.
//!
//! # Ordering
//!
//! Per topic, messages dispatch FIFO and subscribers fire in strict
//! descending priority order within one dispatch. Ordering across topics
//! or across concurrent publishes is unspecified.
//!
//! # Global channel
//!
//! The global channel is an explicit [`publish_global`] /
//! [`subscribe_global`] pair on a reserved internal topic; an empty topic
//! string has no special meaning.
//!
//! [`publish_global`]: MessageBus::publish_global
//! [`subscribe_global`]: MessageBus::subscribe_global

use crate::tracing_compat::{debug, trace, warn};
use smallvec::SmallVec;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Reserved topic backing the explicit global channel.
const GLOBAL_TOPIC: &str = "__global__";

/// Separator between a namespace and the topic it qualifies.
const NAMESPACE_SEPARATOR: char = '.';

/// Error returned when publishing fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The bus was shut down; the processing thread is gone.
    #[error("publishing on a terminated message bus")]
    Terminated,
}

/// Identifies one subscription for later removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionToken {
    topic: String,
    id: u64,
}

impl SubscriptionToken {
    /// The topic this subscription is registered under.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Subscription parameters: priority, once-flag, and an optional
/// predicate filter.
pub struct SubscribeOptions<M> {
    priority: i32,
    once: bool,
    filter: Option<Arc<dyn Fn(&M) -> bool + Send + Sync>>,
}

impl<M> Default for SubscribeOptions<M> {
    fn default() -> Self {
        Self {
            priority: 0,
            once: false,
            filter: None,
        }
    }
}

impl<M> std::fmt::Debug for SubscribeOptions<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("priority", &self.priority)
            .field("once", &self.once)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

impl<M> SubscribeOptions<M> {
    /// Default options: priority 0, fire repeatedly, no filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch priority; higher fires earlier within a publish.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Auto-unsubscribe after the first successful invocation.
    #[must_use]
    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    /// Skip messages the predicate rejects.
    #[must_use]
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(predicate));
        self
    }
}

struct Subscription<M> {
    id: u64,
    priority: i32,
    once: bool,
    filter: Option<Arc<dyn Fn(&M) -> bool + Send + Sync>>,
    handler: Arc<dyn Fn(&M) + Send + Sync>,
}

struct Envelope<M> {
    topic: String,
    message: M,
}

/// A delayed publication, ordered so the heap peeks the earliest due.
struct Delayed<M> {
    due: Instant,
    seq: u64,
    envelope: Envelope<M>,
}

impl<M> PartialEq for Delayed<M> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<M> Eq for Delayed<M> {}

impl<M> PartialOrd for Delayed<M> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for Delayed<M> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Reversed: BinaryHeap is a max-heap, we want the earliest due.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct BusState<M> {
    subscriptions: HashMap<String, SmallVec<[Subscription<M>; 4]>>,
    queue: VecDeque<Envelope<M>>,
    delayed: BinaryHeap<Delayed<M>>,
    history: VecDeque<(String, M)>,
    next_id: u64,
    next_seq: u64,
    shutdown: bool,
}

struct BusInner<M> {
    state: Mutex<BusState<M>>,
    cond: Condvar,
    history_capacity: usize,
}

/// Configuration options for a bus instance.
#[derive(Debug, Clone)]
pub struct BusOptions {
    /// Capacity of the message-history ring; oldest entries evict past
    /// it.
    pub history_capacity: usize,
    /// Name of the processing thread.
    pub thread_name: String,
}

impl Default for BusOptions {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            thread_name: "syncopate-bus".to_string(),
        }
    }
}

/// Topic-addressed publish/subscribe with priorities, filters,
/// once-subscriptions, namespaces, and delayed delivery.
///
/// Each instance owns its subscriber registry and processing thread
/// outright; independent instances can coexist (no process-wide state).
/// Dropping the bus shuts it down and joins the processing thread;
/// messages already queued are dispatched first, delayed messages not yet
/// due are discarded.
pub struct MessageBus<M> {
    inner: Arc<BusInner<M>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<M> std::fmt::Debug for MessageBus<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock().expect("bus lock poisoned");
        f.debug_struct("MessageBus")
            .field("topics", &state.subscriptions.len())
            .field("queued", &state.queue.len())
            .field("delayed", &state.delayed.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

impl<M: Clone + Send + 'static> Default for MessageBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Clone + Send + 'static> MessageBus<M> {
    /// Creates a bus and starts its processing thread.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(BusOptions::default())
    }

    /// Creates a bus with custom options.
    #[must_use]
    pub fn with_options(options: BusOptions) -> Self {
        let inner = Arc::new(BusInner {
            state: Mutex::new(BusState {
                subscriptions: HashMap::new(),
                queue: VecDeque::new(),
                delayed: BinaryHeap::new(),
                history: VecDeque::new(),
                next_id: 1,
                next_seq: 0,
                shutdown: false,
            }),
            cond: Condvar::new(),
            history_capacity: options.history_capacity,
        });

        let process_inner = Arc::clone(&inner);
        let thread = std::thread::Builder::new()
            .name(options.thread_name)
            .spawn(move || process_loop(&process_inner))
            .expect("failed to spawn bus processing thread");

        Self {
            inner,
            thread: Mutex::new(Some(thread)),
        }
    }

    /// Subscribes a handler to `topic` with default options.
    pub fn subscribe<F>(&self, topic: impl Into<String>, handler: F) -> SubscriptionToken
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.subscribe_with(topic, handler, SubscribeOptions::default())
    }

    /// Subscribes a handler with explicit options.
    pub fn subscribe_with<F>(
        &self,
        topic: impl Into<String>,
        handler: F,
        options: SubscribeOptions<M>,
    ) -> SubscriptionToken
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let mut state = self.inner.state.lock().expect("bus lock poisoned");
        let id = state.next_id;
        state.next_id += 1;

        let subscription = Subscription {
            id,
            priority: options.priority,
            once: options.once,
            filter: options.filter,
            handler: Arc::new(handler),
        };

        let subscribers = state.subscriptions.entry(topic.clone()).or_default();
        // Keep the list in descending priority order; equal priorities
        // keep insertion order.
        let position = subscribers
            .iter()
            .position(|existing| existing.priority < subscription.priority)
            .unwrap_or(subscribers.len());
        subscribers.insert(position, subscription);

        trace!(topic = %topic, id, "subscriber added");
        SubscriptionToken { topic, id }
    }

    /// Subscribes to the explicit global channel.
    pub fn subscribe_global<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        self.subscribe(GLOBAL_TOPIC, handler)
    }

    /// Publishes a message to `topic`.
    ///
    /// The message is recorded in the history ring and dispatched by the
    /// processing thread in descending subscriber-priority order.
    ///
    /// # Errors
    ///
    /// [`PublishError::Terminated`] after shutdown.
    pub fn publish(&self, topic: impl Into<String>, message: M) -> Result<(), PublishError> {
        let topic = topic.into();
        {
            let mut state = self.inner.state.lock().expect("bus lock poisoned");
            if state.shutdown {
                return Err(PublishError::Terminated);
            }
            self.record_history(&mut state, &topic, &message);
            state.queue.push_back(Envelope { topic, message });
        }
        self.inner.cond.notify_all();
        Ok(())
    }

    /// Publishes to `topic` after `delay` elapses.
    ///
    /// # Errors
    ///
    /// [`PublishError::Terminated`] after shutdown.
    pub fn publish_after(
        &self,
        topic: impl Into<String>,
        message: M,
        delay: Duration,
    ) -> Result<(), PublishError> {
        let topic = topic.into();
        {
            let mut state = self.inner.state.lock().expect("bus lock poisoned");
            if state.shutdown {
                return Err(PublishError::Terminated);
            }
            self.record_history(&mut state, &topic, &message);
            let seq = state.next_seq;
            state.next_seq += 1;
            state.delayed.push(Delayed {
                due: Instant::now() + delay,
                seq,
                envelope: Envelope { topic, message },
            });
        }
        self.inner.cond.notify_all();
        Ok(())
    }

    /// Publishes under a namespace: the effective topic is
    /// `"{namespace}.{topic}"`.
    ///
    /// # Errors
    ///
    /// [`PublishError::Terminated`] after shutdown.
    pub fn publish_scoped(
        &self,
        namespace: &str,
        topic: &str,
        message: M,
    ) -> Result<(), PublishError> {
        self.publish(format!("{namespace}{NAMESPACE_SEPARATOR}{topic}"), message)
    }

    /// Publishes on the explicit global channel.
    ///
    /// # Errors
    ///
    /// [`PublishError::Terminated`] after shutdown.
    pub fn publish_global(&self, message: M) -> Result<(), PublishError> {
        self.publish(GLOBAL_TOPIC, message)
    }

    /// Removes the subscription identified by `token`.
    ///
    /// Returns true if it was still registered. A dispatch already in
    /// flight on the processing thread may deliver one final message.
    pub fn unsubscribe(&self, token: &SubscriptionToken) -> bool {
        let mut state = self.inner.state.lock().expect("bus lock poisoned");
        let Some(subscribers) = state.subscriptions.get_mut(&token.topic) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|subscription| subscription.id != token.id);
        let removed = subscribers.len() < before;
        if subscribers.is_empty() {
            state.subscriptions.remove(&token.topic);
        }
        removed
    }

    /// Removes every subscription for `topic`, returning how many.
    pub fn unsubscribe_all(&self, topic: &str) -> usize {
        let mut state = self.inner.state.lock().expect("bus lock poisoned");
        state
            .subscriptions
            .remove(topic)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Number of subscriptions registered for `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let state = self.inner.state.lock().expect("bus lock poisoned");
        state
            .subscriptions
            .get(topic)
            .map_or(0, SmallVec::len)
    }

    /// Returns true if `topic` has at least one subscription.
    #[must_use]
    pub fn has_subscriber(&self, topic: &str) -> bool {
        self.subscriber_count(topic) > 0
    }

    /// Distinct namespaces with live subscriptions, sorted.
    ///
    /// A namespace is the part of a subscribed topic before the first
    /// `.`; unqualified topics and the global channel are not listed.
    #[must_use]
    pub fn active_namespaces(&self) -> Vec<String> {
        let state = self.inner.state.lock().expect("bus lock poisoned");
        let mut namespaces: Vec<String> = state
            .subscriptions
            .keys()
            .filter(|topic| topic.as_str() != GLOBAL_TOPIC)
            .filter_map(|topic| {
                topic
                    .split_once(NAMESPACE_SEPARATOR)
                    .map(|(namespace, _)| namespace.to_string())
            })
            .collect();
        namespaces.sort_unstable();
        namespaces.dedup();
        namespaces
    }

    /// Messages recorded for `topic`, oldest first.
    ///
    /// The ring is bounded by [`BusOptions::history_capacity`]; entries
    /// past it are evicted oldest-first.
    #[must_use]
    pub fn history(&self, topic: &str) -> Vec<M> {
        let state = self.inner.state.lock().expect("bus lock poisoned");
        state
            .history
            .iter()
            .filter(|(recorded_topic, _)| recorded_topic == topic)
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Number of messages not yet dispatched (queued plus delayed).
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        let state = self.inner.state.lock().expect("bus lock poisoned");
        state.queue.len() + state.delayed.len()
    }

    /// Shuts the bus down and joins the processing thread.
    ///
    /// Queued messages are dispatched before the thread exits; delayed
    /// messages not yet due are discarded. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.inner.state.lock().expect("bus lock poisoned");
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.inner.cond.notify_all();
        debug!("message bus shutting down");

        let handle = self
            .thread
            .lock()
            .expect("bus thread handle lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn record_history(&self, state: &mut BusState<M>, topic: &str, message: &M) {
        if self.inner.history_capacity == 0 {
            return;
        }
        if state.history.len() == self.inner.history_capacity {
            state.history.pop_front();
        }
        state.history.push_back((topic.to_string(), message.clone()));
    }
}

impl<M> Drop for MessageBus<M> {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock().expect("bus lock poisoned");
            state.shutdown = true;
        }
        self.inner.cond.notify_all();
        let handle = self
            .thread
            .lock()
            .expect("bus thread handle lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

/// Snapshot of one subscriber taken under the lock, dispatched outside
/// it.
struct DispatchEntry<M> {
    id: u64,
    once: bool,
    filter: Option<Arc<dyn Fn(&M) -> bool + Send + Sync>>,
    handler: Arc<dyn Fn(&M) + Send + Sync>,
}

/// The processing-thread loop: drain the queue, promote due delayed
/// messages, park when idle.
fn process_loop<M: Clone + Send + 'static>(inner: &BusInner<M>) {
    loop {
        let work = {
            let mut state = inner.state.lock().expect("bus lock poisoned");
            loop {
                let now = Instant::now();
                while state
                    .delayed
                    .peek()
                    .is_some_and(|delayed| delayed.due <= now)
                {
                    let delayed = state.delayed.pop().expect("peeked entry exists");
                    state.queue.push_back(delayed.envelope);
                }

                if let Some(envelope) = state.queue.pop_front() {
                    let snapshot: Vec<DispatchEntry<M>> = state
                        .subscriptions
                        .get(&envelope.topic)
                        .map(|subscribers| {
                            subscribers
                                .iter()
                                .map(|subscription| DispatchEntry {
                                    id: subscription.id,
                                    once: subscription.once,
                                    filter: subscription.filter.clone(),
                                    handler: Arc::clone(&subscription.handler),
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    break Some((envelope, snapshot));
                }

                if state.shutdown {
                    break None;
                }

                match state.delayed.peek().map(|delayed| delayed.due) {
                    Some(due) => {
                        let timeout = due.saturating_duration_since(Instant::now());
                        let (guard, _) = inner
                            .cond
                            .wait_timeout(state, timeout)
                            .expect("bus lock poisoned");
                        state = guard;
                    }
                    None => {
                        state = inner.cond.wait(state).expect("bus lock poisoned");
                    }
                }
            }
        };

        let Some((envelope, snapshot)) = work else {
            break;
        };
        dispatch(inner, &envelope, snapshot);
    }
}

/// Invokes subscribers in descending priority order, honoring filters and
/// once-semantics.
fn dispatch<M: Clone + Send + 'static>(
    inner: &BusInner<M>,
    envelope: &Envelope<M>,
    snapshot: Vec<DispatchEntry<M>>,
) {
    let mut fired_once: SmallVec<[u64; 4]> = SmallVec::new();

    for entry in &snapshot {
        if let Some(filter) = &entry.filter {
            if !filter(&envelope.message) {
                continue;
            }
        }
        if catch_unwind(AssertUnwindSafe(|| (entry.handler)(&envelope.message))).is_err() {
            warn!(topic = %envelope.topic, "subscriber panicked during dispatch");
        }
        if entry.once {
            fired_once.push(entry.id);
        }
    }

    if !fired_once.is_empty() {
        let mut state = inner.state.lock().expect("bus lock poisoned");
        if let Some(subscribers) = state.subscriptions.get_mut(&envelope.topic) {
            subscribers.retain(|subscription| !fired_once.contains(&subscription.id));
            if subscribers.is_empty() {
                state.subscriptions.remove(&envelope.topic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    /// Publishes a probe message and waits until it is dispatched, which
    /// proves everything published before it was dispatched too
    /// (FIFO per queue).
    fn drain(bus: &MessageBus<i32>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let token = bus.subscribe_with(
            "__drain__",
            move |_| {
                let _ = tx.lock().expect("probe sender lock poisoned").send(());
            },
            SubscribeOptions::new().once(),
        );
        bus.publish("__drain__", 0).expect("bus alive");
        rx.recv_timeout(Duration::from_secs(5))
            .expect("drain probe not dispatched");
        let _ = token;
    }

    #[test]
    fn publish_reaches_all_subscribers() {
        let bus = MessageBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let hits_clone = Arc::clone(&hits);
            bus.subscribe("t", move |message: &i32| {
                assert_eq!(*message, 42);
                hits_clone.fetch_add(1, Ordering::Relaxed);
            });
        }

        bus.publish("t", 42).expect("bus alive");
        drain(&bus);
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn subscribers_fire_in_descending_priority_order() {
        let bus = MessageBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let order_low = Arc::clone(&order);
        bus.subscribe_with(
            "t",
            move |_: &i32| order_low.lock().expect("order lock").push(0),
            SubscribeOptions::new().priority(0),
        );
        let order_high = Arc::clone(&order);
        bus.subscribe_with(
            "t",
            move |_: &i32| order_high.lock().expect("order lock").push(2),
            SubscribeOptions::new().priority(2),
        );

        bus.publish("t", 1).expect("bus alive");
        drain(&bus);

        assert_eq!(*order.lock().expect("order lock"), vec![2, 0]);
    }

    #[test]
    fn once_subscription_fires_exactly_once() {
        let bus = MessageBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        bus.subscribe_with(
            "t",
            move |_: &i32| {
                hits_clone.fetch_add(1, Ordering::Relaxed);
            },
            SubscribeOptions::new().once(),
        );

        bus.publish("t", 1).expect("bus alive");
        bus.publish("t", 2).expect("bus alive");
        drain(&bus);

        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert!(!bus.has_subscriber("t"));
    }

    #[test]
    fn filter_skips_rejected_messages() {
        let bus = MessageBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        bus.subscribe_with(
            "t",
            move |message: &i32| {
                assert!(message % 2 == 0);
                hits_clone.fetch_add(1, Ordering::Relaxed);
            },
            SubscribeOptions::new().filter(|message: &i32| message % 2 == 0),
        );

        for value in 0..6 {
            bus.publish("t", value).expect("bus alive");
        }
        drain(&bus);

        assert_eq!(hits.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn once_with_rejecting_filter_stays_subscribed() {
        let bus = MessageBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        bus.subscribe_with(
            "t",
            move |_: &i32| {
                hits_clone.fetch_add(1, Ordering::Relaxed);
            },
            SubscribeOptions::new()
                .once()
                .filter(|message: &i32| *message > 0),
        );

        bus.publish("t", -1).expect("bus alive");
        drain(&bus);
        assert_eq!(hits.load(Ordering::Relaxed), 0);
        assert!(bus.has_subscriber("t"));

        bus.publish("t", 1).expect("bus alive");
        drain(&bus);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert!(!bus.has_subscriber("t"));
    }

    #[test]
    fn global_channel_is_separate_from_topics() {
        let bus = MessageBus::new();
        let global_hits = Arc::new(AtomicUsize::new(0));
        let topic_hits = Arc::new(AtomicUsize::new(0));

        let global_clone = Arc::clone(&global_hits);
        bus.subscribe_global(move |_: &i32| {
            global_clone.fetch_add(1, Ordering::Relaxed);
        });
        let topic_clone = Arc::clone(&topic_hits);
        bus.subscribe("t", move |_: &i32| {
            topic_clone.fetch_add(1, Ordering::Relaxed);
        });

        bus.publish_global(1).expect("bus alive");
        bus.publish("t", 2).expect("bus alive");
        drain(&bus);

        assert_eq!(global_hits.load(Ordering::Relaxed), 1);
        assert_eq!(topic_hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn scoped_publish_qualifies_the_topic() {
        let bus = MessageBus::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        bus.subscribe("devices.connected", move |message: &i32| {
            let _ = tx.lock().expect("sender lock").send(*message);
        });

        bus.publish_scoped("devices", "connected", 7).expect("bus alive");
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(7));
    }

    #[test]
    fn active_namespaces_lists_qualified_topics() {
        let bus: MessageBus<i32> = MessageBus::new();
        bus.subscribe("devices.connected", |_| {});
        bus.subscribe("devices.removed", |_| {});
        bus.subscribe("solver.progress", |_| {});
        bus.subscribe("bare", |_| {});
        bus.subscribe_global(|_| {});

        assert_eq!(bus.active_namespaces(), vec!["devices", "solver"]);
    }

    #[test]
    fn unsubscribe_removes_one_token() {
        let bus: MessageBus<i32> = MessageBus::new();
        let token = bus.subscribe("t", |_| {});
        bus.subscribe("t", |_| {});

        assert_eq!(bus.subscriber_count("t"), 2);
        assert!(bus.unsubscribe(&token));
        assert!(!bus.unsubscribe(&token));
        assert_eq!(bus.subscriber_count("t"), 1);
    }

    #[test]
    fn unsubscribe_all_clears_the_topic() {
        let bus: MessageBus<i32> = MessageBus::new();
        bus.subscribe("t", |_| {});
        bus.subscribe("t", |_| {});

        assert_eq!(bus.unsubscribe_all("t"), 2);
        assert!(!bus.has_subscriber("t"));
        assert_eq!(bus.unsubscribe_all("t"), 0);
    }

    #[test]
    fn history_ring_evicts_oldest() {
        let bus = MessageBus::with_options(BusOptions {
            history_capacity: 3,
            ..BusOptions::default()
        });

        for value in 0..5 {
            bus.publish("t", value).expect("bus alive");
        }
        drain(&bus);

        // Capacity 3, and the drain probe displaced one more entry.
        let recorded = bus.history("t");
        assert_eq!(recorded, vec![3, 4]);
    }

    #[test]
    fn delayed_publish_arrives_after_the_delay() {
        let bus = MessageBus::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        bus.subscribe("t", move |message: &i32| {
            let _ = tx.lock().expect("sender lock").send(*message);
        });

        let start = Instant::now();
        bus.publish_after("t", 9, Duration::from_millis(50))
            .expect("bus alive");

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(9));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn delayed_messages_do_not_block_immediate_ones() {
        let bus = MessageBus::new();
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);

        bus.subscribe("t", move |message: &i32| {
            let _ = tx.lock().expect("sender lock").send(*message);
        });

        bus.publish_after("t", 2, Duration::from_millis(80))
            .expect("bus alive");
        bus.publish("t", 1).expect("bus alive");

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(1));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(2));
    }

    #[test]
    fn panicking_subscriber_does_not_kill_the_bus() {
        let bus = MessageBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe_with(
            "t",
            |_: &i32| panic!("bad subscriber"),
            SubscribeOptions::new().priority(1),
        );
        let hits_clone = Arc::clone(&hits);
        bus.subscribe("t", move |_: &i32| {
            hits_clone.fetch_add(1, Ordering::Relaxed);
        });

        bus.publish("t", 1).expect("bus alive");
        drain(&bus);
        assert_eq!(hits.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn publish_after_shutdown_is_rejected() {
        let bus: MessageBus<i32> = MessageBus::new();
        bus.shutdown();

        assert_eq!(bus.publish("t", 1), Err(PublishError::Terminated));
        assert_eq!(
            bus.publish_after("t", 1, Duration::from_millis(10)),
            Err(PublishError::Terminated)
        );
    }

    #[test]
    fn shutdown_dispatches_already_queued_messages() {
        let bus = MessageBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_clone = Arc::clone(&hits);
        bus.subscribe("t", move |_: &i32| {
            hits_clone.fetch_add(1, Ordering::Relaxed);
        });

        for value in 0..10 {
            bus.publish("t", value).expect("bus alive");
        }
        bus.shutdown();

        assert_eq!(hits.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn queue_depth_counts_undispatched_messages() {
        let bus: MessageBus<i32> = MessageBus::new();
        bus.publish_after("t", 1, Duration::from_secs(60))
            .expect("bus alive");
        assert_eq!(bus.queue_depth(), 1);
    }
}
