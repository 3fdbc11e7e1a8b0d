use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{DeepstreamError, Result};
use crate::message::{Action, Message, Topic};
use crate::outbox::Outbox;
use crate::typed;

/// Identifies one subscription callback
pub type SubscriptionId = u64;

type SubscribeFn = Arc<dyn Fn(&[u8]) + Send + Sync>;
type ListenFn = Arc<dyn Fn(&str, bool) -> bool + Send + Sync>;

#[derive(Default)]
struct EventState {
    subscribers: BTreeMap<String, Vec<SubscriptionId>>,
    callbacks: HashMap<SubscriptionId, SubscribeFn>,
    listeners: BTreeMap<String, ListenFn>,
    send_queue: VecDeque<Message>,
}

/// Publish/subscribe API for deepstream events
///
/// Clones share the same subscriptions, so a clone can be moved into a
/// callback that emits or unsubscribes.
#[derive(Clone)]
pub struct Event {
    outbox: Outbox,
    ids: Arc<AtomicU64>,
    inner: Arc<Mutex<EventState>>,
}

impl Event {
    pub(crate) fn new(outbox: Outbox, ids: Arc<AtomicU64>) -> Self {
        Self {
            outbox,
            ids,
            inner: Arc::new(Mutex::new(EventState::default())),
        }
    }

    /// Emit an event to the server and to local subscribers of `name`.
    /// While disconnected the event is queued until the next connection.
    /// Data must be UTF-8, since frames travel as WebSocket text.
    pub fn emit(&self, name: &str, data: impl Into<Vec<u8>>) -> Result<()> {
        if name.is_empty() {
            return Err(DeepstreamError::EmptyName("event"));
        }
        let data = data.into();
        if let Err(e) = std::str::from_utf8(&data) {
            return Err(DeepstreamError::InvalidPayload(format!(
                "event data is not UTF-8: {}",
                e
            )));
        }

        let message = Message::new(Topic::Event, Action::Event)
            .with_argument(name)
            .with_argument(data.clone());

        if !self.outbox.send(message.clone()) {
            debug!("Queueing event {} until connected", name);
            self.inner.lock().send_queue.push_back(message);
        }

        self.notify_subscribers(name, &data);
        Ok(())
    }

    /// Emit a serializable value with deepstream's type prefix.
    pub fn emit_typed<T: Serialize + ?Sized>(&self, name: &str, data: &T) -> Result<()> {
        self.emit(name, typed::encode(data)?)
    }

    /// Register `callback` for events called `name`.
    pub fn subscribe<F>(&self, name: &str, callback: F) -> Result<SubscriptionId>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        if name.is_empty() {
            return Err(DeepstreamError::EmptyName("event subscription"));
        }

        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        let first = {
            let mut state = self.inner.lock();
            state.callbacks.insert(id, Arc::new(callback));
            let subscribers = state.subscribers.entry(name.to_string()).or_default();
            subscribers.push(id);
            subscribers.len() == 1
        };

        if first {
            self.outbox
                .send(Message::new(Topic::Event, Action::Subscribe).with_argument(name));
        }

        Ok(id)
    }

    /// Remove every callback for `name`.
    pub fn unsubscribe(&self, name: &str) {
        let removed = {
            let mut state = self.inner.lock();
            match state.subscribers.remove(name) {
                Some(ids) => {
                    for id in ids {
                        state.callbacks.remove(&id);
                    }
                    true
                }
                None => false,
            }
        };

        if !removed {
            warn!("Not subscribed to event {}", name);
            return;
        }

        self.outbox
            .send(Message::new(Topic::Event, Action::Unsubscribe).with_argument(name));
    }

    /// Remove a single callback; the last one unsubscribes from the server.
    pub fn unsubscribe_id(&self, name: &str, id: SubscriptionId) {
        let now_empty = {
            let mut state = self.inner.lock();
            let Some(subscribers) = state.subscribers.get_mut(name) else {
                warn!("Not subscribed to event {}", name);
                return;
            };
            let Some(position) = subscribers.iter().position(|s| *s == id) else {
                warn!("No subscription {} for event {}", id, name);
                return;
            };
            subscribers.remove(position);
            let now_empty = subscribers.is_empty();
            state.callbacks.remove(&id);
            now_empty
        };

        if now_empty {
            self.unsubscribe(name);
        }
    }

    /// Listen for subscriptions matching `pattern`.
    ///
    /// The callback receives the matched name and whether a subscriber
    /// appeared (`true`) or went away (`false`). For appearances its return
    /// value accepts or rejects providing the event.
    pub fn listen<F>(&self, pattern: &str, callback: F) -> Result<()>
    where
        F: Fn(&str, bool) -> bool + Send + Sync + 'static,
    {
        if pattern.is_empty() {
            return Err(DeepstreamError::EmptyName("listen pattern"));
        }

        {
            let mut state = self.inner.lock();
            if state.listeners.contains_key(pattern) {
                warn!("Already listening to pattern {}", pattern);
                return Ok(());
            }
            state.listeners.insert(pattern.to_string(), Arc::new(callback));
        }

        self.outbox
            .send(Message::new(Topic::Event, Action::Listen).with_argument(pattern));
        Ok(())
    }

    /// Stop listening for `pattern`.
    pub fn unlisten(&self, pattern: &str) {
        if self.inner.lock().listeners.remove(pattern).is_none() {
            warn!("Not listening to pattern {}", pattern);
            return;
        }

        self.outbox
            .send(Message::new(Topic::Event, Action::Unlisten).with_argument(pattern));
    }

    /// Names with at least one subscriber
    pub fn subscriptions(&self) -> Vec<String> {
        self.inner.lock().subscribers.keys().cloned().collect()
    }

    /// Handle a message with topic `E` from the server.
    pub(crate) fn notify(&self, message: &Message) {
        match (message.action(), message.is_ack()) {
            (Action::Event, false) => {
                let (Some(name), Some(data)) = (message.argument(0), message.argument(1)) else {
                    warn!("Malformed event message: {}", message);
                    return;
                };
                let name = String::from_utf8_lossy(name);
                self.notify_subscribers(&name, data);
            }
            (Action::SubscriptionForPatternFound, false)
            | (Action::SubscriptionForPatternRemoved, false) => self.notify_listeners(message),
            (
                Action::Subscribe | Action::Unsubscribe | Action::Listen | Action::Unlisten,
                true,
            ) => {
                debug!("Acknowledged: {}", message);
            }
            _ => warn!("Unexpected event message: {}", message),
        }
    }

    fn notify_subscribers(&self, name: &str, data: &[u8]) {
        // callbacks may (un)subscribe while they run, so call a snapshot
        let callbacks: Vec<SubscribeFn> = {
            let state = self.inner.lock();
            let Some(ids) = state.subscribers.get(name) else {
                debug!("No subscriber for event {}", name);
                return;
            };
            ids.iter()
                .filter_map(|id| state.callbacks.get(id).cloned())
                .collect()
        };

        for callback in callbacks {
            callback(data);
        }
    }

    fn notify_listeners(&self, message: &Message) {
        let (Some(pattern), Some(matched)) = (message.argument(0), message.argument(1)) else {
            warn!("Malformed listen message: {}", message);
            return;
        };
        let pattern = String::from_utf8_lossy(pattern).into_owned();
        let matched = String::from_utf8_lossy(matched).into_owned();
        let is_subscribed = message.action() == Action::SubscriptionForPatternFound;

        let Some(callback) = self.inner.lock().listeners.get(&pattern).cloned() else {
            warn!("{}: no listener for pattern {}", message.header(), pattern);
            return;
        };

        let accept = callback(&matched, is_subscribed);

        if !is_subscribed {
            return;
        }

        let action = if accept {
            Action::ListenAccept
        } else {
            Action::ListenReject
        };
        self.outbox.send(
            Message::new(Topic::Event, action)
                .with_argument(pattern)
                .with_argument(matched),
        );
    }

    /// Replay subscriptions and listens, then flush queued emits.
    pub(crate) fn on_connected(&self) {
        let (names, patterns) = {
            let state = self.inner.lock();
            let names: Vec<String> = state.subscribers.keys().cloned().collect();
            let patterns: Vec<String> = state.listeners.keys().cloned().collect();
            (names, patterns)
        };

        for name in names {
            if !self
                .outbox
                .send(Message::new(Topic::Event, Action::Subscribe).with_argument(name))
            {
                return;
            }
        }
        for pattern in patterns {
            if !self
                .outbox
                .send(Message::new(Topic::Event, Action::Listen).with_argument(pattern))
            {
                return;
            }
        }

        loop {
            let Some(message) = self.inner.lock().send_queue.pop_front() else {
                break;
            };
            if !self.outbox.send(message.clone()) {
                self.inner.lock().send_queue.push_front(message);
                break;
            }
        }
    }
}
