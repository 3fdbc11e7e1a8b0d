use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::event::SubscriptionId;
use crate::message::{Action, Message, Topic};
use crate::outbox::Outbox;

type PresenceFn = Arc<dyn Fn(&str, bool) + Send + Sync>;
type QueryFn = Box<dyn FnOnce(&[String]) + Send>;

#[derive(Default)]
struct PresenceState {
    subscribers: Vec<SubscriptionId>,
    callbacks: HashMap<SubscriptionId, PresenceFn>,
    querents: Vec<QueryFn>,
}

/// Login and logout notifications for other clients
#[derive(Clone)]
pub struct Presence {
    outbox: Outbox,
    ids: Arc<AtomicU64>,
    inner: Arc<Mutex<PresenceState>>,
}

impl Presence {
    pub(crate) fn new(outbox: Outbox, ids: Arc<AtomicU64>) -> Self {
        Self {
            outbox,
            ids,
            inner: Arc::new(Mutex::new(PresenceState::default())),
        }
    }

    /// Call `callback(user, joined)` whenever a user logs in or out.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&str, bool) + Send + Sync + 'static,
    {
        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        let first = {
            let mut state = self.inner.lock();
            state.callbacks.insert(id, Arc::new(callback));
            state.subscribers.push(id);
            state.subscribers.len() == 1
        };

        if first {
            self.outbox.send(Message::new(Topic::Presence, Action::Subscribe));
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let now_empty = {
            let mut state = self.inner.lock();
            let Some(position) = state.subscribers.iter().position(|s| *s == id) else {
                warn!("No presence subscription {}", id);
                return;
            };
            state.subscribers.remove(position);
            state.callbacks.remove(&id);
            state.subscribers.is_empty()
        };

        if now_empty {
            self.outbox
                .send(Message::new(Topic::Presence, Action::Unsubscribe));
        }
    }

    pub fn unsubscribe_all(&self) {
        {
            let mut state = self.inner.lock();
            state.subscribers.clear();
            state.callbacks.clear();
        }
        self.outbox
            .send(Message::new(Topic::Presence, Action::Unsubscribe));
    }

    /// Ask the server for every logged-in user. Concurrent requests share
    /// one query.
    pub fn get_all<F>(&self, callback: F)
    where
        F: FnOnce(&[String]) + Send + 'static,
    {
        let first = {
            let mut state = self.inner.lock();
            state.querents.push(Box::new(callback));
            state.querents.len() == 1
        };

        if first {
            self.send_query();
        }
    }

    fn send_query(&self) {
        self.outbox
            .send(Message::new(Topic::Presence, Action::Query).with_argument("Q"));
    }

    /// Handle a message with topic `U` from the server.
    pub(crate) fn notify(&self, message: &Message) {
        match (message.action(), message.is_ack()) {
            (Action::Subscribe | Action::Unsubscribe, true) => {
                debug!("Acknowledged: {}", message);
            }
            (Action::Query, false) => {
                let users: Vec<String> = message
                    .arguments()
                    .iter()
                    .map(|u| String::from_utf8_lossy(u).into_owned())
                    .collect();
                let querents = std::mem::take(&mut self.inner.lock().querents);
                for querent in querents {
                    querent(&users);
                }
            }
            (Action::PresenceJoin | Action::PresenceLeave, false) => {
                let Some(user) = message.argument(0) else {
                    warn!("Malformed presence message: {}", message);
                    return;
                };
                let user = String::from_utf8_lossy(user);
                let joined = message.action() == Action::PresenceJoin;

                let callbacks: Vec<PresenceFn> = {
                    let state = self.inner.lock();
                    state
                        .subscribers
                        .iter()
                        .filter_map(|id| state.callbacks.get(id).cloned())
                        .collect()
                };
                for callback in callbacks {
                    callback(&user, joined);
                }
            }
            _ => warn!("Unexpected presence message: {}", message),
        }
    }

    /// Re-subscribe and re-send a pending query after (re)connecting.
    pub(crate) fn on_connected(&self) {
        let (subscribed, querying) = {
            let state = self.inner.lock();
            (!state.subscribers.is_empty(), !state.querents.is_empty())
        };
        if subscribed {
            self.outbox.send(Message::new(Topic::Presence, Action::Subscribe));
        }
        if querying {
            self.send_query();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::testing::TestOutbox;
    use crate::state::ConnectionState;

    fn presence(outbox: &TestOutbox) -> Presence {
        Presence::new(outbox.outbox.clone(), Arc::new(AtomicU64::new(0)))
    }

    fn incoming(text: &str) -> Message {
        let (mut messages, errors) =
            crate::parser::parse(&crate::message::from_human_readable(text));
        assert!(errors.is_empty(), "{errors:?}");
        messages.remove(0)
    }

    #[test]
    fn subscribe_and_unsubscribe_round_trip() {
        let mut outbox = TestOutbox::connected();
        let presence = presence(&outbox);

        let a = presence.subscribe(|_, _| {});
        let b = presence.subscribe(|_, _| {});
        assert_eq!(outbox.drain(), vec!["U|S+"]);

        presence.unsubscribe(a);
        presence.unsubscribe(a);
        assert!(outbox.drain().is_empty());

        presence.unsubscribe(b);
        assert_eq!(outbox.drain(), vec!["U|US+"]);
    }

    #[test]
    fn joins_and_leaves_reach_subscribers() {
        let outbox = TestOutbox::connected();
        let presence = presence(&outbox);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        presence.subscribe(move |user, joined| sink.lock().push((user.to_string(), joined)));
        presence.notify(&incoming("U|A|S+"));
        presence.notify(&incoming("U|PNJ|alice+"));
        presence.notify(&incoming("U|PNL|bob+"));

        assert_eq!(
            *seen.lock(),
            vec![("alice".to_string(), true), ("bob".to_string(), false)]
        );
    }

    #[test]
    fn unsubscribe_all_clears_callbacks() {
        let mut outbox = TestOutbox::connected();
        let presence = presence(&outbox);
        let seen = Arc::new(Mutex::new(0));

        let sink = Arc::clone(&seen);
        presence.subscribe(move |_, _| *sink.lock() += 1);
        presence.unsubscribe_all();
        presence.notify(&incoming("U|PNJ|alice+"));

        assert_eq!(*seen.lock(), 0);
        assert_eq!(outbox.drain(), vec!["U|S+", "U|US+"]);
    }

    #[test]
    fn queries_share_one_request() {
        let mut outbox = TestOutbox::connected();
        let presence = presence(&outbox);
        let results = Arc::new(Mutex::new(Vec::new()));

        for _ in 0..2 {
            let sink = Arc::clone(&results);
            presence.get_all(move |users| sink.lock().push(users.to_vec()));
        }
        assert_eq!(outbox.drain(), vec!["U|Q|Q+"]);

        presence.notify(&incoming("U|Q|alice|bob+"));
        let expected = vec!["alice".to_string(), "bob".to_string()];
        assert_eq!(*results.lock(), vec![expected.clone(), expected]);

        presence.get_all(|_| {});
        assert_eq!(outbox.drain(), vec!["U|Q|Q+"]);
    }

    #[test]
    fn reconnect_replays_subscription_and_query() {
        let mut outbox = TestOutbox::new(ConnectionState::AwaitConnection);
        let presence = presence(&outbox);

        presence.subscribe(|_, _| {});
        presence.get_all(|_| {});
        assert!(outbox.drain().is_empty());

        outbox.state.send_replace(ConnectionState::Connected);
        presence.on_connected();
        assert_eq!(outbox.drain(), vec!["U|S+", "U|Q|Q+"]);
    }
}
