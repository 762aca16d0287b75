//! Subscription bookkeeping for the stream server.
//!
//! Two mirrored maps under one readers-writer lock: session -> channels
//! and channel -> sessions. The broker-side subscription for a channel
//! exists iff the channel has at least one subscriber; the 0->1 and 1->0
//! edges emit commands to the dispatcher task that owns the pub/sub
//! connection.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

/// Commands to the broker pub/sub dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCommand {
    Subscribe(String),
    Unsubscribe(String),
}

#[derive(Default)]
struct Tables {
    session_subs: HashMap<String, HashSet<String>>,
    channel_subs: HashMap<String, HashSet<String>>,
}

pub struct SubscriptionManager {
    tables: RwLock<Tables>,
    control: mpsc::UnboundedSender<BrokerCommand>,
}

impl SubscriptionManager {
    pub fn new(control: mpsc::UnboundedSender<BrokerCommand>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            control,
        }
    }

    /// Subscribing twice is a no-op.
    pub fn subscribe(&self, session_id: &str, channel: &str) {
        let mut guard = self.tables.write();
        let tables = &mut *guard;

        let subs = tables
            .session_subs
            .entry(session_id.to_string())
            .or_default();
        if !subs.insert(channel.to_string()) {
            return;
        }

        let watchers = tables.channel_subs.entry(channel.to_string()).or_default();
        watchers.insert(session_id.to_string());
        if watchers.len() == 1 {
            let _ = self
                .control
                .send(BrokerCommand::Subscribe(channel.to_string()));
        }
        debug!(session_id, channel, "subscribed");
    }

    /// Unsubscribing when not subscribed is a no-op.
    pub fn unsubscribe(&self, session_id: &str, channel: &str) {
        let mut guard = self.tables.write();
        let tables = &mut *guard;

        let Some(subs) = tables.session_subs.get_mut(session_id) else {
            return;
        };
        if !subs.remove(channel) {
            return;
        }
        if subs.is_empty() {
            tables.session_subs.remove(session_id);
        }

        if let Some(watchers) = tables.channel_subs.get_mut(channel) {
            watchers.remove(session_id);
            if watchers.is_empty() {
                tables.channel_subs.remove(channel);
                let _ = self
                    .control
                    .send(BrokerCommand::Unsubscribe(channel.to_string()));
            }
        }
        debug!(session_id, channel, "unsubscribed");
    }

    /// Release everything a departed session held.
    pub fn session_left(&self, session_id: &str) {
        let channels: Vec<String> = {
            let tables = self.tables.read();
            tables
                .session_subs
                .get(session_id)
                .map(|subs| subs.iter().cloned().collect())
                .unwrap_or_default()
        };
        for channel in channels {
            self.unsubscribe(session_id, &channel);
        }
        debug!(session_id, "session subscriptions released");
    }

    pub fn subscribers(&self, channel: &str) -> Vec<String> {
        let tables = self.tables.read();
        tables
            .channel_subs
            .get(channel)
            .map(|watchers| watchers.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn subscriptions(&self, session_id: &str) -> Vec<String> {
        let tables = self.tables.read();
        tables
            .session_subs
            .get(session_id)
            .map(|subs| subs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Channels the server should hold broker-side subscriptions for.
    /// Used to rebuild state after a pub/sub reconnect.
    pub fn active_channels(&self) -> Vec<String> {
        let tables = self.tables.read();
        tables.channel_subs.keys().cloned().collect()
    }

    /// Mirror-invariant check: `c in session_subs[s]` iff
    /// `s in channel_subs[c]`.
    #[cfg(test)]
    fn is_mirrored(&self) -> bool {
        let tables = self.tables.read();
        let forward = tables.session_subs.iter().all(|(session, subs)| {
            subs.iter().all(|channel| {
                tables
                    .channel_subs
                    .get(channel)
                    .is_some_and(|watchers| watchers.contains(session))
            })
        });
        let backward = tables.channel_subs.iter().all(|(channel, watchers)| {
            watchers.iter().all(|session| {
                tables
                    .session_subs
                    .get(session)
                    .is_some_and(|subs| subs.contains(channel))
            })
        });
        forward && backward
    }
}
