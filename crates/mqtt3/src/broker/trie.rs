//! Trie of topic levels holding both subscriptions and retained messages.
//!
//! Each node is one `/`-separated level. Subscription filters descend the
//! trie creating nodes; a concrete topic is matched by walking literal
//! children plus the `+` and `#` wildcard children. Retained messages live
//! at the node of their exact topic, so the same structure answers "which
//! retained messages does this new filter see".
//!
//! Topics whose first level starts with `$` are only reachable through
//! filters that also start with that literal level.

use crate::packet::PublishPacket;
use crate::QoS;
use std::collections::HashMap;

/// One subscription entry at a trie node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub client_id: String,
    pub qos: QoS,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<String, TrieNode>,
    subscribers: Vec<Subscriber>,
    retained: Option<PublishPacket>,
}

impl TrieNode {
    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.subscribers.is_empty() && self.retained.is_none()
    }
}

#[derive(Debug, Default)]
pub struct TopicTrie {
    root: TrieNode,
}

impl TopicTrie {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a subscription; a repeated (client, filter) pair only updates
    /// the granted `QoS`. Returns true when the subscription is new.
    pub fn subscribe(&mut self, filter: &str, client_id: &str, qos: QoS) -> bool {
        let mut node = &mut self.root;
        for level in filter.split('/') {
            node = node.children.entry(level.to_string()).or_default();
        }
        if let Some(existing) = node
            .subscribers
            .iter_mut()
            .find(|s| s.client_id == client_id)
        {
            existing.qos = qos;
            false
        } else {
            node.subscribers.push(Subscriber {
                client_id: client_id.to_string(),
                qos,
            });
            true
        }
    }

    /// Removes a subscription, pruning nodes left empty on the way back up.
    /// Idempotent; returns whether anything was removed.
    pub fn unsubscribe(&mut self, filter: &str, client_id: &str) -> bool {
        let levels: Vec<&str> = filter.split('/').collect();
        Self::unsubscribe_at(&mut self.root, &levels, client_id)
    }

    fn unsubscribe_at(node: &mut TrieNode, levels: &[&str], client_id: &str) -> bool {
        let Some((level, rest)) = levels.split_first() else {
            let before = node.subscribers.len();
            node.subscribers.retain(|s| s.client_id != client_id);
            return before != node.subscribers.len();
        };
        let Some(child) = node.children.get_mut(*level) else {
            return false;
        };
        let removed = Self::unsubscribe_at(child, rest, client_id);
        if child.is_empty() {
            node.children.remove(*level);
        }
        removed
    }

    /// Drops every subscription a client holds (clean-session teardown).
    pub fn remove_client(&mut self, client_id: &str) {
        Self::remove_client_at(&mut self.root, client_id);
    }

    fn remove_client_at(node: &mut TrieNode, client_id: &str) {
        node.subscribers.retain(|s| s.client_id != client_id);
        node.children.retain(|_, child| {
            Self::remove_client_at(child, client_id);
            !child.is_empty()
        });
    }

    /// Subscribers whose filter matches the concrete topic, one entry per
    /// matching filter. Callers dedup per client when delivering.
    #[must_use]
    pub fn matches(&self, topic: &str) -> Vec<Subscriber> {
        let levels: Vec<&str> = topic.split('/').collect();
        let mut out = Vec::new();
        Self::collect_subscribers(&self.root, &levels, topic.starts_with('$'), &mut out);
        out
    }

    fn collect_subscribers(
        node: &TrieNode,
        levels: &[&str],
        skip_wildcards: bool,
        out: &mut Vec<Subscriber>,
    ) {
        let Some((level, rest)) = levels.split_first() else {
            out.extend_from_slice(&node.subscribers);
            // "a/b" also matches "a/b/#": the hash child stands for an
            // empty suffix.
            if let Some(hash) = node.children.get("#") {
                out.extend_from_slice(&hash.subscribers);
            }
            return;
        };
        if let Some(child) = node.children.get(*level) {
            Self::collect_subscribers(child, rest, false, out);
        }
        if !skip_wildcards {
            if let Some(plus) = node.children.get("+") {
                Self::collect_subscribers(plus, rest, false, out);
            }
            if let Some(hash) = node.children.get("#") {
                out.extend_from_slice(&hash.subscribers);
            }
        }
    }

    /// Stores or clears the retained message at an exact topic.
    pub fn set_retained(&mut self, topic: &str, message: Option<PublishPacket>) {
        let levels: Vec<&str> = topic.split('/').collect();
        match message {
            Some(message) => {
                let mut node = &mut self.root;
                for level in &levels {
                    node = node.children.entry((*level).to_string()).or_default();
                }
                node.retained = Some(message);
            }
            None => Self::clear_retained_at(&mut self.root, &levels),
        }
    }

    fn clear_retained_at(node: &mut TrieNode, levels: &[&str]) {
        let Some((level, rest)) = levels.split_first() else {
            node.retained = None;
            return;
        };
        if let Some(child) = node.children.get_mut(*level) {
            Self::clear_retained_at(child, rest);
            if child.is_empty() {
                node.children.remove(*level);
            }
        }
    }

    /// Retained messages visible to a new subscription with this filter.
    #[must_use]
    pub fn retained_matching(&self, filter: &str) -> Vec<PublishPacket> {
        let levels: Vec<&str> = filter.split('/').collect();
        let mut out = Vec::new();
        Self::collect_retained(&self.root, &levels, true, &mut out);
        out
    }

    fn collect_retained(
        node: &TrieNode,
        levels: &[&str],
        at_root: bool,
        out: &mut Vec<PublishPacket>,
    ) {
        let Some((level, rest)) = levels.split_first() else {
            if let Some(message) = &node.retained {
                out.push(message.clone());
            }
            return;
        };
        match *level {
            "#" => Self::collect_retained_subtree(node, at_root, out),
            "+" => {
                for (key, child) in &node.children {
                    if at_root && key.starts_with('$') {
                        continue;
                    }
                    Self::collect_retained(child, rest, false, out);
                }
            }
            literal => {
                if let Some(child) = node.children.get(literal) {
                    Self::collect_retained(child, rest, false, out);
                }
            }
        }
    }

    fn collect_retained_subtree(node: &TrieNode, skip_dollar: bool, out: &mut Vec<PublishPacket>) {
        if let Some(message) = &node.retained {
            out.push(message.clone());
        }
        for (key, child) in &node.children {
            if skip_dollar && key.starts_with('$') {
                continue;
            }
            Self::collect_retained_subtree(child, false, out);
        }
    }
}
