//! Expiry and priority helpers for the pending proactive queue.

use crate::message::ProactiveMessage;
use chrono::{DateTime, Utc};

pub fn is_expired(message: &ProactiveMessage) -> bool {
    is_expired_at(message, Utc::now())
}

pub fn is_expired_at(message: &ProactiveMessage, now: DateTime<Utc>) -> bool {
    message.expires_at.is_some_and(|at| at <= now)
}

pub fn filter_expired(messages: Vec<ProactiveMessage>) -> Vec<ProactiveMessage> {
    filter_expired_at(messages, Utc::now())
}

pub fn filter_expired_at(
    messages: Vec<ProactiveMessage>,
    now: DateTime<Utc>,
) -> Vec<ProactiveMessage> {
    messages
        .into_iter()
        .filter(|m| !is_expired_at(m, now))
        .collect()
}

/// Stable sort, high priority first. Equal priorities keep insertion order.
pub fn sort_by_priority(mut messages: Vec<ProactiveMessage>) -> Vec<ProactiveMessage> {
    messages.sort_by_key(|m| m.priority.rank());
    messages
}

pub fn highest_priority(messages: Vec<ProactiveMessage>) -> Option<ProactiveMessage> {
    sort_by_priority(filter_expired(messages)).into_iter().next()
}
