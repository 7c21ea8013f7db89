// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Receipts and the idempotency cache.
//!
//! Direct mode encodes `"stream_key|msg_id"`; Gateway receipts are
//! opaque server strings. The cache remembers recent ack/result
//! outcomes so a retry after partial success returns the cached answer
//! instead of re-invoking the server.

use crate::TransportError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const RECEIPT_SEP: char = '|';

/// Encode a Direct-mode receipt.
pub fn encode_receipt(stream_key: &str, msg_id: &str) -> String {
    format!("{stream_key}{RECEIPT_SEP}{msg_id}")
}

/// Decode a Direct-mode receipt into `(stream_key, msg_id)`.
pub fn decode_receipt(receipt: &str) -> Result<(&str, &str), TransportError> {
    receipt
        .rsplit_once(RECEIPT_SEP)
        .filter(|(stream, msg)| !stream.is_empty() && !msg.is_empty())
        .ok_or_else(|| TransportError::Protocol(format!("bad receipt: {receipt:?}")))
}

/// TTL cache of idempotent operation outcomes.
///
/// Keys follow `"<op>:<task_id>"` (`result:` / `ack:`). A hit within
/// the TTL short-circuits the RPC; expired entries are swept lazily.
pub struct ReceiptCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (bool, Instant)>>,
}

impl ReceiptCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    /// Cached outcome for a key, if still fresh.
    pub fn get(&self, key: &str) -> Option<bool> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((outcome, stored)) if stored.elapsed() < self.ttl => Some(*outcome),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: impl Into<String>, outcome: bool) {
        let mut entries = self.entries.lock();
        // Opportunistic sweep keeps the map bounded without a janitor task.
        if entries.len() > 4096 {
            let ttl = self.ttl;
            entries.retain(|_, (_, stored)| stored.elapsed() < ttl);
        }
        entries.insert(key.into(), (outcome, Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Cache key for a reported result.
pub fn result_key(task_id: &str) -> String {
    format!("result:{task_id}")
}

/// Cache key for a task ack.
pub fn ack_key(task_id: &str) -> String {
    format!("ack:{task_id}")
}

#[cfg(test)]
#[path = "receipt_tests.rs"]
mod tests;
