use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

/// Attempts are counted per (client identity, endpoint) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    pub identity: String,
    pub endpoint: String,
}

impl AttemptKey {
    pub fn new(identity: &str, endpoint: &str) -> Self {
        Self {
            identity: identity.to_string(),
            endpoint: endpoint.to_string(),
        }
    }
}

/// Ordered attempt timestamps for one key plus the instant the record expires.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    timestamps: VecDeque<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
}

impl AttemptRecord {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            timestamps: VecDeque::new(),
            expires_at: now,
        }
    }

    pub fn timestamps(&self) -> &VecDeque<DateTime<Utc>> {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Keep only timestamps inside `[cutoff, now]`. Anything stamped after
    /// `now` is dropped, so a later `push(now, ..)` keeps the log ordered.
    pub fn prune(&mut self, cutoff: DateTime<Utc>, now: DateTime<Utc>) {
        self.timestamps.retain(|t| *t >= cutoff && *t <= now);
    }

    /// Append an attempt, keeping at most `cap` of the newest timestamps.
    pub fn push(&mut self, at: DateTime<Utc>, cap: usize) {
        self.timestamps.push_back(at);
        while self.timestamps.len() > cap.max(1) {
            self.timestamps.pop_front();
        }
    }

    /// Restart the record's lifetime at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>, ttl: Duration) {
        self.expires_at = expiry(now, ttl);
    }
}

/// Shared, expiring store of attempt records.
///
/// Backed by [`DashMap`]; [`update`](AttemptStore::update) runs its closure
/// while holding the entry's shard lock, so a read-decide-write sequence on
/// one key is never interleaved with another on the same key.
#[derive(Debug, Default)]
pub struct AttemptStore {
    records: DashMap<AttemptKey, AttemptRecord>,
}

impl AttemptStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Stored timestamps for `key`, or an empty list if absent or expired.
    pub fn get(&self, key: &AttemptKey, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        match self.records.get(key) {
            Some(record) if !record.is_expired(now) => record.timestamps.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// Replace the timestamps for `key`, expiring `ttl` after `now`.
    pub fn put(&self, key: AttemptKey, mut timestamps: Vec<DateTime<Utc>>, ttl: Duration, now: DateTime<Utc>) {
        timestamps.sort_unstable();
        self.records.insert(
            key,
            AttemptRecord {
                timestamps: timestamps.into(),
                expires_at: expiry(now, ttl),
            },
        );
    }

    /// Run `f` against the record for `key` as one atomic step.
    ///
    /// A missing or expired record is presented to `f` as empty. If `f`
    /// leaves a fresh record empty it is not kept.
    pub fn update<R>(
        &self,
        key: &AttemptKey,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut AttemptRecord) -> R,
    ) -> R {
        let mut entry = self
            .records
            .entry(key.clone())
            .or_insert_with(|| AttemptRecord::empty(now));

        if entry.is_expired(now) {
            entry.timestamps.clear();
        }

        let result = f(entry.value_mut());
        let discard = entry.is_empty() && entry.is_expired(now);
        drop(entry);

        if discard {
            self.records.remove_if(key, |_, record| {
                record.is_empty() && record.is_expired(now)
            });
        }

        result
    }

    /// Evict all records whose expiration has passed. Returns how many were removed.
    pub fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_key, record| !record.is_expired(now));
        let removed = before.saturating_sub(self.records.len());

        tracing::debug!(
            removed,
            remaining = self.records.len(),
            "attempt store cleanup complete"
        );
        removed
    }

    /// Number of keys currently held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
