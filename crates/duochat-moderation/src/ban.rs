//! The ban store.
//!
//! One record per user. A new ban replaces the old one outright with
//! `start = now`: repeated offenses reset the clock, they do not stack.

use std::collections::HashMap;
use std::time::Duration;

use duochat_protocol::UserId;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// An active (or not yet evicted) ban.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanRecord {
    pub user_id: UserId,
    pub start: Instant,
    pub duration: Duration,
}

impl BanRecord {
    /// Time left on the ban at `now`, zero once expired.
    pub fn remaining_at(&self, now: Instant) -> Duration {
        (self.start + self.duration).saturating_duration_since(now)
    }

    /// `now < start + duration`.
    pub fn is_active_at(&self, now: Instant) -> bool {
        !self.remaining_at(now).is_zero()
    }
}

/// Point-in-time answer to "is this user banned?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BanStatus {
    pub banned: bool,
    /// Whole seconds left, rounded up, so `banned` iff this is non-zero.
    pub remaining_secs: u64,
}

/// Shared ban state. Many concurrent lookups, one write per ban event.
#[derive(Debug, Default)]
pub struct BanStore {
    records: RwLock<HashMap<UserId, BanRecord>>,
}

impl BanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bans `user_id` for `duration` starting now, replacing any previous
    /// record.
    pub async fn ban(&self, user_id: UserId, duration: Duration) {
        let record = BanRecord {
            user_id,
            start: Instant::now(),
            duration,
        };
        let previous = self.records.write().await.insert(user_id, record);
        tracing::info!(
            %user_id,
            secs = duration.as_secs(),
            replaced = previous.is_some(),
            "user banned"
        );
    }

    /// Removes any ban on `user_id`. Returns `true` if one existed.
    pub async fn lift(&self, user_id: UserId) -> bool {
        self.records.write().await.remove(&user_id).is_some()
    }

    /// Ban status of `user_id` as of now.
    pub async fn is_banned(&self, user_id: UserId) -> BanStatus {
        let now = Instant::now();
        let records = self.records.read().await;
        match records.get(&user_id) {
            Some(record) if record.is_active_at(now) => BanStatus {
                banned: true,
                remaining_secs: ceil_secs(record.remaining_at(now)),
            },
            _ => BanStatus::default(),
        }
    }

    /// Returns the record for `user_id`, expired or not.
    pub async fn record(&self, user_id: UserId) -> Option<BanRecord> {
        self.records.read().await.get(&user_id).copied()
    }

    /// Evicts expired records. Returns how many were dropped.
    ///
    /// Purely housekeeping: [`is_banned`](Self::is_banned) is correct
    /// whether or not this ever runs.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.is_active_at(now));
        before - records.len()
    }

    /// Number of stored records, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
