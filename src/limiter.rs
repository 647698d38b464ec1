// SPDX-License-Identifier: MIT

//! Per-client request counter table.
//!
//! Tracks a request count and a window timestamp per client identifier
//! behind a single table-wide mutex. Counts decay by one `limit`-sized
//! decrement once a client has been idle longer than the quota interval,
//! and idle records are evicted by a periodic sweep so the table stays
//! bounded even though the key space (client addresses) is not.

use crate::config::RateLimitConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::debug;

/// Outcome of recording one request against a client's quota.
#[derive(Debug, Clone, Copy)]
pub struct RateCheck {
    /// The client's count after this request was recorded
    pub count: u32,
    /// Whether the count now exceeds the configured limit
    pub exceeded: bool,
}

#[derive(Debug)]
struct ClientRecord {
    count: u32,
    /// Start of the client's current quota window. Updated on creation and
    /// on decay, not on every request.
    last_seen: Instant,
}

/// Thread-safe per-client counter table.
pub struct ClientTable {
    limit: u32,
    interval: Duration,
    entries: Mutex<HashMap<String, ClientRecord>>,
}

impl ClientTable {
    /// Create a table enforcing `config.limit` requests per `config.interval`.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limit: config.limit,
            interval: config.interval(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record one request for `client_id` and check it against the quota.
    ///
    /// `wildcard_accept` marks a request whose `Accept` header was exactly
    /// `*/*`; such requests cost a second increment.
    pub async fn record_and_check(&self, client_id: &str, wildcard_accept: bool) -> RateCheck {
        self.record_and_check_at(client_id, wildcard_accept, Instant::now())
            .await
    }

    /// Add a full `limit` to a client's count.
    ///
    /// Applied when a request is denied by a blocklist rule, so the client's
    /// next requests hit the quota check without re-evaluating the rules.
    /// Decay still recovers the client after enough idle time.
    pub async fn penalize(&self, client_id: &str) {
        self.penalize_at(client_id, Instant::now()).await;
    }

    /// Remove every record idle longer than the quota interval.
    pub async fn sweep(&self) {
        self.sweep_at(Instant::now()).await;
    }

    /// Number of tracked clients.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Run the eviction sweep every `every` until `shutdown` flips to true.
    pub fn spawn_sweep(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick fires immediately; skip it so the sweep runs on the
            // intended schedule.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let before = self.len().await;
                        self.sweep().await;
                        let after = self.len().await;
                        debug!(evicted = before.saturating_sub(after), tracked = after, "Eviction sweep complete");
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Eviction sweep task stopping");
                            return;
                        }
                    }
                }
            }
        })
    }

    async fn record_and_check_at(
        &self,
        client_id: &str,
        wildcard_accept: bool,
        now: Instant,
    ) -> RateCheck {
        let mut entries = self.entries.lock().await;
        let record = entries
            .entry(client_id.to_string())
            .and_modify(|r| {
                if now.duration_since(r.last_seen) > self.interval {
                    // One limit-sized decrement per arrival, no matter how
                    // many intervals actually elapsed.
                    r.count = r.count.saturating_sub(self.limit);
                    r.last_seen = now;
                }
            })
            .or_insert(ClientRecord {
                count: 0,
                last_seen: now,
            });

        record.count = record.count.saturating_add(1);
        if wildcard_accept {
            record.count = record.count.saturating_add(1);
        }

        RateCheck {
            count: record.count,
            exceeded: record.count > self.limit,
        }
    }

    async fn penalize_at(&self, client_id: &str, now: Instant) {
        let mut entries = self.entries.lock().await;
        entries
            .entry(client_id.to_string())
            .and_modify(|r| r.count = r.count.saturating_add(self.limit))
            .or_insert(ClientRecord {
                count: self.limit,
                last_seen: now,
            });
    }

    async fn sweep_at(&self, now: Instant) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, record| now.duration_since(record.last_seen) <= self.interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(limit: u32, interval_secs: u64) -> ClientTable {
        ClientTable::new(&RateLimitConfig {
            limit,
            interval_secs,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let table = table(5, 60);

        for i in 1..=5 {
            let check = table.record_and_check("10.0.0.1", false).await;
            assert_eq!(check.count, i);
            assert!(!check.exceeded, "request {i} should be within quota");
        }

        let check = table.record_and_check("10.0.0.1", false).await;
        assert_eq!(check.count, 6);
        assert!(check.exceeded);
    }

    #[tokio::test]
    async fn clients_are_counted_independently() {
        let table = table(2, 60);

        table.record_and_check("10.0.0.1", false).await;
        table.record_and_check("10.0.0.1", false).await;
        let exceeded = table.record_and_check("10.0.0.1", false).await;
        assert!(exceeded.exceeded);

        let other = table.record_and_check("10.0.0.2", false).await;
        assert_eq!(other.count, 1);
        assert!(!other.exceeded);
    }

    #[tokio::test]
    async fn wildcard_accept_costs_two() {
        let table = table(3, 60);

        let check = table.record_and_check("10.0.0.1", true).await;
        assert_eq!(check.count, 2);

        let check = table.record_and_check("10.0.0.1", true).await;
        assert_eq!(check.count, 4);
        assert!(check.exceeded);
    }

    #[tokio::test]
    async fn idle_gap_decays_by_one_limit_then_increments() {
        let table = table(60, 60);
        let start = Instant::now();

        // Drive the count to 80 with a path penalty on top of 20 requests.
        for _ in 0..20 {
            table.record_and_check_at("10.0.0.1", false, start).await;
        }
        table.penalize_at("10.0.0.1", start).await;

        let idle = start + Duration::from_secs(61);
        let check = table.record_and_check_at("10.0.0.1", false, idle).await;
        // 80 decayed to 20, then incremented to 21.
        assert_eq!(check.count, 21);
        assert!(!check.exceeded);
    }

    #[tokio::test]
    async fn long_idle_gap_still_decays_only_once() {
        let table = table(10, 60);
        let start = Instant::now();

        for _ in 0..35 {
            table.record_and_check_at("10.0.0.1", false, start).await;
        }

        // Ten intervals of idleness recover a single limit, not ten.
        let idle = start + Duration::from_secs(600);
        let check = table.record_and_check_at("10.0.0.1", false, idle).await;
        assert_eq!(check.count, 26);
        assert!(check.exceeded);
    }

    #[tokio::test]
    async fn decay_floors_at_zero() {
        let table = table(60, 60);
        let start = Instant::now();

        for _ in 0..3 {
            table.record_and_check_at("10.0.0.1", false, start).await;
        }

        let idle = start + Duration::from_secs(120);
        let check = table.record_and_check_at("10.0.0.1", false, idle).await;
        assert_eq!(check.count, 1);
    }

    #[tokio::test]
    async fn gap_at_exactly_interval_does_not_decay() {
        let table = table(10, 60);
        let start = Instant::now();

        for _ in 0..5 {
            table.record_and_check_at("10.0.0.1", false, start).await;
        }

        let boundary = start + Duration::from_secs(60);
        let check = table.record_and_check_at("10.0.0.1", false, boundary).await;
        assert_eq!(check.count, 6);
    }

    #[tokio::test]
    async fn penalize_adds_full_limit() {
        let table = table(60, 60);

        let check = table.record_and_check("10.0.0.1", false).await;
        assert_eq!(check.count, 1);

        table.penalize("10.0.0.1").await;

        let check = table.record_and_check("10.0.0.1", false).await;
        assert_eq!(check.count, 62);
        assert!(check.exceeded);
    }

    #[tokio::test]
    async fn sweep_evicts_idle_records_and_resets_count() {
        let table = table(10, 60);
        let start = Instant::now();

        for _ in 0..15 {
            table.record_and_check_at("10.0.0.1", false, start).await;
        }
        table.record_and_check_at("10.0.0.2", false, start).await;
        assert_eq!(table.len().await, 2);

        let later = start + Duration::from_secs(61);
        table.sweep_at(later).await;
        assert_eq!(table.len().await, 0);

        // A fresh request starts from scratch, not from a decayed count.
        let check = table.record_and_check_at("10.0.0.1", false, later).await;
        assert_eq!(check.count, 1);
    }

    #[tokio::test]
    async fn sweep_keeps_recently_seen_records() {
        let table = table(10, 60);
        let start = Instant::now();

        table.record_and_check_at("10.0.0.1", false, start).await;
        table.sweep_at(start + Duration::from_secs(30)).await;
        assert_eq!(table.len().await, 1);
    }
}
