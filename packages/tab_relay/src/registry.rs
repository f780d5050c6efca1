//! Tab Registry
//!
//! Per-account tab liveness with a fixed time-to-live. Expiry is lazy: there
//! is no sweeper task, stale entries stay in memory until the next
//! `pick_and_prune` for their account.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Default liveness window refreshed by every heartbeat.
pub const DEFAULT_TAB_TTL: Duration = Duration::from_secs(60);

/// Accepted TTL range. Larger values would overflow `Instant` arithmetic and a
/// zero TTL makes every tab dead on arrival.
pub const MIN_TAB_TTL: Duration = Duration::from_secs(1);
pub const MAX_TAB_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// tab_id -> expires_at, sorted by tab id so reads are deterministic.
type Bucket = BTreeMap<String, Instant>;

/// Live/removed partition produced by a pruning sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneOutcome {
    pub live: Vec<String>,
    pub removed: Vec<String>,
}

/// Shared registry of tab expiry timestamps, keyed by account.
///
/// A single lock guards every bucket: mutations (heartbeat, forget, prune)
/// are serialized against each other and against reads.
pub struct TabRegistry {
    /// account -> bucket. Buckets are never removed, even when empty.
    accounts: RwLock<HashMap<String, Bucket>>,
    ttl: Duration,
}

impl Default for TabRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TAB_TTL)
    }
}

impl TabRegistry {
    /// `ttl` is clamped to `MIN_TAB_TTL..=MAX_TAB_TTL`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            accounts: RwLock::new(HashMap::new()),
            ttl: ttl.clamp(MIN_TAB_TTL, MAX_TAB_TTL),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Set `expires_at = now + ttl` for every id, creating the account bucket
    /// and any missing entries.
    pub async fn heartbeat(&self, account: &str, tab_ids: &[String]) {
        let now = Instant::now();
        let expires_at = now.checked_add(self.ttl).unwrap_or(now + MIN_TAB_TTL);
        let mut accounts = self.accounts.write().await;
        let bucket = accounts.entry(account.to_string()).or_default();
        for tab_id in tab_ids {
            bucket.insert(tab_id.clone(), expires_at);
        }
        debug!(
            "[REGISTRY] {} heartbeat for {} tab(s), {} stored",
            account,
            tab_ids.len(),
            bucket.len()
        );
    }

    /// Remove the given ids from the account's bucket. Unknown ids are ignored.
    /// Returns the number of entries actually removed.
    pub async fn forget(&self, account: &str, tab_ids: &[String]) -> usize {
        let mut accounts = self.accounts.write().await;
        let Some(bucket) = accounts.get_mut(account) else {
            return 0;
        };
        tab_ids
            .iter()
            .filter(|id| bucket.remove(id.as_str()).is_some())
            .count()
    }

    /// Ids whose entry has not yet expired. Does not touch the stored bucket.
    pub async fn live_tabs(&self, account: &str) -> Vec<String> {
        let now = Instant::now();
        let accounts = self.accounts.read().await;
        accounts
            .get(account)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|(_, expires_at)| **expires_at > now)
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Partition the bucket into live and expired ids and keep only the live
    /// ones. This is the only path that frees registry memory.
    pub async fn pick_and_prune(&self, account: &str) -> PruneOutcome {
        let now = Instant::now();
        let mut accounts = self.accounts.write().await;
        let Some(bucket) = accounts.get_mut(account) else {
            return PruneOutcome::default();
        };

        let mut outcome = PruneOutcome::default();
        bucket.retain(|id, expires_at| {
            if *expires_at > now {
                outcome.live.push(id.clone());
                true
            } else {
                outcome.removed.push(id.clone());
                false
            }
        });

        if !outcome.removed.is_empty() {
            debug!(
                "[REGISTRY] {} pruned {} expired tab(s), {} live",
                account,
                outcome.removed.len(),
                outcome.live.len()
            );
        }
        outcome
    }

    /// Number of account buckets, including empty ones.
    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Number of stored entries across all accounts, stale ones included.
    pub async fn entry_count(&self) -> usize {
        self.accounts.read().await.values().map(|b| b.len()).sum()
    }

    #[cfg(test)]
    pub(crate) async fn expires_at(&self, account: &str, tab_id: &str) -> Option<Instant> {
        self.accounts
            .read()
            .await
            .get(account)
            .and_then(|bucket| bucket.get(tab_id).copied())
    }

    /// Backdate every entry of `account` so it reads as expired.
    #[cfg(test)]
    pub(crate) async fn expire_account(&self, account: &str) {
        let now = Instant::now();
        if let Some(bucket) = self.accounts.write().await.get_mut(account) {
            bucket.values_mut().for_each(|expires_at| *expires_at = now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_sets_expiry_to_now_plus_ttl() {
        let registry = TabRegistry::default();
        let before = Instant::now();
        registry.heartbeat("u1", &ids(&["t1"])).await;
        assert_eq!(
            registry.expires_at("u1", "t1").await,
            Some(before + DEFAULT_TAB_TTL)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_refreshes_existing_entry() {
        let registry = TabRegistry::default();
        registry.heartbeat("u1", &ids(&["t1"])).await;
        let first = registry.expires_at("u1", "t1").await.unwrap();

        tokio::time::advance(Duration::from_secs(30)).await;
        registry.heartbeat("u1", &ids(&["t1"])).await;

        let second = registry.expires_at("u1", "t1").await.unwrap();
        assert_eq!(second - first, Duration::from_secs(30));
        assert_eq!(registry.entry_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_tab_excluded_from_live_tabs() {
        let registry = TabRegistry::default();
        registry.heartbeat("u1", &ids(&["t1", "t2"])).await;

        tokio::time::advance(Duration::from_secs(30)).await;
        registry.heartbeat("u1", &ids(&["t2"])).await;

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(registry.live_tabs("u1").await, ids(&["t2"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tab_expires_exactly_at_ttl() {
        let registry = TabRegistry::default();
        registry.heartbeat("u1", &ids(&["t1"])).await;

        tokio::time::advance(DEFAULT_TAB_TTL).await;
        assert!(registry.live_tabs("u1").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_tabs_does_not_prune() {
        let registry = TabRegistry::default();
        registry.heartbeat("u1", &ids(&["t1"])).await;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(registry.live_tabs("u1").await.is_empty());
        // Stale entry is still stored until a mutating sweep.
        assert_eq!(registry.entry_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pick_and_prune_partitions_bucket() {
        let registry = TabRegistry::default();
        registry.heartbeat("u1", &ids(&["a", "b"])).await;
        tokio::time::advance(Duration::from_secs(40)).await;
        registry.heartbeat("u1", &ids(&["c"])).await;
        tokio::time::advance(Duration::from_secs(25)).await;

        let outcome = registry.pick_and_prune("u1").await;
        assert_eq!(outcome.live, ids(&["c"]));
        assert_eq!(outcome.removed, ids(&["a", "b"]));

        // Stored bucket now holds exactly the live partition.
        assert_eq!(registry.entry_count().await, 1);
        assert!(registry.expires_at("u1", "a").await.is_none());
        assert!(registry.expires_at("u1", "c").await.is_some());
    }

    #[tokio::test]
    async fn test_pick_and_prune_unknown_account() {
        let registry = TabRegistry::default();
        let outcome = registry.pick_and_prune("nobody").await;
        assert!(outcome.live.is_empty());
        assert!(outcome.removed.is_empty());
        assert_eq!(registry.account_count().await, 0);
    }

    #[tokio::test]
    async fn test_forget_is_idempotent() {
        let registry = TabRegistry::default();
        registry.heartbeat("u1", &ids(&["t1", "t2"])).await;

        assert_eq!(registry.forget("u1", &ids(&["t1"])).await, 1);
        assert_eq!(registry.forget("u1", &ids(&["t1"])).await, 0);
        assert_eq!(registry.live_tabs("u1").await, ids(&["t2"]));
    }

    #[tokio::test]
    async fn test_forget_unknown_account_creates_nothing() {
        let registry = TabRegistry::default();
        assert_eq!(registry.forget("u1", &ids(&["t1"])).await, 0);
        assert_eq!(registry.account_count().await, 0);
    }

    #[tokio::test]
    async fn test_accounts_are_isolated() {
        let registry = TabRegistry::default();
        registry.heartbeat("u1", &ids(&["t1"])).await;
        registry.heartbeat("u2", &ids(&["t2"])).await;

        assert_eq!(registry.live_tabs("u1").await, ids(&["t1"]));
        assert_eq!(registry.live_tabs("u2").await, ids(&["t2"]));
        registry.forget("u1", &ids(&["t2"])).await;
        assert_eq!(registry.live_tabs("u2").await, ids(&["t2"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_bucket_is_kept() {
        let registry = TabRegistry::default();
        registry.heartbeat("u1", &ids(&["t1"])).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        registry.pick_and_prune("u1").await;

        assert_eq!(registry.entry_count().await, 0);
        assert_eq!(registry.account_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_ttl() {
        let registry = TabRegistry::new(Duration::from_secs(5));
        registry.heartbeat("u1", &ids(&["t1"])).await;
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(registry.live_tabs("u1").await, ids(&["t1"]));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(registry.live_tabs("u1").await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_is_capped() {
        let registry = TabRegistry::new(Duration::from_secs(u64::MAX));
        assert_eq!(registry.ttl(), MAX_TAB_TTL);

        let now = Instant::now();
        registry.heartbeat("u1", &ids(&["t1"])).await;
        assert_eq!(
            registry.expires_at("u1", "t1").await,
            Some(now + MAX_TAB_TTL)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_is_raised_to_minimum() {
        let registry = TabRegistry::new(Duration::ZERO);
        assert_eq!(registry.ttl(), MIN_TAB_TTL);

        registry.heartbeat("u1", &ids(&["t1"])).await;
        assert_eq!(registry.live_tabs("u1").await, ids(&["t1"]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_prunes_remove_each_tab_once() {
        let tab_ids: Vec<String> = (0..50).map(|i| format!("t{i}")).collect();

        for _ in 0..200 {
            let registry = std::sync::Arc::new(TabRegistry::default());
            registry.heartbeat("u1", &tab_ids).await;
            registry.expire_account("u1").await;

            let sweeps: Vec<_> = (0..8)
                .map(|_| {
                    let registry = registry.clone();
                    tokio::spawn(async move { registry.pick_and_prune("u1").await })
                })
                .collect();

            let mut removed = Vec::new();
            for sweep in sweeps {
                let outcome = sweep.await.unwrap();
                assert!(outcome.live.is_empty());
                removed.extend(outcome.removed);
            }
            removed.sort();
            let mut expected = tab_ids.clone();
            expected.sort();
            assert_eq!(removed, expected);
            assert_eq!(registry.entry_count().await, 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_heartbeats_and_forgets_are_serialized() {
        let registry = std::sync::Arc::new(TabRegistry::default());
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let mine = vec![format!("keep-{i}"), format!("drop-{i}")];
                    registry.heartbeat("u1", &mine).await;
                    registry.forget("u1", &mine[1..]).await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), 1);
        }
        let live = registry.live_tabs("u1").await;
        assert_eq!(live.len(), 16);
        assert!(live.iter().all(|id| id.starts_with("keep-")));
    }
}
