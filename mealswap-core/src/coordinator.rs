//! Synchronization coordinator.
//!
//! Owns the active store and the in-memory collections callers observe.
//! Writes go to the store first; collections are only rebuilt after the
//! store has accepted the change set, so a failed write leaves them exactly
//! as they were.

use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

use crate::error::ExchangeError;
use crate::locks::KeyedLocks;
use crate::models::{Meal, MealStatus, MealSwap, Prediction, User};
use crate::store::{self, ChangeSet, Filter, HttpStore, LocalCache, Record, Store, StoreError};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Read-check-commit cycles tried before a conflict reaches the caller.
pub const MAX_COMMIT_ATTEMPTS: usize = 3;

/// Runs `attempt` until it succeeds, fails with anything but
/// [`ExchangeError::Conflict`], or has run [`MAX_COMMIT_ATTEMPTS`] times.
///
/// Each attempt must re-read the records it builds its change set from.
pub(crate) async fn retry_conflicts<T, F, Fut>(
    operation: &'static str,
    mut attempt: F,
) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(ExchangeError::Conflict(reason)) if tries < MAX_COMMIT_ATTEMPTS => {
                tracing::debug!(operation, attempt = tries, %reason, "Change set rejected, re-reading");
                tries += 1;
            }
            result => return result,
        }
    }
}

/// Which store backs the process. Fixed for the lifetime of a coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMode {
    /// Authoritative remote store.
    Remote { server_url: String, api_key: String },
    /// Remote store disabled; everything lives in the local cache.
    Local { data_dir: PathBuf },
}

impl StoreMode {
    /// Builds the store strategy for this mode.
    pub fn build(&self) -> Arc<dyn Store> {
        match self {
            StoreMode::Remote {
                server_url,
                api_key,
            } => Arc::new(HttpStore::new(server_url.clone(), api_key.clone())),
            StoreMode::Local { data_dir } => Arc::new(LocalCache::new(data_dir.clone())),
        }
    }
}

/// Snapshot of everything the coordinator exposes to callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Collections {
    pub current_user: Option<User>,
    pub available: Vec<Meal>,
    pub offered: Vec<Meal>,
    /// Meals claimed by the current user.
    pub claimed: Vec<Meal>,
    /// Swaps the current user took part in.
    pub swaps: Vec<MealSwap>,
    /// Active users ordered by rank; unranked users last.
    pub leaderboard: Vec<User>,
    pub predictions: Vec<Prediction>,
    /// Set when a write succeeded but the follow-up refresh did not.
    pub stale: bool,
}

impl Collections {
    fn build(
        user_id: Option<Uuid>,
        meals: Vec<Meal>,
        swaps: Vec<MealSwap>,
        users: Vec<User>,
        predictions: Vec<Prediction>,
    ) -> Self {
        let current_user = user_id.and_then(|id| users.iter().find(|u| u.id == id).cloned());

        let available = meals
            .iter()
            .filter(|m| m.status == MealStatus::Available)
            .cloned()
            .collect();
        let offered = meals
            .iter()
            .filter(|m| m.status == MealStatus::Offered)
            .cloned()
            .collect();
        let claimed = match user_id {
            Some(id) => meals
                .iter()
                .filter(|m| m.claimed_by == Some(id))
                .cloned()
                .collect(),
            None => Vec::new(),
        };

        let mut leaderboard: Vec<User> = users.into_iter().filter(|u| u.is_active).collect();
        leaderboard.sort_by_key(|u| u.leaderboard_rank.unwrap_or(u32::MAX));

        Self {
            current_user,
            available,
            offered,
            claimed,
            swaps,
            leaderboard,
            predictions,
            stale: false,
        }
    }
}

/// Counts in-flight store calls; cleared on drop so cancelled calls never
/// leave the flag set.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn start(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct SyncCoordinator {
    store: Arc<dyn Store>,
    timeout: Duration,
    collections: RwLock<Collections>,
    /// Generations handed out to refreshes, in start order.
    generations: AtomicU64,
    /// Generation of the installed collections. Only read or written while
    /// holding the `collections` write lock.
    installed: AtomicU64,
    loading: AtomicUsize,
    locks: KeyedLocks,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            timeout: DEFAULT_STORE_TIMEOUT,
            collections: RwLock::new(Collections::default()),
            generations: AtomicU64::new(0),
            installed: AtomicU64::new(0),
            loading: AtomicUsize::new(0),
            locks: KeyedLocks::new(),
        }
    }

    pub fn from_mode(mode: &StoreMode) -> Self {
        Self::new(mode.build())
    }

    /// Bounds every store call. Expiry surfaces as `StoreUnavailable`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    /// Locks shared by everything that rewrites records through this
    /// coordinator.
    pub fn locks(&self) -> &KeyedLocks {
        &self.locks
    }

    /// True while a store call is in flight.
    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst) > 0
    }

    /// Returns a copy of the current collections.
    pub fn snapshot(&self) -> Collections {
        self.collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Drops all collections, e.g. after sign-out. Refreshes already in
    /// flight are discarded.
    pub fn clear(&self) {
        let generation = self.next_generation();
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        *collections = Collections::default();
        self.installed.store(generation, Ordering::SeqCst);
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, ExchangeError> {
        let _loading = LoadingGuard::start(&self.loading);
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(store = self.store.name(), operation, error = %e, "Store call failed");
                Err(e.into())
            }
            Err(_) => {
                tracing::warn!(store = self.store.name(), operation, timeout = ?self.timeout, "Store call timed out");
                Err(ExchangeError::StoreUnavailable(format!(
                    "{} timed out after {:?}",
                    operation, self.timeout
                )))
            }
        }
    }

    /// Fetches typed records from the active store.
    pub async fn fetch<R: Record>(&self, filter: &Filter) -> Result<Vec<R>, ExchangeError> {
        self.bounded("fetch", store::fetch::<R>(self.store.as_ref(), filter))
            .await
    }

    /// Fetches one record by id.
    pub async fn find<R: Record>(&self, id: Uuid) -> Result<Option<R>, ExchangeError> {
        self.bounded("find", store::find::<R>(self.store.as_ref(), id))
            .await
    }

    /// Writes `changes` to the active store, then refreshes the collections
    /// for `acting_user`.
    ///
    /// On failure nothing in memory changes. A failed refresh after a
    /// successful write keeps the old collections and marks them stale.
    pub async fn commit(
        &self,
        changes: ChangeSet,
        acting_user: Option<Uuid>,
    ) -> Result<(), ExchangeError> {
        if changes.is_empty() {
            return Ok(());
        }

        self.bounded("commit", self.store.commit(&changes)).await?;
        tracing::debug!(store = self.store.name(), records = changes.len(), "Committed change set");

        if let Err(e) = self.refresh(acting_user).await {
            tracing::warn!(error = %e, "Write succeeded but refresh failed; collections are stale");
            self.collections
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .stale = true;
        }
        Ok(())
    }

    /// Re-queries the active store and replaces the collections.
    ///
    /// A refresh that finishes after a later-started one has installed its
    /// result is dropped, so the collections never move backwards.
    pub async fn refresh(&self, user_id: Option<Uuid>) -> Result<(), ExchangeError> {
        let generation = self.next_generation();
        let all = Filter::all();
        let swaps = async {
            match user_id {
                Some(id) => self.fetch::<MealSwap>(&Filter::by_user(id)).await,
                None => Ok(Vec::new()),
            }
        };

        let (meals, swaps, users, predictions) = futures::try_join!(
            self.fetch::<Meal>(&all),
            swaps,
            self.fetch::<User>(&all),
            self.fetch::<Prediction>(&all),
        )?;

        let fresh = Collections::build(user_id, meals, swaps, users, predictions);
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        if generation < self.installed.load(Ordering::SeqCst) {
            tracing::debug!(generation, "Discarding refresh superseded by a newer one");
            return Ok(());
        }
        *collections = fresh;
        self.installed.store(generation, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("store", &self.store.name())
            .field("timeout", &self.timeout)
            .field("locked_ids", &self.locks.tracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MealType, Role};
    use crate::store::{Entity, EntityKind, InMemoryStore};
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn meal(name: &str) -> Meal {
        Meal::new(name, MealType::Lunch, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
    }

    /// Store that never answers.
    struct HangingStore;

    #[async_trait]
    impl Store for HangingStore {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn fetch_all(&self, _: EntityKind, _: &Filter) -> Result<Vec<Entity>, StoreError> {
            futures::future::pending().await
        }

        async fn commit(&self, _: &ChangeSet) -> Result<(), StoreError> {
            futures::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_refresh_partitions_meals() {
        let alice = User::new("Alice", "alice@example.edu", Role::Student);
        let available = meal("Soup");
        let mut offered = meal("Stew");
        offered.status = MealStatus::Offered;
        offered.offered_by = Some(Uuid::new_v4());
        let mut mine = meal("Salad");
        mine.status = MealStatus::Claimed;
        mine.offered_by = Some(Uuid::new_v4());
        mine.claimed_by = Some(alice.id);

        let store = InMemoryStore::seeded([
            Entity::User(alice.clone()),
            Entity::Meal(available.clone()),
            Entity::Meal(offered.clone()),
            Entity::Meal(mine.clone()),
        ]);
        let coordinator = SyncCoordinator::new(Arc::new(store));

        coordinator.refresh(Some(alice.id)).await.unwrap();
        let snapshot = coordinator.snapshot();

        assert_eq!(snapshot.current_user, Some(alice));
        assert_eq!(snapshot.available, vec![available]);
        assert_eq!(snapshot.offered, vec![offered]);
        assert_eq!(snapshot.claimed, vec![mine]);
        assert!(!snapshot.stale);
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_rank_and_hides_inactive() {
        let mut first = User::new("First", "first@example.edu", Role::Student);
        first.leaderboard_rank = Some(1);
        let unranked = User::new("New", "new@example.edu", Role::Student);
        let mut second = User::new("Second", "second@example.edu", Role::Student);
        second.leaderboard_rank = Some(2);
        let mut gone = User::new("Gone", "gone@example.edu", Role::Student);
        gone.is_active = false;

        let store = InMemoryStore::seeded(
            [unranked.clone(), second.clone(), gone, first.clone()]
                .into_iter()
                .map(Entity::User),
        );
        let coordinator = SyncCoordinator::new(Arc::new(store));
        coordinator.refresh(None).await.unwrap();

        let names: Vec<String> = coordinator
            .snapshot()
            .leaderboard
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["First", "Second", "New"]);
    }

    #[tokio::test]
    async fn test_commit_refreshes_collections() {
        let coordinator = SyncCoordinator::new(Arc::new(InMemoryStore::new()));
        let soup = meal("Soup");

        coordinator
            .commit(ChangeSet::new().with(soup.clone()), None)
            .await
            .unwrap();

        assert_eq!(coordinator.snapshot().available, vec![soup]);
        assert!(!coordinator.is_loading());
    }

    #[tokio::test]
    async fn test_hanging_store_times_out_as_unavailable() {
        let coordinator = SyncCoordinator::new(Arc::new(HangingStore))
            .with_timeout(Duration::from_millis(50));

        let err = coordinator
            .commit(ChangeSet::new().with(meal("Soup")), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ExchangeError::StoreUnavailable(msg) if msg.contains("timed out")));
        assert_eq!(coordinator.snapshot(), Collections::default());
        assert!(!coordinator.is_loading());
    }

    /// Answers the first meal read after `delay_meals` is set 100ms late,
    /// with the records as they were when the read started.
    #[derive(Default)]
    struct DelayedReadStore {
        inner: InMemoryStore,
        delay_meals: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Store for DelayedReadStore {
        fn name(&self) -> &'static str {
            "delayed"
        }

        async fn fetch_all(
            &self,
            kind: EntityKind,
            filter: &Filter,
        ) -> Result<Vec<Entity>, StoreError> {
            let records = self.inner.fetch_all(kind, filter).await?;
            if kind == EntityKind::Meals && self.delay_meals.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Ok(records)
        }

        async fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError> {
            self.inner.commit(changes).await
        }
    }

    #[tokio::test]
    async fn test_slow_refresh_does_not_replace_newer_collections() {
        let store = Arc::new(DelayedReadStore::default());
        let coordinator = Arc::new(SyncCoordinator::new(store.clone()));
        let first = meal("First");
        let second = meal("Second");

        store.delay_meals.store(true, Ordering::SeqCst);
        let slow = {
            let coordinator = coordinator.clone();
            let first = first.clone();
            tokio::spawn(async move { coordinator.commit(ChangeSet::new().with(first), None).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        coordinator
            .commit(ChangeSet::new().with(second.clone()), None)
            .await
            .unwrap();
        slow.await.unwrap().unwrap();

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.available, vec![first, second]);
        assert!(!snapshot.stale);
    }

    #[tokio::test]
    async fn test_clear_discards_refresh_in_flight() {
        let store = Arc::new(DelayedReadStore::default());
        store.inner.upsert(Entity::Meal(meal("Soup"))).await.unwrap();
        let coordinator = Arc::new(SyncCoordinator::new(store.clone()));

        store.delay_meals.store(true, Ordering::SeqCst);
        let refresh = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refresh(None).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.clear();
        refresh.await.unwrap().unwrap();

        assert_eq!(coordinator.snapshot(), Collections::default());
    }

    #[tokio::test]
    async fn test_retry_conflicts_gives_up_after_max_attempts() {
        let counter = AtomicUsize::new(0);
        let attempts = &counter;
        let result: Result<(), _> = retry_conflicts("test", || async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(ExchangeError::Conflict("meals changed".to_string()))
        })
        .await;

        assert!(matches!(result, Err(ExchangeError::Conflict(_))));
        assert_eq!(counter.load(Ordering::SeqCst), MAX_COMMIT_ATTEMPTS);
    }

    #[test]
    fn test_debug_reports_store_and_locks() {
        let coordinator = SyncCoordinator::new(Arc::new(InMemoryStore::new()));
        let debug = format!("{:?}", coordinator);
        assert!(debug.contains("memory"));
        assert!(debug.contains("locked_ids: 0"));
    }

    #[test]
    fn test_store_mode_builds_matching_store() {
        let local = StoreMode::Local {
            data_dir: PathBuf::from("/tmp/mealswap-test"),
        };
        assert_eq!(local.build().name(), "local");

        let remote = StoreMode::Remote {
            server_url: "http://localhost:8080".to_string(),
            api_key: "key".to_string(),
        };
        assert_eq!(remote.build().name(), "remote");
    }
}
