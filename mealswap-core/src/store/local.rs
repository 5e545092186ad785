//! File-backed local cache.
//!
//! Each entity kind is stored as a single JSON document holding the whole
//! collection:
//! ```text
//! <DATA_DIR>/
//!   users.json
//!   meals.json
//!   swaps.json
//!   predictions.json
//! ```
//!
//! Reads never fail: a missing document is an empty collection and an
//! unreadable one is logged and treated as empty. Writes replace the full
//! document through a temp file and rename.
//!
//! A commit runs as a spawned task holding the write lock. Every touched
//! document is encoded and written to its temp file before the first rename,
//! and once the task has started, cancelling the caller does not stop it
//! part-way through the renames.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

use super::entity::upsert_into;
use super::{ChangeSet, Entity, EntityKind, Filter, Store, StoreError};

/// Clones share the write lock.
#[derive(Debug, Clone)]
pub struct LocalCache {
    data_dir: PathBuf,
    /// Serializes read-modify-write cycles on the documents.
    write_lock: Arc<Mutex<()>>,
}

impl LocalCache {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the full path of a collection's document.
    pub fn path(&self, kind: EntityKind) -> PathBuf {
        self.data_dir.join(kind.filename())
    }

    pub fn exists(&self, kind: EntityKind) -> bool {
        self.path(kind).exists()
    }

    /// Loads a collection.
    ///
    /// Returns `Ok(None)` if the document doesn't exist.
    pub async fn load(&self, kind: EntityKind) -> Result<Option<Vec<Entity>>, StoreError> {
        let path = self.path(kind);

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::Io(path, e)),
        };

        let values: Vec<serde_json::Value> = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Decode(path.display().to_string(), e.to_string()))?;

        values
            .into_iter()
            .map(|value| Entity::from_record_json(kind, value))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
            .map_err(|e| StoreError::Decode(path.display().to_string(), e.to_string()))
    }

    /// Loads a collection, substituting an empty one for anything unreadable.
    pub async fn read_collection(&self, kind: EntityKind) -> Vec<Entity> {
        match self.load(kind).await {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(collection = %kind, error = %e, "Local cache unreadable, using empty collection");
                Vec::new()
            }
        }
    }

    /// Overwrites a collection's document.
    ///
    /// Creates the data directory if it doesn't exist.
    pub async fn save(&self, kind: EntityKind, records: &[Entity]) -> Result<(), StoreError> {
        let temp_path = self.stage(kind, records).await?;
        self.publish(kind, &temp_path).await
    }

    /// Encodes `records` and writes them next to the collection's document.
    async fn stage(&self, kind: EntityKind, records: &[Entity]) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| StoreError::Io(self.data_dir.clone(), e))?;

        let values = records
            .iter()
            .map(Entity::to_record_json)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Encode(kind.to_string(), e.to_string()))?;
        let bytes = serde_json::to_vec_pretty(&values)
            .map_err(|e| StoreError::Encode(kind.to_string(), e.to_string()))?;

        let temp_path = self.path(kind).with_extension("json.tmp");
        fs::write(&temp_path, bytes)
            .await
            .map_err(|e| StoreError::Io(temp_path.clone(), e))?;
        Ok(temp_path)
    }

    /// Replaces the collection's document with a staged temp file.
    async fn publish(&self, kind: EntityKind, temp_path: &Path) -> Result<(), StoreError> {
        let path = self.path(kind);
        fs::rename(temp_path, &path)
            .await
            .map_err(|e| StoreError::Io(path, e))
    }

    /// Checks preconditions and rewrites every document `changes` writes to.
    /// Callers hold the write lock.
    async fn apply(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        // Load every touched document before writing any of them, so a
        // corrupt document aborts the commit instead of being overwritten.
        let mut documents = Vec::new();
        for kind in changes.kinds() {
            let records = self.load(kind).await?.unwrap_or_default();
            documents.push((kind, records));
        }

        changes.check_preconditions(|kind| {
            documents
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, records)| records.as_slice())
                .unwrap_or_default()
        })?;

        let mut staged = Vec::new();
        for (kind, mut records) in documents {
            if !changes.writes(kind) {
                continue;
            }
            for entity in changes.entities.iter().filter(|e| e.kind() == kind) {
                upsert_into(&mut records, entity.clone());
            }
            staged.push((kind, self.stage(kind, &records).await?));
        }

        for (kind, temp_path) in staged {
            self.publish(kind, &temp_path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for LocalCache {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch_all(
        &self,
        kind: EntityKind,
        filter: &Filter,
    ) -> Result<Vec<Entity>, StoreError> {
        let mut records = self.read_collection(kind).await;
        records.retain(|entity| filter.matches(entity));
        Ok(records)
    }

    async fn commit(&self, changes: &ChangeSet) -> Result<(), StoreError> {
        // Dropping this future while waiting for the lock writes nothing.
        let guard = self.write_lock.clone().lock_owned().await;

        let cache = self.clone();
        let changes = changes.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            cache.apply(&changes).await
        });

        task.await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Meal, MealStatus, MealSwap, MealType, Nutrient, Role, User};
    use crate::store::{fetch, find};
    use chrono::{Duration, NaiveDate, Utc};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_cache() -> (LocalCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = LocalCache::new(temp_dir.path().to_path_buf());
        (cache, temp_dir)
    }

    #[test]
    fn test_cache_path() {
        let (cache, _temp) = test_cache();
        assert!(cache.path(EntityKind::Meals).ends_with("meals.json"));
        assert!(!cache.exists(EntityKind::Meals));
    }

    #[tokio::test]
    async fn test_load_nonexistent_returns_none() {
        let (cache, _temp) = test_cache();
        assert!(cache.load(EntityKind::Users).await.unwrap().is_none());
        assert!(cache.read_collection(EntityKind::Users).await.is_empty());
    }

    #[tokio::test]
    async fn test_save_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested").join("data");
        let cache = LocalCache::new(nested.clone());

        cache.save(EntityKind::Meals, &[]).await.unwrap();

        assert!(nested.exists());
        assert!(cache.exists(EntityKind::Meals));
    }

    #[tokio::test]
    async fn test_meal_roundtrip_keeps_nullable_fields() {
        let (cache, _temp) = test_cache();
        let now = Utc::now();

        let untouched = Meal::new(
            "Lentil soup",
            MealType::Lunch,
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        );
        let mut claimed = Meal::new(
            "Pad thai",
            MealType::Dinner,
            NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
        )
        .with_location("South Hall")
        .with_nutrients(vec![Nutrient::new("protein", 21.5, "g")]);
        claimed.status = MealStatus::Claimed;
        claimed.offered_by = Some(Uuid::new_v4());
        claimed.claimed_by = Some(Uuid::new_v4());
        claimed.offer_expiry_time = Some(now + Duration::hours(1));
        claimed.claim_deadline_time = Some(now + Duration::minutes(30));
        claimed.actually_consumed = Some(false);

        cache
            .commit(&ChangeSet::new().with(untouched.clone()).with(claimed.clone()))
            .await
            .unwrap();

        // A fresh cache over the same directory sees the same values.
        let reopened = LocalCache::new(cache.data_dir().to_path_buf());
        let meals: Vec<Meal> = fetch(&reopened, &Filter::all()).await.unwrap();
        assert_eq!(meals, vec![untouched, claimed]);
    }

    #[tokio::test]
    async fn test_corrupt_document_reads_as_empty() {
        let (cache, _temp) = test_cache();
        std::fs::write(cache.path(EntityKind::Users), b"{not json").unwrap();

        let users = cache
            .fetch_all(EntityKind::Users, &Filter::all())
            .await
            .unwrap();
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn test_commit_refuses_to_overwrite_corrupt_document() {
        let (cache, _temp) = test_cache();
        std::fs::write(cache.path(EntityKind::Users), b"{not json").unwrap();

        let user = User::new("Ada", "ada@example.edu", Role::Student);
        let result = cache.commit(&ChangeSet::new().with(user)).await;

        assert!(matches!(result, Err(StoreError::Decode(_, _))));
        let raw = std::fs::read(cache.path(EntityKind::Users)).unwrap();
        assert_eq!(raw, b"{not json");
    }

    #[tokio::test]
    async fn test_commit_rejects_stale_precondition() {
        let (cache, _temp) = test_cache();
        let user = User::new("Ada", "ada@example.edu", Role::Student);
        let meal = Meal::new(
            "Lentil soup",
            MealType::Lunch,
            NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
        );
        cache
            .commit(&ChangeSet::new().with(user.clone()).with(meal.clone()))
            .await
            .unwrap();

        let mut offered = meal.clone();
        offered.status = MealStatus::Offered;
        cache
            .commit(&ChangeSet::new().with(offered.clone()).expecting(meal.clone()))
            .await
            .unwrap();

        let mut scored = user.clone();
        scored.cq_score = 1.0;
        let result = cache
            .commit(
                &ChangeSet::new()
                    .with(offered.clone())
                    .with(scored)
                    .expecting(meal.clone()),
            )
            .await;
        assert!(matches!(result, Err(StoreError::Rejected(_))));

        let users: Vec<User> = fetch(&cache, &Filter::all()).await.unwrap();
        assert_eq!(users, vec![user]);
        let meals: Vec<Meal> = fetch(&cache, &Filter::all()).await.unwrap();
        assert_eq!(meals, vec![offered]);
        assert!(!cache.path(EntityKind::Users).with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_cancelled_commit_applies_fully_or_not_at_all() {
        let (cache, _temp) = test_cache();
        let user = User::new("Ada", "ada@example.edu", Role::Student);
        cache.upsert(Entity::User(user.clone())).await.unwrap();

        for i in 0..200u64 {
            let mut meal = Meal::new(
                "Lentil soup",
                MealType::Lunch,
                NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            );
            meal.status = MealStatus::Offered;
            meal.offered_by = Some(user.id);
            let swap = MealSwap::new(meal.id, user.id, Utc::now());
            let mut scored: User = find(&cache, user.id).await.unwrap().unwrap();
            scored.cq_score += 1.0;

            let changes = ChangeSet::new().with(meal).with(swap).with(scored);
            let _ = tokio::time::timeout(
                std::time::Duration::from_micros(10 + i * 15),
                cache.commit(&changes),
            )
            .await;

            // Taking the lock waits for any write still in flight.
            drop(cache.write_lock.lock().await);
        }

        let meals: Vec<Meal> = fetch(&cache, &Filter::all()).await.unwrap();
        let swaps: Vec<MealSwap> = fetch(&cache, &Filter::all()).await.unwrap();
        let stored: User = find(&cache, user.id).await.unwrap().unwrap();

        assert_eq!(meals.len(), swaps.len());
        for meal in &meals {
            assert!(swaps.iter().any(|s| s.meal_id == meal.id));
        }
        assert_eq!(stored.cq_score, meals.len() as f64);
    }

    #[tokio::test]
    async fn test_overwrite_existing_record() {
        let (cache, _temp) = test_cache();
        let mut user = User::new("Ada", "ada@example.edu", Role::Student);
        cache.upsert(Entity::User(user.clone())).await.unwrap();

        user.cq_score = 4.5;
        cache.upsert(Entity::User(user.clone())).await.unwrap();

        let users: Vec<User> = fetch(&cache, &Filter::all()).await.unwrap();
        assert_eq!(users, vec![user]);
    }
}
