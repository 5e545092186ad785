//! Session and leaderboard service.
//!
//! The signed-in user survives restarts through a `current_user_id` file in
//! the data directory. The file only names the user; the record itself is
//! always resolved against the active store.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::coordinator::{retry_conflicts, SyncCoordinator};
use crate::error::ExchangeError;
use crate::models::{Role, User};
use crate::store::{ChangeSet, Filter, StoreError};

const CURRENT_USER_FILE: &str = "current_user_id";

/// Registrations serialize on this id so two sign-ups cannot claim one email.
const REGISTRATION_LOCK: Uuid = Uuid::nil();

/// Emitted when the session ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Invalidated { user_id: Uuid },
}

/// Pointer file holding the signed-in user's id.
#[derive(Debug, Clone)]
pub struct SessionPointer {
    data_dir: PathBuf,
}

impl SessionPointer {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(CURRENT_USER_FILE)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn save(&self, user_id: Uuid) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir)
            .map_err(|e| StoreError::Io(self.data_dir.clone(), e))?;

        let path = self.path();
        fs::write(&path, user_id.to_string()).map_err(|e| StoreError::Io(path, e))
    }

    /// Returns `Ok(None)` if nobody is signed in.
    pub fn load(&self) -> Result<Option<Uuid>, StoreError> {
        let path = self.path();

        match fs::read_to_string(&path) {
            Ok(content) => {
                let content = content.trim();
                let id = Uuid::parse_str(content).map_err(|e| {
                    StoreError::Decode(path.display().to_string(), e.to_string())
                })?;
                Ok(Some(id))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(path, e)),
        }
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(path, e)),
        }
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }
}

pub struct SessionService {
    coordinator: Arc<SyncCoordinator>,
    pointer: SessionPointer,
    current: RwLock<Option<User>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionService {
    pub fn new(coordinator: Arc<SyncCoordinator>, pointer: SessionPointer) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            coordinator,
            pointer,
            current: RwLock::new(None),
            events,
        }
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn pointer(&self) -> &SessionPointer {
        &self.pointer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The signed-in user, as fresh as the coordinator's last refresh.
    pub fn current_user(&self) -> Option<User> {
        let cached = self
            .current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;

        match self.coordinator.snapshot().current_user {
            Some(fresh) if fresh.id == cached.id => Some(fresh),
            _ => Some(cached),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn set_current(&self, user: Option<User>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = user;
    }

    fn require_current(&self) -> Result<User, ExchangeError> {
        self.current_user().ok_or(ExchangeError::NotAuthenticated)
    }

    fn forget_pointer(&self) {
        if let Err(e) = self.pointer.clear() {
            tracing::warn!(error = %e, "Failed to clear session pointer");
        }
    }

    /// Resolves the saved pointer against the active store.
    ///
    /// A pointer naming a missing or inactive user is cleared and `Ok(None)`
    /// returned. If the store cannot be reached the pointer is cleared as
    /// well and the error returned.
    pub async fn restore(&self) -> Result<Option<User>, ExchangeError> {
        let user_id = match self.pointer.load() {
            Ok(Some(id)) => id,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable session pointer; signing out");
                self.forget_pointer();
                return Ok(None);
            }
        };

        let resolved = match self.coordinator.find::<User>(user_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.forget_pointer();
                return Err(e);
            }
        };

        let Some(user) = resolved.filter(|u| u.is_active) else {
            tracing::info!(%user_id, "Saved session names an unknown or inactive user");
            self.forget_pointer();
            return Ok(None);
        };

        if let Err(e) = self.coordinator.refresh(Some(user.id)).await {
            self.forget_pointer();
            return Err(e);
        }

        self.set_current(Some(user.clone()));
        tracing::info!(user_id = %user.id, "Session restored");
        Ok(Some(user))
    }

    async fn start_session(&self, user: User) -> Result<User, ExchangeError> {
        self.pointer.save(user.id)?;
        self.set_current(Some(user.clone()));
        self.coordinator.refresh(Some(user.id)).await?;
        tracing::info!(user_id = %user.id, "Signed in");
        Ok(user)
    }

    pub async fn sign_in(&self, user_id: Uuid) -> Result<User, ExchangeError> {
        let user = self
            .coordinator
            .find::<User>(user_id)
            .await?
            .ok_or_else(|| ExchangeError::UserNotFound(user_id.to_string()))?;
        if !user.is_active {
            return Err(ExchangeError::NotAuthenticated);
        }
        self.start_session(user).await
    }

    pub async fn sign_in_by_email(&self, email: &str) -> Result<User, ExchangeError> {
        let user = self
            .coordinator
            .fetch::<User>(&Filter::by_email(email))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::UserNotFound(email.to_string()))?;
        if !user.is_active {
            return Err(ExchangeError::NotAuthenticated);
        }
        self.start_session(user).await
    }

    /// Creates a user and signs them in.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        role: Role,
    ) -> Result<User, ExchangeError> {
        let _guard = self.coordinator.locks().lock(REGISTRATION_LOCK).await;

        let taken = self
            .coordinator
            .fetch::<User>(&Filter::by_email(email))
            .await?;
        if !taken.is_empty() {
            return Err(ExchangeError::EmailTaken(email.to_string()));
        }

        let user = User::new(name.trim(), email.trim(), role);
        self.coordinator
            .commit(ChangeSet::new().with(user.clone()), Some(user.id))
            .await?;
        tracing::info!(user_id = %user.id, "Registered user");

        self.start_session(user).await
    }

    /// Edits the signed-in user's name and email.
    pub async fn update_profile(
        &self,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<User, ExchangeError> {
        let current = self.require_current()?;
        let _registration = self.coordinator.locks().lock(REGISTRATION_LOCK).await;
        let _user = self.coordinator.locks().lock(current.id).await;

        let stored = self
            .coordinator
            .find::<User>(current.id)
            .await?
            .ok_or_else(|| ExchangeError::UserNotFound(current.id.to_string()))?;
        let mut user = stored.clone();

        if let Some(email) = email.filter(|e| !user.has_email(e)) {
            let taken = self
                .coordinator
                .fetch::<User>(&Filter::by_email(email))
                .await?
                .into_iter()
                .any(|u| u.id != user.id);
            if taken {
                return Err(ExchangeError::EmailTaken(email.to_string()));
            }
            user.email = email.trim().to_string();
        }
        if let Some(name) = name {
            user.name = name.trim().to_string();
        }

        self.coordinator
            .commit(
                ChangeSet::new().with(user.clone()).expecting(stored),
                Some(user.id),
            )
            .await?;
        self.set_current(Some(user.clone()));
        Ok(user)
    }

    /// Marks the signed-in user inactive and ends the session.
    pub async fn deactivate(&self) -> Result<(), ExchangeError> {
        let current = self.require_current()?;
        {
            let _user = self.coordinator.locks().lock(current.id).await;
            let stored = self
                .coordinator
                .find::<User>(current.id)
                .await?
                .ok_or_else(|| ExchangeError::UserNotFound(current.id.to_string()))?;
            let mut user = stored.clone();
            user.is_active = false;
            user.leaderboard_rank = None;
            self.coordinator
                .commit(ChangeSet::new().with(user).expecting(stored), None)
                .await?;
        }
        tracing::info!(user_id = %current.id, "Deactivated user");
        self.invalidate();
        Ok(())
    }

    /// Ends the session: clears the pointer, the current user and the
    /// coordinator's collections.
    ///
    /// Sends one [`SessionEvent::Invalidated`] if a user was signed in.
    pub fn invalidate(&self) -> Option<Uuid> {
        let previous = self
            .current
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.forget_pointer();
        self.coordinator.clear();

        let user_id = previous?.id;
        // No subscribers is fine.
        let _ = self.events.send(SessionEvent::Invalidated { user_id });
        tracing::info!(%user_id, "Session invalidated");
        Some(user_id)
    }

    /// Recomputes every active user's rank from their CQ score.
    ///
    /// Ties keep store order. Inactive users lose their rank. Running it
    /// twice without score changes writes the same ranks.
    pub async fn update_leaderboard(&self) -> Result<Vec<User>, ExchangeError> {
        let ids: Vec<Uuid> = self
            .coordinator
            .fetch::<User>(&Filter::all())
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();
        let _guards = self.coordinator.locks().lock_all(ids).await;

        let acting = self.current_user().map(|u| u.id);
        let ranked = retry_conflicts("update_leaderboard", || self.try_rank(acting)).await?;

        tracing::info!(users = ranked.len(), "Leaderboard updated");
        Ok(ranked)
    }

    /// Re-reads every user and writes their ranks, on condition that no
    /// user record changed since the read.
    async fn try_rank(&self, acting: Option<Uuid>) -> Result<Vec<User>, ExchangeError> {
        let users = self.coordinator.fetch::<User>(&Filter::all()).await?;

        let mut changes = ChangeSet::new();
        for user in &users {
            changes.expect(user.clone());
        }
        let ranked = rank_users(users);
        for user in &ranked {
            changes.push(user.clone());
        }

        self.coordinator.commit(changes, acting).await?;
        Ok(ranked)
    }
}

/// Orders users by CQ score, highest first, and assigns 1-based ranks to the
/// active ones.
pub fn rank_users(mut users: Vec<User>) -> Vec<User> {
    users.sort_by(|a, b| b.cq_score.total_cmp(&a.cq_score));

    let mut rank = 0;
    for user in &mut users {
        if user.is_active {
            rank += 1;
            user.leaderboard_rank = Some(rank);
        } else {
            user.leaderboard_rank = None;
        }
    }
    users
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("pointer", &self.pointer.path())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
