//! MealSwap Core Library
//!
//! Meal exchange lifecycle, store adapters, synchronization and sessions
//! shared by the MealSwap CLI and server.

pub mod coordinator;
pub mod error;
pub mod exchange;
pub mod lifecycle;
pub mod locks;
pub mod models;
pub mod session;
pub mod store;

pub use coordinator::{
    Collections, StoreMode, SyncCoordinator, DEFAULT_STORE_TIMEOUT, MAX_COMMIT_ATTEMPTS,
};
pub use error::ExchangeError;
pub use exchange::MealExchange;
pub use locks::KeyedLocks;
pub use models::{
    Meal, MealStatus, MealSwap, MealType, Nutrient, ParseEnumError, Prediction, Role, SwapStatus,
    User,
};
pub use session::{rank_users, SessionEvent, SessionPointer, SessionService};
pub use store::{
    ChangeSet, Entity, EntityKind, Filter, HttpStore, InMemoryStore, LocalCache, Precondition, Record,
    Store, StoreError,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
