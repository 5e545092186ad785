use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::StoreError;
use crate::models::{Meal, MealSwap, Prediction, User};

/// Entity collections known to the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Users,
    Meals,
    Swaps,
    Predictions,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Users,
        EntityKind::Meals,
        EntityKind::Swaps,
        EntityKind::Predictions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Users => "users",
            EntityKind::Meals => "meals",
            EntityKind::Swaps => "swaps",
            EntityKind::Predictions => "predictions",
        }
    }

    /// Returns the filename of this collection's cache document.
    pub fn filename(&self) -> &'static str {
        match self {
            EntityKind::Users => "users.json",
            EntityKind::Meals => "meals.json",
            EntityKind::Swaps => "swaps.json",
            EntityKind::Predictions => "predictions.json",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "users" => Some(EntityKind::Users),
            "meals" => Some(EntityKind::Meals),
            "swaps" => Some(EntityKind::Swaps),
            "predictions" => Some(EntityKind::Predictions),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any record a store can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "lowercase")]
pub enum Entity {
    User(User),
    Meal(Meal),
    Swap(MealSwap),
    Prediction(Prediction),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::User(_) => EntityKind::Users,
            Entity::Meal(_) => EntityKind::Meals,
            Entity::Swap(_) => EntityKind::Swaps,
            Entity::Prediction(_) => EntityKind::Predictions,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Entity::User(u) => u.id,
            Entity::Meal(m) => m.id,
            Entity::Swap(s) => s.id,
            Entity::Prediction(p) => p.id,
        }
    }

    /// Encodes the bare record, without the kind tag.
    pub fn to_record_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Entity::User(u) => serde_json::to_value(u),
            Entity::Meal(m) => serde_json::to_value(m),
            Entity::Swap(s) => serde_json::to_value(s),
            Entity::Prediction(p) => serde_json::to_value(p),
        }
    }

    /// Decodes a bare record of the given kind.
    pub fn from_record_json(kind: EntityKind, value: serde_json::Value) -> serde_json::Result<Self> {
        Ok(match kind {
            EntityKind::Users => Entity::User(serde_json::from_value(value)?),
            EntityKind::Meals => Entity::Meal(serde_json::from_value(value)?),
            EntityKind::Swaps => Entity::Swap(serde_json::from_value(value)?),
            EntityKind::Predictions => Entity::Prediction(serde_json::from_value(value)?),
        })
    }
}

/// Typed access to one entity kind.
pub trait Record: Sized {
    const KIND: EntityKind;

    fn from_entity(entity: Entity) -> Option<Self>;
    fn into_entity(self) -> Entity;
}

macro_rules! impl_record {
    ($ty:ty, $variant:ident, $kind:ident) => {
        impl Record for $ty {
            const KIND: EntityKind = EntityKind::$kind;

            fn from_entity(entity: Entity) -> Option<Self> {
                match entity {
                    Entity::$variant(record) => Some(record),
                    _ => None,
                }
            }

            fn into_entity(self) -> Entity {
                Entity::$variant(self)
            }
        }

        impl From<$ty> for Entity {
            fn from(record: $ty) -> Self {
                Entity::$variant(record)
            }
        }
    };
}

impl_record!(User, User, Users);
impl_record!(Meal, Meal, Meals);
impl_record!(MealSwap, Swap, Swaps);
impl_record!(Prediction, Prediction, Predictions);

/// Conjunctive query over one collection. Unset fields match everything.
///
/// - `meal_id` matches a meal's own id or a swap's `meal_id`
/// - `user_id` matches a user's id or a meal/swap participant
/// - `email` matches users case-insensitively
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_meal(meal_id: Uuid) -> Self {
        Self {
            meal_id: Some(meal_id),
            ..Self::default()
        }
    }

    pub fn by_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn by_email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        if self.id.is_some_and(|id| entity.id() != id) {
            return false;
        }
        if let Some(meal_id) = self.meal_id {
            let hit = match entity {
                Entity::Meal(m) => m.id == meal_id,
                Entity::Swap(s) => s.meal_id == meal_id,
                _ => false,
            };
            if !hit {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            let hit = match entity {
                Entity::User(u) => u.id == user_id,
                Entity::Meal(m) => m.offered_by == Some(user_id) || m.claimed_by == Some(user_id),
                Entity::Swap(s) => s.involves(user_id),
                Entity::Prediction(_) => false,
            };
            if !hit {
                return false;
            }
        }
        if let Some(email) = &self.email {
            match entity {
                Entity::User(u) if u.has_email(email) => {}
                _ => return false,
            }
        }
        true
    }
}

/// State a stored record must be in for a change set to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precondition {
    pub kind: EntityKind,
    pub id: Uuid,
    /// The stored record must equal this. `None` means no record may exist.
    pub expected: Option<Entity>,
}

impl Precondition {
    /// Checks this precondition against the stored records of its kind.
    pub fn holds(&self, records: &[Entity]) -> bool {
        records.iter().find(|e| e.id() == self.id) == self.expected.as_ref()
    }
}

/// A group of entities written together.
///
/// Preconditions are checked under the store's write lock; if any fails,
/// nothing is written and the store returns [`StoreError::Rejected`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub entities: Vec<Entity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preconditions: Vec<Precondition>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, entity: impl Into<Entity>) -> Self {
        self.entities.push(entity.into());
        self
    }

    pub fn push(&mut self, entity: impl Into<Entity>) {
        self.entities.push(entity.into());
    }

    /// Requires the stored copy of `current` to be unchanged.
    pub fn expecting(mut self, current: impl Into<Entity>) -> Self {
        self.expect(current);
        self
    }

    pub fn expect(&mut self, current: impl Into<Entity>) {
        let current = current.into();
        self.preconditions.push(Precondition {
            kind: current.kind(),
            id: current.id(),
            expected: Some(current),
        });
    }

    /// Requires that no record of `kind` with `id` exists yet.
    pub fn expecting_absent(mut self, kind: EntityKind, id: Uuid) -> Self {
        self.preconditions.push(Precondition {
            kind,
            id,
            expected: None,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Kinds touched by this change set's entities or preconditions, without
    /// duplicates.
    pub fn kinds(&self) -> Vec<EntityKind> {
        let touched = self.entities.iter().map(Entity::kind);
        let checked = self.preconditions.iter().map(|p| p.kind);

        let mut kinds = Vec::new();
        for kind in touched.chain(checked) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    /// Returns true if some entity in this change set is of `kind`.
    pub fn writes(&self, kind: EntityKind) -> bool {
        self.entities.iter().any(|e| e.kind() == kind)
    }

    /// Fails with `Rejected` on the first precondition that does not hold.
    /// `records_of` returns the stored records of a kind.
    pub(crate) fn check_preconditions<'a>(
        &self,
        records_of: impl Fn(EntityKind) -> &'a [Entity],
    ) -> Result<(), StoreError> {
        match self.preconditions.iter().find(|p| !p.holds(records_of(p.kind))) {
            Some(failed) => Err(StoreError::Rejected(format!(
                "{} {} changed since it was read",
                failed.kind, failed.id
            ))),
            None => Ok(()),
        }
    }
}

impl From<Vec<Entity>> for ChangeSet {
    fn from(entities: Vec<Entity>) -> Self {
        Self {
            entities,
            preconditions: Vec::new(),
        }
    }
}

/// Inserts or replaces `entity` in `collection`, keeping insertion order.
pub(crate) fn upsert_into(collection: &mut Vec<Entity>, entity: Entity) {
    let id = entity.id();
    match collection.iter_mut().find(|existing| existing.id() == id) {
        Some(existing) => *existing = entity,
        None => collection.push(entity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MealStatus, MealType, Role};
    use chrono::{NaiveDate, Utc};

    fn meal() -> Meal {
        Meal::new("Chili", MealType::Dinner, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap())
    }

    #[test]
    fn test_filter_by_user_matches_participants() {
        let offerer = Uuid::new_v4();
        let mut m = meal();
        m.status = MealStatus::Offered;
        m.offered_by = Some(offerer);
        let swap = MealSwap::new(m.id, offerer, Utc::now());

        let filter = Filter::by_user(offerer);
        assert!(filter.matches(&Entity::Meal(m.clone())));
        assert!(filter.matches(&Entity::Swap(swap)));
        assert!(!Filter::by_user(Uuid::new_v4()).matches(&Entity::Meal(m)));
    }

    #[test]
    fn test_filter_by_meal_matches_meal_and_swaps() {
        let m = meal();
        let swap = MealSwap::new(m.id, Uuid::new_v4(), Utc::now());
        let other = MealSwap::new(Uuid::new_v4(), Uuid::new_v4(), Utc::now());

        let filter = Filter::by_meal(m.id);
        assert!(filter.matches(&Entity::Meal(m)));
        assert!(filter.matches(&Entity::Swap(swap)));
        assert!(!filter.matches(&Entity::Swap(other)));
    }

    #[test]
    fn test_filter_by_email_is_case_insensitive() {
        let user = User::new("Ada", "ada@example.edu", Role::Student);
        assert!(Filter::by_email("ADA@example.edu").matches(&Entity::User(user.clone())));
        assert!(!Filter::by_email("bob@example.edu").matches(&Entity::User(user)));
        assert!(!Filter::by_email("ada@example.edu").matches(&Entity::Meal(meal())));
    }

    #[test]
    fn test_filter_fields_combine() {
        let user = User::new("Ada", "ada@example.edu", Role::Student);
        let filter = Filter {
            id: Some(user.id),
            email: Some("someone-else@example.edu".to_string()),
            ..Filter::default()
        };
        assert!(!filter.matches(&Entity::User(user)));
    }

    #[test]
    fn test_upsert_into_replaces_in_place() {
        let a = meal();
        let b = meal();
        let mut collection = vec![Entity::Meal(a.clone()), Entity::Meal(b.clone())];

        let mut renamed = a.clone();
        renamed.name = "Chili (mild)".to_string();
        upsert_into(&mut collection, Entity::Meal(renamed));

        assert_eq!(collection.len(), 2);
        assert_eq!(collection[0].id(), a.id);
        assert_eq!(collection[1].id(), b.id);
        match &collection[0] {
            Entity::Meal(m) => assert_eq!(m.name, "Chili (mild)"),
            other => panic!("unexpected entity {:?}", other),
        }
    }

    #[test]
    fn test_entity_json_is_tagged_by_kind() {
        let json = serde_json::to_value(Entity::Meal(meal())).unwrap();
        assert_eq!(json["kind"], "meal");
        assert_eq!(json["record"]["status"], "available");
    }

    #[test]
    fn test_change_set_kinds_are_unique() {
        let m = meal();
        let changes = ChangeSet::new()
            .with(m.clone())
            .with(MealSwap::new(m.id, Uuid::new_v4(), Utc::now()))
            .with(meal());
        assert_eq!(changes.kinds(), vec![EntityKind::Meals, EntityKind::Swaps]);
        assert_eq!(changes.len(), 3);

        let user = User::new("Ada", "ada@example.edu", Role::Student);
        let guarded = changes.expecting(user);
        assert_eq!(
            guarded.kinds(),
            vec![EntityKind::Meals, EntityKind::Swaps, EntityKind::Users]
        );
        assert!(!guarded.writes(EntityKind::Users));
    }

    #[test]
    fn test_preconditions_compare_whole_records() {
        let stored = meal();
        let records = vec![Entity::Meal(stored.clone())];

        let unchanged = ChangeSet::new().expecting(stored.clone());
        assert!(unchanged.check_preconditions(|_| records.as_slice()).is_ok());

        let mut offered = stored.clone();
        offered.status = MealStatus::Offered;
        let stale = ChangeSet::new().expecting(offered);
        assert!(matches!(
            stale.check_preconditions(|_| records.as_slice()),
            Err(StoreError::Rejected(msg)) if msg.contains(&stored.id.to_string())
        ));

        let absent = ChangeSet::new().expecting_absent(EntityKind::Meals, stored.id);
        assert!(absent.check_preconditions(|_| records.as_slice()).is_err());
        assert!(absent.check_preconditions(|_| &[][..]).is_ok());
    }

    #[test]
    fn test_change_set_without_preconditions_omits_them_on_the_wire() {
        let json = serde_json::to_value(ChangeSet::new().with(meal())).unwrap();
        assert!(json.get("preconditions").is_none());

        let decoded: ChangeSet =
            serde_json::from_value(serde_json::json!({ "entities": [] })).unwrap();
        assert!(decoded.preconditions.is_empty());
    }
}
