//! Runs the remote store client against an in-process server.

use chrono::NaiveDate;
use mealswap::server::{router, ApiKeyEntry, ApiKeyStore, AppState};
use mealswap_core::{
    ChangeSet, Entity, EntityKind, ExchangeError, Filter, HttpStore, InMemoryStore, Meal,
    MealExchange, MealStatus, MealSwap, MealType, Role, SessionPointer, SessionService, Store,
    StoreError, SwapStatus, SyncCoordinator, User,
};
use std::sync::Arc;
use tempfile::TempDir;

const API_KEY: &str = "test-key";

async fn spawn_server() -> String {
    let keys = ApiKeyStore::from_entries([ApiKeyEntry {
        key: API_KEY.to_string(),
        label: "integration".to_string(),
    }]);
    let app = router(AppState::new(Arc::new(InMemoryStore::new()), keys));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn session(store: &HttpStore, dir: &TempDir) -> SessionService {
    SessionService::new(
        Arc::new(SyncCoordinator::new(Arc::new(store.clone()))),
        SessionPointer::new(dir.path()),
    )
}

#[tokio::test]
async fn test_health_needs_no_key() {
    let url = spawn_server().await;
    assert!(HttpStore::new(&url, "wrong").check_health().await);
}

#[tokio::test]
async fn test_wrong_key_is_rejected() {
    let url = spawn_server().await;
    let store = HttpStore::new(&url, "wrong");

    let result = store.fetch_all(EntityKind::Users, &Filter::all()).await;
    assert!(matches!(result, Err(StoreError::Status { status: 401, .. })));
}

#[tokio::test]
async fn test_filters_travel_as_query_parameters() {
    let url = spawn_server().await;
    let store = HttpStore::new(&url, API_KEY);

    let ada = User::new("Ada", "ada@example.edu", Role::Student);
    let bob = User::new("Bob", "bob@example.edu", Role::CafeteriaStaff);
    store.upsert(Entity::User(ada.clone())).await.unwrap();
    store.upsert(Entity::User(bob.clone())).await.unwrap();

    let by_email = store
        .fetch_all(EntityKind::Users, &Filter::by_email("BOB@example.edu"))
        .await
        .unwrap();
    assert_eq!(by_email, vec![Entity::User(bob)]);

    let by_id = store
        .fetch_all(EntityKind::Users, &Filter::by_id(ada.id))
        .await
        .unwrap();
    assert_eq!(by_id, vec![Entity::User(ada)]);
}

#[tokio::test]
async fn test_exchange_over_http() {
    let url = spawn_server().await;
    let store = HttpStore::new(&url, API_KEY);

    let offerer_dir = TempDir::new().unwrap();
    let claimant_dir = TempDir::new().unwrap();
    let offerer_session = session(&store, &offerer_dir);
    let claimant_session = session(&store, &claimant_dir);

    let offerer = offerer_session
        .register("Ada", "ada@example.edu", Role::Student)
        .await
        .unwrap();
    let claimant = claimant_session
        .register("Bob", "bob@example.edu", Role::Student)
        .await
        .unwrap();

    let offerer_exchange = MealExchange::new(offerer_session.coordinator().clone());
    let claimant_exchange = MealExchange::new(claimant_session.coordinator().clone());

    let meal = Meal::new(
        "Lentil soup",
        MealType::Lunch,
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
    )
    .with_location("North Hall");
    let listed = offerer_exchange
        .list_meal(meal, Some(&offerer))
        .await
        .unwrap();
    let (offered, _) = offerer_exchange
        .offer(&listed, Some(&offerer))
        .await
        .unwrap();

    // The claimant's view was taken before the offer; the engine re-reads.
    let (claimed, swap) = claimant_exchange
        .claim(&offered, Some(&claimant))
        .await
        .unwrap();
    assert_eq!(claimed.status, MealStatus::Claimed);
    assert_eq!(swap.status, SwapStatus::Completed);

    let swaps: Vec<MealSwap> = claimant_session
        .coordinator()
        .fetch(&Filter::by_meal(claimed.id))
        .await
        .unwrap();
    assert_eq!(swaps.len(), 1);
    assert_eq!(swaps[0].cq_points_earned, Some(1.0));

    let second = offerer_exchange.claim(&offered, Some(&offerer)).await;
    assert!(second.is_err());

    let board = claimant_session.update_leaderboard().await.unwrap();
    let ranked: Vec<_> = board.iter().map(|u| (u.id, u.leaderboard_rank)).collect();
    assert_eq!(ranked, vec![(offerer.id, Some(1)), (claimant.id, Some(2))]);

    // A fresh process for the claimant picks the session back up.
    let restored = session(&store, &claimant_dir).restore().await.unwrap();
    assert_eq!(restored.map(|u| u.id), Some(claimant.id));
}

#[tokio::test]
async fn test_stale_change_set_is_rejected_over_http() {
    let url = spawn_server().await;
    let store = HttpStore::new(&url, API_KEY);

    let ada = User::new("Ada", "ada@example.edu", Role::Student);
    store.upsert(Entity::User(ada.clone())).await.unwrap();

    let mut scored = ada.clone();
    scored.cq_score = 1.5;
    store
        .commit(&ChangeSet::new().with(scored.clone()).expecting(ada.clone()))
        .await
        .unwrap();

    let mut renamed = ada.clone();
    renamed.name = "Ada L.".to_string();
    let result = store
        .commit(&ChangeSet::new().with(renamed).expecting(ada))
        .await;
    assert!(matches!(result, Err(StoreError::Rejected(_))));

    let stored = store
        .fetch_all(EntityKind::Users, &Filter::all())
        .await
        .unwrap();
    assert_eq!(stored, vec![Entity::User(scored)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_claims_from_two_clients_have_one_winner() {
    let url = spawn_server().await;
    let store = HttpStore::new(&url, API_KEY);

    let dirs: Vec<TempDir> = (0..3).map(|_| TempDir::new().unwrap()).collect();
    let offerer_session = session(&store, &dirs[0]);
    let bob_session = session(&store, &dirs[1]);
    let carol_session = session(&store, &dirs[2]);

    let offerer = offerer_session
        .register("Ada", "ada@example.edu", Role::Student)
        .await
        .unwrap();
    let bob = bob_session
        .register("Bob", "bob@example.edu", Role::Student)
        .await
        .unwrap();
    let carol = carol_session
        .register("Carol", "carol@example.edu", Role::Student)
        .await
        .unwrap();

    let offerer_exchange = MealExchange::new(offerer_session.coordinator().clone());
    let meal = Meal::new(
        "Lentil soup",
        MealType::Lunch,
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
    );
    let listed = offerer_exchange.list_meal(meal, Some(&offerer)).await.unwrap();
    let (offered, _) = offerer_exchange.offer(&listed, Some(&offerer)).await.unwrap();

    let bob_claim = {
        let exchange = MealExchange::new(bob_session.coordinator().clone());
        let meal = offered.clone();
        tokio::spawn(async move { exchange.claim(&meal, Some(&bob)).await })
    };
    let carol_claim = {
        let exchange = MealExchange::new(carol_session.coordinator().clone());
        let meal = offered.clone();
        tokio::spawn(async move { exchange.claim(&meal, Some(&carol)).await })
    };
    let results = [bob_claim.await.unwrap(), carol_claim.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(ExchangeError::InvalidState { .. }))));

    let swaps: Vec<MealSwap> = offerer_session
        .coordinator()
        .fetch(&Filter::by_meal(offered.id))
        .await
        .unwrap();
    let completed = swaps
        .iter()
        .filter(|s| s.status == SwapStatus::Completed)
        .count();
    assert_eq!(completed, 1);

    let users: Vec<User> = offerer_session
        .coordinator()
        .fetch(&Filter::all())
        .await
        .unwrap();
    let distributed: u32 = users.iter().map(|u| u.meals_distributed).sum();
    assert_eq!(distributed, 1);
}
