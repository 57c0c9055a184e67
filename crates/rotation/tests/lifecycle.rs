//! Full rotation lifecycle against in-memory store and cache.

use chrono::Duration as ChronoDuration;
use keygate_cache::{Cache, MemoryCache, keys};
use keygate_core::{ClientId, Clock, ManualClock, PermissionSet, SecretString};
use keygate_credential::{
    ClientCredential, CredentialStatus, SecretHasher, TransitionRecord, TransitionState,
};
use keygate_rotation::{RotationError, RotationManager, RotationManagerConfig, RotationStatus};
use keygate_store::{MemorySecretStore, SecretStore, paths};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: Arc<MemorySecretStore>,
    cache: Arc<MemoryCache>,
    clock: ManualClock,
    manager: RotationManager,
    client: ClientId,
}

async fn harness() -> Harness {
    let clock = ManualClock::starting_now();
    let store = Arc::new(MemorySecretStore::new());
    let cache = Arc::new(MemoryCache::with_clock(256, Arc::new(clock.clone())));
    let manager = RotationManager::new(
        Arc::clone(&store) as Arc<dyn SecretStore>,
        Arc::clone(&cache) as Arc<dyn Cache>,
        Arc::new(clock.clone()),
        RotationManagerConfig {
            default_transition_minutes: 60,
            min_transition_minutes: 5,
            lock_ttl: Duration::from_secs(30),
            finalize_grace: Duration::from_secs(600),
        },
    );

    let client = ClientId::new("acme").unwrap();
    let hashed = SecretHasher::new()
        .hash(&SecretString::new("old-secret"))
        .unwrap();
    let record = ClientCredential::new(
        client.clone(),
        "v1",
        hashed,
        clock.now(),
        ["payments:execute"].into_iter().collect::<PermissionSet>(),
    );
    store
        .put_secret(&paths::cred_default(&client), &record.to_bytes().unwrap())
        .await
        .unwrap();

    Harness {
        store,
        cache,
        clock,
        manager,
        client,
    }
}

async fn stored_credential(h: &Harness, path: &str) -> ClientCredential {
    ClientCredential::from_bytes(&h.store.get_secret(path).await.unwrap()).unwrap()
}

async fn stored_transition(h: &Harness) -> TransitionRecord {
    TransitionRecord::from_bytes(
        &h.store
            .get_secret(&paths::transition(&h.client))
            .await
            .unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn full_lifecycle_reaches_new_active() {
    let h = harness().await;

    let initiated = h.manager.initiate(&h.client, Some(10), false).await.unwrap();
    assert_eq!(initiated.record.current_state, TransitionState::Initiated);
    assert!(!initiated.new_secret.is_empty());
    let new_version = initiated.record.new_version.clone();

    // The new version exists but the transition has not opened the window.
    assert!(h.store.contains(&paths::cred_version(&h.client, &new_version)));
    assert_eq!(stored_transition(&h).await.state, TransitionState::Initiated);

    // First tick publishes the dual-validity window.
    let record = h.manager.tick(&h.client).await.unwrap().unwrap();
    assert_eq!(record.current_state, TransitionState::DualActive);
    let transition = stored_transition(&h).await;
    assert_eq!(transition.state, TransitionState::DualActive);
    let end = transition.end_time.unwrap();
    assert_eq!(end - transition.start_time.unwrap(), ChronoDuration::minutes(10));

    // Nothing further is due inside the window.
    assert!(h.manager.tick(&h.client).await.unwrap().is_none());

    // Past the window the driver demotes the old version.
    h.clock.advance(ChronoDuration::minutes(11));
    let record = h.manager.tick(&h.client).await.unwrap().unwrap();
    assert_eq!(record.current_state, TransitionState::OldDeprecated);
    let old = stored_credential(&h, &paths::cred_version(&h.client, "v1")).await;
    assert_eq!(old.status, CredentialStatus::Deprecated);

    // Seed a cached token; finalization must drop it.
    h.cache
        .set_with_ttl(&keys::token(&h.client, "j-1"), b"t", Duration::from_secs(600))
        .await
        .unwrap();

    // Past the finalize grace the rotation completes.
    h.clock.advance(ChronoDuration::minutes(11));
    let record = h.manager.tick(&h.client).await.unwrap().unwrap();
    assert_eq!(record.current_state, TransitionState::NewActive);
    assert_eq!(record.status(), RotationStatus::Completed);
    assert!(record.completed_at.is_some());

    let default = stored_credential(&h, &paths::cred_default(&h.client)).await;
    assert_eq!(default.version, new_version);
    assert_eq!(default.status, CredentialStatus::Active);
    assert!(!h.store.contains(&paths::cred_version(&h.client, "v1")));
    assert!(!h.store.contains(&paths::transition(&h.client)));
    assert_eq!(h.cache.get(&keys::token(&h.client, "j-1")).await.unwrap(), None);

    // Terminal rotations are left alone by the driver.
    assert!(h.manager.tick(&h.client).await.unwrap().is_none());
}

#[tokio::test]
async fn second_initiation_conflicts_unless_forced() {
    let h = harness().await;
    h.manager.initiate(&h.client, None, false).await.unwrap();

    let err = h.manager.initiate(&h.client, None, false).await.unwrap_err();
    assert!(matches!(err, RotationError::Conflict { .. }));

    let forced = h.manager.initiate(&h.client, None, true).await.unwrap();
    assert_eq!(forced.record.current_state, TransitionState::Initiated);
}

#[tokio::test]
async fn transition_window_floor_is_enforced() {
    let h = harness().await;
    let err = h.manager.initiate(&h.client, Some(2), false).await.unwrap_err();
    assert!(matches!(
        err,
        RotationError::WindowTooShort {
            requested: 2,
            minimum: 5
        }
    ));
}

#[tokio::test]
async fn manual_advance_overrides_time_conditions() {
    let h = harness().await;
    h.manager.initiate(&h.client, Some(60), false).await.unwrap();

    // No clock movement at all; three manual advances finish the walk.
    assert_eq!(
        h.manager.advance(&h.client).await.unwrap().current_state,
        TransitionState::DualActive
    );
    assert_eq!(
        h.manager.advance(&h.client).await.unwrap().current_state,
        TransitionState::OldDeprecated
    );
    assert_eq!(
        h.manager.advance(&h.client).await.unwrap().current_state,
        TransitionState::NewActive
    );

    // Advancing a finished rotation is a no-op, not an error.
    assert_eq!(
        h.manager.advance(&h.client).await.unwrap().current_state,
        TransitionState::NewActive
    );
}

#[tokio::test]
async fn reapplying_the_current_state_is_a_no_op() {
    let h = harness().await;
    h.manager.initiate(&h.client, None, false).await.unwrap();
    let first = h
        .manager
        .apply(&h.client, TransitionState::DualActive)
        .await
        .unwrap();
    let second = h
        .manager
        .apply(&h.client, TransitionState::DualActive)
        .await
        .unwrap();
    assert_eq!(first.current_state, second.current_state);
    assert_eq!(first.rotation_id, second.rotation_id);
    assert_eq!(
        stored_transition(&h).await.state,
        TransitionState::DualActive
    );
}

#[tokio::test]
async fn skipping_states_is_rejected() {
    let h = harness().await;
    h.manager.initiate(&h.client, None, false).await.unwrap();
    let err = h
        .manager
        .apply(&h.client, TransitionState::NewActive)
        .await
        .unwrap_err();
    assert!(matches!(err, RotationError::InvalidTransition { .. }));
}

#[tokio::test]
async fn cancel_from_dual_active_restores_pre_rotation_state() {
    let h = harness().await;
    let initiated = h.manager.initiate(&h.client, None, false).await.unwrap();
    let new_version = initiated.record.new_version.clone();
    h.manager.advance(&h.client).await.unwrap(); // DualActive

    let record = h.manager.cancel(&h.client).await.unwrap();
    assert_eq!(record.current_state, TransitionState::Failed);
    assert_eq!(record.status(), RotationStatus::Failed);

    assert!(!h.store.contains(&paths::transition(&h.client)));
    assert!(!h.store.contains(&paths::cred_version(&h.client, &new_version)));
    let default = stored_credential(&h, &paths::cred_default(&h.client)).await;
    assert_eq!(default.version, "v1");
    assert_eq!(default.status, CredentialStatus::Active);
}

#[tokio::test]
async fn cancel_from_old_deprecated_reactivates_old_version() {
    let h = harness().await;
    let initiated = h.manager.initiate(&h.client, None, false).await.unwrap();
    let new_version = initiated.record.new_version.clone();
    h.manager.advance(&h.client).await.unwrap(); // DualActive
    h.manager.advance(&h.client).await.unwrap(); // OldDeprecated

    let old = stored_credential(&h, &paths::cred_version(&h.client, "v1")).await;
    assert_eq!(old.status, CredentialStatus::Deprecated);

    h.manager.cancel(&h.client).await.unwrap();

    let old = stored_credential(&h, &paths::cred_version(&h.client, "v1")).await;
    assert_eq!(old.status, CredentialStatus::Active);
    let default = stored_credential(&h, &paths::cred_default(&h.client)).await;
    assert_eq!(default.version, "v1");
    assert_eq!(default.status, CredentialStatus::Active);
    assert!(!h.store.contains(&paths::cred_version(&h.client, &new_version)));
}

#[tokio::test]
async fn store_failure_during_advance_fails_and_rolls_back() {
    let h = harness().await;
    let initiated = h.manager.initiate(&h.client, Some(10), false).await.unwrap();
    let new_version = initiated.record.new_version.clone();
    h.manager.tick(&h.client).await.unwrap(); // DualActive

    // The due-time check reads the transition record first; let that one
    // through and kill the next store operation, which is deprecate_old
    // reading the old record to demote it.
    h.clock.advance(ChronoDuration::minutes(11));
    h.store.fail_after(1, 1);
    let err = h.manager.tick(&h.client).await.unwrap_err();
    assert!(matches!(err, RotationError::Store(_)));

    // The rotation parked itself in Failed and the rollback ran.
    let record = h.manager.status(&h.client).await.unwrap().unwrap();
    assert_eq!(record.current_state, TransitionState::Failed);
    assert!(!h.store.contains(&paths::transition(&h.client)));
    assert!(!h.store.contains(&paths::cred_version(&h.client, &new_version)));
    let default = stored_credential(&h, &paths::cred_default(&h.client)).await;
    assert_eq!(default.version, "v1");
    assert_eq!(default.status, CredentialStatus::Active);
}

#[tokio::test]
async fn initiation_without_a_credential_is_not_found() {
    let h = harness().await;
    let ghost = ClientId::new("ghost").unwrap();
    let err = h.manager.initiate(&ghost, None, false).await.unwrap_err();
    assert!(matches!(err, RotationError::NotFound { .. }));
}

#[tokio::test]
async fn failed_rotation_allows_a_fresh_initiation() {
    let h = harness().await;
    h.manager.initiate(&h.client, None, false).await.unwrap();
    h.manager.cancel(&h.client).await.unwrap();

    // Terminal record does not block a new rotation.
    let fresh = h.manager.initiate(&h.client, None, false).await.unwrap();
    assert_eq!(fresh.record.current_state, TransitionState::Initiated);
}
