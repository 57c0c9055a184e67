//! Rotation side effects against the store and cache.

use crate::{RotationError, RotationRecord};
use chrono::Duration as ChronoDuration;
use keygate_cache::{Cache, CacheLease, keys};
use keygate_core::{ClientId, Clock, SecretString};
use keygate_credential::{
    ClientCredential, CredentialStatus, SecretHasher, TransitionRecord, TransitionState,
    generate_client_secret, generate_version,
};
use keygate_store::{SecretStore, paths};
use std::sync::Arc;
use std::time::Duration;

/// A running rotation's record survives this long in the cache; far longer
/// than any sane transition window.
const RUNNING_RECORD_TTL: Duration = Duration::from_secs(7 * 24 * 3600);
/// Terminal records stay visible to operators for a while, then age out.
const TERMINAL_RECORD_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone)]
pub struct RotationManagerConfig {
    pub default_transition_minutes: u64,
    pub min_transition_minutes: u64,
    /// TTL of the per-client lease held across mutations.
    pub lock_ttl: Duration,
    /// How long a rotation lingers in `OldDeprecated` before the driver
    /// finalizes it. Sized to the token lifetime so cached sessions reach
    /// their natural expiry first.
    pub finalize_grace: Duration,
}

impl Default for RotationManagerConfig {
    fn default() -> Self {
        Self {
            default_transition_minutes: 60,
            min_transition_minutes: 5,
            lock_ttl: Duration::from_secs(30),
            finalize_grace: Duration::from_secs(3600),
        }
    }
}

/// Result of starting a rotation: the record plus the one and only copy of
/// the new raw secret. It is handed to the operator and never stored.
pub struct InitiatedRotation {
    pub record: RotationRecord,
    pub new_secret: SecretString,
}

/// Drives rotation state against the store and cache.
///
/// Every mutating entry point runs under the per-client cache lease, so a
/// second driver (or a concurrent manual request) skips or fails fast
/// instead of interleaving writes.
pub struct RotationManager {
    store: Arc<dyn SecretStore>,
    cache: Arc<dyn Cache>,
    lease: CacheLease,
    hasher: SecretHasher,
    clock: Arc<dyn Clock>,
    config: RotationManagerConfig,
}

impl RotationManager {
    pub fn new(
        store: Arc<dyn SecretStore>,
        cache: Arc<dyn Cache>,
        clock: Arc<dyn Clock>,
        config: RotationManagerConfig,
    ) -> Self {
        Self {
            store,
            lease: CacheLease::new(Arc::clone(&cache), config.lock_ttl),
            cache,
            hasher: SecretHasher::new(),
            clock,
            config,
        }
    }

    /// Start a rotation for `client_id`.
    ///
    /// Writes the new version record and the transition record, but leaves
    /// the new version unacceptable until the driver publishes
    /// `DualActive`. With `force`, a live rotation is abandoned in place
    /// and a fresh one begins from the current default record.
    #[tracing::instrument(skip(self), fields(client_id = %client_id))]
    pub async fn initiate(
        &self,
        client_id: &ClientId,
        transition_minutes: Option<u64>,
        force: bool,
    ) -> Result<InitiatedRotation, RotationError> {
        let minutes = transition_minutes.unwrap_or(self.config.default_transition_minutes);
        if minutes < self.config.min_transition_minutes {
            return Err(RotationError::WindowTooShort {
                requested: minutes,
                minimum: self.config.min_transition_minutes,
            });
        }

        self.with_lease(client_id, async || {
            if let Some(existing) = self.read_record(client_id).await? {
                if !existing.is_terminal() && !force {
                    return Err(RotationError::Conflict {
                        client_id: client_id.clone(),
                    });
                }
            }

            let current_bytes = self
                .store
                .get_secret(&paths::cred_default(client_id))
                .await
                .map_err(|e| {
                    if e.is_not_found() {
                        RotationError::NotFound {
                            client_id: client_id.clone(),
                        }
                    } else {
                        RotationError::Store(e)
                    }
                })?;
            let current = ClientCredential::from_bytes(&current_bytes)?;

            // Make sure the old version is reachable per-version; the
            // authentication path reads candidates at their version paths.
            self.store
                .put_secret(
                    &paths::cred_version(client_id, &current.version),
                    &current.to_bytes()?,
                )
                .await?;

            let new_secret = generate_client_secret();
            let new_version = generate_version();
            let hashed = self
                .hasher
                .hash(&new_secret)
                .map_err(|e| RotationError::Corrupt(e.to_string()))?;
            let new_record = ClientCredential::new(
                client_id.clone(),
                new_version.clone(),
                hashed,
                self.clock.now(),
                current.permissions.clone(),
            );

            let result: Result<RotationRecord, RotationError> = async {
                self.store
                    .put_secret(
                        &paths::cred_version(client_id, &new_version),
                        &new_record.to_bytes()?,
                    )
                    .await?;

                let transition =
                    TransitionRecord::new(client_id.clone(), &current.version, &new_version);
                self.store
                    .put_secret(&paths::transition(client_id), &transition.to_bytes()?)
                    .await?;

                let record = RotationRecord::new(
                    client_id.clone(),
                    &current.version,
                    &new_version,
                    minutes,
                    self.clock.now(),
                );
                self.write_record(&record).await?;
                Ok(record)
            }
            .await;

            match result {
                Ok(record) => {
                    tracing::info!(
                        rotation_id = %record.rotation_id,
                        old_version = %record.old_version,
                        new_version = %record.new_version,
                        transition_minutes = minutes,
                        "rotation initiated"
                    );
                    Ok(InitiatedRotation { record, new_secret })
                }
                Err(e) => {
                    // Failure before the rotation existed: remove what was
                    // written so nothing half-initiated lingers.
                    let _ = self
                        .store
                        .delete_secret(&paths::cred_version(client_id, &new_version))
                        .await;
                    let _ = self.store.delete_secret(&paths::transition(client_id)).await;
                    Err(e)
                }
            }
        })
        .await
    }

    /// Manually advance one state on the success path.
    #[tracing::instrument(skip(self), fields(client_id = %client_id))]
    pub async fn advance(&self, client_id: &ClientId) -> Result<RotationRecord, RotationError> {
        self.with_lease(client_id, async || {
            let record = self
                .read_record(client_id)
                .await?
                .ok_or_else(|| RotationError::NotFound {
                    client_id: client_id.clone(),
                })?;
            match record.current_state.next() {
                Some(target) => self.apply_locked(record, target).await,
                // Terminal: advancing again is a no-op, not an error.
                None => Ok(record),
            }
        })
        .await
    }

    /// Apply a specific transition. Re-applying the state the rotation is
    /// already in returns the record unchanged.
    #[tracing::instrument(skip(self), fields(client_id = %client_id, target = %target))]
    pub async fn apply(
        &self,
        client_id: &ClientId,
        target: TransitionState,
    ) -> Result<RotationRecord, RotationError> {
        self.with_lease(client_id, async || {
            let record = self
                .read_record(client_id)
                .await?
                .ok_or_else(|| RotationError::NotFound {
                    client_id: client_id.clone(),
                })?;
            if record.current_state == target {
                return Ok(record);
            }
            self.apply_locked(record, target).await
        })
        .await
    }

    /// Cancel a running rotation, restoring the pre-rotation state.
    #[tracing::instrument(skip(self), fields(client_id = %client_id))]
    pub async fn cancel(&self, client_id: &ClientId) -> Result<RotationRecord, RotationError> {
        self.apply(client_id, TransitionState::Failed).await
    }

    /// Current rotation record, if any.
    pub async fn status(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<RotationRecord>, RotationError> {
        self.read_record(client_id).await
    }

    /// Clients with a rotation record in the cache, terminal or not.
    pub async fn tracked_clients(&self) -> Result<Vec<ClientId>, RotationError> {
        let mut clients = Vec::new();
        for key in self.cache.scan_prefix("rotation:").await? {
            if let Some(raw) = key.strip_prefix("rotation:") {
                if let Ok(id) = ClientId::new(raw) {
                    clients.push(id);
                }
            }
        }
        Ok(clients)
    }

    /// Driver entry point: advance every transition whose time condition
    /// has been met. Skips silently when the lease is held elsewhere.
    #[tracing::instrument(skip(self), fields(client_id = %client_id))]
    pub async fn tick(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<RotationRecord>, RotationError> {
        let outcome = self
            .with_lease(client_id, async || {
                let mut current = None;
                loop {
                    let Some(record) = self.read_record(client_id).await? else {
                        return Ok(current);
                    };
                    if record.is_terminal() {
                        return Ok(current);
                    }
                    let Some(target) = self.due_target(&record).await else {
                        return Ok(current);
                    };
                    current = Some(self.apply_locked(record, target).await?);
                }
            })
            .await;

        match outcome {
            Err(RotationError::Busy { .. }) => {
                tracing::debug!("rotation lease held elsewhere, skipping tick");
                Ok(None)
            }
            other => other,
        }
    }

    /// The next transition whose time condition is currently satisfied.
    /// The dual-validity window boundary lives in the stored transition
    /// record; an unreadable record simply means "not due yet".
    async fn due_target(&self, record: &RotationRecord) -> Option<TransitionState> {
        let now = self.clock.now();
        match record.current_state {
            // Publication has no time condition; the first tick does it.
            TransitionState::Initiated => Some(TransitionState::DualActive),
            TransitionState::DualActive | TransitionState::OldDeprecated => {
                let transition = match self.read_transition(&record.client_id).await {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(
                            client_id = %record.client_id,
                            error = %e,
                            "transition record unreadable during tick"
                        );
                        return None;
                    }
                };
                let end = transition.end_time?;
                if record.current_state == TransitionState::DualActive {
                    (now >= end).then_some(TransitionState::OldDeprecated)
                } else {
                    let grace =
                        ChronoDuration::from_std(self.config.finalize_grace).unwrap_or_default();
                    (now >= end + grace).then_some(TransitionState::NewActive)
                }
            }
            TransitionState::NewActive | TransitionState::Failed => None,
        }
    }

    // ── transition side effects ────────────────────────────────────────────

    /// Validate the edge and run its side effects. Must hold the lease.
    async fn apply_locked(
        &self,
        mut record: RotationRecord,
        target: TransitionState,
    ) -> Result<RotationRecord, RotationError> {
        if !record.current_state.can_transition_to(target) {
            return Err(RotationError::InvalidTransition {
                from: record.current_state,
                to: target,
            });
        }

        let from = record.current_state;
        let effects = match target {
            TransitionState::DualActive => self.publish_dual_active(&record).await,
            TransitionState::OldDeprecated => self.deprecate_old(&record).await,
            TransitionState::NewActive => self.finalize(&record).await,
            TransitionState::Failed => self.roll_back(&record).await,
            TransitionState::Initiated => unreachable!("no edge leads back to initiated"),
        };

        match effects {
            Ok(()) => {
                record.enter(target, self.clock.now());
                self.write_record(&record).await?;
                tracing::info!(
                    rotation_id = %record.rotation_id,
                    from = %from,
                    to = %target,
                    "rotation advanced"
                );
                Ok(record)
            }
            Err(e) if target != TransitionState::Failed => {
                // A failed advance fails the rotation and restores the
                // pre-rotation state; the original error still surfaces.
                tracing::warn!(
                    rotation_id = %record.rotation_id,
                    from = %from,
                    to = %target,
                    error = %e,
                    "rotation advance failed, rolling back"
                );
                if let Err(rollback_err) = self.roll_back(&record).await {
                    tracing::error!(
                        rotation_id = %record.rotation_id,
                        error = %rollback_err,
                        "rollback after failed advance also failed"
                    );
                }
                record.enter(TransitionState::Failed, self.clock.now());
                if let Err(persist_err) = self.write_record(&record).await {
                    tracing::error!(
                        rotation_id = %record.rotation_id,
                        error = %persist_err,
                        "failed to persist failed rotation record"
                    );
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// `Initiated → DualActive`: open the dual-validity window.
    async fn publish_dual_active(&self, record: &RotationRecord) -> Result<(), RotationError> {
        let now = self.clock.now();
        let mut transition = self.read_transition(&record.client_id).await?;
        transition.state = TransitionState::DualActive;
        transition.start_time = Some(now);
        transition.end_time =
            Some(now + ChronoDuration::minutes(record.transition_period_minutes as i64));
        self.store
            .put_secret(
                &paths::transition(&record.client_id),
                &transition.to_bytes()?,
            )
            .await?;
        self.invalidate_acceptance_caches(&record.client_id).await;
        Ok(())
    }

    /// `DualActive → OldDeprecated`: demote the old version.
    async fn deprecate_old(&self, record: &RotationRecord) -> Result<(), RotationError> {
        let old_path = paths::cred_version(&record.client_id, &record.old_version);
        let old = self.read_credential(&old_path).await?;
        self.store
            .put_secret(
                &old_path,
                &old.with_status(CredentialStatus::Deprecated).to_bytes()?,
            )
            .await?;

        let mut transition = self.read_transition(&record.client_id).await?;
        transition.state = TransitionState::OldDeprecated;
        self.store
            .put_secret(
                &paths::transition(&record.client_id),
                &transition.to_bytes()?,
            )
            .await?;
        // Cached tokens are left alone here on purpose: ongoing sessions
        // ride their tokens to natural expiry. Only new authentications
        // (cache misses) see the demoted status.
        self.invalidate_acceptance_caches(&record.client_id).await;
        Ok(())
    }

    /// `OldDeprecated → NewActive`: the new version becomes the sole
    /// default, the old version and the transition record disappear, and
    /// every cached token for the client is dropped.
    async fn finalize(&self, record: &RotationRecord) -> Result<(), RotationError> {
        let new = self
            .read_credential(&paths::cred_version(&record.client_id, &record.new_version))
            .await?;
        self.store
            .put_secret(&paths::cred_default(&record.client_id), &new.to_bytes()?)
            .await?;
        self.store
            .delete_secret(&paths::cred_version(&record.client_id, &record.old_version))
            .await?;
        self.store
            .delete_secret(&paths::transition(&record.client_id))
            .await?;

        self.invalidate_acceptance_caches(&record.client_id).await;
        let _ = self
            .cache
            .invalidate_prefix(&keys::token_prefix(&record.client_id))
            .await;
        Ok(())
    }

    /// `* → Failed`: undo whatever the originating state had done.
    async fn roll_back(&self, record: &RotationRecord) -> Result<(), RotationError> {
        match record.current_state {
            TransitionState::Initiated | TransitionState::DualActive => {
                self.store
                    .delete_secret(&paths::transition(&record.client_id))
                    .await?;
                self.store
                    .delete_secret(&paths::cred_version(&record.client_id, &record.new_version))
                    .await?;
            }
            TransitionState::OldDeprecated => {
                // Reactivate the old version before removing the new one.
                let old_path = paths::cred_version(&record.client_id, &record.old_version);
                let old = self.read_credential(&old_path).await?;
                let restored = old.with_status(CredentialStatus::Active);
                self.store
                    .put_secret(&old_path, &restored.to_bytes()?)
                    .await?;
                self.store
                    .put_secret(
                        &paths::cred_default(&record.client_id),
                        &restored.to_bytes()?,
                    )
                    .await?;
                self.store
                    .delete_secret(&paths::transition(&record.client_id))
                    .await?;
                self.store
                    .delete_secret(&paths::cred_version(&record.client_id, &record.new_version))
                    .await?;
            }
            TransitionState::NewActive | TransitionState::Failed => {
                // can_transition_to already rejects these.
            }
        }

        self.invalidate_acceptance_caches(&record.client_id).await;
        let _ = self
            .cache
            .invalidate_prefix(&keys::token_prefix(&record.client_id))
            .await;
        Ok(())
    }

    // ── plumbing ───────────────────────────────────────────────────────────

    async fn with_lease<T>(
        &self,
        client_id: &ClientId,
        op: impl AsyncFnOnce() -> Result<T, RotationError>,
    ) -> Result<T, RotationError> {
        let Some(guard) = self.lease.try_acquire(client_id).await? else {
            return Err(RotationError::Busy {
                client_id: client_id.clone(),
            });
        };
        let result = op().await;
        if let Err(e) = guard.release().await {
            tracing::warn!(client_id = %client_id, error = %e, "lease release failed");
        }
        result
    }

    async fn read_record(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<RotationRecord>, RotationError> {
        match self.cache.get(&keys::rotation(client_id)).await? {
            Some(bytes) => Ok(Some(RotationRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_record(&self, record: &RotationRecord) -> Result<(), RotationError> {
        let ttl = if record.is_terminal() {
            TERMINAL_RECORD_TTL
        } else {
            RUNNING_RECORD_TTL
        };
        self.cache
            .set_with_ttl(&keys::rotation(&record.client_id), &record.to_bytes()?, ttl)
            .await?;
        Ok(())
    }

    async fn read_credential(&self, path: &str) -> Result<ClientCredential, RotationError> {
        let bytes = self.store.get_secret(path).await.map_err(|e| {
            if e.is_not_found() {
                // Mid-rotation reads expect the record to exist; absence
                // means the store was mutated out from under the rotation.
                RotationError::Corrupt(format!("missing credential record at '{path}'"))
            } else {
                RotationError::Store(e)
            }
        })?;
        Ok(ClientCredential::from_bytes(&bytes)?)
    }

    async fn read_transition(
        &self,
        client_id: &ClientId,
    ) -> Result<TransitionRecord, RotationError> {
        let bytes = self
            .store
            .get_secret(&paths::transition(client_id))
            .await?;
        Ok(TransitionRecord::from_bytes(&bytes)?)
    }

    /// Drop every cached view that feeds the acceptable-version decision.
    async fn invalidate_acceptance_caches(&self, client_id: &ClientId) {
        for key in [keys::cred_meta(client_id), keys::transition(client_id)] {
            if let Err(e) = self.cache.delete(&key).await {
                tracing::warn!(key, error = %e, "cache invalidation failed");
            }
        }
    }
}
