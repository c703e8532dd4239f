use crate::config::ResourceConfig;
use crate::json_display;
use crate::poller::{wait_for_state, Probe, StatusWait, WaitError};
use crate::provider::{
    join_failure_causes, ErrorKind, OperationHandle, ProviderError, ProviderResult, RemoteClient,
    ResourceKind, Resources, StateMapper, StatusSource, Updated,
};
use crate::remote::{RemoteError, RemoteResult};
use crate::retry::retry_when;
use log::{debug, info, warn};
use reconcile_model::{IdentityKey, LifecycleState, RetrySettings};
use std::fmt::{Debug, Display, Formatter};
use std::marker::PhantomData;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A successful reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub struct Reconciled<O> {
    pub identity: IdentityKey,
    /// The final remote object, `None` once it has been deleted.
    pub object: Option<O>,
    pub state: LifecycleState,
}

/// A failed reconciliation. Carries everything the caller needs to render a diagnostic and to
/// decide what to track: the identity if one was assigned (a created-but-never-active object
/// still has one), the last object observed, and the state the attempt ended in.
#[derive(Debug)]
pub struct ReconcileError<O> {
    pub identity: Option<IdentityKey>,
    pub last_object: Option<O>,
    pub state: LifecycleState,
    pub error: ProviderError,
}

pub type ReconcileResult<O> = std::result::Result<Reconciled<O>, ReconcileError<O>>;

impl<O> ReconcileError<O> {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn resources(&self) -> Resources {
        self.error.resources()
    }

    pub fn map_object<P, F>(self, f: F) -> ReconcileError<P>
    where
        F: FnOnce(O) -> P,
    {
        ReconcileError {
            identity: self.identity,
            last_object: self.last_object.map(f),
            state: self.state,
            error: self.error,
        }
    }
}

impl<O> Display for ReconcileError<O> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.identity {
            Some(identity) => write!(
                f,
                "Reconciliation of '{}' ended in state '{}': {}",
                identity, self.state, self.error
            ),
            None => write!(
                f,
                "Reconciliation ended in state '{}': {}",
                self.state, self.error
            ),
        }
    }
}

impl<O: Debug> std::error::Error for ReconcileError<O> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

fn remote_error_kind(error: &RemoteError) -> ErrorKind {
    match error {
        RemoteError::NotFound { .. } => ErrorKind::NotFound,
        RemoteError::Api { .. } => ErrorKind::Rejected,
        RemoteError::EmptyResult { .. } => ErrorKind::Inconsistency,
        RemoteError::Unsupported { .. } => ErrorKind::Config,
        RemoteError::Cancelled { .. } => ErrorKind::Cancelled,
        RemoteError::Transport { .. } => ErrorKind::Other,
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Drives one resource kind through its lifecycle by combining a [`RemoteClient`], a
/// [`StateMapper`], the retry classifier and the poller according to a [`ResourceConfig`].
///
/// A `Reconciler` holds no mutable state; every decision is made from a fresh read, so one
/// instance may reconcile distinct identities concurrently.
pub struct Reconciler<K, C, M> {
    config: ResourceConfig,
    client: C,
    mapper: M,
    kind: PhantomData<fn() -> K>,
}

impl<K, C, M> Reconciler<K, C, M>
where
    K: ResourceKind,
    C: RemoteClient<K>,
    M: StateMapper<K>,
{
    pub fn new(config: ResourceConfig, client: C, mapper: M) -> Self {
        Self {
            config,
            client,
            mapper,
            kind: PhantomData,
        }
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn mapper(&self) -> &M {
        &self.mapper
    }

    /// Bring the remote object in line with `desired`.
    ///
    /// - With no `existing` identity the object is created.
    /// - If the object has disappeared out of band, or is left over from a failed create, it is
    ///   created again. Recreating a failed object discards whatever configuration the failed
    ///   object held; this is expected.
    /// - If the change cannot be made in place, the object is replaced.
    /// - Otherwise the fields that differ from `previous` (or from the remote object itself when
    ///   `previous` is unknown) are updated.
    pub async fn reconcile(
        &self,
        desired: &K::Spec,
        previous: Option<&K::Spec>,
        existing: Option<&IdentityKey>,
        cancel: &CancellationToken,
    ) -> ReconcileResult<K::Object> {
        let identity = match existing {
            None => return self.create(desired, cancel).await,
            Some(identity) => identity,
        };
        self.validate_identity(identity)?;

        let current = match self.read(identity).await {
            Ok(Some(current)) => current,
            Ok(None) => {
                warn!(
                    "{} '{}' no longer exists, creating it again",
                    K::NAME,
                    identity
                );
                return self.create(desired, cancel).await;
            }
            Err(error) => {
                return Err(self.fail(Some(identity), LifecycleState::Active, None, error));
            }
        };

        if let Some(status) = current.status() {
            if self.config.is_create_failure(status) {
                warn!(
                    "{} '{}' is in status '{}' from a failed create, replacing it",
                    K::NAME,
                    identity,
                    status
                );
                return self.replace(identity, desired, cancel).await;
            }
        }

        let baseline = match previous {
            Some(previous) => previous.clone(),
            None => self.mapper.from_remote(&current),
        };
        if self.mapper.requires_replacement(&baseline, desired) {
            info!("Changes to {} '{}' require replacement", K::NAME, identity);
            return self.replace(identity, desired, cancel).await;
        }

        self.update_from(identity, desired, &baseline, Some(current), cancel)
            .await
    }

    /// Delete the object. An object that is already gone is not an error.
    pub async fn destroy(
        &self,
        identity: &IdentityKey,
        cancel: &CancellationToken,
    ) -> Result<(), ReconcileError<K::Object>> {
        self.validate_identity(identity)?;
        self.delete(identity, cancel).await.map(|_| ())
    }

    /// Create the object and wait for it to become active.
    pub async fn create(
        &self,
        desired: &K::Spec,
        cancel: &CancellationToken,
    ) -> ReconcileResult<K::Object> {
        let deadline = Instant::now() + self.config.timeouts.create;
        let state = self.transition(None, LifecycleState::Absent, LifecycleState::Creating);
        let request = self.mapper.to_remote(desired);
        // Requests can carry secrets that only their Debug impl redacts.
        debug!("Creating {} with {:?}", K::NAME, request);

        let created = retry_when(
            &self.retry_settings(deadline),
            cancel,
            &format!("create {}", K::NAME),
            || self.client.create(&request),
            self.config.retry_create,
        )
        .await
        .map_err(|e| {
            // A transport failure may have happened after the backend accepted the call.
            let resources = match e {
                RemoteError::Transport { .. } => Resources::Unknown,
                _ => Resources::Clear,
            };
            self.remote_failure(
                None,
                self.transition(None, state, LifecycleState::CreateFailed),
                None,
                resources,
                format!("Unable to create {}", K::NAME),
                e,
            )
        })?;

        let identity = self.mapper.identity(desired, &created).map_err(|e| {
            self.fail(
                None,
                self.transition(None, state, LifecycleState::CreateFailed),
                Some(created.clone()),
                ProviderError::new_with_source_and_context(
                    Resources::Orphaned,
                    format!("Created {} but unable to derive its identity", K::NAME),
                    e,
                )
                .with_kind(ErrorKind::Inconsistency),
            )
        })?;
        info!("Created {} '{}'", K::NAME, identity);

        let mut object = match &self.config.create_wait {
            Some(wait) => self
                .wait_for_object(wait, &identity, deadline, cancel)
                .await
                .map_err(|e| {
                    let (error, last) = self.wait_error(
                        e,
                        Resources::Remaining,
                        format!("waiting for {} '{}' to be created", K::NAME, identity),
                        self.config.create_failure_hint,
                    );
                    self.fail(
                        Some(&identity),
                        self.transition(Some(&identity), state, LifecycleState::CreateFailed),
                        last,
                        error,
                    )
                })?,
            None => created,
        };

        if let Some(definition) = self.mapper.definition(desired) {
            object = self
                .import_and_reassert(&identity, desired, &definition, deadline, cancel, state)
                .await?;
        }

        if self.config.create_wait.is_none() {
            object = self
                .read_required(&identity, LifecycleState::CreateFailed, Resources::Unknown)
                .await?;
        }

        let state = self.transition(Some(&identity), state, LifecycleState::Active);
        Ok(Reconciled {
            identity,
            object: Some(object),
            state,
        })
    }

    /// Fetch the object. `None` means it no longer exists and should be dropped from tracked
    /// state.
    pub async fn read(&self, identity: &IdentityKey) -> ProviderResult<Option<K::Object>> {
        match self.client.get(identity).await {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_not_found() => {
                debug!("{} '{}' not found", K::NAME, identity);
                Ok(None)
            }
            Err(e) => {
                let kind = remote_error_kind(&e);
                Err(ProviderError::new_with_source_and_context(
                    Resources::Unknown,
                    format!("Unable to read {} '{}'", K::NAME, identity),
                    e,
                )
                .with_kind(kind))
            }
        }
    }

    /// Send the fields that changed between `previous` and `desired`, then wait for the update
    /// to finish.
    pub async fn update(
        &self,
        identity: &IdentityKey,
        desired: &K::Spec,
        previous: &K::Spec,
        cancel: &CancellationToken,
    ) -> ReconcileResult<K::Object> {
        self.update_from(identity, desired, previous, None, cancel)
            .await
    }

    /// Delete the object and wait for it to disappear.
    pub async fn delete(
        &self,
        identity: &IdentityKey,
        cancel: &CancellationToken,
    ) -> ReconcileResult<K::Object> {
        let deadline = Instant::now() + self.config.timeouts.delete;
        let state = self.transition(
            Some(identity),
            LifecycleState::Active,
            LifecycleState::Deleting,
        );

        match retry_when(
            &self.retry_settings(deadline),
            cancel,
            &format!("delete {} '{}'", K::NAME, identity),
            || self.client.delete(identity),
            self.config.retry_delete,
        )
        .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!("{} '{}' was already deleted", K::NAME, identity);
                return Ok(self.absent(identity, state));
            }
            Err(e) => {
                return Err(self.remote_failure(
                    Some(identity),
                    self.transition(Some(identity), state, LifecycleState::DeleteFailed),
                    None,
                    Resources::Remaining,
                    format!("Unable to delete {} '{}'", K::NAME, identity),
                    e,
                ));
            }
        }

        if let Some(wait) = &self.config.delete_wait {
            let result = wait_for_state(
                wait,
                &self.config.poll,
                remaining(deadline),
                cancel,
                || self.probe_object(identity),
            )
            .await;
            if let Err(e) = result {
                let (error, last) = self.wait_error(
                    e,
                    Resources::Remaining,
                    format!("waiting for {} '{}' to be deleted", K::NAME, identity),
                    None,
                );
                return Err(self.fail(
                    Some(identity),
                    self.transition(Some(identity), state, LifecycleState::DeleteFailed),
                    last,
                    error,
                ));
            }
        }

        info!("Deleted {} '{}'", K::NAME, identity);
        Ok(self.absent(identity, state))
    }

    async fn replace(
        &self,
        identity: &IdentityKey,
        desired: &K::Spec,
        cancel: &CancellationToken,
    ) -> ReconcileResult<K::Object> {
        self.delete(identity, cancel).await?;
        self.create(desired, cancel).await
    }

    async fn update_from(
        &self,
        identity: &IdentityKey,
        desired: &K::Spec,
        previous: &K::Spec,
        current: Option<K::Object>,
        cancel: &CancellationToken,
    ) -> ReconcileResult<K::Object> {
        let deadline = Instant::now() + self.config.timeouts.update;
        let previous_definition = self.mapper.definition(previous);
        let changed_definition = self
            .mapper
            .definition(desired)
            .filter(|definition| match &previous_definition {
                Some(previous) => self.mapper.definition_changed(previous, definition),
                None => true,
            });

        let object = if let Some(definition) = changed_definition {
            let state = self.transition(
                Some(identity),
                LifecycleState::Active,
                LifecycleState::Updating,
            );
            self.import_and_reassert(identity, desired, &definition, deadline, cancel, state)
                .await?
        } else if let Some(delta) = self.mapper.delta(previous, desired) {
            let state = self.transition(
                Some(identity),
                LifecycleState::Active,
                LifecycleState::Updating,
            );
            self.apply_delta(identity, desired, &delta, deadline, cancel, state)
                .await?
        } else {
            debug!("{} '{}' is up to date", K::NAME, identity);
            let object = match current {
                Some(object) => object,
                None => {
                    self.read_required(identity, LifecycleState::Active, Resources::Unknown)
                        .await?
                }
            };
            return Ok(Reconciled {
                identity: identity.clone(),
                object: Some(object),
                state: LifecycleState::Active,
            });
        };

        info!("Updated {} '{}'", K::NAME, identity);
        Ok(Reconciled {
            identity: identity.clone(),
            object: Some(object),
            state: self.transition(
                Some(identity),
                LifecycleState::Updating,
                LifecycleState::Active,
            ),
        })
    }

    /// Replace the object's definition in bulk, then patch back any field the import reset.
    async fn import_and_reassert(
        &self,
        identity: &IdentityKey,
        desired: &K::Spec,
        definition: &K::Definition,
        deadline: Instant,
        cancel: &CancellationToken,
        state: LifecycleState,
    ) -> Result<K::Object, ReconcileError<K::Object>> {
        let failed = state.failed().unwrap_or(state);
        let produced = retry_when(
            &self.retry_settings(deadline),
            cancel,
            &format!("import {} '{}' definition", K::NAME, identity),
            || self.client.import_definition(identity, definition),
            self.config.retry_update,
        )
        .await
        .map_err(|e| {
            self.remote_failure(
                Some(identity),
                self.transition(Some(identity), state, failed),
                None,
                Resources::Remaining,
                format!("Unable to import definition of {} '{}'", K::NAME, identity),
                e,
            )
        })?;
        debug!("Imported definition of {} '{}'", K::NAME, identity);

        match self.mapper.reassert(desired, &produced) {
            None => Ok(produced),
            Some(delta) => {
                debug!(
                    "Reasserting fields of {} '{}' after import: {:?}",
                    K::NAME,
                    identity,
                    delta
                );
                self.apply_delta(identity, desired, &delta, deadline, cancel, state)
                    .await
            }
        }
    }

    async fn apply_delta(
        &self,
        identity: &IdentityKey,
        desired: &K::Spec,
        delta: &K::Delta,
        deadline: Instant,
        cancel: &CancellationToken,
        state: LifecycleState,
    ) -> Result<K::Object, ReconcileError<K::Object>> {
        debug!(
            "Updating {} '{}' with {}",
            K::NAME,
            identity,
            json_display(delta)
        );
        let failed = state.failed().unwrap_or(state);
        let hint = if state == LifecycleState::Updating {
            self.mapper.update_failure_hint(desired)
        } else {
            None
        };

        let updated = retry_when(
            &self.retry_settings(deadline),
            cancel,
            &format!("update {} '{}'", K::NAME, identity),
            || self.client.update(identity, delta),
            self.config.retry_update,
        )
        .await
        .map_err(|e| {
            self.remote_failure(
                Some(identity),
                self.transition(Some(identity), state, failed),
                None,
                Resources::Remaining,
                format!("Unable to update {} '{}'", K::NAME, identity),
                e,
            )
        })?;

        match updated {
            Updated::Object(object) => match &self.config.update_wait {
                None => Ok(object),
                Some(wait) => self
                    .wait_for_object(wait, identity, deadline, cancel)
                    .await
                    .map_err(|e| {
                        let (error, last) = self.wait_error(
                            e,
                            Resources::Remaining,
                            format!("waiting for {} '{}' to be updated", K::NAME, identity),
                            hint.as_deref(),
                        );
                        self.fail(
                            Some(identity),
                            self.transition(Some(identity), state, failed),
                            last,
                            error,
                        )
                    }),
            },
            Updated::Operation(operation) => {
                let operation_id = operation.operation_id().to_string();
                debug!(
                    "Update of {} '{}' is running as operation '{}'",
                    K::NAME,
                    identity,
                    operation_id
                );
                if let Some(wait) = &self.config.operation_wait {
                    let result = wait_for_state(
                        wait,
                        &self.config.poll,
                        remaining(deadline),
                        cancel,
                        || self.probe_operation(identity, &operation_id),
                    )
                    .await;
                    if let Err(e) = result {
                        let (error, _) = self.wait_error(
                            e,
                            Resources::Remaining,
                            format!(
                                "waiting for {} '{}' update ({})",
                                K::NAME,
                                identity,
                                operation_id
                            ),
                            hint.as_deref(),
                        );
                        let last = self.client.get(identity).await.ok();
                        return Err(self.fail(
                            Some(identity),
                            self.transition(Some(identity), state, failed),
                            last,
                            error,
                        ));
                    }
                }
                self.read_required(identity, failed, Resources::Remaining)
                    .await
            }
        }
    }

    async fn wait_for_object(
        &self,
        wait: &StatusWait,
        identity: &IdentityKey,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<K::Object, WaitError<K::Object>> {
        match wait_for_state(
            wait,
            &self.config.poll,
            remaining(deadline),
            cancel,
            || self.probe_object(identity),
        )
        .await?
        {
            Some(object) => Ok(object),
            // An absence target used where an object is required.
            None => Err(WaitError::NotFound {
                checks: 0,
                last: None,
            }),
        }
    }

    async fn probe_object(&self, identity: &IdentityKey) -> RemoteResult<Probe<K::Object>> {
        match self.client.get(identity).await {
            Ok(object) => {
                let status = object.status().unwrap_or_default().to_string();
                Ok(Probe::Found { object, status })
            }
            Err(e) if e.is_not_found() => Ok(Probe::NotFound),
            Err(e) => Err(e),
        }
    }

    async fn probe_operation(
        &self,
        identity: &IdentityKey,
        operation_id: &str,
    ) -> RemoteResult<Probe<K::Operation>> {
        match self.client.get_operation(identity, operation_id).await {
            Ok(operation) => {
                let status = operation.status().unwrap_or_default().to_string();
                Ok(Probe::Found {
                    object: operation,
                    status,
                })
            }
            Err(e) if e.is_not_found() => Ok(Probe::NotFound),
            Err(e) => Err(e),
        }
    }

    /// A read that must find the object.
    async fn read_required(
        &self,
        identity: &IdentityKey,
        state: LifecycleState,
        resources: Resources,
    ) -> Result<K::Object, ReconcileError<K::Object>> {
        match self.read(identity).await {
            Ok(Some(object)) => Ok(object),
            Ok(None) => Err(self.fail(
                Some(identity),
                state,
                None,
                ProviderError::new_with_context(
                    resources,
                    format!("{} '{}' not found after it was modified", K::NAME, identity),
                )
                .with_kind(ErrorKind::NotFound),
            )),
            Err(error) => Err(self.fail(Some(identity), state, None, error)),
        }
    }

    fn validate_identity(&self, identity: &IdentityKey) -> Result<(), ReconcileError<K::Object>> {
        self.config.identity.parse(identity).map(|_| ()).map_err(|e| {
            self.fail(
                Some(identity),
                LifecycleState::Active,
                None,
                ProviderError::new_with_source_and_context(
                    Resources::Unknown,
                    format!("Invalid {} identity", K::NAME),
                    e,
                )
                .with_kind(ErrorKind::Config),
            )
        })
    }

    /// Retries may use the configured retry budget but never more than what is left of the
    /// operation's timeout.
    fn retry_settings(&self, deadline: Instant) -> RetrySettings {
        RetrySettings::new(
            self.config.retry.timeout.min(remaining(deadline)),
            self.config.retry.backoff,
        )
    }

    fn transition(
        &self,
        identity: Option<&IdentityKey>,
        from: LifecycleState,
        to: LifecycleState,
    ) -> LifecycleState {
        let name = identity.map(IdentityKey::as_str).unwrap_or("<new>");
        if !from.can_transition_to(to) {
            warn!(
                "{} '{}': unexpected transition from '{}' to '{}'",
                K::NAME,
                name,
                from,
                to
            );
        }
        debug!("{} '{}': {} -> {}", K::NAME, name, from, to);
        to
    }

    fn absent(&self, identity: &IdentityKey, from: LifecycleState) -> Reconciled<K::Object> {
        Reconciled {
            identity: identity.clone(),
            object: None,
            state: self.transition(Some(identity), from, LifecycleState::Absent),
        }
    }

    fn fail(
        &self,
        identity: Option<&IdentityKey>,
        state: LifecycleState,
        last_object: Option<K::Object>,
        error: ProviderError,
    ) -> ReconcileError<K::Object> {
        debug!("{}: {}", K::NAME, error);
        ReconcileError {
            identity: identity.cloned(),
            last_object,
            state,
            error,
        }
    }

    fn remote_failure(
        &self,
        identity: Option<&IdentityKey>,
        state: LifecycleState,
        last_object: Option<K::Object>,
        resources: Resources,
        context: String,
        error: RemoteError,
    ) -> ReconcileError<K::Object> {
        let kind = remote_error_kind(&error);
        self.fail(
            identity,
            state,
            last_object,
            ProviderError::new_with_source_and_context(resources, context, error).with_kind(kind),
        )
    }

    /// Convert a failed wait into a `ProviderError`, collecting every structured failure cause
    /// the last observation reported.
    fn wait_error<T: StatusSource>(
        &self,
        error: WaitError<T>,
        resources: Resources,
        context: String,
        hint: Option<&str>,
    ) -> (ProviderError, Option<T>) {
        let kind = match &error {
            WaitError::NotFound { .. } => ErrorKind::NotFound,
            WaitError::UnexpectedStatus { .. } => ErrorKind::TerminalStatus,
            WaitError::Timeout { .. } => ErrorKind::Timeout,
            WaitError::Probe { source, .. } => remote_error_kind(source),
            WaitError::Cancelled { .. } => ErrorKind::Cancelled,
        };

        let mut message = match &error {
            WaitError::Probe { .. } => format!("{}: status probe failed", context),
            other => format!("{}: {}", context, other),
        };
        let causes = error
            .last()
            .and_then(|last| join_failure_causes(&last.failure_causes()));
        if let Some(causes) = causes {
            message.push_str(". last error: ");
            message.push_str(&causes);
        }
        if let Some(hint) = hint {
            message.push_str(". ");
            message.push_str(hint);
        }

        match error {
            WaitError::Probe { source, last } => (
                ProviderError::new_with_source_and_context(resources, message, source)
                    .with_kind(kind),
                last,
            ),
            other => (
                ProviderError::new_with_context(resources, message).with_kind(kind),
                other.into_last(),
            ),
        }
    }
}
