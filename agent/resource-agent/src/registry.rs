use crate::error::{self, RegistryError};
use crate::provider::{ErrorKind, ProviderError, RemoteClient, ResourceKind, Resources, StateMapper};
use crate::reconciler::{ReconcileError, Reconciled, Reconciler};
use async_trait::async_trait;
use reconcile_model::{Configuration, IdentityKey, LifecycleState};
use serde::Serialize;
use serde_json::Value;
use snafu::ensure;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use tokio_util::sync::CancellationToken;

/// What a [`ResourceDriver`] returns on success.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverOutput {
    pub identity: IdentityKey,
    pub state: LifecycleState,
    /// The remote object as the backend returned it.
    pub object: Option<Value>,
    /// The remote object mapped back into the shape of the desired spec.
    pub observed: Option<Value>,
}

pub type DriverError = ReconcileError<Value>;

/// The two caller-facing entry points of a resource type, with specs and objects carried as
/// untyped JSON so that drivers for different types can live in one [`Registry`].
#[async_trait]
pub trait ResourceDriver: Send + Sync {
    fn type_name(&self) -> &'static str;

    async fn reconcile(
        &self,
        desired: Value,
        previous: Option<Value>,
        existing: Option<IdentityKey>,
        cancel: &CancellationToken,
    ) -> Result<DriverOutput, DriverError>;

    async fn destroy(
        &self,
        identity: &IdentityKey,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError>;
}

fn to_value<T: Serialize>(value: T) -> Value {
    serde_json::to_value(value)
        .unwrap_or_else(|e| Value::String(format!("Serialization failed: {}", e)))
}

fn spec_error(
    type_name: &str,
    which: &str,
    identity: Option<IdentityKey>,
    source: reconcile_model::Error,
) -> DriverError {
    ReconcileError {
        identity,
        last_object: None,
        state: LifecycleState::Absent,
        error: ProviderError::new_with_source_and_context(
            Resources::Clear,
            format!("Invalid {} spec for {}", which, type_name),
            source,
        )
        .with_kind(ErrorKind::Config),
    }
}

#[async_trait]
impl<K, C, M> ResourceDriver for Reconciler<K, C, M>
where
    K: ResourceKind,
    C: RemoteClient<K> + 'static,
    M: StateMapper<K> + 'static,
{
    fn type_name(&self) -> &'static str {
        K::NAME
    }

    async fn reconcile(
        &self,
        desired: Value,
        previous: Option<Value>,
        existing: Option<IdentityKey>,
        cancel: &CancellationToken,
    ) -> Result<DriverOutput, DriverError> {
        let desired = K::Spec::from_value(desired)
            .map_err(|e| spec_error(K::NAME, "desired", existing.clone(), e))?;
        let previous = previous
            .map(K::Spec::from_value)
            .transpose()
            .map_err(|e| spec_error(K::NAME, "previous", existing.clone(), e))?;

        let Reconciled {
            identity,
            object,
            state,
        } = Reconciler::reconcile(self, &desired, previous.as_ref(), existing.as_ref(), cancel)
            .await
            .map_err(|e| e.map_object(to_value))?;

        Ok(DriverOutput {
            identity,
            state,
            observed: object
                .as_ref()
                .map(|object| to_value(self.mapper().from_remote(object))),
            object: object.map(to_value),
        })
    }

    async fn destroy(
        &self,
        identity: &IdentityKey,
        cancel: &CancellationToken,
    ) -> Result<(), DriverError> {
        Reconciler::destroy(self, identity, cancel)
            .await
            .map_err(|e| e.map_object(to_value))
    }
}

/// The explicit table of resource types, built at startup and passed by reference.
#[derive(Default)]
pub struct Registry {
    drivers: BTreeMap<&'static str, Box<dyn ResourceDriver>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<D>(&mut self, driver: D) -> Result<&mut Self, RegistryError>
    where
        D: ResourceDriver + 'static,
    {
        let type_name = driver.type_name();
        ensure!(
            !self.drivers.contains_key(type_name),
            error::DuplicateSnafu { type_name }
        );
        self.drivers.insert(type_name, Box::new(driver));
        Ok(self)
    }

    pub fn get(&self, type_name: &str) -> Option<&dyn ResourceDriver> {
        self.drivers.get(type_name).map(|driver| driver.as_ref())
    }

    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.drivers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.drivers.keys()).finish()
    }
}
