/*!

In-memory backends for the resource types in `resource-providers`. Each mock keeps its objects in
a map, answers `get` with a scripted sequence of statuses where the type has statuses, and
records the requests it receives so tests can inspect them.

!*/

use resource_agent::diff::{PatchOp, PatchOperation};
use resource_agent::provider::{FailureCause, RemoteClient, Updated};
use resource_agent::{IdentityKey, RemoteError, RemoteResult};
use resource_providers::appsync_type::{
    AppSyncType, GraphqlType, TypeKey, TypeSpec, UpdateTypeRequest,
};
use resource_providers::db_instance::{
    DbInstance, DbInstanceObject, DbInstanceSpec, UpdateDbInstanceRequest, STATUS_AVAILABLE,
    STATUS_CREATING,
};
use resource_providers::eks_addon::{
    Addon, AddonKey, AddonUpdate, CreateAddonRequest, EksAddon, UpdateAddonRequest,
    STATUS_CREATE_FAILED, STATUS_CREATING as ADDON_CREATING, UPDATE_FAILED, UPDATE_IN_PROGRESS,
};
use resource_providers::notification_channel::{
    Channel, NotificationChannel, NotificationChannelSpec,
};
use resource_providers::rest_api::{
    CreateRestApiRequest, RestApi, RestApiDefinition, RestApiObject,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Pop the next scripted status, repeating the last one once the script runs out.
fn next_status(script: &mut VecDeque<&'static str>) -> Option<&'static str> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().copied()
    }
}

fn lock<T>(backend: &Arc<Mutex<T>>) -> MutexGuard<'_, T> {
    backend.lock().unwrap()
}

#[derive(Debug, Default)]
pub(crate) struct AddonBackend {
    pub(crate) addons: HashMap<String, Addon>,
    /// Statuses reported by successive `get` calls.
    pub(crate) statuses: VecDeque<&'static str>,
    /// Health issues attached when an add-on reports `CREATE_FAILED`.
    pub(crate) issues: Vec<FailureCause>,
    pub(crate) create_errors: VecDeque<RemoteError>,
    /// Statuses reported by successive `get_operation` calls.
    pub(crate) update_statuses: VecDeque<&'static str>,
    pub(crate) update_errors: Vec<FailureCause>,
    pub(crate) creates: Vec<CreateAddonRequest>,
    pub(crate) updates: Vec<UpdateAddonRequest>,
    pub(crate) deletes: u32,
}

#[derive(Clone, Default)]
pub(crate) struct MockAddons {
    pub(crate) backend: Arc<Mutex<AddonBackend>>,
}

impl MockAddons {
    pub(crate) fn backend(&self) -> MutexGuard<'_, AddonBackend> {
        lock(&self.backend)
    }
}

#[async_trait::async_trait]
impl RemoteClient<EksAddon> for MockAddons {
    async fn create(&self, request: &CreateAddonRequest) -> RemoteResult<Addon> {
        let mut backend = self.backend();
        backend.creates.push(request.clone());
        if let Some(error) = backend.create_errors.pop_front() {
            return Err(error);
        }
        let addon = Addon {
            cluster_name: request.cluster_name.clone(),
            addon_name: request.addon_name.clone(),
            addon_version: request.addon_version.clone(),
            configuration_values: request.configuration_values.clone(),
            pod_identity_associations: request.pod_identity_associations.clone(),
            service_account_role_arn: request.service_account_role_arn.clone(),
            status: ADDON_CREATING.to_string(),
            tags: request.tags.clone(),
            ..Addon::default()
        };
        let id = format!("{}:{}", request.cluster_name, request.addon_name);
        backend.addons.insert(id, addon.clone());
        Ok(addon)
    }

    async fn get(&self, id: &IdentityKey) -> RemoteResult<Addon> {
        let key = AddonKey::parse(id).map_err(RemoteError::transport)?;
        let mut backend = self.backend();
        let status = next_status(&mut backend.statuses);
        let issues = backend.issues.clone();
        let addon = backend
            .addons
            .get_mut(&format!("{}:{}", key.cluster_name, key.addon_name))
            .ok_or_else(|| RemoteError::not_found(id.as_str()))?;
        if let Some(status) = status {
            addon.status = status.to_string();
            if status == STATUS_CREATE_FAILED {
                addon.issues = issues;
            }
        }
        Ok(addon.clone())
    }

    async fn update(
        &self,
        id: &IdentityKey,
        delta: &UpdateAddonRequest,
    ) -> RemoteResult<Updated<Addon, AddonUpdate>> {
        let mut backend = self.backend();
        backend.updates.push(delta.clone());
        let addon = backend
            .addons
            .get_mut(id.as_str())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))?;
        if let Some(version) = &delta.addon_version {
            addon.addon_version = Some(version.clone());
        }
        Ok(Updated::Operation(AddonUpdate {
            id: format!("update-{}", backend.updates.len()),
            status: UPDATE_IN_PROGRESS.to_string(),
            errors: Vec::new(),
        }))
    }

    async fn delete(&self, id: &IdentityKey) -> RemoteResult<()> {
        let mut backend = self.backend();
        backend.deletes += 1;
        backend
            .addons
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))
    }

    async fn get_operation(
        &self,
        _id: &IdentityKey,
        operation_id: &str,
    ) -> RemoteResult<AddonUpdate> {
        let mut backend = self.backend();
        let status = next_status(&mut backend.update_statuses)
            .ok_or_else(|| RemoteError::not_found(operation_id))?;
        Ok(AddonUpdate {
            id: operation_id.to_string(),
            status: status.to_string(),
            errors: if status == UPDATE_FAILED {
                backend.update_errors.clone()
            } else {
                Vec::new()
            },
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct RestApiBackend {
    pub(crate) apis: HashMap<String, RestApiObject>,
    next_id: u32,
    pub(crate) imports: Vec<RestApiDefinition>,
    pub(crate) patches: Vec<Vec<PatchOperation>>,
}

#[derive(Clone, Default)]
pub(crate) struct MockRestApis {
    pub(crate) backend: Arc<Mutex<RestApiBackend>>,
}

impl MockRestApis {
    pub(crate) fn backend(&self) -> MutexGuard<'_, RestApiBackend> {
        lock(&self.backend)
    }
}

fn apply_patch(api: &mut RestApiObject, operation: &PatchOperation) {
    let value = operation.value.clone();
    match (operation.op, operation.path.as_str()) {
        (PatchOp::Replace, "/name") => api.name = value.unwrap_or_default(),
        (PatchOp::Replace, "/description") => api.description = value.filter(|v| !v.is_empty()),
        (PatchOp::Replace, "/policy") => api.policy = value.filter(|v| !v.is_empty()),
        (PatchOp::Replace, "/minimumCompressionSize") => {
            api.minimum_compression_size = value.and_then(|v| v.parse().ok())
        }
        (op, path) => {
            if let Some(media_type) = path.strip_prefix("/binaryMediaTypes/") {
                let media_type = media_type.replace("~1", "/").replace("~0", "~");
                api.binary_media_types.retain(|t| *t != media_type);
                if op == PatchOp::Add {
                    api.binary_media_types.push(media_type);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl RemoteClient<RestApi> for MockRestApis {
    async fn create(&self, request: &CreateRestApiRequest) -> RemoteResult<RestApiObject> {
        let mut backend = self.backend();
        backend.next_id += 1;
        let api = RestApiObject {
            id: format!("api{}", backend.next_id),
            name: request.name.clone(),
            description: request.description.clone(),
            api_key_source: request.api_key_source.clone(),
            binary_media_types: request.binary_media_types.clone(),
            disable_execute_api_endpoint: request.disable_execute_api_endpoint,
            endpoint_configuration: request.endpoint_configuration.clone(),
            minimum_compression_size: request.minimum_compression_size,
            policy: request.policy.clone(),
            tags: request.tags.clone(),
            ..RestApiObject::default()
        };
        backend.apis.insert(api.id.clone(), api.clone());
        Ok(api)
    }

    async fn get(&self, id: &IdentityKey) -> RemoteResult<RestApiObject> {
        self.backend()
            .apis
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| RemoteError::not_found(id.as_str()))
    }

    async fn update(
        &self,
        id: &IdentityKey,
        delta: &Vec<PatchOperation>,
    ) -> RemoteResult<Updated<RestApiObject, resource_agent::provider::Never>> {
        let mut backend = self.backend();
        backend.patches.push(delta.clone());
        let api = backend
            .apis
            .get_mut(id.as_str())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))?;
        for operation in delta {
            apply_patch(api, operation);
        }
        Ok(Updated::Object(api.clone()))
    }

    async fn delete(&self, id: &IdentityKey) -> RemoteResult<()> {
        self.backend()
            .apis
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))
    }

    /// An overwrite import takes the name and description from the document and drops the
    /// binary media types.
    async fn import_definition(
        &self,
        id: &IdentityKey,
        definition: &RestApiDefinition,
    ) -> RemoteResult<RestApiObject> {
        let mut backend = self.backend();
        backend.imports.push(definition.clone());
        let api = backend
            .apis
            .get_mut(id.as_str())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))?;
        api.name = "imported".to_string();
        api.description = Some("from the definition".to_string());
        api.binary_media_types.clear();
        Ok(api.clone())
    }
}

#[derive(Debug, Default)]
pub(crate) struct DbInstanceBackend {
    pub(crate) instances: HashMap<String, DbInstanceObject>,
    pub(crate) statuses: VecDeque<&'static str>,
    pub(crate) updates: Vec<UpdateDbInstanceRequest>,
}

#[derive(Clone, Default)]
pub(crate) struct MockDbInstances {
    pub(crate) backend: Arc<Mutex<DbInstanceBackend>>,
}

impl MockDbInstances {
    pub(crate) fn backend(&self) -> MutexGuard<'_, DbInstanceBackend> {
        lock(&self.backend)
    }
}

#[async_trait::async_trait]
impl RemoteClient<DbInstance> for MockDbInstances {
    async fn create(&self, request: &DbInstanceSpec) -> RemoteResult<DbInstanceObject> {
        let mut backend = self.backend();
        let instance = DbInstanceObject {
            id: format!("db{}", backend.instances.len() + 1),
            name: request.name.clone(),
            db_instance_type: request.db_instance_type.clone(),
            allocated_storage: request.allocated_storage,
            vpc_security_group_ids: request.vpc_security_group_ids.clone(),
            vpc_subnet_ids: request.vpc_subnet_ids.clone(),
            status: STATUS_CREATING.to_string(),
            ..DbInstanceObject::default()
        };
        backend
            .instances
            .insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }

    async fn get(&self, id: &IdentityKey) -> RemoteResult<DbInstanceObject> {
        let mut backend = self.backend();
        let status = next_status(&mut backend.statuses).unwrap_or(STATUS_AVAILABLE);
        let instance = backend
            .instances
            .get_mut(id.as_str())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))?;
        instance.status = status.to_string();
        Ok(instance.clone())
    }

    async fn update(
        &self,
        id: &IdentityKey,
        delta: &UpdateDbInstanceRequest,
    ) -> RemoteResult<Updated<DbInstanceObject, resource_agent::provider::Never>> {
        let mut backend = self.backend();
        backend.updates.push(delta.clone());
        let instance = backend
            .instances
            .get_mut(id.as_str())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))?;
        if let Some(instance_type) = &delta.db_instance_type {
            instance.db_instance_type = instance_type.clone();
        }
        Ok(Updated::Object(instance.clone()))
    }

    async fn delete(&self, id: &IdentityKey) -> RemoteResult<()> {
        self.backend()
            .instances
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))
    }
}

#[derive(Debug, Default)]
pub(crate) struct ChannelBackend {
    pub(crate) channels: HashMap<String, Channel>,
    next_id: u32,
}

#[derive(Clone, Default)]
pub(crate) struct MockChannels {
    pub(crate) backend: Arc<Mutex<ChannelBackend>>,
}

impl MockChannels {
    pub(crate) fn backend(&self) -> MutexGuard<'_, ChannelBackend> {
        lock(&self.backend)
    }
}

#[async_trait::async_trait]
impl RemoteClient<NotificationChannel> for MockChannels {
    async fn create(&self, request: &NotificationChannelSpec) -> RemoteResult<Channel> {
        let mut backend = self.backend();
        backend.next_id += 1;
        let channel = Channel {
            id: format!("channel-{}", backend.next_id),
            config: request.clone(),
        };
        backend.channels.insert(channel.id.clone(), channel.clone());
        Ok(channel)
    }

    async fn get(&self, id: &IdentityKey) -> RemoteResult<Channel> {
        self.backend()
            .channels
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| RemoteError::not_found(id.as_str()))
    }

    async fn update(
        &self,
        _id: &IdentityKey,
        delta: &resource_agent::provider::Never,
    ) -> RemoteResult<Updated<Channel, resource_agent::provider::Never>> {
        match *delta {}
    }

    async fn delete(&self, id: &IdentityKey) -> RemoteResult<()> {
        self.backend()
            .channels
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))
    }
}

#[derive(Clone, Default)]
pub(crate) struct MockTypes {
    pub(crate) types: Arc<Mutex<HashMap<String, GraphqlType>>>,
}

/// The first word after `type` in an SDL definition.
fn type_name(definition: &str) -> String {
    definition
        .split_whitespace()
        .skip_while(|word| *word != "type")
        .nth(1)
        .unwrap_or_default()
        .to_string()
}

#[async_trait::async_trait]
impl RemoteClient<AppSyncType> for MockTypes {
    async fn create(&self, request: &TypeSpec) -> RemoteResult<GraphqlType> {
        let graphql_type = GraphqlType {
            api_id: request.api_id.clone(),
            name: type_name(&request.definition),
            definition: request.definition.clone(),
            format: request.format,
            ..GraphqlType::default()
        };
        lock(&self.types).insert(graphql_type.name.clone(), graphql_type.clone());
        Ok(graphql_type)
    }

    async fn get(&self, id: &IdentityKey) -> RemoteResult<GraphqlType> {
        let key = TypeKey::parse(id).map_err(RemoteError::transport)?;
        lock(&self.types)
            .get(&key.type_name)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(id.as_str()))
    }

    async fn update(
        &self,
        id: &IdentityKey,
        delta: &UpdateTypeRequest,
    ) -> RemoteResult<Updated<GraphqlType, resource_agent::provider::Never>> {
        let key = TypeKey::parse(id).map_err(RemoteError::transport)?;
        let mut types = lock(&self.types);
        let graphql_type = types
            .get_mut(&key.type_name)
            .ok_or_else(|| RemoteError::not_found(id.as_str()))?;
        graphql_type.definition = delta.definition.clone();
        Ok(Updated::Object(graphql_type.clone()))
    }

    async fn delete(&self, id: &IdentityKey) -> RemoteResult<()> {
        let key = TypeKey::parse(id).map_err(RemoteError::transport)?;
        lock(&self.types)
            .remove(&key.type_name)
            .map(|_| ())
            .ok_or_else(|| RemoteError::not_found(id.as_str()))
    }
}
