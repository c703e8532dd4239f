/*!

An API Gateway REST API. Updates are sent as JSON-patch style operations. When the spec carries
an OpenAPI `body` the definition is imported in bulk after create (and whenever the body or its
import parameters change), and any declared field the import overwrote is patched back.

!*/

use crate::timeouts;
use reconcile_model::{IdentityKey, IdentityShape, Timeouts};
use resource_agent::diff::{PatchBuilder, PatchOperation};
use resource_agent::provider::{Never, RemoteClient, ResourceKind, StateMapper, StatusSource};
use resource_agent::{Configuration, Reconciler, ResourceConfig};
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

pub const NAME: &str = "api_gateway_rest_api";

const BINARY_MEDIA_TYPES: &str = "/binaryMediaTypes";
const VPC_ENDPOINT_IDS: &str = "/endpointConfiguration/vpcEndpointIds";

/// How an imported definition is combined with the existing API.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PutMode {
    Merge,
    #[default]
    Overwrite,
}

derive_display_from_serialize!(PutMode);
derive_fromstr_from_deserialize!(PutMode);

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointConfiguration {
    /// Exactly one endpoint type, e.g. `REGIONAL` or `PRIVATE`.
    pub types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub vpc_endpoint_ids: BTreeSet<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestApiSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binary_media_types: Vec<String>,
    #[serde(default)]
    pub disable_execute_api_endpoint: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_configuration: Option<EndpointConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_compression_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// An OpenAPI definition to import.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub put_rest_api_mode: Option<PutMode>,
    #[serde(default)]
    pub fail_on_warnings: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Configuration for RestApiSpec {}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRestApiRequest {
    pub name: String,
    pub description: Option<String>,
    pub api_key_source: Option<String>,
    pub binary_media_types: Vec<String>,
    pub disable_execute_api_endpoint: bool,
    pub endpoint_configuration: Option<EndpointConfiguration>,
    pub minimum_compression_size: Option<i32>,
    pub policy: Option<String>,
    pub tags: BTreeMap<String, String>,
}

/// A bulk import of an OpenAPI definition.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestApiDefinition {
    pub body: String,
    pub mode: PutMode,
    pub fail_on_warnings: bool,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestApiObject {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub api_key_source: Option<String>,
    #[serde(default)]
    pub binary_media_types: Vec<String>,
    #[serde(default)]
    pub disable_execute_api_endpoint: bool,
    pub endpoint_configuration: Option<EndpointConfiguration>,
    pub minimum_compression_size: Option<i32>,
    pub policy: Option<String>,
    pub root_resource_id: Option<String>,
    pub created_date: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl StatusSource for RestApiObject {
    fn status(&self) -> Option<&str> {
        None
    }
}

pub struct RestApi;

impl ResourceKind for RestApi {
    const NAME: &'static str = NAME;
    type Spec = RestApiSpec;
    type Request = CreateRestApiRequest;
    type Object = RestApiObject;
    type Delta = Vec<PatchOperation>;
    type Operation = Never;
    type Definition = RestApiDefinition;
}

/// Two policies are equivalent if they are the same JSON document, regardless of formatting.
fn policies_equivalent(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => match (
            serde_json::from_str::<Value>(a),
            serde_json::from_str::<Value>(b),
        ) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        },
        (a, b) => a.unwrap_or_default() == b.unwrap_or_default(),
    }
}

fn first_type(config: Option<&EndpointConfiguration>) -> Option<&str> {
    config.and_then(|config| config.types.first()).map(String::as_str)
}

pub struct RestApiMapper;

impl StateMapper<RestApi> for RestApiMapper {
    fn identity(
        &self,
        _spec: &RestApiSpec,
        created: &RestApiObject,
    ) -> reconcile_model::Result<IdentityKey> {
        IdentityShape::SINGLE.build(&[created.id.as_str()])
    }

    fn to_remote(&self, spec: &RestApiSpec) -> CreateRestApiRequest {
        CreateRestApiRequest {
            name: spec.name.clone(),
            description: spec.description.clone(),
            api_key_source: spec.api_key_source.clone(),
            binary_media_types: spec.binary_media_types.clone(),
            disable_execute_api_endpoint: spec.disable_execute_api_endpoint,
            endpoint_configuration: spec.endpoint_configuration.clone(),
            minimum_compression_size: spec.minimum_compression_size,
            policy: spec.policy.clone(),
            tags: spec.tags.clone(),
        }
    }

    fn from_remote(&self, api: &RestApiObject) -> RestApiSpec {
        RestApiSpec {
            name: api.name.clone(),
            description: api.description.clone(),
            api_key_source: api.api_key_source.clone(),
            binary_media_types: api.binary_media_types.clone(),
            disable_execute_api_endpoint: api.disable_execute_api_endpoint,
            endpoint_configuration: api.endpoint_configuration.clone(),
            minimum_compression_size: api.minimum_compression_size,
            policy: api.policy.clone(),
            tags: api.tags.clone(),
            ..RestApiSpec::default()
        }
    }

    fn delta(&self, previous: &RestApiSpec, desired: &RestApiSpec) -> Option<Vec<PatchOperation>> {
        let mut patch = PatchBuilder::new();
        patch
            .replace_if_changed(
                "/apiKeySource",
                previous.api_key_source.as_deref().unwrap_or_default(),
                desired.api_key_source.as_deref().unwrap_or_default(),
            )
            .clear_and_reinstate(
                BINARY_MEDIA_TYPES,
                &previous.binary_media_types,
                &desired.binary_media_types,
            )
            .replace_if_changed(
                "/description",
                previous.description.as_deref().unwrap_or_default(),
                desired.description.as_deref().unwrap_or_default(),
            )
            .replace_if_changed(
                "/disableExecuteApiEndpoint",
                &previous.disable_execute_api_endpoint.to_string(),
                &desired.disable_execute_api_endpoint.to_string(),
            );

        let old_endpoint = previous.endpoint_configuration.as_ref();
        if let Some(new_endpoint) = &desired.endpoint_configuration {
            if let Some(new_type) = first_type(Some(new_endpoint)) {
                patch.replace_if_changed(
                    "/endpointConfiguration/types/0",
                    first_type(old_endpoint).unwrap_or_default(),
                    new_type,
                );
            }
        }
        let no_ids = BTreeSet::new();
        patch.set_difference(
            VPC_ENDPOINT_IDS,
            old_endpoint.map_or(&no_ids, |c| &c.vpc_endpoint_ids),
            desired
                .endpoint_configuration
                .as_ref()
                .map_or(&no_ids, |c| &c.vpc_endpoint_ids),
        );
        if let Some(ip_address_type) = desired
            .endpoint_configuration
            .as_ref()
            .and_then(|c| c.ip_address_type.as_deref())
        {
            patch.replace_if_changed(
                "/endpointConfiguration/ipAddressType",
                old_endpoint
                    .and_then(|c| c.ip_address_type.as_deref())
                    .unwrap_or_default(),
                ip_address_type,
            );
        }

        if previous.minimum_compression_size != desired.minimum_compression_size {
            // No value clears the setting.
            patch.push(PatchOperation {
                value: desired.minimum_compression_size.map(|size| size.to_string()),
                ..PatchOperation::replace("/minimumCompressionSize", "")
            });
        }
        patch.replace_if_changed("/name", &previous.name, &desired.name);
        if !policies_equivalent(previous.policy.as_deref(), desired.policy.as_deref()) {
            patch.push(PatchOperation::replace(
                "/policy",
                desired.policy.clone().unwrap_or_default(),
            ));
        }
        patch.build_non_empty()
    }

    fn definition(&self, spec: &RestApiSpec) -> Option<RestApiDefinition> {
        spec.body.as_ref().map(|body| RestApiDefinition {
            body: body.clone(),
            mode: spec.put_rest_api_mode.unwrap_or_default(),
            fail_on_warnings: spec.fail_on_warnings,
            parameters: spec.parameters.clone(),
        })
    }

    /// The import mode and warning handling only apply to the next import.
    fn definition_changed(
        &self,
        previous: &RestApiDefinition,
        desired: &RestApiDefinition,
    ) -> bool {
        previous.body != desired.body || previous.parameters != desired.parameters
    }

    /// Only fields the spec declares are patched back. Whatever the import set for the others is
    /// kept.
    fn reassert(
        &self,
        desired: &RestApiSpec,
        produced: &RestApiObject,
    ) -> Option<Vec<PatchOperation>> {
        let mut baseline = self.from_remote(produced);
        if desired.api_key_source.is_none() {
            baseline.api_key_source = None;
        }
        if desired.binary_media_types.is_empty() {
            baseline.binary_media_types = Vec::new();
        }
        if desired.description.is_none() {
            baseline.description = None;
        }
        if !desired.disable_execute_api_endpoint {
            baseline.disable_execute_api_endpoint = false;
        }
        let endpoint = baseline.endpoint_configuration.take().unwrap_or_default();
        baseline.endpoint_configuration =
            desired
                .endpoint_configuration
                .as_ref()
                .map(|wanted| EndpointConfiguration {
                    // The endpoint type is not reasserted after an import.
                    types: wanted.types.clone(),
                    ip_address_type: endpoint
                        .ip_address_type
                        .filter(|_| wanted.ip_address_type.is_some()),
                    vpc_endpoint_ids: if wanted.vpc_endpoint_ids.is_empty() {
                        BTreeSet::new()
                    } else {
                        endpoint.vpc_endpoint_ids
                    },
                });
        if desired.minimum_compression_size.is_none() {
            baseline.minimum_compression_size = None;
        }
        if desired.policy.is_none() {
            baseline.policy = None;
        }
        self.delta(&baseline, desired)
    }
}

pub fn config() -> crate::Result<ResourceConfig> {
    Ok(ResourceConfig::new(IdentityShape::SINGLE).timeouts(timeouts(NAME, Timeouts::default())?))
}

pub type RestApiReconciler<C> = Reconciler<RestApi, C, RestApiMapper>;

pub fn reconciler<C: RemoteClient<RestApi>>(client: C) -> crate::Result<RestApiReconciler<C>> {
    Ok(Reconciler::new(config()?, client, RestApiMapper))
}
