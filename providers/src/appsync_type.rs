/*!

A type in an AppSync GraphQL API. The type's name is not declared; the backend takes it from the
definition and it becomes part of the identity `API-ID:FORMAT:TYPE-NAME`.

!*/

use crate::timeouts;
use reconcile_model::{IdentityKey, IdentityShape, Timeouts};
use resource_agent::provider::{Never, RemoteClient, ResourceKind, StateMapper, StatusSource};
use resource_agent::{Configuration, Reconciler, ResourceConfig};
use serde::{Deserialize, Serialize};
use serde_plain::{derive_display_from_serialize, derive_fromstr_from_deserialize};

pub const NAME: &str = "appsync_type";

pub const IDENTITY: IdentityShape =
    IdentityShape::composite(":", &["api_id", "format", "type_name"]);

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TypeFormat {
    #[default]
    Sdl,
    Json,
}

derive_display_from_serialize!(TypeFormat);
derive_fromstr_from_deserialize!(TypeFormat);

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSpec {
    pub api_id: String,
    pub definition: String,
    #[serde(default)]
    pub format: TypeFormat,
}

impl Configuration for TypeSpec {}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTypeRequest {
    pub definition: String,
    pub format: TypeFormat,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlType {
    pub api_id: String,
    pub arn: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub definition: String,
    pub format: TypeFormat,
}

impl StatusSource for GraphqlType {
    fn status(&self) -> Option<&str> {
        None
    }
}

pub struct AppSyncType;

impl ResourceKind for AppSyncType {
    const NAME: &'static str = NAME;
    type Spec = TypeSpec;
    type Request = TypeSpec;
    type Object = GraphqlType;
    type Delta = UpdateTypeRequest;
    type Operation = Never;
    type Definition = Never;
}

/// The parts of a type identity.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TypeKey {
    pub api_id: String,
    pub format: TypeFormat,
    pub type_name: String,
}

impl TypeKey {
    pub fn parse(id: &IdentityKey) -> reconcile_model::Result<Self> {
        let parts = IDENTITY.parse(id)?;
        let format = parts[1].parse().map_err(|_| IDENTITY.mismatch(id))?;
        Ok(Self {
            api_id: parts[0].to_string(),
            format,
            type_name: parts[2].to_string(),
        })
    }
}

pub struct TypeMapper;

impl StateMapper<AppSyncType> for TypeMapper {
    fn identity(
        &self,
        spec: &TypeSpec,
        created: &GraphqlType,
    ) -> reconcile_model::Result<IdentityKey> {
        let format = created.format.to_string();
        IDENTITY.build(&[spec.api_id.as_str(), format.as_str(), created.name.as_str()])
    }

    fn to_remote(&self, spec: &TypeSpec) -> TypeSpec {
        spec.clone()
    }

    fn from_remote(&self, graphql_type: &GraphqlType) -> TypeSpec {
        TypeSpec {
            api_id: graphql_type.api_id.clone(),
            definition: graphql_type.definition.clone(),
            format: graphql_type.format,
        }
    }

    /// The backend replaces the whole definition on update.
    fn delta(&self, previous: &TypeSpec, desired: &TypeSpec) -> Option<UpdateTypeRequest> {
        if previous.definition == desired.definition {
            return None;
        }
        Some(UpdateTypeRequest {
            definition: desired.definition.clone(),
            format: desired.format,
        })
    }

    fn requires_replacement(&self, previous: &TypeSpec, desired: &TypeSpec) -> bool {
        previous.api_id != desired.api_id || previous.format != desired.format
    }
}

pub fn config() -> crate::Result<ResourceConfig> {
    Ok(ResourceConfig::new(IDENTITY).timeouts(timeouts(NAME, Timeouts::default())?))
}

pub type TypeReconciler<C> = Reconciler<AppSyncType, C, TypeMapper>;

pub fn reconciler<C: RemoteClient<AppSyncType>>(client: C) -> crate::Result<TypeReconciler<C>> {
    Ok(Reconciler::new(config()?, client, TypeMapper))
}
