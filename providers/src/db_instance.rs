/*!

A Timestream for InfluxDB database instance. Only the name, the instance type and the log
delivery configuration can be changed in place; any other change replaces the instance. The
backend reports an instance as `AVAILABLE` for a moment before it starts modifying it, so waits
require two `AVAILABLE` observations in a row.

!*/

use crate::constants::MINUTE;
use crate::timeouts;
use reconcile_model::{IdentityKey, IdentityShape, StatusSets, Timeouts};
use resource_agent::provider::{Never, RemoteClient, ResourceKind, StateMapper, StatusSource};
use resource_agent::{Configuration, Reconciler, ResourceConfig, StatusWait};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter};

pub const NAME: &str = "timestream_influxdb_db_instance";

pub const STATUS_CREATING: &str = "CREATING";
pub const STATUS_AVAILABLE: &str = "AVAILABLE";
pub const STATUS_DELETING: &str = "DELETING";
pub const STATUS_MODIFYING: &str = "MODIFYING";
pub const STATUS_UPDATING: &str = "UPDATING";
pub const STATUS_DELETED: &str = "DELETED";
pub const STATUS_FAILED: &str = "FAILED";

const NOT_FOUND_CHECKS: u32 = 20;
const CONTINUOUS_TARGET_OCCURRENCE: u32 = 2;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Configuration {
    pub bucket_name: String,
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDeliveryConfiguration {
    pub s3_configuration: S3Configuration,
}

#[derive(Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbInstanceSpec {
    pub name: String,
    pub db_instance_type: String,
    pub allocated_storage: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_storage_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_parameter_group_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_delivery_configuration: Option<LogDeliveryConfiguration>,
    #[serde(default)]
    pub publicly_accessible: bool,
    pub vpc_security_group_ids: BTreeSet<String>,
    pub vpc_subnet_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Debug for DbInstanceSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbInstanceSpec")
            .field("name", &self.name)
            .field("db_instance_type", &self.db_instance_type)
            .field("allocated_storage", &self.allocated_storage)
            .field("db_storage_type", &self.db_storage_type)
            .field("deployment_type", &self.deployment_type)
            .field("db_parameter_group_identifier", &self.db_parameter_group_identifier)
            .field("log_delivery_configuration", &self.log_delivery_configuration)
            .field("publicly_accessible", &self.publicly_accessible)
            .field("vpc_security_group_ids", &self.vpc_security_group_ids)
            .field("vpc_subnet_ids", &self.vpc_subnet_ids)
            .field("bucket", &self.bucket)
            .field("organization", &self.organization)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tags", &self.tags)
            .finish()
    }
}

impl Configuration for DbInstanceSpec {}

/// Only the fields that changed are set.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDbInstanceRequest {
    pub name: Option<String>,
    pub db_instance_type: Option<String>,
    pub log_delivery_configuration: Option<LogDeliveryConfiguration>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbInstanceObject {
    pub id: String,
    pub arn: Option<String>,
    pub name: String,
    pub db_instance_type: String,
    pub allocated_storage: u32,
    pub db_storage_type: Option<String>,
    pub deployment_type: Option<String>,
    pub db_parameter_group_identifier: Option<String>,
    pub log_delivery_configuration: Option<LogDeliveryConfiguration>,
    #[serde(default)]
    pub publicly_accessible: bool,
    #[serde(default)]
    pub vpc_security_group_ids: BTreeSet<String>,
    #[serde(default)]
    pub vpc_subnet_ids: BTreeSet<String>,
    pub endpoint: Option<String>,
    pub availability_zone: Option<String>,
    pub secondary_availability_zone: Option<String>,
    pub influx_auth_parameters_secret_arn: Option<String>,
    pub status: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl StatusSource for DbInstanceObject {
    fn status(&self) -> Option<&str> {
        Some(&self.status)
    }
}

pub struct DbInstance;

impl ResourceKind for DbInstance {
    const NAME: &'static str = NAME;
    type Spec = DbInstanceSpec;
    type Request = DbInstanceSpec;
    type Object = DbInstanceObject;
    type Delta = UpdateDbInstanceRequest;
    type Operation = Never;
    type Definition = Never;
}

pub struct DbInstanceMapper;

impl StateMapper<DbInstance> for DbInstanceMapper {
    fn identity(
        &self,
        _spec: &DbInstanceSpec,
        created: &DbInstanceObject,
    ) -> reconcile_model::Result<IdentityKey> {
        IdentityShape::SINGLE.build(&[created.id.as_str()])
    }

    fn to_remote(&self, spec: &DbInstanceSpec) -> DbInstanceSpec {
        spec.clone()
    }

    /// The backend never returns the initial bucket, organization or credentials, so an observed
    /// spec leaves them empty.
    fn from_remote(&self, instance: &DbInstanceObject) -> DbInstanceSpec {
        DbInstanceSpec {
            name: instance.name.clone(),
            db_instance_type: instance.db_instance_type.clone(),
            allocated_storage: instance.allocated_storage,
            db_storage_type: instance.db_storage_type.clone(),
            deployment_type: instance.deployment_type.clone(),
            db_parameter_group_identifier: instance.db_parameter_group_identifier.clone(),
            log_delivery_configuration: instance.log_delivery_configuration.clone(),
            publicly_accessible: instance.publicly_accessible,
            vpc_security_group_ids: instance.vpc_security_group_ids.clone(),
            vpc_subnet_ids: instance.vpc_subnet_ids.clone(),
            tags: instance.tags.clone(),
            ..DbInstanceSpec::default()
        }
    }

    fn delta(
        &self,
        previous: &DbInstanceSpec,
        desired: &DbInstanceSpec,
    ) -> Option<UpdateDbInstanceRequest> {
        let logs_changed =
            previous.log_delivery_configuration != desired.log_delivery_configuration;
        let update = UpdateDbInstanceRequest {
            name: Some(desired.name.clone()).filter(|name| *name != previous.name),
            db_instance_type: Some(desired.db_instance_type.clone())
                .filter(|instance_type| *instance_type != previous.db_instance_type),
            // Removing the configuration turns delivery off.
            log_delivery_configuration: if logs_changed {
                Some(desired.log_delivery_configuration.clone().unwrap_or_default())
            } else {
                None
            },
        };
        if update == UpdateDbInstanceRequest::default() {
            None
        } else {
            Some(update)
        }
    }

    fn requires_replacement(&self, previous: &DbInstanceSpec, desired: &DbInstanceSpec) -> bool {
        let observed = previous.password.is_empty();
        previous.allocated_storage != desired.allocated_storage
            || previous.db_storage_type != desired.db_storage_type
            || previous.deployment_type != desired.deployment_type
            || previous.db_parameter_group_identifier != desired.db_parameter_group_identifier
            || previous.publicly_accessible != desired.publicly_accessible
            || previous.vpc_security_group_ids != desired.vpc_security_group_ids
            || previous.vpc_subnet_ids != desired.vpc_subnet_ids
            || (!observed
                && (previous.bucket != desired.bucket
                    || previous.organization != desired.organization
                    || previous.username != desired.username
                    || previous.password != desired.password))
    }
}

pub fn config() -> crate::Result<ResourceConfig> {
    Ok(ResourceConfig::new(IdentityShape::SINGLE)
        .timeouts(timeouts(NAME, Timeouts::uniform(30 * MINUTE))?)
        .create_wait(
            StatusWait::new(StatusSets::new(
                [STATUS_CREATING, STATUS_UPDATING, STATUS_MODIFYING],
                [STATUS_AVAILABLE],
            ))
            .with_not_found_checks(NOT_FOUND_CHECKS)
            .with_continuous_target_occurrence(CONTINUOUS_TARGET_OCCURRENCE),
        )
        .update_wait(
            StatusWait::new(StatusSets::new(
                [STATUS_MODIFYING, STATUS_UPDATING],
                [STATUS_AVAILABLE],
            ))
            .with_not_found_checks(NOT_FOUND_CHECKS)
            .with_continuous_target_occurrence(CONTINUOUS_TARGET_OCCURRENCE),
        )
        .delete_wait(StatusWait::new(StatusSets::absence([
            STATUS_DELETING,
            STATUS_MODIFYING,
            STATUS_UPDATING,
            STATUS_AVAILABLE,
        ]))))
}

pub type DbInstanceReconciler<C> = Reconciler<DbInstance, C, DbInstanceMapper>;

pub fn reconciler<C: RemoteClient<DbInstance>>(
    client: C,
) -> crate::Result<DbInstanceReconciler<C>> {
    Ok(Reconciler::new(config()?, client, DbInstanceMapper))
}
