//! `VerticaDB` Custom Resource Definition describing the desired cluster

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the database is brought up the first time the cluster is reconciled.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum InitPolicy {
    /// Create a brand new database at the communal location.
    #[default]
    Create,
    /// Revive a database whose catalog already exists at the communal location.
    Revive,
    /// Only schedule the pods; never run admintools against them.
    ScheduleOnly,
}

/// Fault tolerance level of the database ("K-safety").
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum KSafety {
    #[serde(rename = "0")]
    KSafety0,
    #[default]
    #[serde(rename = "1")]
    KSafety1,
}

fn default_shard_count() -> i32 {
    12
}

fn default_data_path() -> String {
    "/data".to_string()
}

fn default_depot_path() -> String {
    "/depot".to_string()
}

fn default_request_size() -> String {
    "500Gi".to_string()
}

fn default_subcluster_size() -> i32 {
    3
}

fn default_service_type() -> String {
    "ClusterIP".to_string()
}

/// `VerticaDB` CRD for an Eon mode database cluster
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(group = "vertica.com", version = "v1beta1", kind = "VerticaDB")]
#[kube(namespaced)]
#[kube(shortname = "vdb")]
#[kube(printcolumn = r#"{"name":"Database","type":"string","jsonPath":".spec.dbName"}"#)]
#[kube(printcolumn = r#"{"name":"InitPolicy","type":"string","jsonPath":".spec.initPolicy"}"#)]
#[kube(printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#)]
pub struct VerticaDBSpec {
    /// Container image for the server pods
    #[serde(default)]
    pub image: String,

    /// Name of the database
    #[serde(rename = "dbName")]
    pub db_name: String,

    /// Whether to create a new database, revive an existing one or do neither
    #[serde(default, rename = "initPolicy")]
    pub init_policy: InitPolicy,

    /// Fault tolerance level
    #[serde(default, rename = "kSafety")]
    pub k_safety: KSafety,

    /// Number of shards to create the database with
    #[serde(default = "default_shard_count", rename = "shardCount")]
    pub shard_count: i32,

    /// Secret holding the license, if any
    #[serde(default, rename = "licenseSecret")]
    pub license_secret: Option<String>,

    /// Pass --ignore-cluster-lease to revive_db
    #[serde(default, rename = "ignoreClusterLease")]
    pub ignore_cluster_lease: bool,

    /// Shared object storage location
    pub communal: CommunalStorage,

    /// Local (per pod) storage
    #[serde(default)]
    pub local: LocalStorage,

    /// Subclusters in declaration order. The first one is where the database
    /// gets created.
    pub subclusters: Vec<Subcluster>,
}

/// Communal storage location and how to authenticate against it
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
pub struct CommunalStorage {
    /// Path in the object store, e.g. `s3://bucket/key`
    pub path: String,

    /// Endpoint of the object store, e.g. `https://minio:9000`
    #[serde(default)]
    pub endpoint: String,

    /// Secret containing the `accesskey` and `secretkey` entries
    #[serde(default, rename = "credentialSecret")]
    pub credential_secret: String,

    /// Append the VerticaDB UID to the communal path
    #[serde(default, rename = "includeUIDInPath")]
    pub include_uid_in_path: bool,
}

/// Local storage settings for each pod
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct LocalStorage {
    #[serde(default = "default_data_path", rename = "dataPath")]
    pub data_path: String,

    #[serde(default = "default_depot_path", rename = "depotPath")]
    pub depot_path: String,

    #[serde(default, rename = "storageClass")]
    pub storage_class: Option<String>,

    #[serde(default = "default_request_size", rename = "requestSize")]
    pub request_size: String,
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            depot_path: default_depot_path(),
            storage_class: None,
            request_size: default_request_size(),
        }
    }
}

/// A named, independently sized group of pods
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct Subcluster {
    pub name: String,

    #[serde(default = "default_subcluster_size")]
    pub size: i32,

    #[serde(default = "default_service_type", rename = "serviceType")]
    pub service_type: String,

    #[serde(default, rename = "nodePort")]
    pub node_port: Option<i32>,

    #[serde(default, rename = "externalIPs")]
    pub external_ips: Vec<String>,

    #[serde(default, rename = "nodeSelector")]
    pub node_selector: BTreeMap<String, String>,
}

impl Subcluster {
    #[must_use]
    pub fn new(name: &str, size: i32) -> Self {
        Self {
            name: name.to_string(),
            size,
            service_type: default_service_type(),
            node_port: None,
            external_ips: Vec::new(),
            node_selector: BTreeMap::new(),
        }
    }
}

impl VerticaDBSpec {
    /// The subcluster the database is created in.
    #[must_use]
    pub fn first_subcluster(&self) -> Option<&Subcluster> {
        self.subclusters.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_deserialization_with_defaults() {
        let yaml = r#"
dbName: vertdb
communal:
  path: s3://nimbusdb/db
  endpoint: https://minio:9000
  credentialSecret: s3-creds
subclusters:
  - name: defaultsubcluster
"#;
        let spec: VerticaDBSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.init_policy, InitPolicy::Create);
        assert_eq!(spec.k_safety, KSafety::KSafety1);
        assert_eq!(spec.shard_count, 12);
        assert_eq!(spec.local.depot_path, "/depot");
        assert_eq!(spec.subclusters[0].size, 3);
        assert!(!spec.communal.include_uid_in_path);
    }

    #[test]
    fn test_ksafety_uses_string_values() {
        let spec: VerticaDBSpec = serde_yaml::from_str(
            r#"
dbName: db
kSafety: "0"
initPolicy: ScheduleOnly
communal:
  path: s3://b/p
subclusters: []
"#,
        )
        .unwrap();
        assert_eq!(spec.k_safety, KSafety::KSafety0);
        assert_eq!(spec.init_policy, InitPolicy::ScheduleOnly);
        assert!(spec.first_subcluster().is_none());
    }
}
