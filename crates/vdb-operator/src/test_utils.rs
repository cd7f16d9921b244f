//! Builders shared by unit and integration tests.

use crate::credentials::{ACCESS_KEY_NAME, SECRET_KEY_NAME};
use crate::crds::{
    CommunalStorage, InitPolicy, KSafety, LocalStorage, Subcluster, VerticaDB, VerticaDBSpec,
};
use crate::names::{MemberName, ResourceNaming};
use crate::podfacts::{IpFamily, PodFact, PodFacts, PodStatusSnapshot, Tristate};
use std::collections::BTreeMap;

/// A VerticaDB with one three-pod subcluster and create as the init policy.
#[must_use]
pub fn make_vdb() -> VerticaDB {
    let mut vdb = VerticaDB::new(
        "vertica-sample",
        VerticaDBSpec {
            image: "vertica/vertica-k8s:latest".to_string(),
            db_name: "vertdb".to_string(),
            init_policy: InitPolicy::Create,
            k_safety: KSafety::KSafety1,
            shard_count: 12,
            license_secret: None,
            ignore_cluster_lease: false,
            communal: CommunalStorage {
                path: "s3://nimbusdb/mydb".to_string(),
                endpoint: "https://minio".to_string(),
                credential_secret: "s3-auth".to_string(),
                include_uid_in_path: false,
            },
            local: LocalStorage::default(),
            subclusters: vec![Subcluster::new("defaultsubcluster", 3)],
        },
    );
    vdb.metadata.namespace = Some("default".to_string());
    vdb.metadata.uid = Some("3b5f1d2a-8c1e-4f7e-9d2b-6a0c4e7f1b11".to_string());
    vdb
}

/// Secret data with both communal keys present.
#[must_use]
pub fn make_communal_secret_data() -> BTreeMap<String, String> {
    BTreeMap::from([
        (ACCESS_KEY_NAME.to_string(), "minio".to_string()),
        (SECRET_KEY_NAME.to_string(), "minio123".to_string()),
    ])
}

/// Every expected member as running, IPv4, in the database and with the
/// agent down. The i-th member gets IP `10.0.0.<i+1>` and node `node<i+1>`.
#[must_use]
pub fn make_pod_facts(vdb: &VerticaDB) -> PodFacts {
    let mut facts = PodFacts::new();
    for (position, sc, name) in ResourceNaming::expected_members(vdb) {
        facts.insert(PodFact {
            name,
            subcluster: sc.name.clone(),
            compat21_node_name: format!("node{:04}", position + 1),
            running: true,
            db_exists: Tristate::True,
            agent_running: Tristate::False,
            ip_family: IpFamily::V4,
            pod_ip: Some(format!("10.0.0.{}", position + 1)),
        });
    }
    facts
}

/// Same as [`make_pod_facts`] but with no database created anywhere yet.
#[must_use]
pub fn make_pod_facts_without_db(vdb: &VerticaDB) -> PodFacts {
    let mut facts = make_pod_facts(vdb);
    let names: Vec<MemberName> = facts.iter().map(|pf| pf.name.clone()).collect();
    for name in names {
        if let Some(pf) = facts.get_mut(&name) {
            pf.db_exists = Tristate::False;
        }
    }
    facts
}

/// Running snapshot for a pod with the given IP.
#[must_use]
pub fn running_pod(ip: &str) -> PodStatusSnapshot {
    PodStatusSnapshot {
        running: true,
        pod_ip: Some(ip.to_string()),
    }
}
