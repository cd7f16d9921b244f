use crate::crds::{Subcluster, VerticaDB};
use kube::ResourceExt;
use std::fmt;

/// Namespaced name of one member pod of the cluster.
///
/// Ordering is by namespace then name, which gives the pod facts map a stable
/// iteration order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberName {
    pub namespace: String,
    pub name: String,
}

impl MemberName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MemberName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

pub struct ResourceNaming;

impl ResourceNaming {
    /// Statefulset name for a subcluster: `<vdb>-<subcluster>`.
    /// Subcluster names may contain underscores, which are not valid in
    /// Kubernetes object names.
    pub fn sts_name(vdb: &VerticaDB, sc: &Subcluster) -> String {
        format!("{}-{}", vdb.name_any(), sc.name.replace('_', "-"))
    }

    /// Pod name for ordinal `index` of a subcluster. This is the name the
    /// statefulset controller assigns, so it is deterministic.
    pub fn pod_name(vdb: &VerticaDB, sc: &Subcluster, index: i32) -> MemberName {
        MemberName::new(
            vdb.namespace().unwrap_or_else(|| "default".to_string()),
            format!("{}-{index}", Self::sts_name(vdb, sc)),
        )
    }

    /// Every member the spec expects, in subcluster declaration order then
    /// ordinal order.
    pub fn expected_members(vdb: &VerticaDB) -> Vec<(usize, &Subcluster, MemberName)> {
        vdb.spec
            .subclusters
            .iter()
            .flat_map(|sc| (0..sc.size.max(0)).map(move |i| (sc, Self::pod_name(vdb, sc, i))))
            .enumerate()
            .map(|(position, (sc, name))| (position, sc, name))
            .collect()
    }

    /// Secret holding the communal credentials.
    pub fn communal_credential_secret(vdb: &VerticaDB) -> MemberName {
        MemberName::new(
            vdb.namespace().unwrap_or_else(|| "default".to_string()),
            vdb.spec.communal.credential_secret.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::make_vdb;

    #[test]
    fn pod_names_are_dense_per_subcluster() {
        let mut vdb = make_vdb();
        vdb.spec.subclusters = vec![Subcluster::new("main_sc", 2), Subcluster::new("sec", 1)];

        let members = ResourceNaming::expected_members(&vdb);
        let names: Vec<_> = members.iter().map(|(_, _, n)| n.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "vertica-sample-main-sc-0",
                "vertica-sample-main-sc-1",
                "vertica-sample-sec-0"
            ]
        );
        assert_eq!(members[2].0, 2);
        assert_eq!(members[2].1.name, "sec");
    }

    #[test]
    fn member_name_displays_namespaced() {
        let name = MemberName::new("ns", "pod-0");
        assert_eq!(name.to_string(), "ns/pod-0");
    }
}
