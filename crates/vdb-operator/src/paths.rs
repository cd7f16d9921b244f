//! Fixed paths inside the server container and helpers that derive paths
//! from the VerticaDB spec.

use crate::crds::VerticaDB;

/// Name of the container the database runs in.
pub const SERVER_CONTAINER: &str = "server";

pub const ADMINTOOLS_BIN: &str = "/opt/vertica/bin/admintools";
pub const ADMINTOOLS_CONF: &str = "/opt/vertica/config/admintools.conf";
pub const AGENT_BIN: &str = "/opt/vertica/sbin/vertica_agent";

/// Communal storage parameters handed to admintools with
/// `--communal-storage-params`. Holds credentials; removed after each use.
pub const AUTH_PARMS_FILE: &str = "/home/dbadmin/auth_parms.conf";

/// SQL run by create_db through `--sql`.
pub const POST_DB_CREATE_SQL_FILE: &str = "/home/dbadmin/post-db-create.sql";

/// Location of the database in communal storage.
pub fn communal_path(vdb: &VerticaDB) -> String {
    let base = vdb.spec.communal.path.trim_end_matches('/');
    match (&vdb.spec.communal.include_uid_in_path, &vdb.metadata.uid) {
        (true, Some(uid)) => format!("{base}/{uid}"),
        _ => base.to_string(),
    }
}

/// Glob matching the catalog directory of this pod's node, present only once
/// the pod has been made part of a database.
pub fn catalog_glob(vdb: &VerticaDB) -> String {
    let db = &vdb.spec.db_name;
    format!(
        "{}/{db}/v_{}_node????_catalog",
        vdb.spec.local.data_path.trim_end_matches('/'),
        db.to_lowercase()
    )
}
