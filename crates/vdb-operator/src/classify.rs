//! Classification of admintools output.
//!
//! admintools reports most failures on stdout with a non-zero exit. Some of
//! them are expected while the surrounding infrastructure converges (the
//! object store is not reachable yet, the bucket has not been created, ...).
//! [`classify`] maps the captured stdout to a closed set of categories; what
//! to do about each category is decided by the caller.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

/// Known failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputCategory {
    /// The communal storage endpoint could not be reached.
    EndpointUnreachable,
    /// The bucket named in the communal path does not exist.
    BucketMissing,
    /// create_db refused to run because the communal path has data in it.
    CommunalPathNotEmpty,
    /// revive_db found no database at the communal path.
    DatabaseNotFound,
    /// revive_db found another cluster still holding the lease.
    ClusterLeaseNotExpired,
    /// None of the known patterns matched.
    Unclassified,
}

impl fmt::Display for OutputCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputCategory::EndpointUnreachable => "endpoint-unreachable",
            OutputCategory::BucketMissing => "bucket-missing",
            OutputCategory::CommunalPathNotEmpty => "communal-path-not-empty",
            OutputCategory::DatabaseNotFound => "database-not-found",
            OutputCategory::ClusterLeaseNotExpired => "cluster-lease-not-expired",
            OutputCategory::Unclassified => "unclassified",
        };
        f.write_str(s)
    }
}

lazy_static! {
    static ref ENDPOINT_BAD_PATTERN: Regex =
        Regex::new(r"Unable to connect to endpoint").unwrap();

    static ref BUCKET_NOT_EXIST_PATTERN: Regex =
        Regex::new(r"The specified bucket does not exist").unwrap();

    static ref COMMUNAL_PATH_NOT_EMPTY_PATTERN: Regex =
        Regex::new(r"Communal location \[.+\] is not empty").unwrap();

    static ref DATABASE_NOT_FOUND_PATTERN: Regex =
        Regex::new(r"(?i)database \S+ (?:was not|could not be) found in communal (?:storage|location)")
            .unwrap();

    static ref CLUSTER_LEASE_PATTERN: Regex =
        Regex::new(r"(?i)cluster lease (?:has not|hasn't) expired").unwrap();

    /// Checked in order; the first match wins.
    static ref PATTERNS: [(&'static Regex, OutputCategory); 5] = [
        (&*ENDPOINT_BAD_PATTERN, OutputCategory::EndpointUnreachable),
        (&*BUCKET_NOT_EXIST_PATTERN, OutputCategory::BucketMissing),
        (&*COMMUNAL_PATH_NOT_EMPTY_PATTERN, OutputCategory::CommunalPathNotEmpty),
        (&*DATABASE_NOT_FOUND_PATTERN, OutputCategory::DatabaseNotFound),
        (&*CLUSTER_LEASE_PATTERN, OutputCategory::ClusterLeaseNotExpired),
    ];
}

/// Classify the full stdout of an admintools invocation.
#[must_use]
pub fn classify(stdout: &str) -> OutputCategory {
    PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(stdout))
        .map_or(OutputCategory::Unclassified, |(_, category)| *category)
}
