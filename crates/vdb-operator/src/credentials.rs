//! Communal storage credentials.

use crate::error::Result;
use crate::names::MemberName;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Secret key holding the access key.
pub const ACCESS_KEY_NAME: &str = "accesskey";
/// Secret key holding the secret key.
pub const SECRET_KEY_NAME: &str = "secretkey";

/// Access/secret key pair for the communal object store.
#[derive(Clone, PartialEq, Eq)]
pub struct CommunalCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for CommunalCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommunalCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Outcome of looking up the credentials for a VerticaDB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLookup {
    Found(CommunalCredentials),
    SecretNotFound,
    MissingKey(&'static str),
}

impl CredentialLookup {
    /// Pick the two keys out of decoded secret data.
    #[must_use]
    pub fn from_secret_data(data: Option<BTreeMap<String, String>>) -> Self {
        let Some(data) = data else {
            return CredentialLookup::SecretNotFound;
        };
        let Some(access_key) = data.get(ACCESS_KEY_NAME) else {
            return CredentialLookup::MissingKey(ACCESS_KEY_NAME);
        };
        let Some(secret_key) = data.get(SECRET_KEY_NAME) else {
            return CredentialLookup::MissingKey(SECRET_KEY_NAME);
        };
        CredentialLookup::Found(CommunalCredentials {
            access_key: access_key.clone(),
            secret_key: secret_key.clone(),
        })
    }
}

/// Reads secret data. `Ok(None)` means the secret does not exist.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretFetcher: Send + Sync {
    async fn fetch(&self, name: &MemberName) -> Result<Option<BTreeMap<String, String>>>;
}

/// Reads secrets through the Kubernetes API.
#[derive(Clone)]
pub struct KubeSecretFetcher {
    client: Client,
}

impl KubeSecretFetcher {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretFetcher for KubeSecretFetcher {
    async fn fetch(&self, name: &MemberName) -> Result<Option<BTreeMap<String, String>>> {
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &name.namespace);
        let Some(secret) = secrets.get_opt(&name.name).await? else {
            return Ok(None);
        };

        let mut data: BTreeMap<String, String> = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, String::from_utf8_lossy(&v.0).into_owned()))
            .collect();
        if let Some(string_data) = secret.string_data {
            data.extend(string_data);
        }
        Ok(Some(data))
    }
}

/// Secrets kept in memory, keyed by namespaced name.
#[derive(Default)]
pub struct InMemorySecretFetcher {
    secrets: Mutex<HashMap<MemberName, BTreeMap<String, String>>>,
}

impl InMemorySecretFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: MemberName, data: BTreeMap<String, String>) {
        self.secrets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name, data);
    }
}

#[async_trait]
impl SecretFetcher for InMemorySecretFetcher {
    async fn fetch(&self, name: &MemberName) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self
            .secrets
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(name)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn lookup_requires_both_keys() {
        assert_eq!(
            CredentialLookup::from_secret_data(None),
            CredentialLookup::SecretNotFound
        );
        assert_eq!(
            CredentialLookup::from_secret_data(Some(data(&[("secretkey", "s")]))),
            CredentialLookup::MissingKey(ACCESS_KEY_NAME)
        );
        assert_eq!(
            CredentialLookup::from_secret_data(Some(data(&[("accesskey", "a")]))),
            CredentialLookup::MissingKey(SECRET_KEY_NAME)
        );
        assert_eq!(
            CredentialLookup::from_secret_data(Some(data(&[
                ("accesskey", "a"),
                ("secretkey", "s")
            ]))),
            CredentialLookup::Found(CommunalCredentials {
                access_key: "a".to_string(),
                secret_key: "s".to_string(),
            })
        );
    }

    #[test]
    fn debug_redacts_secret_key() {
        let creds = CommunalCredentials {
            access_key: "minio".to_string(),
            secret_key: "hunter2".to_string(),
        };
        let text = format!("{creds:?}");
        assert!(text.contains("minio"));
        assert!(!text.contains("hunter2"));
    }

    #[tokio::test]
    async fn mocked_fetcher_is_usable_as_trait_object() {
        let mut fetcher = MockSecretFetcher::new();
        fetcher
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(Some(data(&[("accesskey", "a"), ("secretkey", "s")]))));

        let fetcher: &dyn SecretFetcher = &fetcher;
        let found = fetcher.fetch(&MemberName::new("ns", "creds")).await.unwrap();
        assert!(matches!(
            CredentialLookup::from_secret_data(found),
            CredentialLookup::Found(_)
        ));
    }

    #[tokio::test]
    async fn in_memory_fetcher_returns_none_for_unknown() {
        let fetcher = InMemorySecretFetcher::new();
        fetcher.insert(MemberName::new("ns", "creds"), data(&[("accesskey", "a")]));
        assert!(fetcher
            .fetch(&MemberName::new("ns", "other"))
            .await
            .unwrap()
            .is_none());
        assert!(fetcher
            .fetch(&MemberName::new("ns", "creds"))
            .await
            .unwrap()
            .is_some());
    }
}
