//! Credential resolution: managed identity and key-vault secrets.
//!
//! The pipeline authenticates to storage with a short-lived access token
//! kept in a key vault. Resolving it is two REST calls:
//!
//! 1. the instance metadata service exchanges the machine's managed
//!    identity for an OAuth token scoped to a resource, and
//! 2. the vault's secrets endpoint, called with that bearer token, returns
//!    the stored secret value.
//!
//! Both run once at startup; failure is fatal before any document is
//! touched. [`SecretProvider`] is the seam tests substitute.

use crate::error::Corpus2MdError;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

/// OAuth resource for key-vault access tokens.
pub const VAULT_RESOURCE: &str = "https://vault.azure.net";

/// OAuth resource for batch-service access tokens.
pub const BATCH_RESOURCE: &str = "https://batch.core.windows.net/";

const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const VAULT_API_VERSION: &str = "7.4";

/// Resolves a secret by name. The production implementation is
/// [`KeyVaultClient`]; tests use a canned provider.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn secret(&self, name: &str) -> Result<String, Corpus2MdError>;
}

/// A user-assigned managed identity, exchanged for OAuth tokens at the
/// instance metadata endpoint.
#[derive(Clone)]
pub struct ManagedIdentityCredential {
    client: reqwest::Client,
    identity_id: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl ManagedIdentityCredential {
    pub fn new(identity_id: impl Into<String>) -> Result<Self, Corpus2MdError> {
        // The metadata endpoint is link-local; anything slower than a few
        // seconds means we are not running where we think we are.
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Corpus2MdError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            identity_id: identity_id.into(),
        })
    }

    /// Fetch an access token for `resource` (see [`VAULT_RESOURCE`],
    /// [`BATCH_RESOURCE`]).
    pub async fn token(&self, resource: &str) -> Result<String, Corpus2MdError> {
        let response = self
            .client
            .get(IMDS_TOKEN_ENDPOINT)
            .header("Metadata", "true")
            .query(&[
                ("api-version", IMDS_API_VERSION),
                ("resource", resource),
                ("client_id", &self.identity_id),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Corpus2MdError::CredentialResolve {
                vault: "instance metadata service".into(),
                detail: e.to_string(),
            })?;

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| Corpus2MdError::CredentialResolve {
                    vault: "instance metadata service".into(),
                    detail: format!("token response: {e}"),
                })?;

        Ok(token.access_token)
    }
}

/// Reads secrets from one key vault with a managed-identity credential.
pub struct KeyVaultClient {
    vault_name: String,
    credential: ManagedIdentityCredential,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SecretResponse {
    value: String,
}

impl KeyVaultClient {
    pub fn new(
        vault_name: impl Into<String>,
        credential: ManagedIdentityCredential,
    ) -> Result<Self, Corpus2MdError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Corpus2MdError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            vault_name: vault_name.into(),
            credential,
            client,
        })
    }
}

#[async_trait]
impl SecretProvider for KeyVaultClient {
    async fn secret(&self, name: &str) -> Result<String, Corpus2MdError> {
        let bearer = self.credential.token(VAULT_RESOURCE).await?;
        let url = format!(
            "https://{}.vault.azure.net/secrets/{}?api-version={}",
            self.vault_name, name, VAULT_API_VERSION
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&bearer)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Corpus2MdError::CredentialResolve {
                vault: self.vault_name.clone(),
                detail: e.to_string(),
            })?;

        let secret: SecretResponse =
            response
                .json()
                .await
                .map_err(|e| Corpus2MdError::CredentialResolve {
                    vault: self.vault_name.clone(),
                    detail: format!("secret response: {e}"),
                })?;

        info!("resolved secret '{}' from vault '{}'", name, self.vault_name);
        Ok(secret.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_shape() {
        let parsed: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":"3599"}"#).unwrap();
        assert_eq!(parsed.access_token, "abc");
    }

    #[test]
    fn secret_response_shape() {
        let parsed: SecretResponse =
            serde_json::from_str(r#"{"value":"sv=2024&sig=x","id":"https://v/secrets/s"}"#)
                .unwrap();
        assert_eq!(parsed.value, "sv=2024&sig=x");
    }
}
