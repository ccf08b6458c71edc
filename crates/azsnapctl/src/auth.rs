//! Ambient credential chain for the management API, tried in order:
//! client-secret environment variables, the instance metadata service, the
//! Azure CLI token cache. The first source that yields a token wins; if all
//! fail the run aborts before any management call is made.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com";
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const DEFAULT_IMDS_ENDPOINT: &str = "http://169.254.169.254";
const IMDS_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("client-secret token request failed: {0}")]
    ClientSecret(String),
    #[error("managed identity token request failed: {0}")]
    Imds(String),
    #[error("azure cli token request failed: {0}")]
    AzCli(String),
    #[error("no credential source yielded a token: {0}")]
    NoCredential(String),
    #[error("transport error")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientSecret {
    /// `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET`, if both are set.
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("AZURE_CLIENT_ID").ok()?;
        let client_secret = std::env::var("AZURE_CLIENT_SECRET").ok()?;
        Some(Self {
            client_id,
            client_secret,
        })
    }
}

pub struct CredentialChain {
    http: Client,
    tenant_id: String,
    authority: String,
    imds_endpoint: String,
    client_secret: Option<ClientSecret>,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzCliTokenResponse {
    access_token: String,
}

impl CredentialChain {
    pub fn from_env(tenant_id: &str) -> Self {
        Self {
            http: Client::new(),
            tenant_id: tenant_id.to_string(),
            authority: DEFAULT_AUTHORITY.to_string(),
            imds_endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
            client_secret: ClientSecret::from_env(),
        }
    }

    #[cfg(test)]
    fn with_sources(
        tenant_id: &str,
        authority: &str,
        imds_endpoint: &str,
        client_secret: Option<ClientSecret>,
    ) -> Self {
        Self {
            http: Client::new(),
            tenant_id: tenant_id.to_string(),
            authority: authority.to_string(),
            imds_endpoint: imds_endpoint.to_string(),
            client_secret,
        }
    }

    /// Walk the chain and return a bearer token for the management API.
    pub async fn acquire(&self) -> Result<String, AuthError> {
        let mut failures = Vec::new();

        if let Some(secret) = &self.client_secret {
            match self.client_secret_token(secret).await {
                Ok(token) => {
                    debug!("credential source: client secret");
                    return Ok(token);
                }
                Err(e) => failures.push(format!("client secret: {e}")),
            }
        } else {
            failures.push("client secret: AZURE_CLIENT_ID/AZURE_CLIENT_SECRET not set".into());
        }

        match self.imds_token().await {
            Ok(token) => {
                debug!("credential source: managed identity");
                return Ok(token);
            }
            Err(e) => failures.push(format!("managed identity: {e}")),
        }

        match self.az_cli_token().await {
            Ok(token) => {
                debug!("credential source: azure cli");
                return Ok(token);
            }
            Err(e) => failures.push(format!("azure cli: {e}")),
        }

        Err(AuthError::NoCredential(failures.join("; ")))
    }

    async fn client_secret_token(&self, secret: &ClientSecret) -> Result<String, AuthError> {
        let url = format!("{}/{}/oauth2/v2.0/token", self.authority, self.tenant_id);
        let resp = self
            .http
            .post(url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
                ("scope", MANAGEMENT_SCOPE),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::ClientSecret(body));
        }
        let token: OAuthTokenResponse = resp.json().await?;
        Ok(token.access_token)
    }

    async fn imds_token(&self) -> Result<String, AuthError> {
        let url = format!(
            "{}/metadata/identity/oauth2/token?api-version=2018-02-01&resource={}/",
            self.imds_endpoint, MANAGEMENT_RESOURCE
        );
        let resp = self
            .http
            .get(url)
            .header("Metadata", "true")
            .timeout(IMDS_PROBE_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Imds(body));
        }
        let token: OAuthTokenResponse = resp.json().await?;
        Ok(token.access_token)
    }

    async fn az_cli_token(&self) -> Result<String, AuthError> {
        let output = tokio::process::Command::new("az")
            .args([
                "account",
                "get-access-token",
                "--resource",
                MANAGEMENT_RESOURCE,
                "--tenant",
                &self.tenant_id,
                "--output",
                "json",
            ])
            .output()
            .await
            .map_err(|e| AuthError::AzCli(format!("az not runnable: {e}")))?;
        if !output.status.success() {
            return Err(AuthError::AzCli(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        let token: AzCliTokenResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| AuthError::AzCli(format!("unexpected az output: {e}")))?;
        Ok(token.access_token)
    }
}
