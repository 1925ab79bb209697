//! Identity provider access: the Graph `/me` lookup and the authorisation
//! URL for the federated login flow.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{instrument, warn};
use url::Url;

use crate::config::AzureConfig;

/// Scope requested for the federated login.
pub const GRAPH_USER_READ_SCOPE: &str = "https://graph.microsoft.com/User.Read";
pub const GRAPH_TIMEOUT: Duration = Duration::from_secs(10);
const AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The provider refused the access token.
    #[error("identity provider rejected the access token")]
    Rejected,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// The caller as the identity provider sees them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphUser {
    #[serde(default)]
    pub user_principal_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub mail: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve the owner of `access_token`.
    async fn fetch_me(&self, access_token: &str) -> Result<GraphUser, GraphError>;
}

/// [`IdentityProvider`] backed by Microsoft Graph.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: ReqwestClient,
    me_url: String,
}

impl GraphClient {
    pub fn new(base_url: &Url) -> Result<Self, GraphError> {
        let http = ReqwestClient::builder()
            .timeout(GRAPH_TIMEOUT)
            .build()
            .map_err(|e| GraphError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            me_url: format!("{}/me", base_url.as_str().trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl IdentityProvider for GraphClient {
    #[instrument(skip_all)]
    async fn fetch_me(&self, access_token: &str) -> Result<GraphUser, GraphError> {
        let response = self
            .http
            .get(&self.me_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "graph request failed");
                GraphError::Unavailable(e.to_string())
            })?;

        match response.status() {
            s if s.is_success() => response.json::<GraphUser>().await.map_err(|e| {
                warn!(error = %e, "graph returned a malformed profile");
                GraphError::Unavailable("malformed graph response".into())
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GraphError::Rejected),
            status => {
                warn!(%status, "graph answered with an error status");
                Err(GraphError::Unavailable(format!("unexpected status {status}")))
            }
        }
    }
}

/// Authorisation-code URL the client is redirected to.
pub fn azure_login_url(config: &AzureConfig) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!(
        "{AUTHORITY_HOST}/{}/oauth2/v2.0/authorize",
        config.tenant_id
    ))?;
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("response_type", "code")
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("response_mode", "query")
        .append_pair("scope", &format!("{GRAPH_USER_READ_SCOPE} openid profile offline_access"));
    Ok(url)
}
