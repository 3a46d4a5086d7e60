//! Shared authenticated JSON-over-HTTP plumbing for the remote clients

use reqwest::{Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};

/// Server endpoint and basic-auth credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl ServerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
        }
    }

    /// Set basic-auth credentials
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    base: Url,
    username: Option<String>,
    password: Option<String>,
    http: reqwest::Client,
}

impl HttpClient {
    pub(crate) fn new(config: &ServerConfig, user_agent: &str) -> RemoteResult<Self> {
        let base = Url::parse(config.url.trim_end_matches('/')).map_err(|e| {
            RemoteError::NotConfigured(format!("invalid server url {:?}: {}", config.url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::NotConfigured(format!(
                "server url {:?} cannot carry a path",
                config.url
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| RemoteError::NotConfigured(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base,
            username: config.username.clone(),
            password: config.password.clone(),
            http,
        })
    }

    pub(crate) fn base_url(&self) -> &Url {
        &self.base
    }

    /// Base URL extended by percent-encoded path segments.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, url: Url) -> RemoteResult<T> {
        self.request(Method::GET, url, None::<&()>).await
    }

    pub(crate) async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: Url,
        body: &B,
    ) -> RemoteResult<T> {
        self.request(Method::POST, url, Some(body)).await
    }

    async fn request<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> RemoteResult<T> {
        debug!(method = %method, url = %url, "Remote request");

        let mut request = self.http.request(method, url.clone());
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_ref());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        Self::handle_response(url, response).await
    }

    async fn handle_response<T: DeserializeOwned>(url: Url, response: Response) -> RemoteResult<T> {
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(RemoteError::Http {
                status: status.as_u16(),
                url: url.to_string(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| RemoteError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_segments_are_percent_encoded() {
        let client = HttpClient::new(&ServerConfig::new("https://ci.example.com/"), "test").unwrap();
        let url = client.url(&["job", "feature/login", "runs", ""]);
        assert_eq!(
            url.as_str(),
            "https://ci.example.com/job/feature%2Flogin/runs/"
        );
    }

    #[test]
    fn base_path_is_kept() {
        let client =
            HttpClient::new(&ServerConfig::new("https://scm.example.com/bitbucket"), "test").unwrap();
        let url = client.url(&["rest", "api"]);
        assert_eq!(url.as_str(), "https://scm.example.com/bitbucket/rest/api");
    }

    #[test]
    fn invalid_url_is_not_configured() {
        let err = HttpClient::new(&ServerConfig::new("not a url"), "test").unwrap_err();
        assert!(matches!(err, RemoteError::NotConfigured(_)));
    }
}
