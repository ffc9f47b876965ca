use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, warn};

use super::ApiMethod;
use crate::config::{API_TOKEN_PROPERTY, Config};
use crate::db::PropertySource;
use crate::utils::{AppError, AppResult};

/// Raw HTTP access to the Web API. Implementations authenticate every call;
/// interpreting the payload is left to [`super::SlackApiClient`].
#[async_trait]
pub trait SlackTransport: Send + Sync {
    async fn get(&self, method: ApiMethod, params: &[(&str, String)]) -> AppResult<Value>;

    async fn download(&self, url: &str) -> AppResult<Vec<u8>>;
}

pub struct HttpTransport {
    http: reqwest::Client,
    api_url: String,
    properties: Arc<dyn PropertySource>,
}

impl HttpTransport {
    pub fn new(config: &Config, properties: Arc<dyn PropertySource>) -> AppResult<Self> {
        if !properties.exists(API_TOKEN_PROPERTY) {
            warn!("property {} is not configured, API calls will fail", API_TOKEN_PROPERTY);
        }
        let http = reqwest::Client::builder()
            .user_agent(config.slack.user_agent.clone())
            .build()?;

        Ok(Self {
            http,
            api_url: config.slack.api_url.clone(),
            properties,
        })
    }

    fn token(&self) -> AppResult<SecretString> {
        let token = self.properties.get_property(API_TOKEN_PROPERTY)?;
        Ok(SecretString::from(token))
    }
}

#[async_trait]
impl SlackTransport for HttpTransport {
    async fn get(&self, method: ApiMethod, params: &[(&str, String)]) -> AppResult<Value> {
        let url = build_url(&self.api_url, method, params);
        debug!("GET {}", url);

        let token = self.token()?;
        let response = self
            .http
            .get(&url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::remote(
                method.as_str(),
                format!("status={} body={}", status, body),
            ));
        }

        let value = response.json::<Value>().await.map_err(|e| {
            AppError::remote(method.as_str(), format!("non-JSON body: {e}"))
        })?;
        Ok(value)
    }

    async fn download(&self, url: &str) -> AppResult<Vec<u8>> {
        debug!("downloading file from {}", url);

        let token = self.token()?;
        let response = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::remote(
                "file download",
                format!("{} returned status {}", url, status),
            ));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// `https://slack.com/api/conversations.history?channel=C1&limit=1000&oldest=...`
pub fn build_url(api_url: &str, method: ApiMethod, params: &[(&str, String)]) -> String {
    let mut url = format!("{}{}", api_url, method.as_str());
    if params.is_empty() {
        return url;
    }

    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
        .finish();
    url.push('?');
    url.push_str(&query);
    url
}
