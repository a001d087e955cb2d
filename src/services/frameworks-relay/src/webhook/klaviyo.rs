//! # Marketing API Client
//!
//! Delivery of canonical events to Klaviyo and find-or-create profile
//! resolution. Every call carries the private API key and revision headers,
//! runs with an explicit timeout and is wrapped in the configured
//! [`RetryPolicy`].

use super::retry::RetryPolicy;
use crate::config::KlaviyoConfig;
use crate::error::{RelayError, RelayResult};
use crate::models::CanonicalEvent;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument};

const SERVICE: &str = "klaviyo";

/// Sends canonical events to the marketing API
#[async_trait]
pub trait DeliveryDispatcher: Send + Sync {
    async fn send(&self, event: &CanonicalEvent) -> RelayResult<()>;
}

/// Resolves the downstream profile id for a customer
#[async_trait]
pub trait ProfileResolver: Send + Sync {
    /// Find by email, then by customer code, creating the profile if neither matches
    async fn resolve(&self, email: Option<&str>, customer_code: &str) -> RelayResult<String>;
}

#[derive(Debug, Deserialize)]
struct ProfileResource {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ProfileList {
    #[serde(default)]
    data: Vec<ProfileResource>,
}

#[derive(Debug, Deserialize)]
struct ProfileCreated {
    data: ProfileResource,
}

/// Klaviyo REST client
#[derive(Debug, Clone)]
pub struct KlaviyoClient {
    http_client: Client,
    api_url: String,
    api_key: String,
    revision: String,
    timeout_secs: u64,
    retry: RetryPolicy,
}

impl KlaviyoClient {
    pub fn new(config: &KlaviyoConfig, retry: RetryPolicy) -> RelayResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("frameworks-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RelayError::internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            revision: config.api_revision.clone(),
            timeout_secs: config.timeout_secs,
            retry,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Authorization", format!("Klaviyo-API-Key {}", self.api_key))
            .header("revision", &self.revision)
            .header("Accept", "application/json")
    }

    async fn execute(&self, request: RequestBuilder) -> RelayResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| RelayError::from_reqwest(SERVICE, self.timeout_secs, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(RelayError::external_api(SERVICE, status.as_u16(), body))
    }

    async fn send_once(&self, event: &CanonicalEvent) -> RelayResult<()> {
        let body = json!({
            "data": {
                "type": "event",
                "attributes": event,
            }
        });

        self.execute(
            self.http_client
                .post(format!("{}/events/", self.api_url))
                .json(&body),
        )
        .await?;
        Ok(())
    }

    async fn find_profile(&self, filter: &str) -> RelayResult<Option<String>> {
        let response = self
            .execute(
                self.http_client
                    .get(format!("{}/profiles/", self.api_url))
                    .query(&[("filter", filter)]),
            )
            .await?;

        let list: ProfileList = response
            .json()
            .await
            .map_err(|e| RelayError::from_reqwest(SERVICE, self.timeout_secs, e))?;
        Ok(list.data.into_iter().next().map(|profile| profile.id))
    }

    async fn create_profile(&self, email: Option<&str>, customer_code: &str) -> RelayResult<String> {
        let mut attributes = serde_json::Map::new();
        if let Some(email) = email {
            attributes.insert("email".to_string(), Value::String(email.to_string()));
        }
        attributes.insert(
            "external_id".to_string(),
            Value::String(customer_code.to_string()),
        );

        let body = json!({
            "data": {
                "type": "profile",
                "attributes": attributes,
            }
        });

        let response = self
            .execute(
                self.http_client
                    .post(format!("{}/profiles/", self.api_url))
                    .json(&body),
            )
            .await?;

        let created: ProfileCreated = response
            .json()
            .await
            .map_err(|e| RelayError::from_reqwest(SERVICE, self.timeout_secs, e))?;
        Ok(created.data.id)
    }
}

/// `equals(field,"value")` with quotes and backslashes in the value escaped
fn equals_filter(field: &str, value: &str) -> String {
    let mut literal = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            literal.push('\\');
        }
        literal.push(c);
    }
    format!("equals({},\"{}\")", field, literal)
}

#[async_trait]
impl DeliveryDispatcher for KlaviyoClient {
    #[instrument(skip(self, event), fields(metric = %event.metric_name(), profile_id = %event.profile_id()))]
    async fn send(&self, event: &CanonicalEvent) -> RelayResult<()> {
        let client = self;
        self.retry
            .run("klaviyo.send_event", move |_| client.send_once(event))
            .await?;

        info!("Event delivered to Klaviyo");
        Ok(())
    }
}

#[async_trait]
impl ProfileResolver for KlaviyoClient {
    #[instrument(skip_all, fields(customer_code = %customer_code))]
    async fn resolve(&self, email: Option<&str>, customer_code: &str) -> RelayResult<String> {
        let client = self;

        if let Some(email) = email {
            let filter = equals_filter("email", email);
            let filter = filter.as_str();
            if let Some(id) = self
                .retry
                .run("klaviyo.find_profile", move |_| client.find_profile(filter))
                .await?
            {
                debug!(profile_id = %id, "Found profile by email");
                return Ok(id);
            }
        }

        let filter = equals_filter("external_id", customer_code);
        let filter = filter.as_str();
        if let Some(id) = self
            .retry
            .run("klaviyo.find_profile", move |_| client.find_profile(filter))
            .await?
        {
            debug!(profile_id = %id, "Found profile by customer code");
            return Ok(id);
        }

        let id = self
            .retry
            .run("klaviyo.create_profile", move |_| {
                client.create_profile(email, customer_code)
            })
            .await?;
        info!(profile_id = %id, "Created Klaviyo profile");
        Ok(id)
    }
}
