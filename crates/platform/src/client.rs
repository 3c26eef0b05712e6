use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use herald_common::config::AppConfig;
use herald_common::error::RemoteError;
use herald_common::http::{build_http_client, decode_response};
use herald_common::run_state::format_run_state;
use herald_common::types::{InstanceUsage, LifecycleEvent, Workload};

use crate::PlatformApi;
use crate::auth::{Authenticator, Credentials};
use crate::models::{AppEntity, EventEntity, Page, Resource, StatsResponse, usage_from_stats};

/// Event retrieval stopped on a failing page.
///
/// Events from the pages fetched before the failure are kept in `fetched`;
/// callers decide whether to use or discard them.
#[derive(Debug, Error)]
#[error("events_since failed on page {page} after {} events were fetched: {source}", .fetched.len())]
pub struct EventsError {
    pub page: u32,
    pub fetched: Vec<LifecycleEvent>,
    #[source]
    pub source: RemoteError,
}

/// Pages fetched before a page request failed.
struct PartialPages<E> {
    fetched: Vec<Resource<E>>,
    page: u32,
    error: RemoteError,
}

/// Client for the control plane's v2 API.
pub struct PlatformClient {
    http: reqwest::Client,
    api_url: String,
    auth: Authenticator,
}

impl PlatformClient {
    pub fn new(
        api_url: impl Into<String>,
        credentials: Credentials,
        timeout: Duration,
        skip_ssl_validation: bool,
    ) -> Result<Self, RemoteError> {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let http = build_http_client(timeout, skip_ssl_validation)?;

        Ok(Self {
            auth: Authenticator::new(http.clone(), api_url.clone(), credentials),
            http,
            api_url,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, RemoteError> {
        Self::new(
            config.cf_api_url.clone(),
            Credentials {
                username: config.cf_username.clone(),
                password: config.cf_password.clone(),
                client_id: config.cf_client_id.clone(),
                client_secret: config.cf_client_secret.clone(),
            },
            config.http_timeout(),
            config.cf_skip_ssl_validation,
        )
    }

    /// Authenticated GET of `path`, decoded as JSON.
    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let token = self.auth.token().await?;

        let response = self
            .http
            .get(format!("{}{}", self.api_url, path))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| RemoteError::transport(operation, e))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(operation, "Token rejected, will log in again on next call");
            self.auth.invalidate().await;
        }

        decode_response(operation, response).await
    }

    /// Fetch every page of a list endpoint, page 1 first.
    ///
    /// Iterates while the current page number is below the `total_pages`
    /// reported by the latest response.
    async fn fetch_all_pages<E: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Resource<E>>, PartialPages<E>> {
        let mut fetched = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut params = query.to_vec();
            params.push(("page", page.to_string()));

            let body: Page<E> = match self.get_json(operation, path, &params).await {
                Ok(body) => body,
                Err(error) => {
                    return Err(PartialPages {
                        fetched,
                        page,
                        error,
                    });
                }
            };

            tracing::debug!(
                operation,
                page,
                total_pages = body.total_pages,
                entities = body.resources.len(),
                "Fetched page"
            );

            let total_pages = body.total_pages;
            fetched.extend(body.resources);

            if page >= total_pages {
                break;
            }
            page += 1;
        }

        Ok(fetched)
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn list_workloads(&self) -> Result<Vec<Workload>, RemoteError> {
        let resources = self
            .fetch_all_pages::<AppEntity>("list_workloads", "/v2/apps", &[])
            .await
            .map_err(|partial| partial.error)?;

        let workloads: Vec<Workload> = resources.into_iter().map(Workload::from).collect();
        tracing::debug!(count = workloads.len(), "Listed workloads");
        Ok(workloads)
    }

    async fn instance_usage(&self, workload_id: &str) -> Result<Vec<InstanceUsage>, RemoteError> {
        let stats: StatsResponse = self
            .get_json(
                "instance_usage",
                &format!("/v2/apps/{workload_id}/stats"),
                &[],
            )
            .await?;

        Ok(usage_from_stats(workload_id, stats))
    }

    async fn events_since(
        &self,
        threshold: Option<DateTime<Utc>>,
    ) -> Result<Vec<LifecycleEvent>, EventsError> {
        let mut query = vec![("order-direction", "desc".to_string())];
        if let Some(threshold) = threshold {
            query.push(("q", format!("timestamp>{}", format_run_state(threshold))));
        }

        match self
            .fetch_all_pages::<EventEntity>("events_since", "/v2/events", &query)
            .await
        {
            Ok(resources) => {
                let events: Vec<LifecycleEvent> = resources
                    .into_iter()
                    .map(|r| LifecycleEvent::from(r.entity))
                    .collect();
                tracing::debug!(count = events.len(), since = ?threshold, "Fetched events");
                Ok(events)
            }
            Err(partial) => Err(EventsError {
                page: partial.page,
                fetched: partial
                    .fetched
                    .into_iter()
                    .map(|r| LifecycleEvent::from(r.entity))
                    .collect(),
                source: partial.error,
            }),
        }
    }
}
