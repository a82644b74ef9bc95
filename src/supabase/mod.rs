//! PostgREST client for the follow-up reads the notifications need.
//!
//! Requests use the service-role key, so row level security does not hide
//! the profiles of other users.

pub mod models;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub use models::{Application, CompanyRef, Job, Profile};

use crate::config::SupabaseConfig;

/// Read access to the rows referenced by change events
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn profile(&self, id: &str) -> Result<Option<Profile>>;

    /// Job joined with its company name
    async fn job_with_company(&self, id: &str) -> Result<Option<Job>>;
}

/// Supabase REST (PostgREST) client
pub struct SupabaseClient {
    base_url: String,
    service_key: String,
    client: reqwest::Client,
}

impl SupabaseClient {
    pub fn new(base_url: &str, service_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            client,
        })
    }

    /// `None` when the project URL or service key is missing
    pub fn from_config(config: &SupabaseConfig) -> Result<Option<Self>> {
        match (config.url.as_deref(), config.service_key.as_deref()) {
            (Some(url), Some(key)) if !url.is_empty() && !key.is_empty() => {
                Self::new(url, key).map(Some)
            }
            _ => Ok(None),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// GET rows from a table with PostgREST query parameters
    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        let response = self
            .client
            .get(self.rest_url(table))
            .query(query)
            .header("apikey", &self.service_key)
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to query {}", table))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Supabase query on {} failed: {} - {}", table, status, body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} rows", table))
    }

    async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        select: &str,
        id: &str,
    ) -> Result<Option<T>> {
        let rows = self
            .select::<T>(
                table,
                &[
                    ("select", select.to_string()),
                    ("id", format!("eq.{}", id)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Check that the REST endpoint answers with the configured key
    pub async fn ping(&self) -> Result<()> {
        self.select::<serde_json::Value>(
            "profiles",
            &[("select", "id".to_string()), ("limit", "1".to_string())],
        )
        .await
        .map(|_| ())
    }
}

#[async_trait]
impl RecordSource for SupabaseClient {
    async fn profile(&self, id: &str) -> Result<Option<Profile>> {
        self.select_one("profiles", "id,email,full_name,role", id).await
    }

    async fn job_with_company(&self, id: &str) -> Result<Option<Job>> {
        self.select_one(
            "jobs",
            "id,title,company_id,employer_id,location,slug,job_type,companies(name)",
            id,
        )
        .await
    }
}
