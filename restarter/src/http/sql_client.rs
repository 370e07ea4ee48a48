// File: restarter/src/http/sql_client.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ClusterProbe, SqlResponse};
use crate::config::SqlConfig;
use crate::constants::health::HEALTH_QUERY;
use crate::types::{ClusterSpec, HealthStatus};

pub struct HttpSqlProbe {
    config: SqlConfig,
    client: Client,
}

impl HttpSqlProbe {
    pub fn new(config: SqlConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| anyhow!("Failed to build SQL HTTP client: {}", e))?;

        Ok(Self { config, client })
    }

    /// Fills `{cluster}`, `{crd}`, `{namespace}`, `{statefulset}` and `{pod}`
    pub fn render_url(template: &str, cluster: &ClusterSpec, pod: Option<&str>) -> String {
        let identity = cluster.identity();
        let mut url = template
            .replace("{cluster}", &identity.name)
            .replace("{crd}", &identity.crd_name)
            .replace("{namespace}", &identity.namespace)
            .replace("{statefulset}", &identity.statefulset_name);
        if let Some(pod) = pod {
            url = url.replace("{pod}", pod);
        }
        url
    }

    async fn post_statement(&self, url: &str, statement: &str) -> Result<SqlResponse> {
        debug!("Executing on {}: {}", url, statement);

        let mut request = self.client.post(url).json(&json!({ "stmt": statement }));
        if let Some(username) = &self.config.username {
            request = request.basic_auth(username, self.config.password.as_ref());
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow::Error::new(e).context(format!("SQL request to {} failed", url)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body
                .pointer("/error/message")
                .and_then(|v| v.as_str())
                .unwrap_or("no error message");
            return Err(anyhow!("SQL statement failed on {} with status {}: {}", url, status, message));
        }

        response
            .json::<SqlResponse>()
            .await
            .map_err(|e| anyhow!("Failed to parse SQL response from {}: {}", url, e))
    }
}

#[async_trait]
impl ClusterProbe for HttpSqlProbe {
    async fn cluster_health(&self, cluster: &ClusterSpec) -> Result<HealthStatus> {
        let url = Self::render_url(&self.config.cluster_url_template, cluster, None);

        let response = match self.post_statement(&url, HEALTH_QUERY).await {
            Ok(response) => response,
            Err(e) => {
                let unreachable = e
                    .chain()
                    .filter_map(|cause| cause.downcast_ref::<reqwest::Error>())
                    .any(|re| re.is_connect() || re.is_timeout());
                if unreachable {
                    warn!("Cluster {} is unreachable: {:#}", cluster.name(), e);
                    return Ok(HealthStatus::Unreachable);
                }
                return Err(e);
            }
        };

        // No rows means every table is healthy
        let status = response
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|value| value.as_str())
            .map(HealthStatus::parse)
            .unwrap_or(HealthStatus::Green);

        Ok(status)
    }

    async fn execute(&self, cluster: &ClusterSpec, pod: &str, statement: &str) -> Result<SqlResponse> {
        let url = Self::render_url(&self.config.pod_url_template, cluster, Some(pod));
        self.post_statement(&url, statement).await
    }
}
