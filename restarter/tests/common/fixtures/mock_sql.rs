//! Mock CrateDB `_sql` endpoint for testing the HTTP probe
//!
//! Cluster-wide queries go to `/{namespace}/{cluster}/_sql`, statements for a
//! single pod to `/{namespace}/pods/{pod}/_sql`.

use restarter::config::SqlConfig;
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

pub struct MockSqlServer {
    pub server: MockServer,
    pub base_url: String,
}

impl MockSqlServer {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self { server, base_url }
    }

    /// Probe settings pointing at this server
    pub fn sql_config(&self) -> SqlConfig {
        SqlConfig {
            cluster_url_template: format!("{}/{{namespace}}/{{cluster}}/_sql", self.base_url),
            pod_url_template: format!("{}/{{namespace}}/pods/{{pod}}/_sql", self.base_url),
            request_timeout_seconds: 5,
            ..SqlConfig::default()
        }
    }

    /// `sys.health` answers with one row carrying `health`
    pub async fn mock_health(&self, cluster_path: &str, health: &str) {
        Mock::given(method("POST"))
            .and(path(cluster_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cols": ["health"],
                "rows": [[health]],
                "rowcount": 1,
                "duration": 1.2
            })))
            .mount(&self.server)
            .await;
    }

    /// `sys.health` has no rows when every table is healthy
    pub async fn mock_no_health_rows(&self, cluster_path: &str) {
        Mock::given(method("POST"))
            .and(path(cluster_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cols": ["health"],
                "rows": [],
                "rowcount": 0,
                "duration": 0.8
            })))
            .mount(&self.server)
            .await;
    }

    /// Accepts exactly `statement` on `pod_path`
    pub async fn mock_statement(&self, pod_path: &str, statement: &str) {
        Mock::given(method("POST"))
            .and(path(pod_path))
            .and(body_partial_json(json!({ "stmt": statement })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cols": [],
                "rows": [[]],
                "rowcount": 1,
                "duration": 3.0
            })))
            .expect(1)
            .mount(&self.server)
            .await;
    }

    /// CrateDB-style error body
    pub async fn mock_error(&self, any_path: &str, status: u16, message: &str) {
        Mock::given(method("POST"))
            .and(path(any_path))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": {
                    "message": message,
                    "code": 4000
                }
            })))
            .mount(&self.server)
            .await;
    }
}
