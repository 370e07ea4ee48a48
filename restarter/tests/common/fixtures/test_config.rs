//! Test configuration builder for creating test configs programmatically

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Builder for a config directory with `main.toml` and maintenance windows
pub struct TestConfigBuilder {
    temp_dir: TempDir,
    main_config: MainConfigBuilder,
    maintenance_files: Vec<(String, String)>,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self {
            temp_dir,
            main_config: MainConfigBuilder::default(),
            maintenance_files: Vec::new(),
        }
    }

    pub fn with_main_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(MainConfigBuilder) -> MainConfigBuilder,
    {
        self.main_config = f(self.main_config);
        self
    }

    /// Adds a file under `config/maintenance/`
    pub fn with_maintenance_file(mut self, file_name: &str, content: &str) -> Self {
        self.maintenance_files.push((file_name.to_string(), content.to_string()));
        self
    }

    /// Writes config files to the temp directory
    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");

        fs::write(config_dir.join("main.toml"), self.main_config.to_toml()).expect("Failed to write main.toml");

        if !self.maintenance_files.is_empty() {
            let maintenance_dir = config_dir.join("maintenance");
            fs::create_dir_all(&maintenance_dir).expect("Failed to create maintenance dir");
            for (name, content) in &self.maintenance_files {
                fs::write(maintenance_dir.join(name), content).expect("Failed to write maintenance config");
            }
        }

        TestConfig {
            _temp_dir: self.temp_dir,
            config_dir,
        }
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct MainConfigBuilder {
    clusters: Vec<String>,
    maintenance_config_path: Option<String>,
    only_on_suspended_nodes: bool,
    ignore_maintenance_windows: bool,
    pod_ready_timeout_seconds: u64,
    max_concurrent_clusters: usize,
    sql_username: Option<String>,
    sql_password: Option<String>,
}

impl MainConfigBuilder {
    pub fn cluster(mut self, name: &str) -> Self {
        self.clusters.push(name.to_string());
        self
    }

    pub fn maintenance_path(mut self, path: &str) -> Self {
        self.maintenance_config_path = Some(path.to_string());
        self
    }

    pub fn only_on_suspended_nodes(mut self) -> Self {
        self.only_on_suspended_nodes = true;
        self
    }

    pub fn ignore_maintenance_windows(mut self) -> Self {
        self.ignore_maintenance_windows = true;
        self
    }

    pub fn pod_ready_timeout(mut self, seconds: u64) -> Self {
        self.pod_ready_timeout_seconds = seconds;
        self
    }

    pub fn max_concurrent_clusters(mut self, max: usize) -> Self {
        self.max_concurrent_clusters = max;
        self
    }

    pub fn sql_credentials(mut self, username: Option<&str>, password: Option<&str>) -> Self {
        self.sql_username = username.map(str::to_string);
        self.sql_password = password.map(str::to_string);
        self
    }

    fn to_toml(&self) -> String {
        let clusters = self
            .clusters
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut toml = format!(
            r#"
clusters = [{}]
only_on_suspended_nodes = {}
ignore_maintenance_windows = {}
pod_ready_timeout_seconds = {}
max_concurrent_clusters = {}
"#,
            clusters,
            self.only_on_suspended_nodes,
            self.ignore_maintenance_windows,
            self.pod_ready_timeout_seconds,
            self.max_concurrent_clusters
        );
        if let Some(path) = &self.maintenance_config_path {
            toml.push_str(&format!("maintenance_config_path = \"{}\"\n", path));
        }

        toml.push_str("\n[sql]\n");
        if let Some(username) = &self.sql_username {
            toml.push_str(&format!("username = \"{}\"\n", username));
        }
        if let Some(password) = &self.sql_password {
            toml.push_str(&format!("password = \"{}\"\n", password));
        }
        toml
    }
}

impl Default for MainConfigBuilder {
    fn default() -> Self {
        Self {
            clusters: Vec::new(),
            maintenance_config_path: None,
            only_on_suspended_nodes: false,
            ignore_maintenance_windows: false,
            pod_ready_timeout_seconds: 300,
            max_concurrent_clusters: 1,
            sql_username: None,
            sql_password: None,
        }
    }
}

/// Test configuration with temp directory
pub struct TestConfig {
    _temp_dir: TempDir,
    pub config_dir: PathBuf,
}

impl TestConfig {
    pub fn config_dir_str(&self) -> String {
        self.config_dir.to_string_lossy().to_string()
    }
}
