//! API configuration.

use std::path::PathBuf;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Max request body size, uploads included
    pub max_body_size: usize,
    /// Where uploaded sources and targets are stored
    pub upload_dir: PathBuf,
    /// Output directory used when the form leaves `output_dir` empty
    pub default_output_dir: PathBuf,
    /// Extra roots that downloads and previews may read from
    pub file_roots: Vec<PathBuf>,
    /// Expose `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_origins: vec!["*".to_string()],
            max_body_size: 2 * 1024 * 1024 * 1024, // 2GB
            upload_dir: PathBuf::from("uploads"),
            default_output_dir: PathBuf::from("Output"),
            file_roots: Vec::new(),
            metrics_enabled: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            max_body_size: std::env::var("MAX_BODY_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_size),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            default_output_dir: std::env::var("WORKER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.default_output_dir),
            file_roots: std::env::var("API_FILE_ROOTS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or_default(),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Directories downloads and previews are confined to.
    pub fn allowed_roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.upload_dir.clone(), self.default_output_dir.clone()];
        roots.extend(self.file_roots.iter().cloned());
        roots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_roots_include_uploads_and_output() {
        let config = ApiConfig {
            file_roots: vec![PathBuf::from("/srv/media")],
            ..ApiConfig::default()
        };
        assert_eq!(
            config.allowed_roots(),
            vec![
                PathBuf::from("uploads"),
                PathBuf::from("Output"),
                PathBuf::from("/srv/media"),
            ]
        );
    }
}
