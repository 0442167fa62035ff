use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Receiver-side configuration for chunked uploads
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Root directory holding one staging directory per session (default: "uploads/temp_chunks")
    pub staging_dir: PathBuf,

    /// Root directory for reassembled artifacts (default: "uploads/files")
    pub final_dir: PathBuf,

    /// Per-chunk payload ceiling in bytes (default: 10 MB)
    pub max_chunk_size: usize,

    /// Accepted file extensions, lowercase, without the dot (default: kml, kmz)
    pub allowed_extensions: Vec<String>,

    /// Staging areas idle for longer than this are garbage collected (default: 1 hour)
    pub staging_retention: Duration,

    /// Interval of the background GC sweep (default: 15 minutes)
    pub gc_interval: Duration,

    /// Probability of an opportunistic GC sweep after a chunk is accepted (default: 0.1)
    pub gc_probability: f64,

    /// Address the HTTP server binds to (default: 127.0.0.1:3000)
    pub bind_addr: String,

    /// Optional bearer token required on upload routes
    pub upload_token: Option<String>,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("uploads/temp_chunks"),
            final_dir: PathBuf::from("uploads/files"),
            max_chunk_size: 10 * 1024 * 1024, // 10 MB
            allowed_extensions: vec!["kml".to_string(), "kmz".to_string()],
            staging_retention: Duration::from_secs(3600),
            gc_interval: Duration::from_secs(900),
            gc_probability: 0.1,
            bind_addr: "127.0.0.1:3000".to_string(),
            upload_token: None,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(), // Vite default
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            final_dir: env::var("FINAL_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.final_dir),

            max_chunk_size: env::var("MAX_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_chunk_size),

            allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                .ok()
                .map(|v| parse_extensions(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or(default.allowed_extensions),

            staging_retention: env::var("STAGING_RETENTION_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.staging_retention),

            gc_interval: env::var("GC_INTERVAL_SECS")
                .ok()
                .and_then(|v| parse_period(&v))
                .unwrap_or(default.gc_interval),

            gc_probability: env::var("GC_PROBABILITY")
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
                .map(|p| p.clamp(0.0, 1.0))
                .unwrap_or(default.gc_probability),

            bind_addr: env::var("BIND_ADDR").unwrap_or(default.bind_addr),

            upload_token: env::var("UPLOAD_TOKEN").ok().filter(|t| !t.is_empty()),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }

    /// Config rooted at a scratch directory, with opportunistic GC disabled
    pub fn development(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            staging_dir: root.join("temp_chunks"),
            final_dir: root.join("files"),
            gc_probability: 0.0,
            ..Self::default()
        }
    }
}

/// Whole seconds, zero excluded; a timer cannot tick at a zero period.
fn parse_period(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
