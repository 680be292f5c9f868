use std::path::PathBuf;

/// Server configuration, read from the environment (spec.md §6) with the
/// same "env var with a sane default" discipline the reference file server
/// uses in its `main.rs`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub db_path: Option<PathBuf>,

    pub enable_e2ee: bool,
    /// 0 means unlimited.
    pub max_file_size_bytes: u64,
    pub max_lifetime_hours: u64,
    pub chunk_size_bytes: u64,

    /// The rate limiter itself is an external collaborator (spec.md §1); these
    /// two are accepted and surfaced only so operators can point it at the
    /// same config the rest of the stack reads.
    pub rate_limit_window_ms: u64,
    pub rate_limit_max_requests: u64,

    pub preserve_uploads: bool,
    /// 0 disables the sweep.
    pub zombie_cleanup_interval_ms: u64,
    pub ttl_sweep_interval_secs: u64,

    pub server_name: String,
    pub server_version: String,
    pub peerjs_path: String,
    pub ice_servers: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("DROPGATE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("DROPGATE_PORT")
            .unwrap_or_else(|_| "7420".into())
            .parse()?;
        let upload_dir: PathBuf = std::env::var("DROPGATE_UPLOAD_DIR")
            .unwrap_or_else(|_| "./dropgate-uploads".into())
            .into();
        let temp_dir: PathBuf = std::env::var("DROPGATE_TEMP_DIR")
            .unwrap_or_else(|_| "./dropgate-uploads/.tmp".into())
            .into();

        let preserve_uploads = parse_bool_env("PRESERVE_UPLOADS", false)?;
        let db_path = if preserve_uploads {
            Some(
                std::env::var("DROPGATE_DB_PATH")
                    .unwrap_or_else(|_| "dropgate-index.db".into())
                    .into(),
            )
        } else {
            None
        };

        let max_file_size_mb: u64 = parse_u64_env("MAX_FILE_SIZE_MB", 100)?;

        Ok(Self {
            host,
            port,
            upload_dir,
            temp_dir,
            db_path,
            enable_e2ee: parse_bool_env("ENABLE_E2EE", false)?,
            max_file_size_bytes: max_file_size_mb.saturating_mul(1024 * 1024),
            max_lifetime_hours: parse_u64_env("DROPGATE_MAX_LIFETIME_HOURS", 24 * 7)?,
            chunk_size_bytes: parse_u64_env("DROPGATE_CHUNK_SIZE_BYTES", 5 * 1024 * 1024)?,
            rate_limit_window_ms: parse_u64_env("RATE_LIMIT_WINDOW_MS", 0)?,
            rate_limit_max_requests: parse_u64_env("RATE_LIMIT_MAX_REQUESTS", 0)?,
            preserve_uploads,
            zombie_cleanup_interval_ms: parse_u64_env("ZOMBIE_CLEANUP_INTERVAL_MS", 300_000)?,
            ttl_sweep_interval_secs: 60,
            server_name: "dropgate".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            peerjs_path: std::env::var("DROPGATE_PEERJS_PATH").unwrap_or_else(|_| "/peerjs".into()),
            ice_servers: std::env::var("DROPGATE_ICE_SERVERS")
                .map(|v| v.split(',').map(str::trim).map(str::to_string).collect())
                .unwrap_or_default(),
        })
    }

    pub fn max_size_mb(&self) -> u64 {
        self.max_file_size_bytes / (1024 * 1024)
    }
}

fn parse_bool_env(key: &str, default: bool) -> anyhow::Result<bool> {
    match std::env::var(key) {
        Ok(v) => Ok(matches!(v.trim(), "1" | "true" | "TRUE" | "yes")),
        Err(_) => Ok(default),
    }
}

fn parse_u64_env(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(v) => v.parse().map_err(|e| anyhow::anyhow!("invalid {key}: {e}")),
        Err(_) => Ok(default),
    }
}
