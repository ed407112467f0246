use std::path::PathBuf;

/// Centralized configuration for the csvserve process.
///
/// Built once at startup (usually via [`ServerConfig::from_env`]) and passed
/// explicitly to the server and ingestion paths; nothing reads these values
/// from ambient global state.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the HTTP listener binds on all interfaces.
    pub http_port: u16,
    /// SQLite database file holding the uploaded_data table.
    pub db_path: PathBuf,
    /// Directory every raw uploaded file is persisted under, never cleaned up.
    pub upload_dir: PathBuf,
}

pub const DEFAULT_HTTP_PORT: u16 = 4444;
pub const DEFAULT_DB_PATH: &str = "uploaded_csv.db";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
        }
    }
}

impl ServerConfig {
    /// Read configuration from `CSVSERVE_*` environment variables, falling
    /// back to the defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let http_port = std::env::var("CSVSERVE_HTTP_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(DEFAULT_HTTP_PORT);
        let db_path = std::env::var("CSVSERVE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));
        let upload_dir = std::env::var("CSVSERVE_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR));
        Self { http_port, db_path, upload_dir }
    }

    /// Destination for an uploaded file. The client-supplied name is joined
    /// verbatim; no path-traversal or normalization is applied.
    #[inline]
    pub fn upload_path(&self, file_name: &str) -> PathBuf {
        self.upload_dir.join(file_name)
    }
}
