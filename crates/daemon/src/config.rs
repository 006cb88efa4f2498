use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: SocketAddr,
    pub provider_id: String,

    /// Fleet engine REST endpoint; `None` keeps everything in process memory.
    pub fleet_engine_url: Option<String>,
    pub fleet_token: Option<String>,
    pub request_timeout: Duration,

    /// SurrealKV directory; `None` keeps manifests in memory.
    pub db_dir: Option<PathBuf>,
    /// Delivery configuration loaded at start-up.
    pub config_file: Option<PathBuf>,
}
