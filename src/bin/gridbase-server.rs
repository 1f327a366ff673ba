/// Gridbase Server
///
/// Standalone server exposing the row store over WebSocket and HTTP.

use gridbase::config::ServerConfig;
use gridbase::server::{initial_store, run_server};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ServerConfig::from_env().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let store = initial_store(&config).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    run_server(config, store).await
}
