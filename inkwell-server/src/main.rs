use inkwell_collab::{ServerConfig, SyncServer};
use log::{error, info, warn};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    info!("Starting Inkwell on {}...", config.bind_addr);
    warn!("Room history is kept in memory only and is lost on restart");

    let server = SyncServer::new(config);
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {e}");
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            let stats = server.stats().await;
            info!(
                "Shutting down ({} connections served, {} rooms)",
                stats.total_connections, stats.active_rooms
            );
        }
    }
}
