// src/main.rs
use std::sync::Arc;
use env_logger::Env;
use log::{ error, info };
use serverscout::sources::http_master::build_http_client;
use serverscout::storage::memory::ServerStore;
use serverscout::{ Config, DiscoveryEngine, LogReporter };
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env();

    // One transport for the whole process
    let http = match build_http_client(config.http_timeout()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            return Err(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()));
        }
    };

    let engine = DiscoveryEngine::new(config, &http, Arc::new(LogReporter));
    let store = ServerStore::new();

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling discovery");
            on_ctrl_c.cancel();
        }
    });

    let summary = engine
        .run_cycle(
            |record| {
                match serde_json::to_string(&record) {
                    Ok(line) => println!("{}", line),
                    Err(e) => error!("Failed to encode record for {}: {}", record.endpoint, e),
                }
                store.upsert(record);
            },
            &cancel
        ).await;

    info!(
        "Found {} servers with {} players (udp master {}, http master {}, lan {})",
        store.len(),
        store.total_players(),
        summary.discovered.udp_master,
        summary.discovered.http_master,
        summary.discovered.lan
    );
    Ok(())
}
