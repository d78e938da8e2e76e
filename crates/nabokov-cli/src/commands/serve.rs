//! HTTP backend command.

use nabokov_provider::GenerationService;
use nabokov_server::AppState;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

pub async fn run(service: Arc<GenerationService>, host: &str, port: u16) -> anyhow::Result<()> {
    let ip: IpAddr = host
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid host '{host}': {e}"))?;
    let addr = SocketAddr::new(ip, port);

    eprintln!("Nabokov backend on http://{addr}");
    eprintln!(
        "  provider: {} ({})",
        service.provider_name(),
        service.provider_key()
    );
    eprintln!("  GET  /health");
    eprintln!("  POST /api/message");
    eprintln!("  POST /api/stream");

    nabokov_server::serve(addr, Arc::new(AppState::new(service))).await?;
    Ok(())
}
