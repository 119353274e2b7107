use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::http::connection::Connection;
use crate::http::middleware::Middleware;

pub async fn run(cfg: &Config, chain: Arc<dyn Middleware>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("Listening on {}", cfg.listen_addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        tracing::debug!(%peer, "accepted connection");

        let chain = Arc::clone(&chain);
        let limits = cfg.limits();
        tokio::spawn(async move {
            let conn = Connection::new(socket, chain, limits);
            if let Err(e) = conn.run().await {
                tracing::error!(%peer, error = %e, "connection error");
            }
        });
    }
}
