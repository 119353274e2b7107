use std::sync::Arc;

use kestrel::config::Config;
use kestrel::http::error::HttpError;
use kestrel::http::middleware::{Chain, Flow};
use kestrel::http::request::Request;
use kestrel::http::response::{Response, StatusCode};
use kestrel::server;

fn log_request(req: &Request, _resp: &mut Response) -> Result<Flow, HttpError> {
    tracing::info!(method = ?req.method, target = %req.target, "request");
    Ok(Flow::Done)
}

fn hello(req: &Request, resp: &mut Response) -> Result<Flow, HttpError> {
    match req.target.as_str() {
        "/" => {
            resp.set_header("Content-Type", "text/plain");
            resp.set_body("Hello from kestrel\n");
        }
        _ => {
            resp.status = StatusCode::NotFound;
            resp.set_body("404 Not Found\n");
        }
    }
    Ok(Flow::Done)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let chain = Arc::new(Chain::new().link(log_request).link(hello));

    tokio::select! {
        res = server::listener::run(&cfg, chain) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
