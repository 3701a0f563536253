//! Process entry point: bind the listeners, start the simulation, serve
//! until a shutdown signal arrives.

use anyhow::Context;
use s7_honeypot::error::HoneypotError;
use s7_honeypot::model::shared_process;
use s7_honeypot::modbus::{proxy::run_proxy, server::run_internal_server};
use s7_honeypot::projection::{run_projection, RegisterImage, SharedRegisters};
use s7_honeypot::s7::run_responder;
use s7_honeypot::scan::run_scan_cycle;
use s7_honeypot::types::{INTERNAL_MODBUS_ADDR, MODBUS_LISTEN_ADDR, S7_LISTEN_ADDR};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn bind(endpoint: &str) -> Result<TcpListener, HoneypotError> {
    TcpListener::bind(endpoint)
        .await
        .map_err(|source| HoneypotError::Bind {
            endpoint: endpoint.into(),
            source,
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("s7-honeypot {} starting", s7_honeypot::VERSION);

    // Bind everything up front so a port clash is fatal before any task runs.
    let s7_listener = bind(S7_LISTEN_ADDR).await?;
    let modbus_listener = bind(MODBUS_LISTEN_ADDR).await?;
    let internal_listener = bind(INTERNAL_MODBUS_ADDR).await?;
    let upstream = internal_listener.local_addr()?;

    let process = shared_process();
    let registers: SharedRegisters = Arc::new(RegisterImage::new());

    tokio::spawn(run_scan_cycle(process.clone()));
    tokio::spawn(run_projection(process, registers.clone()));
    tokio::spawn(run_internal_server(internal_listener, registers));
    tokio::spawn(run_proxy(modbus_listener, upstream));
    tokio::spawn(run_responder(s7_listener));

    info!(
        "S7-1200 honeypot up (S7comm on {}, Modbus/TCP on {})",
        S7_LISTEN_ADDR, MODBUS_LISTEN_ADDR
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown signal received, stopping");
    Ok(())
}
