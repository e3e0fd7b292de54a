use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod admission;
mod config;
mod dbus_interface;
mod engine;
#[cfg(test)]
mod testutil;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = config::Config::from_env();
    let engine = engine::spawn_engine(&config)?;
    let service = dbus_interface::RollCallService::new(engine);

    let _conn = zbus::connection::Builder::session()?
        .name("edu.campus.RollCall1")?
        .serve_at("/edu/campus/RollCall1", service)?
        .build()
        .await?;

    tracing::info!("rollcalld ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
