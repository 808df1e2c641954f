//! Minimal demo binary: attaches to the first toy pad found, prints
//! tag events as they arrive, and turns the lights off on exit.

use std::sync::Arc;

use toypad_rs::{Engine, EngineConfig, HidApiTransport, TagEvent};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let engine = Engine::new(Arc::new(HidApiTransport::new()), EngineConfig::default());

    if !engine.start().await? {
        tracing::warn!("no toy pad found");
        return Ok(());
    }

    let mut events = engine.tag_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                TagEvent::Added { zone, uid } => {
                    tracing::info!(?zone, uid = %uid.to_hex_upper(), "tag added");
                }
                TagEvent::Removed { zone } => {
                    tracing::info!(?zone, "tag removed");
                }
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    engine.lights_off().await.ok();
    engine.stop().await;
    Ok(())
}
