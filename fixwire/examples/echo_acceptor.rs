//! Acceptor echoing every application message back to its sender.
//!
//! Accepts any FIX.4.4 counterparty addressing `ECHO`:
//!
//! ```text
//! FIX_PORT=9880 RUST_LOG=info cargo run --example echo_acceptor
//! ```
use async_trait::async_trait;
use fixwire::prelude::*;
use fixwire::session::provider::WILDCARD;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 9880;
const GRACE: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Echo {
    registry: OnceLock<Arc<SessionRegistry>>,
}

#[async_trait]
impl Application for Echo {
    async fn on_create(&self, session_id: &SessionId) {
        info!(session = %session_id, "created");
    }

    async fn on_logon(&self, session_id: &SessionId) {
        info!(session = %session_id, "logged on");
    }

    async fn on_logout(&self, session_id: &SessionId) {
        info!(session = %session_id, "logged out");
    }

    async fn to_admin(&self, _message: &mut Message, _session_id: &SessionId) {}

    async fn from_admin(&self, _message: &Message, _session_id: &SessionId) -> std::result::Result<(), RejectReason> {
        Ok(())
    }

    async fn to_app(&self, _message: &mut Message, _session_id: &SessionId) {}

    async fn from_app(&self, message: &Message, session_id: &SessionId) -> std::result::Result<(), RejectReason> {
        let Some(session) = self.registry.get().and_then(|registry| registry.get(session_id)) else {
            return Ok(());
        };
        let mut echo = Message::new(message.msg_type());
        *echo.body_mut() = message.body().clone();
        // the session is locked while this callback runs
        tokio::spawn(async move {
            if let Err(err) = session.send(echo).await {
                warn!(session = %session.id(), %err, "echo failed");
            }
        });
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let port = std::env::var("FIX_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let template = SessionConfigBuilder::new()
        .begin_string("FIX.4.4")
        .sender_comp_id("ECHO")
        .target_comp_id(WILDCARD)
        .build()?;
    let echo = Arc::new(Echo::default());
    let engine = EngineBuilder::new()
        .with_application(echo.clone())
        .with_dynamic_sessions(template)
        .build()
        .await?;
    let _ = echo.registry.set(engine.registry().clone());

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tokio::select! {
        served = engine.serve(listener) => served?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
    engine.stop(GRACE).await;
    Ok(())
}
