/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Shared periodic tick driving every session's timer logic.

use fixwire_session::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

/// Default tick period.
pub const DEFAULT_TIMER_INTERVAL: Duration = Duration::from_secs(1);

/// Task calling [`Session::on_timer`](fixwire_session::Session::on_timer) on
/// every registered session once per tick.
#[derive(Debug)]
pub struct SessionTimer {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SessionTimer {
    /// Starts the timer task.
    #[must_use]
    pub fn spawn(registry: Arc<SessionRegistry>, period: Duration) -> Self {
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(registry, period, stop_rx));
        Self { stop, handle }
    }

    /// Cancels the timer and waits for the current tick to finish.
    pub async fn stop(self) {
        self.stop.send_replace(true);
        if let Err(err) = self.handle.await {
            warn!(%err, "session timer panicked");
        }
    }
}

async fn run(registry: Arc<SessionRegistry>, period: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => tick(&registry).await,
            _ = stop.changed() => break,
        }
    }
    debug!("session timer stopped");
}

async fn tick(registry: &SessionRegistry) {
    for session in registry.sessions() {
        if let Err(err) = session.on_timer().await {
            warn!(session = %session.id(), %err, "timer processing failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockResponder, initiator_session};
    use fixwire_core::message::MsgType;

    #[tokio::test(start_paused = true)]
    async fn test_timer_drives_initiator_logon() {
        let registry = Arc::new(SessionRegistry::new());
        let session = initiator_session("SERVER");
        registry.register(session.clone());
        let responder = MockResponder::new();
        session.bind(responder.clone()).await.unwrap();

        let timer = SessionTimer::spawn(registry, DEFAULT_TIMER_INTERVAL);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        timer.stop().await;

        let sent = responder.messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].msg_type(), MsgType::Logon);
    }
}
