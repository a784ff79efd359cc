/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Running engine: connections, dispatch and the session timer.

use crate::connection::{self, ConnectionSettings};
use crate::dispatcher::Dispatcher;
use crate::timer::SessionTimer;
use fixwire_core::error::SessionError;
use fixwire_session::{Session, SessionId, SessionProvider, SessionRegistry};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{info, warn};

/// Text sent in the Logout of every session when the engine stops.
const SHUTDOWN_TEXT: &str = "Engine shutdown";

/// How often [`Engine::stop`] checks whether sessions have disconnected.
const STOP_POLL: Duration = Duration::from_millis(50);

/// State shared by the engine and its connection tasks.
pub(crate) struct EngineContext {
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) provider: Arc<dyn SessionProvider>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) settings: ConnectionSettings,
}

/// A running FIX engine.
///
/// Created by [`EngineBuilder::build`](crate::EngineBuilder::build).
pub struct Engine {
    context: Arc<EngineContext>,
    timer: Mutex<Option<SessionTimer>>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("sessions", &self.context.registry.len())
            .field("dispatcher", &self.context.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub(crate) fn start(context: EngineContext, timer_interval: Duration) -> Self {
        let context = Arc::new(context);
        let timer = SessionTimer::spawn(context.registry.clone(), timer_interval);
        let (shutdown, _) = watch::channel(false);
        info!(
            sessions = context.registry.len(),
            mode = ?context.dispatcher.mode(),
            "engine started"
        );
        Self {
            context,
            timer: Mutex::new(Some(timer)),
            shutdown,
        }
    }

    /// The session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.context.registry
    }

    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.context.registry.get(id)
    }

    /// Serves an inbound connection. Its session is resolved from the
    /// first Logon received.
    pub fn accept<S>(&self, stream: S, remote: impl Into<String>) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        tokio::spawn(connection::run_acceptor(
            self.context.clone(),
            stream,
            remote.into(),
        ))
    }

    /// Binds the initiator session `id` to an outbound stream. The session
    /// timer sends its Logon.
    ///
    /// # Errors
    /// `UnknownSession` if `id` is not registered, `AlreadyBound` if the
    /// session already has a connection.
    pub async fn connect<S>(
        &self,
        stream: S,
        remote: impl Into<String>,
        id: &SessionId,
    ) -> Result<JoinHandle<()>, SessionError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let session = self
            .session(id)
            .ok_or_else(|| SessionError::UnknownSession(id.to_string()))?;
        let (frames, responder, tx) =
            connection::bind_initiator(&self.context, stream, remote.into(), &session).await?;
        Ok(tokio::spawn(connection::run_initiator(
            self.context.clone(),
            frames,
            responder,
            session,
            tx,
        )))
    }

    /// Accepts TCP connections until the engine stops.
    ///
    /// # Errors
    /// I/O errors from `accept`.
    pub async fn serve(&self, listener: TcpListener) -> std::io::Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening");
        }
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    if let Err(err) = stream.set_nodelay(true) {
                        warn!(%peer, %err, "failed to set TCP_NODELAY");
                    }
                    self.accept(stream, peer.to_string());
                }
                () = stopped(&mut shutdown) => break,
            }
        }
        Ok(())
    }

    /// Logs out every logged-on session and waits up to `grace` for them to
    /// disconnect, then drops remaining connections and stops the timer and
    /// dispatcher.
    pub async fn stop(&self, grace: Duration) {
        info!(?grace, "stopping engine");
        self.shutdown.send_replace(true);
        let sessions = self.context.registry.sessions();
        for session in &sessions {
            if session.is_logged_on().await
                && let Err(err) = session.logout(Some(SHUTDOWN_TEXT)).await
            {
                warn!(session = %session.id(), %err, "failed to send Logout");
            }
        }

        let deadline = Instant::now() + grace;
        loop {
            let mut bound = 0;
            for session in &sessions {
                if session.is_bound().await {
                    bound += 1;
                }
            }
            if bound == 0 {
                break;
            }
            if Instant::now() >= deadline {
                warn!(bound, "grace period elapsed, dropping connections");
                for session in &sessions {
                    if let Err(err) = session.disconnect("engine stopped").await {
                        warn!(session = %session.id(), %err, "disconnect failed");
                    }
                }
                break;
            }
            tokio::time::sleep(STOP_POLL).await;
        }

        let timer = self.timer.lock().take();
        if let Some(timer) = timer {
            timer.stop().await;
        }
        self.context.dispatcher.stop().await;
        info!("engine stopped");
    }
}

async fn stopped(rx: &mut watch::Receiver<bool>) {
    // an error means the engine itself is gone
    let _ = rx.wait_for(|stopped| *stopped).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::EngineBuilder;
    use crate::dispatcher::DispatchMode;
    use crate::testing::{client_message, server_config};
    use fixwire_core::message::{Message, MsgType};
    use fixwire_core::tags;
    use fixwire_session::SessionStatus;
    use fixwire_tagvalue::parse_message;
    use fixwire_transport::FixCodec;
    use futures::{SinkExt, StreamExt};
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};
    use tokio_util::codec::Framed;

    type Client = Framed<DuplexStream, FixCodec>;

    async fn engine(mode: DispatchMode) -> Engine {
        EngineBuilder::new()
            .add_session(server_config("CLIENT"))
            .with_dispatch_mode(mode)
            .build()
            .await
            .unwrap()
    }

    fn open(engine: &Engine) -> Client {
        let (client, server) = duplex(64 * 1024);
        engine.accept(server, "test-client");
        Framed::new(client, FixCodec::new())
    }

    async fn recv(client: &mut Client) -> Option<Message> {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")?
            .unwrap();
        Some(parse_message(&frame, true).unwrap())
    }

    fn logon(seq: u64) -> bytes::Bytes {
        client_message(MsgType::Logon, "CLIENT", seq, |body| {
            body.set(tags::ENCRYPT_METHOD, "0");
            body.set_u64(tags::HEART_BT_INT, 30);
        })
    }

    fn id() -> SessionId {
        server_config("CLIENT").session_id
    }

    #[tokio::test]
    async fn test_logon_over_connection() {
        for mode in [DispatchMode::SingleThreaded, DispatchMode::PerSession] {
            let engine = engine(mode).await;
            let mut client = open(&engine);
            client.send(logon(1)).await.unwrap();

            let reply = recv(&mut client).await.unwrap();
            assert_eq!(reply.msg_type(), MsgType::Logon);
            assert_eq!(reply.header().get(tags::SENDER_COMP_ID), Some("SERVER"));
            let session = engine.session(&id()).unwrap();
            assert_eq!(session.status().await, SessionStatus::LoggedOn);

            engine.stop(Duration::from_millis(100)).await;
        }
    }

    #[tokio::test]
    async fn test_second_connection_rejected() {
        let engine = engine(DispatchMode::SingleThreaded).await;
        let mut first = open(&engine);
        first.send(logon(1)).await.unwrap();
        assert_eq!(recv(&mut first).await.unwrap().msg_type(), MsgType::Logon);

        let mut second = open(&engine);
        second.send(logon(2)).await.unwrap();
        assert!(recv(&mut second).await.is_none());

        let session = engine.session(&id()).unwrap();
        assert!(session.is_logged_on().await);

        let heartbeat = client_message(MsgType::TestRequest, "CLIENT", 2, |body| {
            body.set(tags::TEST_REQ_ID, "STILL-HERE");
        });
        first.send(heartbeat).await.unwrap();
        let reply = recv(&mut first).await.unwrap();
        assert_eq!(reply.msg_type(), MsgType::Heartbeat);
        assert_eq!(reply.body().get(tags::TEST_REQ_ID), Some("STILL-HERE"));

        engine.stop(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_unknown_identity_disconnected() {
        let engine = engine(DispatchMode::SingleThreaded).await;
        let mut client = open(&engine);
        let stranger = client_message(MsgType::Logon, "STRANGER", 1, |body| {
            body.set_u64(tags::HEART_BT_INT, 30);
        });
        client.send(stranger).await.unwrap();
        assert!(recv(&mut client).await.is_none());
        engine.stop(Duration::ZERO).await;
    }

    #[tokio::test]
    async fn test_non_logon_first_message_disconnected() {
        let engine = engine(DispatchMode::SingleThreaded).await;
        let mut client = open(&engine);
        client
            .send(client_message(MsgType::Heartbeat, "CLIENT", 1, |_| {}))
            .await
            .unwrap();
        assert!(recv(&mut client).await.is_none());
        engine.stop(Duration::ZERO).await;
    }

    #[tokio::test]
    async fn test_identity_survives_reconnect() {
        let engine = engine(DispatchMode::PerSession).await;
        let mut client = open(&engine);
        client.send(logon(1)).await.unwrap();
        recv(&mut client).await.unwrap();
        drop(client);

        let session = engine.session(&id()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.is_bound().await && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(session.status().await, SessionStatus::Disconnected);
        assert_eq!(session.state().await.next_target_seq(), 2);

        let mut client = open(&engine);
        client.send(logon(2)).await.unwrap();
        let reply = recv(&mut client).await.unwrap();
        assert_eq!(reply.msg_type(), MsgType::Logon);
        assert_eq!(reply.msg_seq_num(), Some(2));

        engine.stop(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_stop_logs_out_sessions() {
        let engine = engine(DispatchMode::SingleThreaded).await;
        let mut client = open(&engine);
        client.send(logon(1)).await.unwrap();
        recv(&mut client).await.unwrap();

        let stopping = tokio::spawn(async move {
            engine.stop(Duration::from_secs(2)).await;
            engine
        });
        let logout = recv(&mut client).await.unwrap();
        assert_eq!(logout.msg_type(), MsgType::Logout);
        assert_eq!(logout.body().get(tags::TEXT), Some(SHUTDOWN_TEXT));

        client
            .send(client_message(MsgType::Logout, "CLIENT", 2, |_| {}))
            .await
            .unwrap();
        let engine = stopping.await.unwrap();
        let session = engine.session(&id()).unwrap();
        assert!(!session.is_bound().await);
    }

    #[tokio::test]
    async fn test_garbage_tolerance_closes_connection() {
        let engine = EngineBuilder::new()
            .add_session(server_config("CLIENT"))
            .with_max_undecoded(256)
            .build()
            .await
            .unwrap();
        let mut client = open(&engine);
        client.send(logon(1)).await.unwrap();
        assert_eq!(recv(&mut client).await.unwrap().msg_type(), MsgType::Logon);

        let fragments = b"8=FIX.4.4\x019=0".repeat(40);
        client.get_mut().write_all(&fragments).await.unwrap();
        assert!(recv(&mut client).await.is_none());

        let session = engine.session(&id()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.is_bound().await && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!session.is_bound().await);
        engine.stop(Duration::ZERO).await;
    }

    #[tokio::test]
    async fn test_connect_unknown_session() {
        let engine = engine(DispatchMode::SingleThreaded).await;
        let (stream, _peer) = duplex(1024);
        let unknown = server_config("NOBODY").session_id;
        let err = engine.connect(stream, "peer", &unknown).await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownSession(_)));
        engine.stop(Duration::ZERO).await;
    }
}
