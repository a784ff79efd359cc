/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Per-connection reader task.
//!
//! A connection reads frames, resolves its session from the first Logon
//! (acceptor) or is bound up front (initiator), and forwards every frame to
//! the session's dispatch worker.

use crate::dispatcher::Work;
use crate::engine::EngineContext;
use bytes::Bytes;
use fixwire_core::error::SessionError;
use fixwire_core::message::MsgType;
use fixwire_session::{Inbound, Responder, Session, SessionId};
use fixwire_tagvalue::parse_message;
use fixwire_transport::{ChannelResponder, CodecError, FixCodec, WriteMode};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, error, info, warn};

/// Transport limits applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Bytes the frame decoder may hold or discard without producing a
    /// frame before the connection is closed as garbage.
    pub max_undecoded: usize,
    /// Largest BodyLength accepted; a frame declaring more is malformed.
    pub max_message_size: usize,
    /// What a send does when the outbound queue is full: refuse at once or
    /// wait a bounded time for space.
    pub write_mode: WriteMode,
    /// Deadline on disconnect for writing the frame in flight, the queued
    /// frames and the stream shutdown.
    pub drain_timeout: Duration,
}

type Frames<S> = FramedRead<ReadHalf<S>, FixCodec>;

/// Splits `stream` into a frame reader and a responder with its writer task.
fn open<S>(stream: S, remote: String, settings: &ConnectionSettings) -> (Frames<S>, Arc<ChannelResponder>)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read, write) = tokio::io::split(stream);
    let (responder, _writer) =
        ChannelResponder::spawn(write, remote, settings.write_mode, settings.drain_timeout);
    let codec = FixCodec::new()
        .with_max_undecoded(settings.max_undecoded)
        .with_max_message_size(settings.max_message_size);
    (FramedRead::new(read, codec), responder)
}

/// Next frame, or `None` once the stream ends or the responder is closed.
async fn next_frame<S>(
    frames: &mut Frames<S>,
    responder: &ChannelResponder,
) -> Option<Result<Bytes, CodecError>>
where
    S: AsyncRead,
{
    tokio::select! {
        biased;
        () = responder.closed() => None,
        frame = frames.next() => frame,
    }
}

/// Serves an inbound connection whose session is not yet known.
pub(crate) async fn run_acceptor<S>(context: Arc<EngineContext>, stream: S, remote: String)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut frames, responder) = open(stream, remote.clone(), &context.settings);
    info!(%remote, "connection accepted");

    let first = match next_frame(&mut frames, &responder).await {
        Some(Ok(frame)) => frame,
        Some(Err(err)) => {
            warn!(%remote, %err, "framing error before Logon");
            responder.disconnect();
            return;
        }
        None => {
            debug!(%remote, "connection closed before Logon");
            responder.disconnect();
            return;
        }
    };

    let logon = match parse_message(&first, true) {
        Ok(message) if message.msg_type() == MsgType::Logon => message,
        Ok(message) => {
            warn!(%remote, msg_type = %message.msg_type(), "first message is not a Logon");
            responder.disconnect();
            return;
        }
        Err(err) => {
            warn!(%remote, %err, "garbled first message");
            responder.disconnect();
            return;
        }
    };

    let Some(id) = SessionId::from_inbound(&logon) else {
        warn!(%remote, "Logon without a usable identity");
        responder.disconnect();
        return;
    };
    let Some(session) = context.provider.get_session(&id, &context.registry).await else {
        warn!(session = %id, %remote, "unauthorized session, disconnecting");
        responder.disconnect();
        return;
    };
    if let Err(err) = session.bind(responder.clone()).await {
        warn!(session = %id, %remote, %err, "rejecting connection");
        responder.disconnect();
        return;
    }
    let Some(tx) = context.dispatcher.attach(&id) else {
        warn!(session = %id, %remote, "engine stopped, rejecting connection");
        let dyn_responder: Arc<dyn Responder> = responder.clone();
        if let Err(err) = session.unbind(&dyn_responder).await {
            warn!(session = %id, %remote, %err, "unbind failed");
        }
        return;
    };

    let work = Work::Inbound {
        session: session.clone(),
        inbound: Inbound::Message(logon),
    };
    if tx.send(work).await.is_ok() {
        read_loop(&mut frames, &responder, &session, &tx).await;
    }
    release(&context, &session, responder, tx).await;
}

/// Serves an outbound connection already bound to `session`.
pub(crate) async fn run_initiator<S>(
    context: Arc<EngineContext>,
    mut frames: Frames<S>,
    responder: Arc<ChannelResponder>,
    session: Arc<Session>,
    tx: mpsc::Sender<Work>,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    read_loop(&mut frames, &responder, &session, &tx).await;
    release(&context, &session, responder, tx).await;
}

/// Binds an initiator session to `stream` and returns the pieces its reader
/// task needs.
pub(crate) async fn bind_initiator<S>(
    context: &EngineContext,
    stream: S,
    remote: String,
    session: &Arc<Session>,
) -> Result<(Frames<S>, Arc<ChannelResponder>, mpsc::Sender<Work>), SessionError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (frames, responder) = open(stream, remote.clone(), &context.settings);
    if let Err(err) = session.bind(responder.clone()).await {
        responder.disconnect();
        return Err(err);
    }
    let Some(tx) = context.dispatcher.attach(session.id()) else {
        let dyn_responder: Arc<dyn Responder> = responder.clone();
        session.unbind(&dyn_responder).await?;
        return Err(SessionError::InvalidState {
            expected: "running engine".to_string(),
            current: "stopped".to_string(),
        });
    };
    info!(session = %session.id(), %remote, "initiator connection bound");
    Ok((frames, responder, tx))
}

async fn read_loop<S>(
    frames: &mut Frames<S>,
    responder: &ChannelResponder,
    session: &Arc<Session>,
    tx: &mpsc::Sender<Work>,
) where
    S: AsyncRead,
{
    let remote = responder.remote_address();
    let validate_checksum = session.config().validate_checksum;
    loop {
        let frame = match next_frame(frames, responder).await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                error!(session = %session.id(), %remote, %err, "fatal framing error, disconnecting");
                break;
            }
            None => {
                debug!(session = %session.id(), %remote, "connection closed");
                break;
            }
        };
        let inbound = match parse_message(&frame, validate_checksum) {
            Ok(message) => Inbound::Message(message),
            Err(error) => Inbound::Garbled {
                bytes: frame,
                error,
            },
        };
        let work = Work::Inbound {
            session: session.clone(),
            inbound,
        };
        if tx.send(work).await.is_err() {
            warn!(session = %session.id(), %remote, "dispatcher stopped, closing connection");
            break;
        }
    }
}

/// Unbinds the connection after work already queued for it.
async fn release(
    context: &EngineContext,
    session: &Arc<Session>,
    responder: Arc<ChannelResponder>,
    tx: mpsc::Sender<Work>,
) {
    let responder: Arc<dyn Responder> = responder;
    let work = Work::Unbind {
        session: session.clone(),
        responder: responder.clone(),
    };
    if tx.send(work).await.is_err()
        && let Err(err) = session.unbind(&responder).await
    {
        warn!(session = %session.id(), %err, "unbind failed");
    }
    drop(tx);
    context.dispatcher.detach(session.id());
    info!(session = %session.id(), remote = %responder.remote_address(), "connection released");
}
