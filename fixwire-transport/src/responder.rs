/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Channel-backed responder and its writer task.
//!
//! Sessions hand encoded frames to a [`ChannelResponder`]; a dedicated task
//! owns the write half of the stream and writes them in order.
//!
//! On disconnect the frame in flight, the queued frames and the stream
//! shutdown all share one deadline of `drain_timeout`, so a peer that stops
//! reading cannot keep the writer alive.

use async_trait::async_trait;
use bytes::Bytes;
use fixwire_session::Responder;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default outbound queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 1000;

/// Default time the writer spends flushing queued frames on disconnect.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// How [`ChannelResponder::send`] behaves when the outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Never waits: a full queue refuses the frame.
    Async {
        /// Frames buffered ahead of the writer.
        queue_depth: usize,
    },
    /// Waits for queue space, at most `timeout`.
    Sync {
        /// Longest wait for queue space.
        timeout: Duration,
    },
}

impl WriteMode {
    fn queue_depth(self) -> usize {
        match self {
            Self::Async { queue_depth } => queue_depth.max(1),
            Self::Sync { .. } => DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl Default for WriteMode {
    fn default() -> Self {
        Self::Async {
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

/// [`Responder`] that queues frames for a writer task.
#[derive(Debug)]
pub struct ChannelResponder {
    remote: String,
    mode: WriteMode,
    tx: mpsc::Sender<Bytes>,
    closed: watch::Sender<bool>,
}

impl ChannelResponder {
    /// Spawns a writer task for `writer` and returns the responder feeding it.
    ///
    /// # Arguments
    /// * `writer` - Write half of the connection
    /// * `remote` - Counterparty address, for logging
    /// * `mode` - Behavior when the outbound queue is full
    /// * `drain_timeout` - Bound on flushing queued frames at disconnect
    pub fn spawn<W>(
        writer: W,
        remote: impl Into<String>,
        mode: WriteMode,
        drain_timeout: Duration,
    ) -> (Arc<Self>, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let remote = remote.into();
        let (tx, rx) = mpsc::channel(mode.queue_depth());
        let (closed, closed_rx) = watch::channel(false);
        let responder = Arc::new(Self {
            remote: remote.clone(),
            mode,
            tx,
            closed,
        });
        let handle = tokio::spawn(write_loop(writer, rx, closed_rx, remote, drain_timeout));
        (responder, handle)
    }

    /// Returns true once [`disconnect`](Responder::disconnect) was called or
    /// the writer stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.tx.is_closed()
    }

    /// Completes when the responder is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        tokio::select! {
            () = wait_closed(&mut rx) => {}
            () = self.tx.closed() => {}
        }
    }
}

#[async_trait]
impl Responder for ChannelResponder {
    async fn send(&self, data: Bytes) -> bool {
        if *self.closed.borrow() {
            return false;
        }
        match self.mode {
            WriteMode::Async { .. } => match self.tx.try_send(data) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(remote = %self.remote, "outbound queue full, refusing frame");
                    false
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
            WriteMode::Sync { timeout } => match tokio::time::timeout(timeout, self.tx.send(data)).await {
                Ok(Ok(())) => true,
                Ok(Err(_)) => false,
                Err(_) => {
                    warn!(remote = %self.remote, ?timeout, "timed out waiting for outbound queue");
                    false
                }
            },
        }
    }

    fn disconnect(&self) {
        self.closed.send_replace(true);
    }

    fn remote_address(&self) -> String {
        self.remote.clone()
    }
}

enum Written {
    Done,
    /// Disconnect requested; the frame was written before `deadline`.
    Closing(Instant),
    /// Disconnect requested and the frame could not be finished in time.
    Stuck,
    Failed(std::io::Error),
}

async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Bytes>,
    mut closed: watch::Receiver<bool>,
    remote: String,
    drain_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let deadline = loop {
        let frame = tokio::select! {
            biased;
            frame = rx.recv() => frame,
            () = wait_closed(&mut closed) => break Some(Instant::now() + drain_timeout),
        };
        let Some(frame) = frame else {
            break None;
        };
        match write_frame(&mut writer, &frame, &mut closed, drain_timeout).await {
            Written::Done => {}
            Written::Closing(deadline) => break Some(deadline),
            Written::Stuck => {
                warn!(%remote, ?drain_timeout, "peer not reading, dropping connection");
                return;
            }
            Written::Failed(err) => {
                warn!(%remote, %err, "write failed");
                return;
            }
        }
    };
    if let Some(deadline) = deadline {
        drain(&mut writer, &mut rx, &remote, deadline).await;
    }
    let deadline = deadline.unwrap_or_else(|| Instant::now() + drain_timeout);
    match tokio::time::timeout_at(deadline, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(%remote, %err, "shutdown failed"),
        Err(_) => debug!(%remote, "shutdown timed out"),
    }
    info!(%remote, "writer stopped");
}

/// Completes once the responder is disconnected or dropped.
async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

/// Writes one frame. A disconnect arriving mid-write starts the drain
/// deadline, which the rest of the frame must meet.
async fn write_frame<W>(
    writer: &mut W,
    frame: &[u8],
    closed: &mut watch::Receiver<bool>,
    drain_timeout: Duration,
) -> Written
where
    W: AsyncWrite + Unpin,
{
    let write = writer.write_all(frame);
    tokio::pin!(write);
    tokio::select! {
        biased;
        written = &mut write => return written.map_or_else(Written::Failed, |()| Written::Done),
        () = wait_closed(closed) => {}
    }
    let deadline = Instant::now() + drain_timeout;
    match tokio::time::timeout_at(deadline, write).await {
        Ok(Ok(())) => Written::Closing(deadline),
        Ok(Err(err)) => Written::Failed(err),
        Err(_) => Written::Stuck,
    }
}

async fn drain<W>(writer: &mut W, rx: &mut mpsc::Receiver<Bytes>, remote: &str, deadline: Instant)
where
    W: AsyncWrite + Unpin,
{
    rx.close();
    let flush = async {
        while let Some(frame) = rx.recv().await {
            writer.write_all(&frame).await?;
        }
        writer.flush().await
    };
    match tokio::time::timeout_at(deadline, flush).await {
        Ok(Ok(())) => debug!(remote, "drained outbound queue"),
        Ok(Err(err)) => warn!(remote, %err, "write failed while draining"),
        Err(_) => warn!(remote, "drain timed out, dropping queued frames"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, duplex};

    #[tokio::test]
    async fn test_frames_written_in_order() {
        let (client, mut server) = duplex(1024);
        let (responder, handle) =
            ChannelResponder::spawn(client, "test", WriteMode::default(), DEFAULT_DRAIN_TIMEOUT);

        assert!(responder.send(Bytes::from_static(b"one|")).await);
        assert!(responder.send(Bytes::from_static(b"two|")).await);
        responder.disconnect();
        handle.await.unwrap();

        let mut out = Vec::new();
        server.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"one|two|");
        assert!(responder.is_closed());
        assert!(!responder.send(Bytes::from_static(b"late")).await);
    }

    #[tokio::test]
    async fn test_async_mode_full_queue_refuses() {
        // the peer never reads, so the writer blocks on the first frame
        let (client, _server) = duplex(4);
        let (responder, _handle) = ChannelResponder::spawn(
            client,
            "test",
            WriteMode::Async { queue_depth: 1 },
            DEFAULT_DRAIN_TIMEOUT,
        );

        let mut accepted = 0;
        for _ in 0..4 {
            if responder.send(Bytes::from_static(b"0123456789")).await {
                accepted += 1;
            }
        }
        assert!(accepted < 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_mode_times_out() {
        let (client, _server) = duplex(4);
        let (responder, _handle) = ChannelResponder::spawn(
            client,
            "test",
            WriteMode::Sync {
                timeout: Duration::from_millis(50),
            },
            DEFAULT_DRAIN_TIMEOUT,
        );

        let mut refused = false;
        for _ in 0..(DEFAULT_QUEUE_DEPTH + 2) {
            if !responder.send(Bytes::from_static(b"0123456789")).await {
                refused = true;
                break;
            }
        }
        assert!(refused);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_bounded_when_peer_stops_reading() {
        let (client, _server) = duplex(64);
        let (responder, handle) =
            ChannelResponder::spawn(client, "test", WriteMode::default(), DEFAULT_DRAIN_TIMEOUT);
        for _ in 0..10 {
            assert!(responder.send(Bytes::from(vec![b'x'; 100])).await);
        }
        // let the writer fill the pipe and block mid-frame
        tokio::time::sleep(Duration::from_millis(10)).await;

        responder.disconnect();
        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("writer outlived the drain timeout")
            .unwrap();
        assert!(responder.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_bounded_when_queue_backs_up() {
        let (client, mut server) = duplex(256);
        let (responder, handle) =
            ChannelResponder::spawn(client, "test", WriteMode::default(), DEFAULT_DRAIN_TIMEOUT);
        for _ in 0..10 {
            assert!(responder.send(Bytes::from(vec![b'y'; 100])).await);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        responder.disconnect();
        // read a little so the frame in flight completes; the rest stays queued
        let mut head = [0u8; 100];
        server.read_exact(&mut head).await.unwrap();

        tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("writer outlived the drain timeout")
            .unwrap();
    }

    #[tokio::test]
    async fn test_closed_completes_on_disconnect() {
        let (client, _server) = duplex(64);
        let (responder, _handle) =
            ChannelResponder::spawn(client, "test", WriteMode::default(), DEFAULT_DRAIN_TIMEOUT);
        let waiter = responder.clone();
        let wait = tokio::spawn(async move { waiter.closed().await });
        responder.disconnect();
        wait.await.unwrap();
        assert_eq!(responder.remote_address(), "test");
    }
}
