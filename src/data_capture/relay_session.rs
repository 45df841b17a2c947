//! One relayed client connection.
//!
//! A [`RelaySession`] dials the relay target for an accepted client, then runs
//! two directional copy loops on a `JoinSet`:
//! - TX: read from the client, write to the target
//! - RX: read from the target, write to the client
//!
//! Every successful read is forwarded unmodified first and then recorded
//! through the [`PacketRecorder`]. On EOF or error a loop shuts down the
//! writer it forwards to, so the peer sees the close. Once the first loop has
//! ended, the other one gets the drain timeout to finish by itself before it
//! is aborted; both sockets are released when the session returns.

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::{JoinError, JoinSet};

use super::recorder::{CaptureOrigin, PacketRecorder};
use super::types::Direction;
use crate::configuration::types::ProxyConfig;
use crate::error_handling::types::CaptureError;
use crate::event_bus::{ConnectionEvent, ConnectionPhase, Event};
use crate::network::types::RelayCounters;
use crate::session_management::SessionState;

pub(crate) const CHUNK_SIZE: usize = 16 * 1024;
const PREVIEW_LEN: usize = 64;

/// Bytes relayed by a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub bytes_tx: u64,
    pub bytes_rx: u64,
}

/// Per-direction view used by the copy loops.
#[derive(Clone)]
pub(crate) struct PacketTap {
    pub(crate) recorder: PacketRecorder,
    pub(crate) origin: Arc<CaptureOrigin>,
    pub(crate) counters: Arc<RelayCounters>,
}

impl PacketTap {
    fn capture(&self, direction: Direction, chunk: &[u8]) {
        let counter = match direction {
            Direction::Tx => &self.counters.bytes_tx,
            Direction::Rx => &self.counters.bytes_rx,
        };
        counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);

        let record = self.recorder.record(&self.origin, direction, chunk);
        let preview = &chunk[..chunk.len().min(PREVIEW_LEN)];
        trace!(
            "[{}] #{} captured {} {} bytes: {}{}",
            self.origin.connection_id,
            record.sequence,
            direction,
            chunk.len(),
            String::from_utf8_lossy(preview),
            if chunk.len() > PREVIEW_LEN { " ..." } else { "" }
        );
    }
}

/// Copies `reader` into `writer` until EOF or error, recording every chunk.
/// The writer is shut down on the way out in both cases.
pub(crate) async fn pump<R, W>(
    mut reader: R,
    mut writer: W,
    direction: Direction,
    tap: PacketTap,
) -> Result<u64, CaptureError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    let result = loop {
        let n = match reader.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => break Err(CaptureError::TcpStreamError(e)),
        };
        if n == 0 {
            trace!(
                "[{}] {} EOF; shutting down peer writer",
                tap.origin.connection_id,
                direction
            );
            break Ok(total);
        }
        if let Err(e) = writer.write_all(&buf[..n]).await {
            break Err(CaptureError::TcpStreamError(e));
        }
        total += n as u64;
        tap.capture(direction, &buf[..n]);
    };

    let _ = writer.shutdown().await;
    result
}

struct StateTracker<'a> {
    connection_id: &'a str,
    state: SessionState,
}

impl StateTracker<'_> {
    fn enter(&mut self, next: SessionState) {
        debug!("[{}] {:?} -> {:?}", self.connection_id, self.state, next);
        self.state = next;
    }
}

pub struct RelaySession {
    config: Arc<ProxyConfig>,
    connection_id: String,
    client: TcpStream,
    client_addr: SocketAddr,
    recorder: PacketRecorder,
    counters: Arc<RelayCounters>,
    connect_timeout: Duration,
    drain_timeout: Duration,
}

impl RelaySession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<ProxyConfig>,
        connection_id: String,
        client: TcpStream,
        client_addr: SocketAddr,
        recorder: PacketRecorder,
        counters: Arc<RelayCounters>,
        connect_timeout: Duration,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            config,
            connection_id,
            client,
            client_addr,
            recorder,
            counters,
            connect_timeout,
            drain_timeout,
        }
    }

    /// Runs the session to completion.
    ///
    /// A failed dial closes the client without producing any record and is
    /// reported as a `dial_failed` connection event.
    pub async fn run(self) -> Result<SessionSummary, CaptureError> {
        let RelaySession {
            config,
            connection_id,
            client,
            client_addr,
            recorder,
            counters,
            connect_timeout,
            drain_timeout,
        } = self;

        let notify = |phase: ConnectionPhase, error_msg: Option<String>| {
            recorder.bus().publish(Event::Connection(ConnectionEvent {
                local_port: config.local_port,
                proxy_name: config.name.clone(),
                connection_id: connection_id.clone(),
                client_addr: client_addr.to_string(),
                phase,
                error_msg,
                timestamp: Utc::now(),
            }));
        };
        let mut tracker = StateTracker {
            connection_id: &connection_id,
            state: SessionState::Connecting,
        };

        let target = match dial(&config, connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("[{}] [{}] {}", config.name, connection_id, e);
                counters.dial_failures.fetch_add(1, Ordering::Relaxed);
                notify(ConnectionPhase::DialFailed, Some(e.to_string()));
                tracker.enter(SessionState::Closed);
                return Err(e);
            }
        };

        notify(ConnectionPhase::Opened, None);
        tracker.enter(SessionState::Relaying);

        let tap = PacketTap {
            recorder: recorder.clone(),
            origin: Arc::new(CaptureOrigin {
                proxy_name: config.name.clone(),
                local_port: config.local_port,
                connection_id: connection_id.clone(),
                protocol: config.protocol,
            }),
            counters: Arc::clone(&counters),
        };

        let (client_read, client_write) = client.into_split();
        let (target_read, target_write) = target.into_split();

        let mut set = JoinSet::new();
        {
            let tap = tap.clone();
            set.spawn(async move {
                let res = pump(client_read, target_write, Direction::Tx, tap).await;
                (Direction::Tx, res)
            });
        }
        set.spawn(async move {
            let res = pump(target_read, client_write, Direction::Rx, tap).await;
            (Direction::Rx, res)
        });

        let mut summary = SessionSummary::default();
        let mut failure: Option<CaptureError> = None;
        let mut settle = |joined: Option<Result<PumpOutcome, JoinError>>| match joined {
            Some(Ok((Direction::Tx, Ok(bytes)))) => summary.bytes_tx = bytes,
            Some(Ok((Direction::Rx, Ok(bytes)))) => summary.bytes_rx = bytes,
            Some(Ok((direction, Err(e)))) => {
                debug!("[{}] {} loop ended with error: {}", connection_id, direction, e);
                failure.get_or_insert(e);
            }
            Some(Err(e)) if e.is_cancelled() => {}
            Some(Err(e)) => {
                failure.get_or_insert(CaptureError::TcpStreamError(e.into()));
            }
            None => {}
        };

        settle(set.join_next().await);
        tracker.enter(SessionState::Closing);

        match tokio::time::timeout(drain_timeout, set.join_next()).await {
            Ok(joined) => settle(joined),
            Err(_) => {
                debug!(
                    "[{}] remaining direction still open after {:?}, aborting",
                    connection_id, drain_timeout
                );
                set.shutdown().await;
            }
        }
        tracker.enter(SessionState::Closed);

        info!(
            "[{}] [{}] connection from {} closed (tx {} bytes, rx {} bytes)",
            config.name, connection_id, client_addr, summary.bytes_tx, summary.bytes_rx
        );
        notify(ConnectionPhase::Closed, failure.as_ref().map(|e| e.to_string()));

        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

type PumpOutcome = (Direction, Result<u64, CaptureError>);

async fn dial(config: &ProxyConfig, connect_timeout: Duration) -> Result<TcpStream, CaptureError> {
    let target = config.target();
    match tokio::time::timeout(connect_timeout, TcpStream::connect(target.as_str())).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(CaptureError::DialFailed(target, e)),
        Err(_) => Err(CaptureError::DialTimeout(target)),
    }
}
