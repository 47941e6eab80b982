//! The coordinator's two channel endpoints: one ordered outbound link per
//! worker, and the shared inbound collector every worker reports to.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use comms::msg::{Command, Response};
use comms::{MsgReceiver, MsgSender};
use log::{debug, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::error::{CoordinatorError, Result};
use crate::registry::WorkerId;

/// Outbound command fan: one ordered channel per worker.
///
/// Commands to the same worker arrive in send order; nothing is guaranteed
/// across workers.
pub struct Dispatcher<W: AsyncWrite + Unpin> {
    links: HashMap<WorkerId, MsgSender<W>>,
}

impl<W: AsyncWrite + Unpin> Dispatcher<W> {
    pub fn new() -> Self {
        Self {
            links: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: WorkerId, tx: MsgSender<W>) {
        self.links.insert(id, tx);
    }

    /// Enqueues one command for in-order delivery to the named worker.
    ///
    /// # Errors
    /// `Transport` when the worker's channel is unreachable at send time;
    /// the caller decides whether that skips the worker for the phase.
    pub async fn send(&mut self, id: WorkerId, cmd: &Command) -> Result<()> {
        let Some(link) = self.links.get_mut(&id) else {
            return Err(CoordinatorError::Transport {
                worker_id: id,
                source: io::Error::new(io::ErrorKind::NotConnected, "no channel for worker"),
            });
        };

        link.send(cmd)
            .await
            .map_err(|source| CoordinatorError::Transport {
                worker_id: id,
                source,
            })
    }

    /// Dispatches `make(id)` to every worker in `targets`, back-to-back.
    ///
    /// Send failures are logged and collected; they never abort the
    /// broadcast or crash the caller.
    ///
    /// # Returns
    /// The ids whose dispatch failed.
    pub async fn broadcast_with(
        &mut self,
        targets: &[WorkerId],
        mut make: impl FnMut(WorkerId) -> Command,
    ) -> Vec<WorkerId> {
        let mut failed = Vec::new();

        for &id in targets {
            let cmd = make(id);
            match self.send(id, &cmd).await {
                Ok(()) => debug!("dispatched {} to worker {id}", cmd.kind()),
                Err(e) => {
                    warn!("{e}");
                    failed.push(id);
                }
            }
        }

        failed
    }
}

impl<W: AsyncWrite + Unpin> Default for Dispatcher<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared inbound collector.
///
/// Every worker's response connection feeds one queue through a pump task;
/// per-worker FIFO is preserved by the pumps, no ordering exists across
/// workers.
pub struct Collector {
    tx: mpsc::Sender<Response>,
    rx: mpsc::Receiver<Response>,
}

impl Collector {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self { tx, rx }
    }

    /// Attaches one response connection to the shared queue.
    pub fn attach<R>(&self, rx: MsgReceiver<R>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        spawn_pump(self.tx.clone(), rx);
    }

    /// Accepts response connections from workers and attaches each one.
    pub fn serve(&self, listener: TcpListener) {
        let tx = self.tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        debug!("response connection from {peer}");
                        let (rx, tx_half) = stream.into_split();
                        let (rx, _) = comms::channel(rx, tx_half);
                        spawn_pump(tx.clone(), rx);
                    }
                    Err(e) => {
                        warn!("collector accept failed: {e}");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        });
    }

    /// Blocks until one inbound response arrives or `wait` elapses.
    ///
    /// # Returns
    /// `None` when the wait elapsed without a response.
    pub async fn recv(&mut self, wait: Duration) -> Option<Response> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(resp) => resp,
            Err(_) => None,
        }
    }
}

/// Forwards each inbound response into the shared queue. A malformed frame
/// is a protocol anomaly: logged and skipped, the connection stays up. The
/// pump ends on connection loss.
fn spawn_pump<R>(tx: mpsc::Sender<Response>, mut rx: MsgReceiver<R>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv::<Response>().await {
                Ok(resp) => {
                    if tx.send(resp).await.is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    warn!("discarding malformed response: {e}");
                }
                Err(e) => {
                    debug!("response connection closed: {e}");
                    break;
                }
            }
        }
    });
}
