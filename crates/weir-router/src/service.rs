//! Single-owner router task.
//!
//! Ring mutation and routing share the same server table, so the service
//! gives one task exclusive ownership of a [`Router`] and feeds it commands
//! through a bounded queue. Callers hold a cloneable [`RouterHandle`]; each
//! call sends a command with a oneshot reply channel and waits for the
//! answer. Operations therefore run strictly one after another, in the
//! order the queue received them.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use weir_types::{
    BatchSummary, HeavyHitterReport, Placement, RemovalReport, RouterEvent, RouterMetrics, ServerId,
    ServerLoad,
};

use crate::error::RouterError;
use crate::router::Router;

/// Queue depth between handles and the router task.
const COMMAND_QUEUE: usize = 256;

type Reply<T> = oneshot::Sender<T>;

/// A request for the router task.
enum Command {
    AddRequest {
        key: String,
        reply: Reply<Result<Placement, RouterError>>,
    },
    RouteAll {
        keys: Vec<String>,
        reply: Reply<BatchSummary>,
    },
    AddServer {
        name: String,
        capacity: u64,
        reply: Reply<Result<ServerId, RouterError>>,
    },
    RemoveServer {
        name: String,
        reply: Reply<Result<RemovalReport, RouterError>>,
    },
    Candidate {
        key: String,
        reply: Reply<Option<String>>,
    },
    Metrics {
        reply: Reply<RouterMetrics>,
    },
    ServerLoads {
        reply: Reply<Vec<ServerLoad>>,
    },
    HeavyHitters {
        reply: Reply<Vec<HeavyHitterReport>>,
    },
}

/// Handle to a running router task.
///
/// Cloning is cheap; every clone talks to the same router. Once the task
/// has stopped, every call returns [`RouterError::ServiceStopped`].
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<RouterEvent>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    task: Arc<JoinHandle<()>>,
}

impl RouterHandle {
    /// Place one request.
    pub async fn add_request(&self, key: impl Into<String>) -> Result<Placement, RouterError> {
        let key = key.into();
        self.call(|reply| Command::AddRequest { key, reply }).await?
    }

    /// Place every key in order, as one queued operation.
    pub async fn route_all<I, K>(&self, keys: I) -> Result<BatchSummary, RouterError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys = keys.into_iter().map(Into::into).collect();
        self.call(|reply| Command::RouteAll { keys, reply }).await
    }

    /// Add a server.
    pub async fn add_server(&self, name: impl Into<String>, capacity: u64) -> Result<ServerId, RouterError> {
        let name = name.into();
        self.call(|reply| Command::AddServer {
            name,
            capacity,
            reply,
        })
        .await?
    }

    /// Remove a server and re-route its requests.
    pub async fn remove_server(&self, name: impl Into<String>) -> Result<RemovalReport, RouterError> {
        let name = name.into();
        self.call(|reply| Command::RemoveServer { name, reply }).await?
    }

    /// First-attempt candidate for `key`.
    pub async fn candidate(&self, key: impl Into<String>) -> Result<Option<String>, RouterError> {
        let key = key.into();
        self.call(|reply| Command::Candidate { key, reply }).await
    }

    /// Metrics snapshot.
    pub async fn metrics(&self) -> Result<RouterMetrics, RouterError> {
        self.call(|reply| Command::Metrics { reply }).await
    }

    /// Per-server load, in ring order.
    pub async fn server_loads(&self) -> Result<Vec<ServerLoad>, RouterError> {
        self.call(|reply| Command::ServerLoads { reply }).await
    }

    /// Heavy-hitter breakdown at the configured threshold.
    pub async fn heavy_hitters(&self) -> Result<Vec<HeavyHitterReport>, RouterError> {
        self.call(|reply| Command::HeavyHitters { reply }).await
    }

    /// Subscribe to router events.
    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.event_tx.subscribe()
    }

    /// Ask the task to stop after the command it is running.
    pub fn shutdown(&self) {
        info!("router service shutting down");
        let _ = self.shutdown_tx.send(true);
    }

    /// Abort the background task.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Check whether the background task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    async fn call<T>(&self, command: impl FnOnce(Reply<T>) -> Command) -> Result<T, RouterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| RouterError::ServiceStopped)?;
        rx.await.map_err(|_| RouterError::ServiceStopped)
    }
}

/// Start the router task and return a handle to it.
///
/// The task runs until [`RouterHandle::shutdown`] is called or every handle
/// is dropped.
pub fn start(router: Router) -> RouterHandle {
    let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let event_tx = router.event_sender();

    let task = tokio::spawn(run(router, rx, shutdown_rx));

    RouterHandle {
        tx,
        event_tx,
        shutdown_tx: Arc::new(shutdown_tx),
        task: Arc::new(task),
    }
}

async fn run(mut router: Router, mut rx: mpsc::Receiver<Command>, mut shutdown_rx: watch::Receiver<bool>) {
    info!(
        strategy = %router.strategy(),
        policy = %router.policy(),
        "router service started"
    );

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                break;
            }
            command = rx.recv() => {
                let Some(command) = command else {
                    debug!("all router handles dropped");
                    break;
                };
                handle(&mut router, command);
            }
        }
    }

    info!("router service stopped");
}

fn handle(router: &mut Router, command: Command) {
    // A caller that gave up waiting leaves a closed reply channel; the
    // operation has still been applied.
    match command {
        Command::AddRequest { key, reply } => {
            let _ = reply.send(router.add_request(&key));
        }
        Command::RouteAll { keys, reply } => {
            let _ = reply.send(router.route_all(keys));
        }
        Command::AddServer {
            name,
            capacity,
            reply,
        } => {
            let _ = reply.send(router.add_server(name, capacity));
        }
        Command::RemoveServer { name, reply } => {
            let _ = reply.send(router.remove_server(&name));
        }
        Command::Candidate { key, reply } => {
            let _ = reply.send(router.candidate(&key));
        }
        Command::Metrics { reply } => {
            let _ = reply.send(router.metrics());
        }
        Command::ServerLoads { reply } => {
            let _ = reply.send(router.server_loads());
        }
        Command::HeavyHitters { reply } => {
            let threshold = router.config().admission.heavy_hitter_threshold;
            let _ = reply.send(router.heavy_hitters(threshold));
        }
    }
}
