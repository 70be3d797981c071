//! Messages between the foreground context and the background worker.
//!
//! Foreground → worker: fire-and-forget [`WorkerCommand`]s through a
//! [`WorkerHandle`]. Worker → foreground: a permission query carrying a
//! oneshot reply, bounded by a timeout. A query that cannot be answered (no
//! foreground, timeout, foreground gone) reads as "not granted".

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::permission::{PermissionGate, PermissionSource, PermissionState};
use crate::error::{ReminderError, Result};

pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(3);

const CLIENT_QUEUE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerCommand {
    SkipWaiting,
    CheckReminders,
    StartReminderCheck,
    StopReminderCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientRequest {
    CheckNotificationPermission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionReply {
    pub permission: PermissionState,
}

/// A request delivered to a foreground client.
#[derive(Debug)]
pub struct ClientMessage {
    pub request: ClientRequest,
    pub reply: oneshot::Sender<PermissionReply>,
}

/// Sending side of the worker's command queue.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::UnboundedSender<WorkerCommand>,
}

impl WorkerHandle {
    /// Post without waiting. Returns `false` if the worker is gone.
    pub fn post(&self, command: WorkerCommand) -> bool {
        match self.tx.send(command) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!(?command, "worker gone, command dropped");
                false
            }
        }
    }
}

pub fn worker_channel() -> (WorkerHandle, mpsc::UnboundedReceiver<WorkerCommand>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (WorkerHandle { tx }, rx)
}

/// Foreground clients the worker can reach. Clones share the list.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<Mutex<Vec<mpsc::Sender<ClientMessage>>>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a foreground client. Dropping the receiver disconnects it.
    pub fn connect(&self) -> mpsc::Receiver<ClientMessage> {
        let (tx, rx) = mpsc::channel(CLIENT_QUEUE);
        self.lock().push(tx);
        rx
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::Sender<ClientMessage>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn first_live(&self) -> Option<mpsc::Sender<ClientMessage>> {
        let mut clients = self.lock();
        clients.retain(|tx| !tx.is_closed());
        clients.first().cloned()
    }

    pub fn client_count(&self) -> usize {
        let mut clients = self.lock();
        clients.retain(|tx| !tx.is_closed());
        clients.len()
    }

    /// Ask the first live foreground client for its permission state.
    pub async fn query_permission(&self, timeout: Duration) -> Result<PermissionState> {
        let client = self.first_live().ok_or(ReminderError::NoForeground)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let exchange = async move {
            client
                .send(ClientMessage {
                    request: ClientRequest::CheckNotificationPermission,
                    reply: reply_tx,
                })
                .await
                .map_err(|_| ReminderError::Disconnected)?;
            reply_rx
                .await
                .map(|reply| reply.permission)
                .map_err(|_| ReminderError::Disconnected)
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| ReminderError::BridgeTimeout(timeout))?
    }
}

/// Answer permission queries from the gate's current value until every
/// sender is gone.
pub fn answer_queries(mut inbox: mpsc::Receiver<ClientMessage>, gate: PermissionGate) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = inbox.recv().await {
            match message.request {
                ClientRequest::CheckNotificationPermission => {
                    let permission = gate.state();
                    // the worker may have timed out already
                    let _ = message.reply.send(PermissionReply { permission });
                }
            }
        }
    })
}

/// The worker's view of permission: asks the foreground each time and mirrors
/// the answer into the worker's own gate. Any bridge failure mirrors `Denied`.
pub struct BridgePermission {
    clients: ClientRegistry,
    gate: PermissionGate,
    timeout: Duration,
}

impl BridgePermission {
    pub fn new(clients: ClientRegistry, gate: PermissionGate, timeout: Duration) -> Self {
        Self {
            clients,
            gate,
            timeout,
        }
    }
}

#[async_trait]
impl PermissionSource for BridgePermission {
    async fn current(&self) -> PermissionState {
        let answered = match self.clients.query_permission(self.timeout).await {
            Ok(state) => state,
            Err(e) => {
                tracing::debug!(error = %e, "permission query failed, treating as denied");
                PermissionState::Denied
            }
        };
        self.gate.mirror(answered);
        self.gate.state()
    }
}
