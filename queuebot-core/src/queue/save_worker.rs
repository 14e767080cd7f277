//! src/queue/save_worker.rs
//!
//! Single consumer for all state-file writes of one queue. Mutations enqueue
//! versioned snapshots while they still hold the queue lock, so requests
//! arrive in mutation order; the worker does the file I/O off the lock and
//! never lets an older snapshot overwrite a newer one.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use queuebot_common::models::QueueState;
use crate::queue::persistence::{StateKind, StateStore};
use crate::Error;

/// Requests accepted by the save worker.
#[derive(Debug)]
pub enum SaveRequest {
    /// Write `state` to the file for `kind`. Auto-saves carry no reply;
    /// failures are logged and dropped.
    Write {
        kind: StateKind,
        state: QueueState,
        reply: Option<oneshot::Sender<Result<(), Error>>>,
    },
    /// Signalled once every request queued before it has been handled.
    Flush(oneshot::Sender<()>),
}

/// Cloneable sender side of the save worker.
#[derive(Clone, Debug)]
pub struct SaveHandle {
    tx: mpsc::UnboundedSender<SaveRequest>,
}

impl SaveHandle {
    /// Fire-and-forget auto-save. Safe to call while holding a lock: this
    /// is a channel send, not I/O.
    pub fn submit_auto(&self, state: QueueState) {
        let req = SaveRequest::Write {
            kind: StateKind::Auto,
            state,
            reply: None,
        };
        if self.tx.send(req).is_err() {
            error!("Save worker is gone; auto-save dropped.");
        }
    }

    /// Writes the manual backup and waits for the result.
    pub async fn write_backup(&self, state: QueueState) -> Result<(), Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SaveRequest::Write {
                kind: StateKind::Backup,
                state,
                reply: Some(reply_tx),
            })
            .map_err(|_| Error::Persistence("save worker is not running".into()))?;

        match reply_rx.await {
            Ok(res) => res,
            Err(_) => Err(Error::Persistence("backup write was dropped".into())),
        }
    }

    /// Waits until everything submitted so far has hit the disk (or failed).
    pub async fn flush(&self) -> Result<(), Error> {
        trace!("SaveHandle: flush() called.");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(SaveRequest::Flush(reply_tx))
            .map_err(|_| Error::Persistence("save worker is not running".into()))?;
        reply_rx
            .await
            .map_err(|_| Error::Persistence("flush request was dropped".into()))
    }
}

/// Spawns the worker for `store`. The task ends once every `SaveHandle`
/// has been dropped and the backlog is written.
pub fn spawn_save_worker(store: StateStore) -> (SaveHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<SaveRequest>();

    let handle = tokio::spawn(async move {
        info!("Save worker started for #{}", store.channel());
        let mut last_written: HashMap<StateKind, u64> = HashMap::new();

        while let Some(req) = rx.recv().await {
            match req {
                SaveRequest::Write { kind, state, reply } => {
                    if let Some(&last) = last_written.get(&kind) {
                        if state.version < last {
                            debug!(
                                "Skipping stale {} snapshot v{} for #{} (last written v{})",
                                kind.label(),
                                state.version,
                                store.channel(),
                                last
                            );
                            if let Some(reply) = reply {
                                let _ = reply.send(Ok(()));
                            }
                            continue;
                        }
                    }

                    let version = state.version;
                    let result = write_blocking(&store, kind, state).await;
                    if result.is_ok() {
                        last_written.insert(kind, version);
                    }
                    match reply {
                        Some(reply) => {
                            let _ = reply.send(result);
                        }
                        None => {
                            if let Err(e) = result {
                                error!(
                                    "Auto-save of #{} failed (v{}): {:?}",
                                    store.channel(),
                                    version,
                                    e
                                );
                            }
                        }
                    }
                }
                SaveRequest::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }

        info!("Save worker for #{} stopped.", store.channel());
    });

    (SaveHandle { tx }, handle)
}

async fn write_blocking(store: &StateStore, kind: StateKind, state: QueueState) -> Result<(), Error> {
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.write(kind, &state))
        .await
        .map_err(|e| Error::Persistence(format!("state write task failed: {e}")))?
}
