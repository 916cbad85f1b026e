//! Merge queue for single-writer manifest updates.
//!
//! Every merge for a root is serialized through one worker task, so two
//! reparses can never interleave their read-modify-write of the manifest.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};

use crate::error::{DiscoveryError, Result};
use crate::extractor::Endpoint;

use super::{ManifestStore, MergeOutcome, MergeScope};

/// Commands that can be sent to the merge worker.
#[derive(Debug)]
pub enum MergeCommand {
    Merge {
        scope: MergeScope,
        endpoints: Vec<Endpoint>,
        /// Commit even when the diff is empty
        force: bool,
        respond: oneshot::Sender<Result<MergeOutcome>>,
    },
    Shutdown,
}

/// Handle for submitting merges. Cheap to clone.
#[derive(Clone)]
pub struct MergeQueueHandle {
    sender: mpsc::Sender<MergeCommand>,
}

impl MergeQueueHandle {
    const DEFAULT_BUFFER_SIZE: usize = 256;

    /// Spawns the worker task. Must be called inside a tokio runtime.
    pub fn new(store: Arc<ManifestStore>) -> Self {
        Self::with_buffer_size(store, Self::DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(store: Arc<ManifestStore>, buffer_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let worker = MergeWorker { receiver, store };
        tokio::spawn(async move {
            worker.run().await;
        });
        Self { sender }
    }

    pub async fn merge(
        &self,
        scope: MergeScope,
        endpoints: Vec<Endpoint>,
        force: bool,
    ) -> Result<MergeOutcome> {
        let (respond, rx) = oneshot::channel();
        self.sender
            .send(MergeCommand::Merge {
                scope,
                endpoints,
                force,
                respond,
            })
            .await
            .map_err(|_| DiscoveryError::Engine("Merge queue closed".into()))?;
        rx.await
            .map_err(|_| DiscoveryError::Engine("Merge response channel closed".into()))?
    }

    /// After shutdown every merge fails.
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(MergeCommand::Shutdown)
            .await
            .map_err(|_| DiscoveryError::Engine("Merge queue already closed".into()))
    }

    pub fn is_active(&self) -> bool {
        !self.sender.is_closed()
    }
}

struct MergeWorker {
    receiver: mpsc::Receiver<MergeCommand>,
    store: Arc<ManifestStore>,
}

impl MergeWorker {
    async fn run(mut self) {
        tracing::debug!("Merge worker started for {}", self.store.path().display());

        while let Some(command) = self.receiver.recv().await {
            match command {
                MergeCommand::Merge {
                    scope,
                    endpoints,
                    force,
                    respond,
                } => {
                    let store = self.store.clone();
                    // File IO stays off the async workers
                    let result = tokio::task::spawn_blocking(move || {
                        store.apply_merge(&scope, endpoints, force, Utc::now())
                    })
                    .await
                    .unwrap_or_else(|e| Err(DiscoveryError::Engine(format!("Merge task failed: {}", e))));
                    let _ = respond.send(result);
                }
                MergeCommand::Shutdown => {
                    tracing::debug!("Merge worker shutting down");
                    break;
                }
            }
        }

        tracing::debug!("Merge worker stopped");
    }
}
