//! Monitoring session lifecycle
//!
//! The session owns everything that exists only while monitoring is on:
//! the active ingestion strategy and its coalescer. Enabling creates them,
//! disabling tears them down and resets the store. Nothing here is global.
//!
//! [`MonitoringSession::spawn`] moves the session into a task and returns a
//! cloneable [`SessionHandle`]; commands travel over an mpsc channel with a
//! oneshot reply each.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::config::MonitoringConfig;
use crate::constants::SESSION_COMMAND_CAPACITY;
use crate::error::{Error, Result};
use crate::ingest::{select_ingestion, ActiveIngestion, IngestSink, LevelSource, StrategyKind};
use crate::levels::LevelConverter;
use crate::telemetry::{TelemetryStore, UpdateCoalescer};

/// Monitoring status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStatus {
    pub enabled: bool,
    pub strategy: Option<StrategyKind>,
    pub session_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    /// Frames (or polls) forwarded in the current activation
    pub frames: u64,
    /// Store flushes in the current activation
    pub flushes: u64,
    pub snapshot_version: u64,
}

/// One activation: created by `enable`, destroyed by `disable`
struct Activation {
    id: Uuid,
    started_at: DateTime<Utc>,
    ingestion: ActiveIngestion,
    coalescer: Arc<UpdateCoalescer>,
}

/// Monitoring session over one level source
pub struct MonitoringSession<S: LevelSource> {
    source: Arc<S>,
    store: Arc<TelemetryStore>,
    converter: Arc<LevelConverter>,
    config: MonitoringConfig,
    activation: Option<Activation>,
}

impl<S: LevelSource> MonitoringSession<S> {
    pub fn new(source: Arc<S>, store: Arc<TelemetryStore>, config: MonitoringConfig) -> Self {
        let converter = Arc::new(LevelConverter::with_cache_size(config.converter_cache_size));
        Self {
            source,
            store,
            converter,
            config,
            activation: None,
        }
    }

    /// Start monitoring. Strategy selection runs again on every call that
    /// actually enables; calling it while enabled returns the current kind.
    pub async fn enable(&mut self) -> StrategyKind {
        if let Some(activation) = &self.activation {
            return activation.ingestion.kind();
        }

        let coalescer = UpdateCoalescer::new(self.store.clone(), self.config.flush_interval());
        let sink = IngestSink::new(coalescer.clone(), self.converter.clone());
        let ingestion = select_ingestion(&self.source, sink, &self.config).await;
        let kind = ingestion.kind();

        let activation = Activation {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ingestion,
            coalescer,
        };
        tracing::info!(session_id = %activation.id, strategy = %kind, "Monitoring enabled");
        self.activation = Some(activation);
        kind
    }

    /// Stop monitoring and clear the store. No-op when already disabled.
    pub fn disable(&mut self) {
        let Some(activation) = self.activation.take() else {
            return;
        };

        let frames = activation.ingestion.frames();
        activation.ingestion.stop();
        activation.coalescer.close();
        self.store.reset();

        tracing::info!(
            session_id = %activation.id,
            frames,
            flushes = activation.coalescer.flushes(),
            "Monitoring disabled"
        );
    }

    /// Explicit meter teardown for one channel
    pub fn remove_channel(&self, channel_id: u32) -> bool {
        let removed = self.store.remove_channel(channel_id);
        if removed {
            tracing::debug!(channel_id, "Channel meter removed");
        }
        removed
    }

    pub fn is_enabled(&self) -> bool {
        self.activation.is_some()
    }

    pub fn status(&self) -> MonitoringStatus {
        let snapshot_version = self.store.version();
        match &self.activation {
            Some(a) => MonitoringStatus {
                enabled: true,
                strategy: Some(a.ingestion.kind()),
                session_id: Some(a.id),
                started_at: Some(a.started_at),
                frames: a.ingestion.frames(),
                flushes: a.coalescer.flushes(),
                snapshot_version,
            },
            None => MonitoringStatus {
                enabled: false,
                strategy: None,
                session_id: None,
                started_at: None,
                frames: 0,
                flushes: 0,
                snapshot_version,
            },
        }
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    pub fn converter(&self) -> &Arc<LevelConverter> {
        &self.converter
    }

    /// Run the session as a task and return a handle to it
    pub fn spawn(self) -> SessionHandle {
        let (commands_tx, commands_rx) = mpsc::channel(SESSION_COMMAND_CAPACITY);
        let store = self.store.clone();
        tokio::spawn(self.run(commands_rx));
        SessionHandle { commands_tx, store }
    }

    async fn run(mut self, mut commands_rx: mpsc::Receiver<SessionCommand>) {
        while let Some(command) = commands_rx.recv().await {
            match command {
                SessionCommand::Enable { reply } => {
                    let kind = self.enable().await;
                    let _ = reply.send(kind);
                }
                SessionCommand::Disable { reply } => {
                    self.disable();
                    let _ = reply.send(());
                }
                SessionCommand::RemoveChannel { channel_id, reply } => {
                    let _ = reply.send(self.remove_channel(channel_id));
                }
                SessionCommand::Status { reply } => {
                    let _ = reply.send(self.status());
                }
                SessionCommand::Shutdown => break,
            }
        }

        self.disable();
        tracing::debug!("Session task finished");
    }
}

impl<S: LevelSource> Drop for MonitoringSession<S> {
    fn drop(&mut self) {
        self.disable();
    }
}

/// Commands accepted by a spawned session
#[derive(Debug)]
pub enum SessionCommand {
    Enable { reply: oneshot::Sender<StrategyKind> },
    Disable { reply: oneshot::Sender<()> },
    RemoveChannel { channel_id: u32, reply: oneshot::Sender<bool> },
    Status { reply: oneshot::Sender<MonitoringStatus> },
    Shutdown,
}

/// Cloneable handle to a spawned session
#[derive(Clone)]
pub struct SessionHandle {
    commands_tx: mpsc::Sender<SessionCommand>,
    store: Arc<TelemetryStore>,
}

impl SessionHandle {
    pub async fn enable(&self) -> Result<StrategyKind> {
        self.request(|reply| SessionCommand::Enable { reply }).await
    }

    pub async fn disable(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Disable { reply }).await
    }

    pub async fn remove_channel(&self, channel_id: u32) -> Result<bool> {
        self.request(|reply| SessionCommand::RemoveChannel { channel_id, reply }).await
    }

    pub async fn status(&self) -> Result<MonitoringStatus> {
        self.request(|reply| SessionCommand::Status { reply }).await
    }

    /// Disable and stop the session task
    pub async fn shutdown(&self) -> Result<()> {
        self.commands_tx
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| Error::Session("session task is not running".into()))
    }

    /// Store the session writes into
    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    pub fn is_closed(&self) -> bool {
        self.commands_tx.is_closed()
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands_tx
            .send(command(reply_tx))
            .await
            .map_err(|_| Error::Session("session task is not running".into()))?;
        reply_rx
            .await
            .map_err(|_| Error::Session("session task dropped the request".into()))
    }
}
