//! Sync engine wiring and lifecycle
//!
//! The [`SyncEngine`] owns one API client shared by three independent
//! pollers, the snapshot store they feed, and the backoff controller
//! they consult. `run` completes on `shutdown` after letting in-flight
//! requests finish, or with an error once the engine needs operator
//! reauthentication.

use crate::api::{ApiClient, build_http_client};
use crate::auth::TokenManager;
use crate::backoff::{BackoffController, BackoffEvent};
use crate::config::Config;
use crate::error::{ChargeSyncError, Result};
use crate::logging::get_logger;
use crate::models::{Charge, ChargerState};
use crate::poller::{
    PollerContext, run_charge_points_poller, run_charges_poller, run_wallet_poller,
};
use crate::snapshot::SnapshotStore;
use crate::storage::{FileTokenStore, MemoryTokenStore, TokenStore};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio_stream::wrappers::BroadcastStream;

/// Externally observable engine state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Pollers are running
    Running,
    /// The token could not be refreshed; the engine stopped and needs
    /// new credentials
    NeedsReauthentication,
}

/// Data synchronization engine for the remote charging API
pub struct SyncEngine {
    config: Config,
    api: Arc<ApiClient>,
    snapshots: Arc<SnapshotStore>,
    backoff: Arc<BackoffController>,
    state_tx: Arc<watch::Sender<EngineState>>,
    shutdown_tx: watch::Sender<bool>,
    logger: crate::logging::StructuredLogger,
}

impl SyncEngine {
    /// Create an engine with the token store selected by the config:
    /// file-backed when a token file is configured, in-memory otherwise
    pub fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn TokenStore> = if config.storage.token_file.is_empty() {
            Arc::new(MemoryTokenStore::new())
        } else {
            Arc::new(FileTokenStore::new(&config.storage.token_file))
        };
        Self::with_token_store(config, store)
    }

    /// Create an engine with an injected token store
    pub fn with_token_store(config: Config, store: Arc<dyn TokenStore>) -> Result<Self> {
        let logger = get_logger("engine");

        let http = build_http_client(&config.api)?;
        let auth = Arc::new(TokenManager::new(&config.api, http.clone(), store));
        let api = Arc::new(ApiClient::new(&config.api, http, auth));
        let snapshots = Arc::new(SnapshotStore::new());
        let backoff = Arc::new(BackoffController::new(&config.polling));

        let (state_tx, _) = watch::channel(EngineState::Running);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            api,
            snapshots,
            backoff,
            state_tx: Arc::new(state_tx),
            shutdown_tx,
            logger,
        })
    }

    /// Run the pollers until shutdown or a fatal authentication failure.
    ///
    /// In-flight requests complete before this returns; pending sleeps
    /// are cancelled immediately.
    pub async fn run(&self) -> Result<()> {
        self.logger.info("Starting sync engine");

        let mut tasks: JoinSet<()> = JoinSet::new();
        let ctx = PollerContext {
            api: Arc::clone(&self.api),
            snapshots: Arc::clone(&self.snapshots),
            backoff: Arc::clone(&self.backoff),
            shutdown: self.shutdown_tx.subscribe(),
            state_tx: Arc::clone(&self.state_tx),
        };
        tasks.spawn(run_charge_points_poller(ctx.clone()));
        tasks.spawn(run_wallet_poller(ctx.clone()));
        tasks.spawn(run_charges_poller(ctx));

        let mut state_rx = self.state_tx.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::select! {
            result = shutdown_rx.wait_for(|stop| *stop) => {
                let _ = result;
            }
            result = state_rx.wait_for(|state| *state == EngineState::NeedsReauthentication) => {
                let _ = result;
                let _ = self.shutdown_tx.send(true);
            }
        }

        // Drain the pollers; sleeps wake on the shutdown signal, fetches
        // already in flight run to completion
        while tasks.join_next().await.is_some() {}

        if *state_rx.borrow() == EngineState::NeedsReauthentication {
            self.logger
                .error("Sync engine stopped: reauthentication required");
            Err(ChargeSyncError::auth("reauthentication required"))
        } else {
            self.logger.info("Sync engine shutdown complete");
            Ok(())
        }
    }

    /// Signal the engine to stop
    pub fn shutdown(&self) {
        self.logger.info("Shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// The engine configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Snapshot store with the latest known-good value per resource class
    pub fn snapshots(&self) -> Arc<SnapshotStore> {
        Arc::clone(&self.snapshots)
    }

    /// Watch the engine state for the reauthentication-required condition
    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to backoff state transitions
    pub fn subscribe_backoff_events(&self) -> broadcast::Receiver<BackoffEvent> {
        self.backoff.subscribe()
    }

    /// Backoff transitions as an async stream
    pub fn backoff_event_stream(&self) -> BroadcastStream<BackoffEvent> {
        BroadcastStream::new(self.backoff.subscribe())
    }

    /// Start a charge on a known, available charge point
    pub async fn start_charge(&self, charge_point_id: u64) -> Result<Charge> {
        let point = self.known_charge_point(charge_point_id)?;
        if point.state != ChargerState::Available {
            return Err(ChargeSyncError::api(format!(
                "Cannot start charging. Charger is in state '{}'. Expected: available",
                point.state.as_str()
            )));
        }
        self.api.start_charge(charge_point_id).await
    }

    /// Stop a charge by its id
    pub async fn stop_charge(&self, charge_id: u64) -> Result<()> {
        self.api.stop_charge(charge_id).await
    }

    /// Stop the most recent charge on a charge point
    pub async fn stop_charge_point(&self, charge_point_id: u64) -> Result<()> {
        let point = self.known_charge_point(charge_point_id)?;
        if !point.state.is_busy() {
            return Err(ChargeSyncError::api(format!(
                "Cannot stop charging. Charger is in state '{}'. Expected: busy",
                point.state.as_str()
            )));
        }

        let charges = self.api.charges(charge_point_id).await?;
        let latest = charges.into_iter().next().ok_or_else(|| {
            ChargeSyncError::api(format!(
                "No charges found for charge point {}",
                charge_point_id
            ))
        })?;
        self.api.stop_charge(latest.id).await
    }

    fn known_charge_point(&self, charge_point_id: u64) -> Result<crate::models::ChargePoint> {
        let points = self
            .snapshots
            .charge_points()
            .ok_or_else(|| ChargeSyncError::api("Charge points not fetched yet"))?;
        points
            .get(&charge_point_id)
            .cloned()
            .ok_or_else(|| {
                ChargeSyncError::api(format!("Charge point {} not found", charge_point_id))
            })
    }
}
