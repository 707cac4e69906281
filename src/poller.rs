//! Periodic resource pollers
//!
//! One loop per resource class. Every cycle re-reads its interval from
//! the backoff controller so an escalation takes effect on the very next
//! wait, then fetches, updates the snapshot store on success and reports
//! the outcome back to the controller. Errors never crash a loop; only
//! an authentication failure ends it, flagging the engine for
//! reauthentication.
//!
//! The charges poller staggers per-charge-point fetches evenly across
//! its interval window, bounding the instantaneous request rate
//! regardless of fleet size.

use crate::api::ApiClient;
use crate::backoff::{BackoffController, ResourceClass};
use crate::engine::EngineState;
use crate::error::{ChargeSyncError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use crate::snapshot::{SnapshotStore, WalletSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;

/// Everything a poller loop needs, cloned per task
#[derive(Clone)]
pub(crate) struct PollerContext {
    pub api: Arc<ApiClient>,
    pub snapshots: Arc<SnapshotStore>,
    pub backoff: Arc<BackoffController>,
    pub shutdown: watch::Receiver<bool>,
    pub state_tx: Arc<watch::Sender<EngineState>>,
}

/// Whether the loop carries on after a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Continue,
    Fatal,
}

/// Compute the per-charge-point offsets for one staggered cycle:
/// `offset_i = i * interval / count`, all within `[0, interval)`.
pub fn stagger_offsets(count: usize, interval: Duration) -> Vec<Duration> {
    (0..count as u32)
        .map(|i| interval * i / count as u32)
        .collect()
}

/// Sleep for `interval`, waking early on shutdown. Returns true when the
/// loop should stop.
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, interval: Duration) -> bool {
    tokio::select! {
        // A closed channel means the engine is gone; stop as well
        result = shutdown.wait_for(|stop| *stop) => {
            let _ = result;
            true
        }
        _ = tokio::time::sleep(interval) => false,
    }
}

fn poller_logger(class: ResourceClass) -> StructuredLogger {
    get_logger_with_context(LogContext::new("poller").with_resource_class(class.to_string()))
}

/// Route a failed fetch: rate limits escalate the backoff, auth failures
/// are fatal, everything else is logged and retried next cycle with the
/// snapshot left at its last-known-good value.
fn handle_fetch_error(
    ctx: &PollerContext,
    logger: &StructuredLogger,
    class: ResourceClass,
    err: &ChargeSyncError,
) -> CycleOutcome {
    match err {
        ChargeSyncError::RateLimited { resets_in } => {
            ctx.backoff.record_rate_limit(class, *resets_in);
            CycleOutcome::Continue
        }
        ChargeSyncError::Auth { message } => {
            logger.error(&format!(
                "Authentication failed, reauthentication required: {}",
                message
            ));
            let _ = ctx.state_tx.send(EngineState::NeedsReauthentication);
            CycleOutcome::Fatal
        }
        other => {
            logger.warn(&format!("Fetch failed, keeping stale snapshot: {}", other));
            CycleOutcome::Continue
        }
    }
}

/// Poll the slowly-changing charge point reference set
pub(crate) async fn run_charge_points_poller(mut ctx: PollerContext) {
    let logger = poller_logger(ResourceClass::ChargePoints);

    loop {
        match ctx.api.charge_points().await {
            Ok(points) => {
                let ids: Vec<u64> = points.keys().copied().collect();
                logger.debug(&format!("Fetched {} charge points", points.len()));
                ctx.snapshots.set_charge_points(points);
                ctx.snapshots.prune_charges(&ids);
                ctx.backoff.record_success(ResourceClass::ChargePoints);
            }
            Err(err) => {
                if handle_fetch_error(&ctx, &logger, ResourceClass::ChargePoints, &err)
                    == CycleOutcome::Fatal
                {
                    return;
                }
            }
        }

        let interval = ctx.backoff.current_interval(ResourceClass::ChargePoints);
        if sleep_or_shutdown(&mut ctx.shutdown, interval).await {
            return;
        }
    }
}

/// Poll wallet balance and the first page of wallet transactions
pub(crate) async fn run_wallet_poller(mut ctx: PollerContext) {
    let logger = poller_logger(ResourceClass::Wallet);

    loop {
        match fetch_wallet(&ctx.api).await {
            Ok(snapshot) => {
                logger.debug(&format!(
                    "Fetched wallet with {} transactions",
                    snapshot.transactions.len()
                ));
                ctx.snapshots.set_wallet(snapshot);
                ctx.backoff.record_success(ResourceClass::Wallet);
            }
            Err(err) => {
                if handle_fetch_error(&ctx, &logger, ResourceClass::Wallet, &err)
                    == CycleOutcome::Fatal
                {
                    return;
                }
            }
        }

        let interval = ctx.backoff.current_interval(ResourceClass::Wallet);
        if sleep_or_shutdown(&mut ctx.shutdown, interval).await {
            return;
        }
    }
}

async fn fetch_wallet(api: &ApiClient) -> Result<WalletSnapshot> {
    let wallet = api.wallet().await?;
    let transactions = api.wallet_transactions().await?;
    Ok(WalletSnapshot {
        wallet,
        transactions,
    })
}

/// Poll the most recent charge per known charge point, staggered across
/// the interval window
pub(crate) async fn run_charges_poller(mut ctx: PollerContext) {
    let logger = poller_logger(ResourceClass::Charges);

    loop {
        let cycle_started = tokio::time::Instant::now();
        let interval = ctx.backoff.current_interval(ResourceClass::Charges);

        let roster = charge_point_roster(&ctx.snapshots);
        if roster.is_empty() {
            logger.trace("No charge points known yet, skipping cycle");
        } else {
            let offsets = stagger_offsets(roster.len(), interval);
            let mut tasks: JoinSet<CycleOutcome> = JoinSet::new();
            for (charge_point_id, offset) in roster.into_iter().zip(offsets) {
                let task_ctx = ctx.clone();
                let task_logger = logger.clone();
                tasks.spawn(async move {
                    fetch_charges_for_point(task_ctx, task_logger, charge_point_id, offset).await
                });
            }

            // All of this cycle's fetches finish before the next cycle
            // starts, so at most one request per charge point is in flight
            let mut fatal = false;
            while let Some(result) = tasks.join_next().await {
                if matches!(result, Ok(CycleOutcome::Fatal)) {
                    fatal = true;
                }
            }
            if fatal {
                return;
            }
        }

        // Re-read so an escalation during the cycle stretches this wait
        let interval = ctx.backoff.current_interval(ResourceClass::Charges);
        let remaining = interval.saturating_sub(cycle_started.elapsed());
        if sleep_or_shutdown(&mut ctx.shutdown, remaining).await {
            return;
        }
    }
}

/// Sorted ids of the current reference set; sorted so offsets stay
/// stable until the set itself changes
fn charge_point_roster(snapshots: &SnapshotStore) -> Vec<u64> {
    let mut ids: Vec<u64> = snapshots
        .charge_points()
        .map(|points| points.keys().copied().collect())
        .unwrap_or_default();
    ids.sort_unstable();
    ids
}

async fn fetch_charges_for_point(
    mut ctx: PollerContext,
    logger: StructuredLogger,
    charge_point_id: u64,
    offset: Duration,
) -> CycleOutcome {
    if offset > Duration::ZERO && sleep_or_shutdown(&mut ctx.shutdown, offset).await {
        return CycleOutcome::Continue;
    }

    match ctx.api.charges(charge_point_id).await {
        Ok(charges) => {
            // Listing is most-recent-first; track that one charge
            ctx.snapshots
                .set_charge(charge_point_id, charges.into_iter().next());
            ctx.backoff.record_success(ResourceClass::Charges);
            CycleOutcome::Continue
        }
        Err(err) => handle_fetch_error(&ctx, &logger, ResourceClass::Charges, &err),
    }
}
