//! Adaptive polling backoff for rate-limited resource classes
//!
//! One [`BackoffState`] per resource class tracks the interval the
//! corresponding poller sleeps between cycles. A rate-limit rejection
//! escalates the interval to at least the server's own reset hint;
//! sustained success decays it gradually back to baseline. Classes are
//! independent: a rejection on one never touches another's schedule.
//! State is process-local only and resets on restart.

use crate::config::PollingConfig;
use crate::logging::get_logger;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// Once the excess over baseline is below this, snap to baseline
const RECOVERY_SNAP_SECS: u64 = 1;

/// The independently polled resource classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    ChargePoints,
    Wallet,
    Charges,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 3] = [
        ResourceClass::ChargePoints,
        ResourceClass::Wallet,
        ResourceClass::Charges,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChargePoints => "charge_points",
            Self::Wallet => "wallet",
            Self::Charges => "charges",
        }
    }
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of one class's backoff state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPhase {
    /// Polling at the configured baseline interval
    Baseline,
    /// Slowed down after a rate-limit rejection
    Escalated,
    /// Decaying back toward baseline after sustained success
    Recovering,
}

/// Emitted on every phase or interval change, for observability consumers
#[derive(Debug, Clone)]
pub struct BackoffEvent {
    pub class: ResourceClass,
    pub phase: BackoffPhase,
    pub interval: Duration,
}

/// Per-class backoff bookkeeping
#[derive(Debug, Clone)]
struct BackoffState {
    baseline: Duration,
    max: Duration,
    current: Duration,
    consecutive_successes: u32,
    phase: BackoffPhase,
}

impl BackoffState {
    fn new(baseline: Duration, max: Duration) -> Self {
        Self {
            baseline,
            // A baseline above the cap keeps its baseline as the bound,
            // escalation can then never raise the interval further
            max: max.max(baseline),
            current: baseline,
            consecutive_successes: 0,
            phase: BackoffPhase::Baseline,
        }
    }

    /// Escalate to at least the server hint, capped. Returns true if the
    /// phase or interval changed.
    fn record_rate_limit(&mut self, resets_in: Duration) -> bool {
        let escalated = self.current.max(resets_in).min(self.max).max(self.baseline);
        let changed = escalated != self.current || self.phase != BackoffPhase::Escalated;
        self.current = escalated;
        self.consecutive_successes = 0;
        self.phase = BackoffPhase::Escalated;
        changed
    }

    /// Count a success; past the threshold, halve the excess over baseline
    /// per success until the interval is back at baseline. Returns true if
    /// the phase or interval changed.
    fn record_success(&mut self, threshold: u32) -> bool {
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);

        if self.phase == BackoffPhase::Baseline || self.consecutive_successes < threshold {
            return false;
        }

        let excess = self.current.saturating_sub(self.baseline);
        if excess <= Duration::from_secs(RECOVERY_SNAP_SECS) {
            self.current = self.baseline;
            self.phase = BackoffPhase::Baseline;
        } else {
            self.current = self.baseline + excess / 2;
            self.phase = BackoffPhase::Recovering;
        }
        true
    }
}

/// Shared controller holding the backoff state of every resource class
pub struct BackoffController {
    states: Mutex<HashMap<ResourceClass, BackoffState>>,
    recovery_threshold: u32,
    events_tx: broadcast::Sender<BackoffEvent>,
    logger: crate::logging::StructuredLogger,
}

impl BackoffController {
    /// Create a controller with per-class baselines from the polling config
    pub fn new(polling: &PollingConfig) -> Self {
        let max = Duration::from_secs(polling.max_interval_secs);
        let mut states = HashMap::new();
        states.insert(
            ResourceClass::ChargePoints,
            BackoffState::new(Duration::from_secs(polling.charge_points_interval_secs), max),
        );
        states.insert(
            ResourceClass::Wallet,
            BackoffState::new(Duration::from_secs(polling.wallet_interval_secs), max),
        );
        states.insert(
            ResourceClass::Charges,
            BackoffState::new(Duration::from_secs(polling.charges_interval_secs), max),
        );

        let (events_tx, _) = broadcast::channel(64);
        Self {
            states: Mutex::new(states),
            recovery_threshold: polling.recovery_threshold,
            events_tx,
            logger: get_logger("backoff"),
        }
    }

    /// Interval the class's poller should sleep before its next cycle.
    /// Re-read every cycle so escalation takes effect on the next wait.
    pub fn current_interval(&self, class: ResourceClass) -> Duration {
        let states = self.lock_states();
        states
            .get(&class)
            .map(|state| state.current)
            .unwrap_or(Duration::from_secs(30))
    }

    /// Current phase of the class's state machine
    pub fn phase(&self, class: ResourceClass) -> BackoffPhase {
        let states = self.lock_states();
        states
            .get(&class)
            .map(|state| state.phase)
            .unwrap_or(BackoffPhase::Baseline)
    }

    /// React to a rate-limit rejection with the server's reset hint
    pub fn record_rate_limit(&self, class: ResourceClass, resets_in_secs: u64) {
        let (changed, event) = {
            let mut states = self.lock_states();
            match states.get_mut(&class) {
                Some(state) => {
                    let changed = state.record_rate_limit(Duration::from_secs(resets_in_secs));
                    (changed, BackoffEvent {
                        class,
                        phase: state.phase,
                        interval: state.current,
                    })
                }
                None => return,
            }
        };

        if changed {
            self.logger.info(&format!(
                "Rate limited on {}, polling slowed to {}s (hint {}s)",
                class,
                event.interval.as_secs(),
                resets_in_secs
            ));
            let _ = self.events_tx.send(event);
        }
    }

    /// React to a successful fetch
    pub fn record_success(&self, class: ResourceClass) {
        let (changed, event) = {
            let mut states = self.lock_states();
            match states.get_mut(&class) {
                Some(state) => {
                    let changed = state.record_success(self.recovery_threshold);
                    (changed, BackoffEvent {
                        class,
                        phase: state.phase,
                        interval: state.current,
                    })
                }
                None => return,
            }
        };

        if changed {
            match event.phase {
                BackoffPhase::Baseline => self.logger.info(&format!(
                    "{} polling recovered to baseline {}s",
                    class,
                    event.interval.as_secs()
                )),
                _ => self.logger.debug(&format!(
                    "{} polling decayed to {}s",
                    class,
                    event.interval.as_secs()
                )),
            }
            let _ = self.events_tx.send(event);
        }
    }

    /// Subscribe to backoff state transitions
    pub fn subscribe(&self) -> broadcast::Receiver<BackoffEvent> {
        self.events_tx.subscribe()
    }

    fn lock_states(&self) -> std::sync::MutexGuard<'_, HashMap<ResourceClass, BackoffState>> {
        self.states
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_polling() -> PollingConfig {
        PollingConfig {
            charge_points_interval_secs: 3600,
            wallet_interval_secs: 300,
            charges_interval_secs: 30,
            max_interval_secs: 300,
            recovery_threshold: 3,
        }
    }

    #[test]
    fn escalation_honors_hint_and_cap() {
        let controller = BackoffController::new(&test_polling());

        controller.record_rate_limit(ResourceClass::Charges, 120);
        assert_eq!(
            controller.current_interval(ResourceClass::Charges),
            Duration::from_secs(120)
        );
        assert_eq!(controller.phase(ResourceClass::Charges), BackoffPhase::Escalated);

        // A hint above the cap is clamped
        controller.record_rate_limit(ResourceClass::Charges, 10_000);
        assert_eq!(
            controller.current_interval(ResourceClass::Charges),
            Duration::from_secs(300)
        );

        // A smaller hint never shrinks the current interval
        controller.record_rate_limit(ResourceClass::Charges, 5);
        assert_eq!(
            controller.current_interval(ResourceClass::Charges),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn escalation_never_drops_below_baseline() {
        let controller = BackoffController::new(&test_polling());

        // Hint below the charges baseline of 30s
        controller.record_rate_limit(ResourceClass::Charges, 2);
        assert_eq!(
            controller.current_interval(ResourceClass::Charges),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn classes_are_independent() {
        let controller = BackoffController::new(&test_polling());

        controller.record_rate_limit(ResourceClass::Wallet, 200);
        assert_eq!(
            controller.current_interval(ResourceClass::Wallet),
            Duration::from_secs(300)
        );
        assert_eq!(
            controller.current_interval(ResourceClass::Charges),
            Duration::from_secs(30)
        );
        assert_eq!(controller.phase(ResourceClass::Charges), BackoffPhase::Baseline);
    }

    #[test]
    fn recovery_decays_strictly_until_baseline() {
        let controller = BackoffController::new(&test_polling());
        controller.record_rate_limit(ResourceClass::Charges, 200);

        // Below the threshold nothing moves
        controller.record_success(ResourceClass::Charges);
        controller.record_success(ResourceClass::Charges);
        assert_eq!(
            controller.current_interval(ResourceClass::Charges),
            Duration::from_secs(200)
        );

        // From the threshold on, the interval strictly decreases each
        // success until it reaches baseline
        let mut previous = controller.current_interval(ResourceClass::Charges);
        let mut steps = 0;
        while controller.phase(ResourceClass::Charges) != BackoffPhase::Baseline {
            controller.record_success(ResourceClass::Charges);
            let current = controller.current_interval(ResourceClass::Charges);
            assert!(current < previous, "interval must strictly decrease");
            assert!(current >= Duration::from_secs(30));
            previous = current;
            steps += 1;
            assert!(steps < 32, "recovery must terminate");
        }
        assert_eq!(
            controller.current_interval(ResourceClass::Charges),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn rate_limit_resets_success_streak() {
        let controller = BackoffController::new(&test_polling());
        controller.record_rate_limit(ResourceClass::Charges, 200);

        controller.record_success(ResourceClass::Charges);
        controller.record_success(ResourceClass::Charges);
        controller.record_rate_limit(ResourceClass::Charges, 200);

        // The streak starts over; two successes still decay nothing
        controller.record_success(ResourceClass::Charges);
        controller.record_success(ResourceClass::Charges);
        assert_eq!(
            controller.current_interval(ResourceClass::Charges),
            Duration::from_secs(200)
        );
    }

    #[test]
    fn baseline_above_cap_is_preserved() {
        let controller = BackoffController::new(&test_polling());

        // Charge points baseline (3600s) exceeds the 300s cap; escalation
        // must not shrink the interval
        controller.record_rate_limit(ResourceClass::ChargePoints, 120);
        assert_eq!(
            controller.current_interval(ResourceClass::ChargePoints),
            Duration::from_secs(3600)
        );
    }

    #[test]
    fn events_are_emitted_on_transitions() {
        let controller = BackoffController::new(&test_polling());
        let mut events = controller.subscribe();

        controller.record_rate_limit(ResourceClass::Wallet, 120);
        let event = events.try_recv().unwrap();
        assert_eq!(event.class, ResourceClass::Wallet);
        assert_eq!(event.phase, BackoffPhase::Escalated);
        assert_eq!(event.interval, Duration::from_secs(300));

        // Successes below the threshold emit nothing
        controller.record_success(ResourceClass::Wallet);
        assert!(events.try_recv().is_err());
    }
}
