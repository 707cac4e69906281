use chargesync::backoff::{BackoffController, BackoffPhase, ResourceClass};
use chargesync::config::PollingConfig;
use std::time::Duration;

fn polling() -> PollingConfig {
    PollingConfig::default()
}

#[test]
fn wallet_rate_limit_is_bounded_by_baseline_and_cap() {
    let controller = BackoffController::new(&polling());

    // Wallet baseline is 300s, equal to the cap; the hint is honored as a
    // lower bound and the interval never leaves [baseline, max]
    controller.record_rate_limit(ResourceClass::Wallet, 120);
    let interval = controller.current_interval(ResourceClass::Wallet);
    assert!(interval >= Duration::from_secs(120));
    assert_eq!(interval, Duration::from_secs(300));

    // Three consecutive successes: already at baseline width, so recovery
    // lands straight back on baseline
    for _ in 0..3 {
        controller.record_success(ResourceClass::Wallet);
    }
    assert_eq!(
        controller.current_interval(ResourceClass::Wallet),
        Duration::from_secs(300)
    );
    assert_eq!(controller.phase(ResourceClass::Wallet), BackoffPhase::Baseline);
}

#[test]
fn charges_interval_decays_back_to_baseline_after_escalation() {
    let controller = BackoffController::new(&polling());

    controller.record_rate_limit(ResourceClass::Charges, 200);
    assert_eq!(
        controller.current_interval(ResourceClass::Charges),
        Duration::from_secs(200)
    );

    let mut previous = controller.current_interval(ResourceClass::Charges);
    let mut cycles = 0;
    while controller.phase(ResourceClass::Charges) != BackoffPhase::Baseline {
        controller.record_success(ResourceClass::Charges);
        let current = controller.current_interval(ResourceClass::Charges);
        assert!(current <= previous, "interval never increases during a success streak");
        previous = current;
        cycles += 1;
        assert!(cycles < 64, "recovery must converge");
    }
    assert_eq!(
        controller.current_interval(ResourceClass::Charges),
        Duration::from_secs(30)
    );
}

#[test]
fn a_rate_limit_on_one_class_never_affects_another() {
    let controller = BackoffController::new(&polling());

    controller.record_rate_limit(ResourceClass::Charges, 250);

    assert_eq!(
        controller.current_interval(ResourceClass::Wallet),
        Duration::from_secs(300)
    );
    assert_eq!(controller.phase(ResourceClass::Wallet), BackoffPhase::Baseline);
    assert_eq!(
        controller.current_interval(ResourceClass::ChargePoints),
        Duration::from_secs(3600)
    );
    assert_eq!(
        controller.phase(ResourceClass::ChargePoints),
        BackoffPhase::Baseline
    );
}

#[tokio::test]
async fn escalation_is_observable_on_the_event_stream() {
    let controller = BackoffController::new(&polling());
    let mut events = controller.subscribe();

    controller.record_rate_limit(ResourceClass::Charges, 90);

    let event = events.recv().await.unwrap();
    assert_eq!(event.class, ResourceClass::Charges);
    assert_eq!(event.phase, BackoffPhase::Escalated);
    assert_eq!(event.interval, Duration::from_secs(90));
}
