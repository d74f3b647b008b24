use gantry_core::{MonitorConfig, TestType};
use gantry_monitor::{AlertKind, TestCompleted, TestMonitor, TestStatus};
use proptest::prelude::*;

fn monitor(dir: &std::path::Path) -> TestMonitor {
    TestMonitor::new(MonitorConfig {
        output_dir: dir.to_path_buf(),
        ..MonitorConfig::default()
    })
}

fn arb_event() -> impl Strategy<Value = TestCompleted> {
    (
        0u64..20_000,
        prop_oneof![Just(TestStatus::Passed), Just(TestStatus::Failed), Just(TestStatus::Skipped)],
        proptest::option::of(0.0f64..300.0),
    )
        .prop_map(|(duration, status, memory)| {
            let mut event = TestCompleted::new("t", status, duration).with_type(TestType::Unit);
            event.memory_mb = memory;
            if status == TestStatus::Failed {
                event.error = Some("boom".into());
            }
            event
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_alert_ids_strictly_increase(events in proptest::collection::vec(arb_event(), 0..40)) {
        let dir = tempfile::tempdir().unwrap();
        let monitor = monitor(dir.path());
        let mut expected = 0;
        for event in &events {
            expected += usize::from(event.duration_ms > 10_000)
                + usize::from(event.status == TestStatus::Failed)
                + usize::from(event.memory_mb.is_some_and(|m| m > 100.0));
            monitor.publish(event.clone());
        }

        let alerts = monitor.alerts();
        prop_assert_eq!(alerts.len(), expected);
        prop_assert!(alerts.windows(2).all(|w| w[0].id < w[1].id));
        let summary = monitor.summary();
        prop_assert_eq!(summary.total_tests, events.len() as u64);
        prop_assert_eq!(
            summary.passed_tests + summary.failed_tests + summary.skipped_tests,
            summary.total_tests
        );
        let failures = alerts.iter().filter(|a| a.kind == AlertKind::TestFailure).count() as u64;
        prop_assert_eq!(failures, summary.failed_tests);
    }
}

#[test]
fn test_report_lists_top_ten_slow_tests() {
    let dir = tempfile::tempdir().unwrap();
    let monitor = monitor(dir.path());
    monitor.start_monitoring();
    for i in 0..15u64 {
        monitor.publish(TestCompleted::passed(format!("t{i}"), i * 100).with_type(TestType::Api));
    }
    let report = monitor.stop_monitoring();

    let slow = &report.performance.slow_tests;
    assert_eq!(slow.len(), 10);
    assert_eq!(slow[0].test_id.as_str(), "t14");
    assert!(slow.windows(2).all(|w| w[0].duration_ms >= w[1].duration_ms));
    assert_eq!(report.performance.durations.count, 15);
    assert_eq!(report.performance.durations.p99_ms, 1_400);
    assert!(report.is_healthy());

    let raw = std::fs::read_to_string(dir.path().join(gantry_monitor::REPORT_FILE)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["summary"]["totalTests"], 15);
}
