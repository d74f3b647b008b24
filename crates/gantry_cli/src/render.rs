//! Terminal output.

use console::style;
use gantry_monitor::{MonitoringReport, Severity, TrendClass};
use gantry_plan::{Plan, Strategy};
use gantry_runtime::RunOutcome;

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn secs(ms: u64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}

pub fn strategies(default: &str) {
    for strategy in Strategy::ALL {
        let marker = if strategy.name() == default { " (default)" } else { "" };
        println!(
            "{:<16} {}{}",
            style(strategy.name()).bold(),
            strategy.description(),
            style(marker).dim()
        );
    }
}

pub fn plan(plan: &Plan) {
    println!("{} {}", style("Strategy:").bold(), plan.strategy);
    if plan.is_empty() {
        println!("{}", style("no tests matched").yellow());
        return;
    }
    println!(
        "{:<28} {:<12} {:>6} {:>7} {:>9} {:>9}",
        "phase", "type", "tests", "groups", "parallel", "estimate"
    );
    for phase in &plan.phases {
        println!(
            "{:<28} {:<12} {:>6} {:>7} {:>9} {:>9}",
            phase.name,
            phase.phase_type.as_str(),
            phase.len(),
            phase.groups().len(),
            yes_no(phase.parallel),
            secs(phase.estimated_duration_ms)
        );
        if !phase.continue_on_failure {
            println!("{}", style("  stops at first failure").dim());
        }
    }
    let s = &plan.summary;
    println!(
        "{} tests in {} phases ({} parallel), estimated {}s",
        s.total_tests, s.phase_count, s.parallel_phases, s.estimated_duration_secs
    );
}

pub fn outcome(outcome: &RunOutcome) {
    for phase in &outcome.phases {
        let status = if phase.success() {
            style("ok").green()
        } else {
            style("FAILED").red()
        };
        println!(
            "{:<28} {:>6} {} passed, {} failed, {} skipped in {}",
            phase.name,
            status,
            phase.passed,
            phase.failed,
            phase.skipped,
            secs(phase.duration_ms)
        );
        for record in &phase.tests {
            if let Some(error) = &record.error {
                println!("  {} {}: {}", style("-").dim(), record.test_id, error);
            }
        }
    }
    if outcome.cancelled {
        println!("{}", style("run cancelled").yellow());
    }
}

pub fn report(report: &MonitoringReport) {
    let s = &report.summary;
    let headline = format!(
        "{} passed, {} failed, {} skipped of {} ({:.0}% success)",
        s.passed_tests,
        s.failed_tests,
        s.skipped_tests,
        s.total_tests,
        s.success_rate() * 100.0
    );
    if report.is_healthy() {
        println!("{}", style(headline).green().bold());
    } else {
        println!("{}", style(headline).red().bold());
    }

    let d = &report.performance.durations;
    println!(
        "durations: mean {:.0} ms, median {:.0} ms, p95 {} ms, p99 {} ms",
        d.mean_ms, d.median_ms, d.p95_ms, d.p99_ms
    );
    for slow in report.performance.slow_tests.iter().take(3) {
        println!("  slow: {} {} ms", slow.test_id, slow.duration_ms);
    }
    for (test_type, cmp) in &report.performance.benchmarks {
        if cmp.regression {
            let change = cmp.change_pct.unwrap_or_default();
            println!(
                "{} {} mean {:.0} ms ({:+.0}% against baseline)",
                style("regression:").yellow(),
                test_type,
                cmp.current.mean_ms,
                change
            );
        }
    }

    let trend = match report.trend.trend {
        TrendClass::Stable => "stable",
        TrendClass::Degrading => "degrading",
        TrendClass::Improving => "improving",
        TrendClass::InsufficientData => "insufficient data",
    };
    match report.trend.change {
        Some(change) => println!("trend: {} ({:+.1}%)", trend, change),
        None => println!("trend: {}", trend),
    }
    println!(
        "alerts: {} errors, {} warnings unresolved, {} raised",
        report.alerts_with(Severity::Error),
        report.alerts_with(Severity::Warning),
        report.total_alerts
    );
}
