use crate::report::types::Summary;
use rebound_core::{Harness, Matrix, ScenarioReport, Testbed};
use tracing::instrument;

/// Display one line for each scenario as it completes.
#[instrument(skip_all, level = "trace")]
pub fn report<T: Testbed>(harness: &Harness<T>, matrix: &Matrix) -> Summary {
    println!(
        "Running {} scenarios against {}",
        matrix.len(),
        harness.config().dut_addr
    );
    let reports = harness.run_with(matrix, |report| println!("{}", format_line(report)));
    let summary = Summary::from(reports.as_slice());
    println!(
        "{} scenarios, {} passed, {} failed",
        summary.total, summary.passed, summary.failed
    );
    summary
}

fn format_line(report: &ScenarioReport) -> String {
    format!(
        "{} expected={} {} ({:.1}ms)",
        report.scenario,
        report.scenario.expected,
        report.verdict,
        report.elapsed.as_secs_f64() * 1000.0
    )
}
