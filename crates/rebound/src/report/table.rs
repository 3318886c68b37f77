use crate::report::types::Summary;
use comfy_table::presets::{ASCII_MARKDOWN, UTF8_FULL};
use comfy_table::{ContentArrangement, Table};
use rebound_core::{Harness, Matrix, ScenarioReport, Testbed, Verdict};
use tracing::instrument;

/// Generate a Markdown table report of scenario results.
#[instrument(skip_all, level = "trace")]
pub fn report_md<T: Testbed>(harness: &Harness<T>, matrix: &Matrix) -> Summary {
    run_report_table(harness, matrix, ASCII_MARKDOWN)
}

/// Generate a pretty table report of scenario results.
#[instrument(skip_all, level = "trace")]
pub fn report_pretty<T: Testbed>(harness: &Harness<T>, matrix: &Matrix) -> Summary {
    run_report_table(harness, matrix, UTF8_FULL)
}

fn run_report_table<T: Testbed>(harness: &Harness<T>, matrix: &Matrix, preset: &str) -> Summary {
    let reports = harness.run(matrix);
    let summary = Summary::from(reports.as_slice());
    println!("{}", make_table(&reports, preset));
    println!(
        "{} scenarios, {} passed, {} failed",
        summary.total, summary.passed, summary.failed
    );
    summary
}

fn make_table(reports: &[ScenarioReport], preset: &str) -> Table {
    let columns = vec![
        "Mode", "Error", "Method", "Expected", "Verdict", "Detail", "Time",
    ];
    let mut table = Table::new();
    table
        .load_preset(preset)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(columns);
    for report in reports {
        let scenario = &report.scenario;
        let (verdict, detail) = match &report.verdict {
            Verdict::Pass => ("pass", String::new()),
            Verdict::Fail(failure) => ("FAIL", failure.to_string()),
        };
        table.add_row(vec![
            scenario.mode.to_string(),
            scenario.kind.to_string(),
            scenario.method.to_string(),
            scenario.expected.to_string(),
            verdict.to_string(),
            detail,
            format!("{:.1}ms", report.elapsed.as_secs_f64() * 1000.0),
        ]);
    }
    table
}
