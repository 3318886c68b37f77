use crate::config::{LogFormat, LogSpanEvents, ReboundConfig, ReportMode};
use crate::report;
use rebound_core::{Harness, LocalTestbed};
use tracing_subscriber::fmt::format::FmtSpan;

/// Run the selected scenarios and report the results.
///
/// Returns `true` if every scenario passed.
pub fn run_rebound(cfg: &ReboundConfig) -> anyhow::Result<bool> {
    configure_logging(cfg);
    let testbed = LocalTestbed::start(&cfg.harness)?;
    let harness = Harness::new(testbed, cfg.harness.clone());
    let summary = match cfg.mode {
        ReportMode::Pretty => report::table::report_pretty(&harness, &cfg.matrix),
        ReportMode::Markdown => report::table::report_md(&harness, &cfg.matrix),
        ReportMode::Json => report::json::report(&harness, &cfg.matrix)?,
        ReportMode::Stream => report::stream::report(&harness, &cfg.matrix),
    };
    Ok(summary.is_pass())
}

fn configure_logging(cfg: &ReboundConfig) {
    if cfg.verbose {
        let fmt_span = match cfg.log_span_events {
            LogSpanEvents::Off => FmtSpan::NONE,
            LogSpanEvents::Active => FmtSpan::ACTIVE,
            LogSpanEvents::Full => FmtSpan::FULL,
        };
        match cfg.log_format {
            LogFormat::Compact => {
                tracing_subscriber::fmt()
                    .with_span_events(fmt_span)
                    .with_env_filter(&cfg.log_filter)
                    .with_writer(std::io::stderr)
                    .compact()
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::fmt()
                    .with_span_events(fmt_span)
                    .with_env_filter(&cfg.log_filter)
                    .with_writer(std::io::stderr)
                    .pretty()
                    .init();
            }
            LogFormat::Json => {
                tracing_subscriber::fmt()
                    .with_span_events(fmt_span)
                    .with_env_filter(&cfg.log_filter)
                    .with_writer(std::io::stderr)
                    .json()
                    .init();
            }
        }
    }
}
