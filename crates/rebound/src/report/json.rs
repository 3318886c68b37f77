use crate::report::types::{Report, Summary};
use rebound_core::{Harness, Matrix, Testbed};
use tracing::instrument;

/// Generate a json report of scenario results.
#[instrument(skip_all, level = "trace")]
pub fn report<T: Testbed>(harness: &Harness<T>, matrix: &Matrix) -> anyhow::Result<Summary> {
    let reports = harness.run(matrix);
    let report = Report::new(harness.config(), &reports);
    serde_json::to_writer_pretty(std::io::stdout(), &report)?;
    println!();
    Ok(report.summary)
}

#[cfg(test)]
mod tests {
    use crate::report::types::Report;
    use pretty_assertions::assert_eq;
    use rebound_core::{
        Builder, ConnectionMode, DetectionMethod, Failure, IcmpErrorKind, Scenario,
        ScenarioReport, Verdict,
    };
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_json_report() -> anyhow::Result<()> {
        let config = Builder::new().build()?;
        let reports = vec![
            ScenarioReport {
                scenario: Scenario::new(
                    ConnectionMode::Connectionless,
                    IcmpErrorKind::PortUnreachable,
                    DetectionMethod::SocketOptionPath,
                ),
                verdict: Verdict::Pass,
                elapsed: Duration::from_micros(2500),
            },
            ScenarioReport {
                scenario: Scenario::new(
                    ConnectionMode::Connected,
                    IcmpErrorKind::TimeToLiveExceeded,
                    DetectionMethod::ReceivePath,
                ),
                verdict: Verdict::Fail(Failure::Setup(String::from("peer network closed"))),
                elapsed: Duration::from_millis(3),
            },
        ];
        let value = serde_json::to_value(Report::new(&config, &reports))?;
        let expected = json!({
            "info": {
                "tun_network": "10.0.0.0/24",
                "dut_addr": "10.0.0.1",
                "peer_addr": "10.0.0.2"
            },
            "scenarios": [
                {
                    "name": "Connectionless/PortUnreachable/SocketOptionPath",
                    "mode": "Connectionless",
                    "kind": "PortUnreachable",
                    "method": "SocketOptionPath",
                    "expected": "no error",
                    "verdict": "pass",
                    "failure": null,
                    "elapsed_ms": "2.50"
                },
                {
                    "name": "Connected/TimeToLiveExceeded/ReceivePath",
                    "mode": "Connected",
                    "kind": "TimeToLiveExceeded",
                    "method": "ReceivePath",
                    "expected": "no error",
                    "verdict": "fail",
                    "failure": "setup failed: peer network closed",
                    "elapsed_ms": "3.00"
                }
            ],
            "summary": {
                "total": 2,
                "passed": 1,
                "failed": 1
            }
        });
        assert_eq!(expected, value);
        Ok(())
    }
}
