use rebound_core::{HarnessConfig, ScenarioReport, Verdict};
use serde::{Serialize, Serializer};
use std::net::Ipv4Addr;

#[derive(Serialize)]
pub struct Report {
    pub info: Info,
    pub scenarios: Vec<ScenarioResult>,
    pub summary: Summary,
}

impl Report {
    pub fn new(config: &HarnessConfig, reports: &[ScenarioReport]) -> Self {
        Self {
            info: Info::from(config),
            scenarios: reports.iter().map(ScenarioResult::from).collect(),
            summary: Summary::from(reports),
        }
    }
}

#[derive(Serialize)]
pub struct Info {
    pub tun_network: String,
    pub dut_addr: Ipv4Addr,
    pub peer_addr: Ipv4Addr,
}

impl From<&HarnessConfig> for Info {
    fn from(value: &HarnessConfig) -> Self {
        Self {
            tun_network: value.tun_network.to_string(),
            dut_addr: value.dut_addr,
            peer_addr: value.peer_addr,
        }
    }
}

#[derive(Serialize)]
pub struct ScenarioResult {
    pub name: String,
    pub mode: String,
    pub kind: String,
    pub method: String,
    pub expected: String,
    pub verdict: &'static str,
    pub failure: Option<String>,
    #[serde(serialize_with = "fixed_width")]
    pub elapsed_ms: f64,
}

impl From<&ScenarioReport> for ScenarioResult {
    fn from(value: &ScenarioReport) -> Self {
        let scenario = &value.scenario;
        let (verdict, failure) = match &value.verdict {
            Verdict::Pass => ("pass", None),
            Verdict::Fail(failure) => ("fail", Some(failure.to_string())),
        };
        Self {
            name: scenario.name(),
            mode: scenario.mode.to_string(),
            kind: scenario.kind.to_string(),
            method: scenario.method.to_string(),
            expected: scenario.expected.to_string(),
            verdict,
            failure,
            elapsed_ms: value.elapsed.as_secs_f64() * 1000.0,
        }
    }
}

#[derive(Serialize, Debug, Eq, PartialEq)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl Summary {
    pub const fn is_pass(&self) -> bool {
        self.failed == 0
    }
}

impl From<&[ScenarioReport]> for Summary {
    fn from(value: &[ScenarioReport]) -> Self {
        let passed = value.iter().filter(|report| report.verdict.is_pass()).count();
        Self {
            total: value.len(),
            passed,
            failed: value.len() - passed,
        }
    }
}

#[expect(clippy::trivially_copy_pass_by_ref)]
pub fn fixed_width<S>(val: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{val:.2}"))
}
