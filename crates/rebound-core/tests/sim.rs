#![cfg(all(feature = "sim-tests", any(target_os = "linux", target_os = "macos")))]
#![allow(clippy::needless_pass_by_value)]

use rebound_core::{Builder, DetectionMethod, Harness, LocalTestbed, Matrix, Verdict};
use std::sync::{Mutex, OnceLock};
use test_case::test_case;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

/// The maximum number of attempts for each scenario group.
const MAX_ATTEMPTS: usize = 3;

static HARNESS: OnceLock<Mutex<Harness<LocalTestbed>>> = OnceLock::new();

/// The tun device can only be created once per process, so every test shares one harness.
fn harness() -> &'static Mutex<Harness<LocalTestbed>> {
    HARNESS.get_or_init(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::NONE)
            .with_env_filter("sim=debug,rebound_core=info")
            .init();
        let config = Builder::new().build().unwrap();
        let testbed = LocalTestbed::start(&config).unwrap();
        Mutex::new(Harness::new(testbed, config))
    })
}

#[test_case(DetectionMethod::ReceivePath)]
#[test_case(DetectionMethod::SendPath)]
#[test_case(DetectionMethod::SendPathOnUnaffectedPeer)]
#[test_case(DetectionMethod::SocketOptionPath)]
fn test_host_stack(method: DetectionMethod) -> anyhow::Result<()> {
    if !rebound_privilege::Privilege::acquire_privileges()?.has_privileges() {
        warn!("skipping {}: insufficient privileges", method);
        return Ok(());
    }
    let harness = harness().lock().unwrap();
    let matrix = Matrix::all().with_method(method)?;
    assert_eq!(4, matrix.len());
    for attempt in 1..=MAX_ATTEMPTS {
        info!("start running {} [attempt #{}]", method, attempt);
        let failed = harness
            .run(&matrix)
            .into_iter()
            .filter_map(|report| match report.verdict {
                Verdict::Pass => None,
                Verdict::Fail(failure) => Some(format!("{}: {failure}", report.scenario)),
            })
            .collect::<Vec<_>>();
        if failed.is_empty() {
            info!("end running {} [attempt #{}]", method, attempt);
            return Ok(());
        }
        error!("failed running {} {:?} [attempt #{}]", method, failed, attempt);
    }
    anyhow::bail!("failed running {method} after {MAX_ATTEMPTS} attempts")
}
