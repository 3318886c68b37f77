use crate::config::HarnessConfig;
use crate::dut::{CallContext, CallResult, Dut, DutSession, DutSocket};
use crate::error::Result;
use crate::matrix::{Matrix, Scenario};
use crate::outcome::{Failure, Observed, ScenarioReport, Verdict};
use crate::peer::{Link, PeerConnection, UdpFields};
use crate::strategy::Detection;
use crate::types::ConnectionMode;
use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::Mutex;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// The DUT and peer network a harness runs against.
pub trait Testbed: Sync {
    type Dut: Dut + Sync;
    type Link: Link;

    fn dut(&self) -> &Self::Dut;

    /// The address DUT sockets bind to and peers send to.
    fn dut_addr(&self) -> Ipv4Addr;

    /// A new peer endpoint, unique among live endpoints.
    fn peer_link(&self) -> Result<Self::Link>;
}

/// A testbed where the host kernel is the DUT and peers live behind a tun device.
#[cfg(any(target_os = "macos", target_os = "linux"))]
pub struct LocalTestbed {
    dut: crate::dut::LocalDut,
    network: crate::net::tun::TunNetwork,
    dut_addr: Ipv4Addr,
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
impl LocalTestbed {
    /// Create the tun device described by `config`.
    ///
    /// Requires the privilege to create and configure network devices.
    pub fn start(config: &HarnessConfig) -> Result<Self> {
        Ok(Self {
            dut: crate::dut::LocalDut::new(),
            network: crate::net::tun::TunNetwork::start(config)?,
            dut_addr: config.dut_addr,
        })
    }
}

#[cfg(any(target_os = "macos", target_os = "linux"))]
impl Testbed for LocalTestbed {
    type Dut = crate::dut::LocalDut;
    type Link = crate::net::tun::TunLink;

    fn dut(&self) -> &Self::Dut {
        &self.dut
    }

    fn dut_addr(&self) -> Ipv4Addr {
        self.dut_addr
    }

    fn peer_link(&self) -> Result<Self::Link> {
        Ok(self.network.link())
    }
}

/// Runs scenarios against a [`Testbed`].
pub struct Harness<T: Testbed> {
    testbed: T,
    config: HarnessConfig,
}

impl<T: Testbed> Harness<T> {
    #[must_use]
    pub const fn new(testbed: T, config: HarnessConfig) -> Self {
        Self { testbed, config }
    }

    #[must_use]
    pub const fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run every scenario in `matrix`, returning the reports in matrix order.
    pub fn run(&self, matrix: &Matrix) -> Vec<ScenarioReport> {
        self.run_with(matrix, |_| ())
    }

    /// Run every scenario in `matrix`, calling `on_report` as each one completes.
    ///
    /// Scenarios run on up to `parallelism` threads. The returned reports are in matrix order
    /// whatever order they completed in.
    pub fn run_with<F>(&self, matrix: &Matrix, on_report: F) -> Vec<ScenarioReport>
    where
        F: Fn(&ScenarioReport) + Sync,
    {
        let workers = self.config.parallelism.get().min(matrix.len());
        tracing::info!(scenarios = matrix.len(), workers, "running scenarios");
        if workers <= 1 {
            return matrix
                .scenarios()
                .iter()
                .map(|scenario| {
                    let report = self.run_scenario(scenario);
                    on_report(&report);
                    report
                })
                .collect();
        }
        let (work_tx, work_rx) = channel::unbounded();
        for job in matrix.scenarios().iter().enumerate() {
            // the receiver outlives this loop
            let _ = work_tx.send(job);
        }
        drop(work_tx);
        let reports = Mutex::new(vec![None; matrix.len()]);
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    for (index, scenario) in work_rx.iter() {
                        let report = self.run_scenario(scenario);
                        on_report(&report);
                        reports.lock()[index] = Some(report);
                    }
                });
            }
        });
        reports.into_inner().into_iter().flatten().collect()
    }

    /// Run one scenario from bring-up to teardown.
    pub fn run_scenario(&self, scenario: &Scenario) -> ScenarioReport {
        tracing::info!(%scenario, expected = %scenario.expected, "scenario started");
        let start = Instant::now();
        let cancel = CancellationToken::new();
        let ctx = CallContext::new(cancel.clone());
        let verdict = with_deadline(&cancel, self.config.scenario_timeout, || {
            Verdict::from(self.execute(scenario, &ctx))
        });
        let elapsed = start.elapsed();
        match &verdict {
            Verdict::Pass => tracing::info!(%scenario, ?elapsed, "scenario passed"),
            Verdict::Fail(failure) => {
                tracing::info!(%scenario, ?elapsed, %failure, "scenario failed");
            }
        }
        ScenarioReport {
            scenario: scenario.clone(),
            verdict,
            elapsed,
        }
    }

    fn execute(
        &self,
        scenario: &Scenario,
        ctx: &CallContext,
    ) -> std::result::Result<(), Failure> {
        let config = &self.config;
        let dut_addr = self.testbed.dut_addr();
        let local = SocketAddrV4::new(dut_addr, 0);
        let mut session = DutSession::new(self.testbed.dut(), config.teardown_timeout);
        let target = session.create_bound_socket(local, ctx)?;
        let clean = session.create_bound_socket(local, ctx)?;
        let remote = SocketAddrV4::new(dut_addr, target.port.0);
        let mut conn = PeerConnection::new(self.testbed.peer_link()?, remote, &config.payload);
        let peer = conn.local_addr();
        tracing::debug!(
            target = %target.handle,
            target_port = target.port.0,
            clean = %clean.handle,
            clean_port = clean.port.0,
            %peer,
            "scenario bring-up"
        );

        if scenario.mode == ConnectionMode::Connected {
            for socket in [target, clean] {
                let connected =
                    session.connect(socket, peer, &ctx.with_timeout(config.call_timeout));
                setup_call("connect", socket, connected)?;
            }
        }
        let sent = session.send_to(
            target,
            &config.payload,
            peer,
            &ctx.with_timeout(config.call_timeout),
        );
        setup_call("send", target, sent)?;
        let captured = conn
            .expect(&UdpFields::default(), config.expect_timeout)?
            .ok_or_else(|| {
                Failure::Setup(format!(
                    "datagram from socket {} not observed by peer within {:?}",
                    target.handle, config.expect_timeout
                ))
            })?;
        conn.send_icmp_error(scenario.kind, &captured)?;
        std::thread::sleep(config.settle_delay);

        Detection {
            testbed: &self.testbed,
            config,
            session: &session,
            conn: &mut conn,
            target,
            clean,
            expected: scenario.expected,
            ctx,
        }
        .run(scenario.method)
    }
}

fn setup_call<T>(
    operation: &str,
    socket: DutSocket,
    result: CallResult<T>,
) -> std::result::Result<T, Failure> {
    match result {
        CallResult::Ok(val) => Ok(val),
        other => Err(Failure::Setup(format!(
            "{operation} on socket {} failed: {}",
            socket.handle,
            Observed::from(&other)
        ))),
    }
}

/// Run `f`, cancelling `cancel` if it has not returned within `timeout`.
fn with_deadline<R>(cancel: &CancellationToken, timeout: Duration, f: impl FnOnce() -> R) -> R {
    let (done_tx, done_rx) = channel::bounded::<()>(0);
    std::thread::scope(|scope| {
        scope.spawn(move || {
            if matches!(done_rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout)) {
                tracing::warn!(?timeout, "scenario deadline passed, cancelling");
                cancel.cancel();
            }
        });
        let result = f();
        drop(done_tx);
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::dut::MockDut;
    use crate::error::Error;
    use crate::net::ipv4;
    use crate::peer::MockLink;
    use crate::outcome::Step;
    use crate::types::{DetectionMethod, ExpectedOutcome, IcmpErrorKind, Port, SocketHandle};
    use mockall::Sequence;
    use nix::errno::Errno;
    use pretty_assertions::assert_eq;
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DUT_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const PEER: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 50000);
    const TARGET: SocketHandle = SocketHandle(1);
    const CLEAN: SocketHandle = SocketHandle(2);
    const TARGET_ADDR: SocketAddrV4 = SocketAddrV4::new(DUT_ADDR, 40000);

    struct FakeTestbed {
        dut: MockDut,
        links: Mutex<Vec<MockLink>>,
    }

    impl Testbed for FakeTestbed {
        type Dut = MockDut;
        type Link = MockLink;

        fn dut(&self) -> &MockDut {
            &self.dut
        }

        fn dut_addr(&self) -> Ipv4Addr {
            DUT_ADDR
        }

        fn peer_link(&self) -> Result<MockLink> {
            self.links.lock().pop().ok_or(Error::NetworkClosed)
        }
    }

    fn config() -> anyhow::Result<HarnessConfig> {
        Ok(Builder::new().settle_delay(Duration::ZERO).build()?)
    }

    fn from_target() -> Vec<u8> {
        ipv4::make_udp_packet(TARGET_ADDR, PEER, 0, ipv4::DEFAULT_TTL, &[]).unwrap()
    }

    fn expect_bring_up(dut: &mut MockDut, seq: &mut Sequence) {
        for (handle, port) in [(TARGET, 40000), (CLEAN, 40001)] {
            dut.expect_create_bound_socket()
                .withf(|_, local, _| *local == SocketAddrV4::new(DUT_ADDR, 0))
                .times(1)
                .in_sequence(seq)
                .returning(move |_, _, _| Ok((handle, Port(port))));
        }
    }

    fn expect_closed(dut: &mut MockDut) {
        dut.expect_close()
            .times(2)
            .returning(|_, _| CallResult::Ok(()));
    }

    #[test]
    fn test_run_scenario_connected_port_unreachable() -> anyhow::Result<()> {
        let mut seq = Sequence::new();
        let mut dut = MockDut::new();
        let mut link = MockLink::new();
        link.expect_local_addr().return_const(PEER);
        expect_bring_up(&mut dut, &mut seq);
        dut.expect_connect()
            .withf(|_, peer, _| *peer == PEER)
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _| CallResult::Ok(()));
        dut.expect_send_to()
            .withf(|handle, _, dest, _| *handle == TARGET && *dest == PEER)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| CallResult::Ok(0));
        link.expect_recv_packet()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(from_target())));
        link.expect_send_packet()
            .withf(|packet| packet[9] == 1 && packet[20] == 3 && packet[21] == 3)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        for (handle, pending) in [
            (CLEAN, None),
            (TARGET, Some(Errno::ECONNREFUSED)),
            (TARGET, None),
        ] {
            dut.expect_socket_error()
                .withf(move |h, _| *h == handle)
                .times(1)
                .in_sequence(&mut seq)
                .returning(move |_, _| CallResult::Ok(pending));
        }
        dut.expect_send_to()
            .withf(|handle, _, dest, _| *handle == TARGET && *dest == PEER)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| CallResult::Ok(0));
        link.expect_recv_packet()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Some(from_target())));
        expect_closed(&mut dut);
        let testbed = FakeTestbed {
            dut,
            links: Mutex::new(vec![link]),
        };
        let harness = Harness::new(testbed, config()?);
        let scenario = Scenario::new(
            ConnectionMode::Connected,
            IcmpErrorKind::PortUnreachable,
            DetectionMethod::SocketOptionPath,
        );
        let report = harness.run_scenario(&scenario);
        assert_eq!(Verdict::Pass, report.verdict);
        assert_eq!(scenario, report.scenario);
        Ok(())
    }

    #[test]
    fn test_run_scenario_datagram_not_observed() -> anyhow::Result<()> {
        let mut seq = Sequence::new();
        let mut dut = MockDut::new();
        let mut link = MockLink::new();
        link.expect_local_addr().return_const(PEER);
        expect_bring_up(&mut dut, &mut seq);
        dut.expect_send_to()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| CallResult::Ok(0));
        link.expect_recv_packet()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));
        expect_closed(&mut dut);
        let testbed = FakeTestbed {
            dut,
            links: Mutex::new(vec![link]),
        };
        let harness = Harness::new(testbed, config()?);
        let report = harness.run_scenario(&Scenario::new(
            ConnectionMode::Connectionless,
            IcmpErrorKind::TimeToLiveExceeded,
            DetectionMethod::ReceivePath,
        ));
        assert_eq!(
            Verdict::Fail(Failure::Setup(String::from(
                "datagram from socket #1 not observed by peer within 1s"
            ))),
            report.verdict
        );
        Ok(())
    }

    #[test]
    fn test_run_scenario_connect_refused() -> anyhow::Result<()> {
        let mut seq = Sequence::new();
        let mut dut = MockDut::new();
        let mut link = MockLink::new();
        link.expect_local_addr().return_const(PEER);
        expect_bring_up(&mut dut, &mut seq);
        dut.expect_connect()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| CallResult::Errno(Errno::ENETUNREACH));
        expect_closed(&mut dut);
        let testbed = FakeTestbed {
            dut,
            links: Mutex::new(vec![link]),
        };
        let harness = Harness::new(testbed, config()?);
        let report = harness.run_scenario(&Scenario::new(
            ConnectionMode::Connected,
            IcmpErrorKind::PortUnreachable,
            DetectionMethod::SendPath,
        ));
        assert_eq!(
            Verdict::Fail(Failure::Setup(format!(
                "connect on socket #1 failed: ENETUNREACH ({})",
                Errno::ENETUNREACH as i32
            ))),
            report.verdict
        );
        Ok(())
    }

    #[test]
    fn test_run_scenario_deadline_cancels_blocked_recv() -> anyhow::Result<()> {
        let mut seq = Sequence::new();
        let mut dut = MockDut::new();
        let mut link = MockLink::new();
        link.expect_local_addr().return_const(PEER);
        link.expect_send_packet().times(3).returning(|_| Ok(()));
        link.expect_recv_packet()
            .times(1)
            .returning(|_| Ok(Some(from_target())));
        expect_bring_up(&mut dut, &mut seq);
        dut.expect_connect()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _| CallResult::Ok(()));
        dut.expect_send_to()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _, _| CallResult::Ok(0));
        dut.expect_recv()
            .withf(|handle, _, _| *handle == CLEAN)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| CallResult::Ok(vec![]));
        dut.expect_recv()
            .withf(|handle, _, _| *handle == TARGET)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| CallResult::Errno(Errno::ECONNREFUSED));
        dut.expect_recv()
            .withf(|handle, _, ctx| *handle == TARGET && ctx.deadline().is_none())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, ctx: &CallContext| {
                let start = Instant::now();
                while !ctx.is_cancelled() {
                    if start.elapsed() > Duration::from_secs(5) {
                        return CallResult::TimedOut;
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                CallResult::Cancelled
            });
        dut.expect_close()
            .withf(|_, ctx| !ctx.is_cancelled())
            .times(2)
            .returning(|_, _| CallResult::Ok(()));
        let testbed = FakeTestbed {
            dut,
            links: Mutex::new(vec![link]),
        };
        let config = Builder::new()
            .settle_delay(Duration::ZERO)
            .call_timeout(Duration::from_millis(50))
            .scenario_timeout(Duration::from_millis(50))
            .build()?;
        let harness = Harness::new(testbed, config);
        let report = harness.run_scenario(&Scenario::new(
            ConnectionMode::Connected,
            IcmpErrorKind::PortUnreachable,
            DetectionMethod::ReceivePath,
        ));
        assert_eq!(
            Verdict::Fail(Failure::Mismatch {
                step: Step::SecondRecv,
                expected: ExpectedOutcome::NoError,
                observed: Observed::Cancelled,
            }),
            report.verdict
        );
        assert!(report.elapsed < Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn test_parallel_run_reports_in_matrix_order() -> anyhow::Result<()> {
        let mut dut = MockDut::new();
        dut.expect_create_bound_socket()
            .times(16)
            .returning(|_, _, _| Err(Error::NetworkClosed));
        let testbed = FakeTestbed {
            dut,
            links: Mutex::new(vec![]),
        };
        let config = Builder::new()
            .parallelism(NonZeroUsize::new(4).unwrap())
            .build()?;
        let harness = Harness::new(testbed, config);
        let matrix = Matrix::all();
        let completed = AtomicUsize::new(0);
        let reports = harness.run_with(&matrix, |_| {
            completed.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(16, completed.load(Ordering::Relaxed));
        assert_eq!(
            matrix.scenarios(),
            reports
                .iter()
                .map(|report| report.scenario.clone())
                .collect::<Vec<_>>()
        );
        for report in reports {
            assert_eq!(
                Verdict::Fail(Failure::Setup(String::from("peer network closed"))),
                report.verdict
            );
        }
        Ok(())
    }

    #[test]
    fn test_deadline_cancels() {
        let cancel = CancellationToken::new();
        let cancelled = with_deadline(&cancel, Duration::from_millis(10), || {
            let start = Instant::now();
            while !cancel.is_cancelled() && start.elapsed() < Duration::from_secs(5) {
                std::thread::sleep(Duration::from_millis(1));
            }
            cancel.is_cancelled()
        });
        assert!(cancelled);
    }

    #[test]
    fn test_deadline_not_reached() {
        let cancel = CancellationToken::new();
        let value = with_deadline(&cancel, Duration::from_secs(5), || 42);
        assert_eq!(42, value);
        assert!(!cancel.is_cancelled());
    }
}
