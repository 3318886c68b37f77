use crate::config::HarnessConfig;
use crate::dut::{CallContext, DutSession, DutSocket};
use crate::outcome::{check, Failure, Observed, Step};
use crate::peer::{Link, PeerConnection, UdpFields};
use crate::runner::Testbed;
use crate::types::{DetectionMethod, ExpectedOutcome};
use std::net::SocketAddrV4;
use std::time::Duration;
use tracing::instrument;

/// The state a detection procedure observes a pending ICMP error through.
///
/// `target` is the socket whose datagram drew the ICMP error and `clean` a second socket on the
/// same DUT that must stay unaffected by it. Both are reachable from `conn`.
pub struct Detection<'a, T: Testbed> {
    pub testbed: &'a T,
    pub config: &'a HarnessConfig,
    pub session: &'a DutSession<'a, T::Dut>,
    pub conn: &'a mut PeerConnection<T::Link>,
    pub target: DutSocket,
    pub clean: DutSocket,
    pub expected: ExpectedOutcome,
    pub ctx: &'a CallContext,
}

impl<T: Testbed> Detection<'_, T> {
    /// Run the procedure for `method`.
    pub fn run(&mut self, method: DetectionMethod) -> Result<(), Failure> {
        tracing::debug!(%method, expected = %self.expected, "detecting");
        match method {
            DetectionMethod::ReceivePath => self.receive_path(),
            DetectionMethod::SendPath => self.send_path(),
            DetectionMethod::SendPathOnUnaffectedPeer => self.send_path_on_unaffected_peer(),
            DetectionMethod::SocketOptionPath => self.socket_option_path(),
        }
    }

    /// The pending error surfaces on the first receive and is then gone.
    #[instrument(skip(self), level = "trace")]
    fn receive_path(&mut self) -> Result<(), Failure> {
        let max_len = self.config.max_recv_len;
        self.conn.send(&UdpFields::dst_port(self.clean.port.0))?;
        let clean = self.session.recv(self.clean, max_len, &self.bounded());
        check(Step::CleanRecv, ExpectedOutcome::NoError, Observed::from(&clean))?;

        self.conn.send(&UdpFields::default())?;
        let first = self.session.recv(self.target, max_len, &self.bounded());
        check(Step::FirstRecv, self.expected, Observed::from(&first))?;
        if self.expected.is_error() {
            let second = self.session.recv(self.target, max_len, self.ctx);
            check(Step::SecondRecv, ExpectedOutcome::NoError, Observed::from(&second))?;
        }
        Ok(())
    }

    /// The pending error surfaces on the first send, which is not transmitted.
    #[instrument(skip(self), level = "trace")]
    fn send_path(&mut self) -> Result<(), Failure> {
        self.clean_send()?;
        let dest = self.conn.local_addr();
        let first = self.session.send_to(self.target, &self.config.payload, dest, &self.bounded());
        check(Step::FirstSend, self.expected, Observed::from(&first))?;
        let step = if self.expected.is_error() {
            let second =
                self.session
                    .send_to(self.target, &self.config.payload, dest, &self.bounded());
            check(Step::SecondSend, ExpectedOutcome::NoError, Observed::from(&second))?;
            Step::SecondSend
        } else {
            Step::FirstSend
        };
        expect_observed(self.conn, &UdpFields::default(), step, self.config.expect_timeout)
    }

    /// Traffic from the DUT to a peer that took no part in the erroring flow is unaffected.
    ///
    /// The clean socket is the sender, as a pending error is held per socket.
    #[instrument(skip(self), level = "trace")]
    fn send_path_on_unaffected_peer(&mut self) -> Result<(), Failure> {
        self.clean_send()?;
        let remote = SocketAddrV4::new(self.testbed.dut_addr(), self.clean.port.0);
        let mut peer = PeerConnection::new(self.testbed.peer_link()?, remote, &self.config.payload);
        let dest = peer.local_addr();
        let sent = self.session.send_to(self.clean, &self.config.payload, dest, &self.bounded());
        check(Step::UnaffectedSend, ExpectedOutcome::NoError, Observed::from(&sent))?;
        expect_observed(
            &mut peer,
            &UdpFields::default(),
            Step::UnaffectedSend,
            self.config.expect_timeout,
        )
    }

    /// `SO_ERROR` reports the pending error once and clears it.
    #[instrument(skip(self), level = "trace")]
    fn socket_option_path(&mut self) -> Result<(), Failure> {
        let clean = self.session.socket_error(self.clean, &self.bounded());
        check(
            Step::CleanSocketOption,
            ExpectedOutcome::NoError,
            Observed::from_socket_error(&clean),
        )?;
        let first = self.session.socket_error(self.target, &self.bounded());
        check(
            Step::TargetSocketOption,
            self.expected,
            Observed::from_socket_error(&first),
        )?;
        let second = self.session.socket_error(self.target, &self.bounded());
        check(
            Step::SecondSocketOption,
            ExpectedOutcome::NoError,
            Observed::from_socket_error(&second),
        )?;
        let dest = self.conn.local_addr();
        let sent = self.session.send_to(self.target, &self.config.payload, dest, &self.bounded());
        check(
            Step::SendAfterSocketOption,
            ExpectedOutcome::NoError,
            Observed::from(&sent),
        )?;
        expect_observed(
            self.conn,
            &UdpFields::default(),
            Step::SendAfterSocketOption,
            self.config.expect_timeout,
        )
    }

    /// A send on the clean socket reaches the peer.
    fn clean_send(&mut self) -> Result<(), Failure> {
        let dest = self.conn.local_addr();
        let sent = self.session.send_to(self.clean, &self.config.payload, dest, &self.bounded());
        check(Step::CleanSend, ExpectedOutcome::NoError, Observed::from(&sent))?;
        expect_observed(
            self.conn,
            &UdpFields::src_port(self.clean.port.0),
            Step::CleanSend,
            self.config.expect_timeout,
        )
    }

    fn bounded(&self) -> CallContext {
        self.ctx.with_timeout(self.config.call_timeout)
    }
}

fn expect_observed<L: Link>(
    conn: &mut PeerConnection<L>,
    fields: &UdpFields,
    step: Step,
    timeout: Duration,
) -> Result<(), Failure> {
    match conn.expect(fields, timeout)? {
        Some(_) => Ok(()),
        None => Err(Failure::NotObserved { step, timeout }),
    }
}
