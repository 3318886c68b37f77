use crate::dut::{CallContext, CallResult, Dut};
use crate::error::Result;
use crate::types::{Port, SocketHandle, TransportProtocol};
use nix::errno::Errno;
use std::net::SocketAddrV4;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// A socket created by a [`DutSession`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct DutSocket {
    pub handle: SocketHandle,
    pub port: Port,
}

/// The DUT sockets of one scenario.
///
/// Every socket created through the session is closed when the session is dropped, whatever
/// state the scenario ended in.
pub struct DutSession<'a, D: Dut> {
    dut: &'a D,
    open: Vec<SocketHandle>,
    teardown_timeout: Duration,
}

impl<'a, D: Dut> DutSession<'a, D> {
    #[must_use]
    pub const fn new(dut: &'a D, teardown_timeout: Duration) -> Self {
        Self {
            dut,
            open: Vec::new(),
            teardown_timeout,
        }
    }

    /// Create a UDP socket bound to `local`.
    pub fn create_bound_socket(
        &mut self,
        local: SocketAddrV4,
        ctx: &CallContext,
    ) -> Result<DutSocket> {
        let (handle, port) = self
            .dut
            .create_bound_socket(TransportProtocol::Udp, local, ctx)?;
        self.open.push(handle);
        Ok(DutSocket { handle, port })
    }

    #[instrument(skip(self, ctx), level = "trace")]
    pub fn connect(
        &self,
        socket: DutSocket,
        peer: SocketAddrV4,
        ctx: &CallContext,
    ) -> CallResult<()> {
        self.dut.connect(socket.handle, peer, ctx)
    }

    #[instrument(skip(self, payload, ctx), level = "trace")]
    pub fn send_to(
        &self,
        socket: DutSocket,
        payload: &[u8],
        dest: SocketAddrV4,
        ctx: &CallContext,
    ) -> CallResult<usize> {
        let result = self.dut.send_to(socket.handle, payload, dest, ctx);
        tracing::debug!(handle = %socket.handle, %dest, ?result, "send_to");
        result
    }

    pub fn recv(&self, socket: DutSocket, max_len: usize, ctx: &CallContext) -> CallResult<Vec<u8>> {
        let result = self.dut.recv(socket.handle, max_len, ctx);
        tracing::debug!(handle = %socket.handle, ?result, "recv");
        result
    }

    pub fn socket_error(&self, socket: DutSocket, ctx: &CallContext) -> CallResult<Option<Errno>> {
        let result = self.dut.socket_error(socket.handle, ctx);
        tracing::debug!(handle = %socket.handle, ?result, "socket_error");
        result
    }

    /// Close a socket; closing it again is a no-op.
    pub fn close(&mut self, socket: DutSocket, ctx: &CallContext) -> CallResult<()> {
        let Some(index) = self.open.iter().position(|h| *h == socket.handle) else {
            return CallResult::Ok(());
        };
        self.open.swap_remove(index);
        self.dut.close(socket.handle, ctx)
    }

    /// Close every socket still open, logging rather than returning failures.
    pub fn close_all(&mut self) {
        let ctx = CallContext::new(CancellationToken::new()).with_timeout(self.teardown_timeout);
        for handle in self.open.drain(..) {
            match self.dut.close(handle, &ctx) {
                CallResult::Ok(()) => tracing::trace!(%handle, "closed"),
                result => tracing::warn!(%handle, ?result, "failed to close DUT socket"),
            }
        }
    }
}

impl<D: Dut> Drop for DutSession<'_, D> {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dut::MockDut;
    use mockall::predicate::eq;
    use mockall::Sequence;
    use std::net::Ipv4Addr;

    const LOCAL: SocketAddrV4 = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 0);

    fn ctx() -> CallContext {
        CallContext::new(CancellationToken::new())
    }

    #[test]
    fn test_drop_closes_open_sockets() -> anyhow::Result<()> {
        let mut dut = MockDut::new();
        let mut seq = Sequence::new();
        dut.expect_create_bound_socket()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok((SocketHandle(7), Port(4000))));
        dut.expect_create_bound_socket()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok((SocketHandle(8), Port(4001))));
        dut.expect_close()
            .with(eq(SocketHandle(7)), mockall::predicate::always())
            .times(1)
            .returning(|_, _| CallResult::Ok(()));
        dut.expect_close()
            .with(eq(SocketHandle(8)), mockall::predicate::always())
            .times(1)
            .returning(|_, _| CallResult::Ok(()));
        {
            let mut session = DutSession::new(&dut, Duration::from_secs(1));
            let first = session.create_bound_socket(LOCAL, &ctx())?;
            let second = session.create_bound_socket(LOCAL, &ctx())?;
            assert_eq!(Port(4000), first.port);
            assert_eq!(Port(4001), second.port);
        }
        dut.checkpoint();
        Ok(())
    }

    #[test]
    fn test_close_is_idempotent() -> anyhow::Result<()> {
        let mut dut = MockDut::new();
        dut.expect_create_bound_socket()
            .returning(|_, _, _| Ok((SocketHandle(1), Port(4000))));
        dut.expect_close()
            .times(1)
            .returning(|_, _| CallResult::Ok(()));
        let mut session = DutSession::new(&dut, Duration::from_secs(1));
        let socket = session.create_bound_socket(LOCAL, &ctx())?;
        assert_eq!(CallResult::Ok(()), session.close(socket, &ctx()));
        assert_eq!(CallResult::Ok(()), session.close(socket, &ctx()));
        drop(session);
        Ok(())
    }

    #[test]
    fn test_close_failure_does_not_panic_on_drop() -> anyhow::Result<()> {
        let mut dut = MockDut::new();
        dut.expect_create_bound_socket()
            .returning(|_, _, _| Ok((SocketHandle(1), Port(4000))));
        dut.expect_close()
            .times(1)
            .returning(|_, _| CallResult::Errno(Errno::EIO));
        let mut session = DutSession::new(&dut, Duration::from_secs(1));
        session.create_bound_socket(LOCAL, &ctx())?;
        drop(session);
        Ok(())
    }

    #[test]
    fn test_errno_is_returned_as_data() -> anyhow::Result<()> {
        let mut dut = MockDut::new();
        dut.expect_create_bound_socket()
            .returning(|_, _, _| Ok((SocketHandle(1), Port(4000))));
        dut.expect_recv()
            .times(1)
            .returning(|_, _, _| CallResult::Errno(Errno::ECONNREFUSED));
        dut.expect_close().returning(|_, _| CallResult::Ok(()));
        let mut session = DutSession::new(&dut, Duration::from_secs(1));
        let socket = session.create_bound_socket(LOCAL, &ctx())?;
        assert_eq!(
            CallResult::Errno(Errno::ECONNREFUSED),
            session.recv(socket, 100, &ctx())
        );
        Ok(())
    }
}
