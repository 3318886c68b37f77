use crate::dut::{CallContext, CallResult, Dut};
use crate::error::{IoError, IoOperation, IoResult, Result};
use crate::types::{Port, SocketHandle, TransportProtocol};
use indexmap::IndexMap;
use itertools::Itertools;
use nix::errno::Errno;
use nix::sys::select::FdSet;
use nix::sys::time::{TimeVal, TimeValLike};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Type};
use std::io;
use std::io::Read;
use std::net::{SocketAddr, SocketAddrV4};
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// How long a blocked call waits on the socket before re-checking its context.
const POLL_SLICE: Duration = Duration::from_millis(10);

/// A DUT backed by the host's own network stack.
///
/// Sockets are non-blocking; blocking calls are emulated by waiting for readiness in short
/// slices so that deadlines and cancellation are honoured.
#[derive(Debug, Default)]
pub struct LocalDut {
    sockets: Mutex<IndexMap<SocketHandle, Arc<socket2::Socket>>>,
    next_handle: AtomicU32,
}

#[derive(Debug, Clone, Copy)]
enum Interest {
    Read,
    Write,
}

impl LocalDut {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of sockets currently open.
    #[must_use]
    pub fn open_sockets(&self) -> usize {
        self.sockets.lock().len()
    }

    fn socket(&self, handle: SocketHandle) -> Option<Arc<socket2::Socket>> {
        self.sockets.lock().get(&handle).cloned()
    }

    fn new_udp_socket(local: SocketAddrV4) -> IoResult<socket2::Socket> {
        let socket = socket2::Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|err| IoError::Other(err, IoOperation::NewSocket))?;
        socket
            .set_nonblocking(true)
            .map_err(|err| IoError::Other(err, IoOperation::SetNonBlocking))?;
        let addr = SocketAddr::V4(local);
        socket
            .bind(&SockAddr::from(addr))
            .map_err(|err| IoError::Bind(err, addr))?;
        Ok(socket)
    }

    /// Retry `op` until it stops reporting `WouldBlock`, the context expires or it is cancelled.
    fn until_ready<T>(
        socket: &socket2::Socket,
        interest: Interest,
        ctx: &CallContext,
        mut op: impl FnMut(&socket2::Socket) -> io::Result<T>,
    ) -> CallResult<T> {
        loop {
            if ctx.is_cancelled() {
                return CallResult::Cancelled;
            }
            match op(socket) {
                Ok(val) => return CallResult::Ok(val),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(err) => return errno_result(&err),
            }
            let Some(wait) = ctx.next_wait(POLL_SLICE) else {
                return CallResult::TimedOut;
            };
            if let Err(err) = wait_for(socket, interest, wait) {
                tracing::warn!(%err, "readiness wait failed");
                return errno_result(&err);
            }
        }
    }
}

/// Wait up to `timeout` for `socket` to become ready, returning whether it did.
fn wait_for(socket: &socket2::Socket, interest: Interest, timeout: Duration) -> io::Result<bool> {
    let mut fds = FdSet::new();
    fds.insert(socket.as_fd());
    let millis = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
    let mut timeout = TimeVal::milliseconds(millis);
    let ready = match interest {
        Interest::Read => {
            nix::sys::select::select(None, Some(&mut fds), None, None, Some(&mut timeout))
        }
        Interest::Write => {
            nix::sys::select::select(None, None, Some(&mut fds), None, Some(&mut timeout))
        }
    };
    match ready {
        Ok(ready) => Ok(ready == 1),
        Err(Errno::EINTR) => Ok(false),
        Err(err) => Err(io::Error::from(err)),
    }
}

fn errno_result<T>(err: &io::Error) -> CallResult<T> {
    CallResult::Errno(err.raw_os_error().map_or(Errno::UnknownErrno, Errno::from_raw))
}

impl Dut for LocalDut {
    #[instrument(skip(self, _ctx), level = "trace")]
    fn create_bound_socket(
        &self,
        protocol: TransportProtocol,
        local: SocketAddrV4,
        _ctx: &CallContext,
    ) -> Result<(SocketHandle, Port)> {
        let socket = match protocol {
            TransportProtocol::Udp => Self::new_udp_socket(local)?,
        };
        let port = socket
            .local_addr()
            .map_err(|err| IoError::Other(err, IoOperation::LocalAddr))?
            .as_socket()
            .map(|addr| Port(addr.port()))
            .ok_or_else(|| {
                IoError::Other(
                    io::Error::from(io::ErrorKind::AddrNotAvailable),
                    IoOperation::LocalAddr,
                )
            })?;
        let handle = SocketHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.sockets.lock().insert(handle, Arc::new(socket));
        tracing::debug!(%handle, port = port.0, "socket created");
        Ok((handle, port))
    }

    #[instrument(skip(self, ctx), level = "trace")]
    fn connect(
        &self,
        handle: SocketHandle,
        peer: SocketAddrV4,
        ctx: &CallContext,
    ) -> CallResult<()> {
        let Some(socket) = self.socket(handle) else {
            return CallResult::Errno(Errno::EBADF);
        };
        if ctx.is_cancelled() {
            return CallResult::Cancelled;
        }
        match socket.connect(&SockAddr::from(SocketAddr::V4(peer))) {
            Ok(()) => CallResult::Ok(()),
            Err(err) => errno_result(&err),
        }
    }

    #[instrument(skip(self, payload, ctx), level = "trace")]
    fn send_to(
        &self,
        handle: SocketHandle,
        payload: &[u8],
        dest: SocketAddrV4,
        ctx: &CallContext,
    ) -> CallResult<usize> {
        let Some(socket) = self.socket(handle) else {
            return CallResult::Errno(Errno::EBADF);
        };
        tracing::trace!(
            payload = format!("{:02x}", payload.iter().format(" ")),
            %dest
        );
        let addr = SockAddr::from(SocketAddr::V4(dest));
        Self::until_ready(&socket, Interest::Write, ctx, |s| s.send_to(payload, &addr))
    }

    #[instrument(skip(self, ctx), level = "trace")]
    fn recv(&self, handle: SocketHandle, max_len: usize, ctx: &CallContext) -> CallResult<Vec<u8>> {
        let Some(socket) = self.socket(handle) else {
            return CallResult::Errno(Errno::EBADF);
        };
        let mut buf = vec![0_u8; max_len];
        let result = Self::until_ready(&socket, Interest::Read, ctx, |mut s| s.read(&mut buf));
        result.map(|bytes_read| {
            buf.truncate(bytes_read);
            tracing::trace!(buf = format!("{:02x}", buf.iter().format(" ")));
            buf
        })
    }

    #[instrument(skip(self, ctx), ret, level = "trace")]
    fn socket_error(&self, handle: SocketHandle, ctx: &CallContext) -> CallResult<Option<Errno>> {
        let Some(socket) = self.socket(handle) else {
            return CallResult::Errno(Errno::EBADF);
        };
        if ctx.is_cancelled() {
            return CallResult::Cancelled;
        }
        match socket.take_error() {
            Ok(pending) => CallResult::Ok(pending.map(|err| {
                err.raw_os_error()
                    .map_or(Errno::UnknownErrno, Errno::from_raw)
            })),
            Err(err) => errno_result(&err),
        }
    }

    #[instrument(skip(self, _ctx), level = "trace")]
    fn close(&self, handle: SocketHandle, _ctx: &CallContext) -> CallResult<()> {
        if self.sockets.lock().shift_remove(&handle).is_some() {
            tracing::debug!(%handle, "socket closed");
        }
        CallResult::Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio_util::sync::CancellationToken;

    fn loopback() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)
    }

    fn ctx() -> CallContext {
        CallContext::new(CancellationToken::new()).with_timeout(Duration::from_secs(1))
    }

    #[test]
    fn test_send_and_recv_over_loopback() -> anyhow::Result<()> {
        let dut = LocalDut::new();
        let (a, _) = dut.create_bound_socket(TransportProtocol::Udp, loopback(), &ctx())?;
        let (b, b_port) = dut.create_bound_socket(TransportProtocol::Udp, loopback(), &ctx())?;
        let dest = SocketAddrV4::new(Ipv4Addr::LOCALHOST, b_port.0);
        assert_eq!(CallResult::Ok(3), dut.send_to(a, b"abc", dest, &ctx()));
        assert_eq!(CallResult::Ok(b"abc".to_vec()), dut.recv(b, 100, &ctx()));
        assert_eq!(CallResult::Ok(None), dut.socket_error(b, &ctx()));
        Ok(())
    }

    #[test]
    fn test_recv_times_out() -> anyhow::Result<()> {
        let dut = LocalDut::new();
        let (handle, _) = dut.create_bound_socket(TransportProtocol::Udp, loopback(), &ctx())?;
        let ctx = CallContext::new(CancellationToken::new()).with_timeout(Duration::from_millis(30));
        assert_eq!(CallResult::TimedOut, dut.recv(handle, 100, &ctx));
        Ok(())
    }

    #[test]
    fn test_recv_cancelled() -> anyhow::Result<()> {
        let dut = LocalDut::new();
        let (handle, _) = dut.create_bound_socket(TransportProtocol::Udp, loopback(), &ctx())?;
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(
            CallResult::Cancelled,
            dut.recv(handle, 100, &CallContext::new(token))
        );
        Ok(())
    }

    #[test]
    fn test_connected_port_unreachable_is_reported_once() -> anyhow::Result<()> {
        let dut = LocalDut::new();
        let (handle, _) = dut.create_bound_socket(TransportProtocol::Udp, loopback(), &ctx())?;
        let (closed, closed_port) =
            dut.create_bound_socket(TransportProtocol::Udp, loopback(), &ctx())?;
        assert_eq!(CallResult::Ok(()), dut.close(closed, &ctx()));
        let peer = SocketAddrV4::new(Ipv4Addr::LOCALHOST, closed_port.0);
        assert_eq!(CallResult::Ok(()), dut.connect(handle, peer, &ctx()));
        assert_eq!(CallResult::Ok(0), dut.send_to(handle, &[], peer, &ctx()));
        let recv_ctx =
            CallContext::new(CancellationToken::new()).with_timeout(Duration::from_millis(200));
        assert_eq!(
            CallResult::Errno(Errno::ECONNREFUSED),
            dut.recv(handle, 100, &recv_ctx)
        );
        assert_eq!(CallResult::Ok(None), dut.socket_error(handle, &ctx()));
        Ok(())
    }

    #[test]
    fn test_close_is_idempotent() -> anyhow::Result<()> {
        let dut = LocalDut::new();
        let (handle, _) = dut.create_bound_socket(TransportProtocol::Udp, loopback(), &ctx())?;
        assert_eq!(1, dut.open_sockets());
        assert_eq!(CallResult::Ok(()), dut.close(handle, &ctx()));
        assert_eq!(CallResult::Ok(()), dut.close(handle, &ctx()));
        assert_eq!(0, dut.open_sockets());
        Ok(())
    }

    #[test]
    fn test_unknown_handle() {
        let dut = LocalDut::new();
        assert_eq!(
            CallResult::Errno(Errno::EBADF),
            dut.recv(SocketHandle(42), 100, &ctx())
        );
    }
}
