use crate::error::Result;
use crate::types::{Port, SocketHandle, TransportProtocol};
use nix::errno::Errno;
use std::net::SocketAddrV4;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

mod local;
mod session;

pub use local::LocalDut;
pub use session::{DutSession, DutSocket};

/// The deadline and cancellation state a DUT call runs under.
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl CallContext {
    /// A context bounded only by cancellation.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self {
            deadline: None,
            cancel,
        }
    }

    /// A context that also times out after `timeout`, sharing cancellation with `self`.
    ///
    /// A `timeout` too large to represent as an [`Instant`] adds no deadline.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = match (self.deadline, Instant::now().checked_add(timeout)) {
            (Some(outer), Some(inner)) => Some(outer.min(inner)),
            (outer, inner) => outer.or(inner),
        };
        Self {
            deadline,
            cancel: self.cancel.clone(),
        }
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// How long to wait before checking the context again, at most `slice`.
    ///
    /// Returns `None` once the deadline has passed.
    #[must_use]
    pub fn next_wait(&self, slice: Duration) -> Option<Duration> {
        match self.deadline {
            None => Some(slice),
            Some(deadline) => {
                let remaining = deadline.checked_duration_since(Instant::now())?;
                (!remaining.is_zero()).then(|| remaining.min(slice))
            }
        }
    }
}

/// The result of a DUT call.
///
/// An OS error is data to compare against an expectation, not a failure of the call itself.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum CallResult<T> {
    Ok(T),
    Errno(Errno),
    /// The call's own deadline passed first.
    TimedOut,
    /// The scenario was cancelled while the call was in flight.
    Cancelled,
}

impl<T> CallResult<T> {
    /// Map the success value, keeping every other outcome.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallResult<U> {
        match self {
            Self::Ok(val) => CallResult::Ok(f(val)),
            Self::Errno(errno) => CallResult::Errno(errno),
            Self::TimedOut => CallResult::TimedOut,
            Self::Cancelled => CallResult::Cancelled,
        }
    }

    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// The socket calls a device under test answers.
///
/// Each call gets exactly one response.
#[cfg_attr(test, mockall::automock)]
pub trait Dut {
    /// Create a socket bound to `local`, returning its handle and bound port.
    fn create_bound_socket(
        &self,
        protocol: TransportProtocol,
        local: SocketAddrV4,
        ctx: &CallContext,
    ) -> Result<(SocketHandle, Port)>;
    fn connect(&self, handle: SocketHandle, peer: SocketAddrV4, ctx: &CallContext)
        -> CallResult<()>;
    fn send_to(
        &self,
        handle: SocketHandle,
        payload: &[u8],
        dest: SocketAddrV4,
        ctx: &CallContext,
    ) -> CallResult<usize>;
    fn recv(&self, handle: SocketHandle, max_len: usize, ctx: &CallContext)
        -> CallResult<Vec<u8>>;
    /// Read and clear the pending socket error (`SO_ERROR`) without blocking.
    fn socket_error(&self, handle: SocketHandle, ctx: &CallContext) -> CallResult<Option<Errno>>;
    /// Release the socket; closing an unknown or closed handle succeeds.
    fn close(&self, handle: SocketHandle, ctx: &CallContext) -> CallResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_context_never_expires() {
        let ctx = CallContext::new(CancellationToken::new());
        assert_eq!(None, ctx.deadline());
        assert!(!ctx.is_expired());
        assert_eq!(
            Some(Duration::from_millis(5)),
            ctx.next_wait(Duration::from_millis(5))
        );
    }

    #[test]
    fn test_with_timeout_keeps_earlier_deadline() {
        let outer = CallContext::new(CancellationToken::new()).with_timeout(Duration::ZERO);
        let inner = outer.with_timeout(Duration::from_secs(60));
        assert_eq!(outer.deadline(), inner.deadline());
        assert!(inner.is_expired());
        assert_eq!(None, inner.next_wait(Duration::from_millis(5)));
    }

    #[test]
    fn test_with_unrepresentable_timeout() {
        let unbounded = CallContext::new(CancellationToken::new()).with_timeout(Duration::MAX);
        assert_eq!(None, unbounded.deadline());
        assert!(!unbounded.is_expired());
        let bounded = CallContext::new(CancellationToken::new()).with_timeout(Duration::ZERO);
        assert_eq!(bounded.deadline(), bounded.with_timeout(Duration::MAX).deadline());
    }

    #[test]
    fn test_next_wait_is_bounded_by_slice() {
        let ctx = CallContext::new(CancellationToken::new()).with_timeout(Duration::from_secs(60));
        assert_eq!(
            Some(Duration::from_millis(10)),
            ctx.next_wait(Duration::from_millis(10))
        );
    }

    #[test]
    fn test_cancellation_is_shared() {
        let token = CancellationToken::new();
        let ctx = CallContext::new(token.clone()).with_timeout(Duration::from_secs(1));
        assert!(!ctx.is_cancelled());
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_call_result_map() {
        assert_eq!(CallResult::Ok(3), CallResult::Ok("abc").map(str::len));
        assert_eq!(
            CallResult::<usize>::Errno(Errno::ECONNREFUSED),
            CallResult::<&str>::Errno(Errno::ECONNREFUSED).map(str::len)
        );
        assert_eq!(
            CallResult::<usize>::Cancelled,
            CallResult::<&str>::Cancelled.map(str::len)
        );
    }
}
