use crate::dut::CallResult;
use crate::error::Error;
use crate::matrix::Scenario;
use crate::types::ExpectedOutcome;
use nix::errno::Errno;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use thiserror::Error;

/// What a detection step saw.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Observed {
    Success,
    Errno(Errno),
    TimedOut,
    Cancelled,
}

impl Observed {
    /// Whether this observation is the one `expected` calls for.
    #[must_use]
    pub fn matches(self, expected: ExpectedOutcome) -> bool {
        match (self, expected) {
            (Self::Success, ExpectedOutcome::NoError) => true,
            (Self::Errno(observed), ExpectedOutcome::Error(expected)) => observed == expected,
            _ => false,
        }
    }

    /// The pending error read from `SO_ERROR`, where no pending error is a success.
    #[must_use]
    pub fn from_socket_error(result: &CallResult<Option<Errno>>) -> Self {
        match result {
            CallResult::Ok(None) => Self::Success,
            CallResult::Ok(Some(errno)) | CallResult::Errno(errno) => Self::Errno(*errno),
            CallResult::TimedOut => Self::TimedOut,
            CallResult::Cancelled => Self::Cancelled,
        }
    }
}

impl<T> From<&CallResult<T>> for Observed {
    fn from(result: &CallResult<T>) -> Self {
        match result {
            CallResult::Ok(_) => Self::Success,
            CallResult::Errno(errno) => Self::Errno(*errno),
            CallResult::TimedOut => Self::TimedOut,
            CallResult::Cancelled => Self::Cancelled,
        }
    }
}

impl Display for Observed {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "no error"),
            Self::Errno(errno) => write!(f, "{errno:?} ({})", *errno as i32),
            Self::TimedOut => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A step of a detection procedure.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Step {
    CleanRecv,
    FirstRecv,
    SecondRecv,
    CleanSend,
    FirstSend,
    SecondSend,
    UnaffectedSend,
    CleanSocketOption,
    TargetSocketOption,
    SecondSocketOption,
    SendAfterSocketOption,
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CleanRecv => write!(f, "recv on clean socket"),
            Self::FirstRecv => write!(f, "first recv"),
            Self::SecondRecv => write!(f, "second recv"),
            Self::CleanSend => write!(f, "send on clean socket"),
            Self::FirstSend => write!(f, "first send"),
            Self::SecondSend => write!(f, "second send"),
            Self::UnaffectedSend => write!(f, "send to unaffected peer"),
            Self::CleanSocketOption => write!(f, "SO_ERROR on clean socket"),
            Self::TargetSocketOption => write!(f, "SO_ERROR"),
            Self::SecondSocketOption => write!(f, "second SO_ERROR"),
            Self::SendAfterSocketOption => write!(f, "send after SO_ERROR"),
        }
    }
}

/// Why a scenario failed.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Failure {
    /// The scenario could not be brought up.
    #[error("setup failed: {0}")]
    Setup(String),
    /// A step observed something other than the expected outcome.
    #[error("{step}: expected {expected}, observed {observed}")]
    Mismatch {
        step: Step,
        expected: ExpectedOutcome,
        observed: Observed,
    },
    /// The peer did not see the datagram a step should have produced.
    #[error("{step}: datagram not observed by peer within {timeout:?}")]
    NotObserved { step: Step, timeout: Duration },
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self::Setup(err.to_string())
    }
}

/// Compare an observation with the expectation for `step`.
pub fn check(step: Step, expected: ExpectedOutcome, observed: Observed) -> Result<(), Failure> {
    if observed.matches(expected) {
        Ok(())
    } else {
        Err(Failure::Mismatch {
            step,
            expected,
            observed,
        })
    }
}

/// The verdict of one scenario.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Verdict {
    Pass,
    Fail(Failure),
}

impl Verdict {
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

impl From<Result<(), Failure>> for Verdict {
    fn from(result: Result<(), Failure>) -> Self {
        match result {
            Ok(()) => Self::Pass,
            Err(failure) => Self::Fail(failure),
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "pass"),
            Self::Fail(failure) => write!(f, "fail: {failure}"),
        }
    }
}

/// The result of running one scenario.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub verdict: Verdict,
    pub elapsed: Duration,
}
