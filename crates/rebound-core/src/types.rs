use nix::errno::Errno;
use std::fmt::{Display, Formatter};

/// Whether the DUT sockets are connected to the peer before the ICMP error arrives.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ConnectionMode {
    Connected,
    Connectionless,
}

impl ConnectionMode {
    pub const ALL: [Self; 2] = [Self::Connected, Self::Connectionless];
}

impl Display for ConnectionMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected"),
            Self::Connectionless => write!(f, "Connectionless"),
        }
    }
}

/// The ICMP error injected in response to the DUT's datagram.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum IcmpErrorKind {
    /// Destination unreachable, port unreachable (type 3, code 3).
    PortUnreachable,
    /// Time exceeded, TTL expired in transit (type 11, code 0).
    TimeToLiveExceeded,
}

impl IcmpErrorKind {
    pub const ALL: [Self; 2] = [Self::PortUnreachable, Self::TimeToLiveExceeded];

    #[must_use]
    pub const fn icmp_type(self) -> u8 {
        match self {
            Self::PortUnreachable => 3,
            Self::TimeToLiveExceeded => 11,
        }
    }

    #[must_use]
    pub const fn icmp_code(self) -> u8 {
        match self {
            Self::PortUnreachable => 3,
            Self::TimeToLiveExceeded => 0,
        }
    }
}

impl Display for IcmpErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PortUnreachable => write!(f, "PortUnreachable"),
            Self::TimeToLiveExceeded => write!(f, "TimeToLiveExceeded"),
        }
    }
}

/// The socket level mechanism used to observe a pending error.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DetectionMethod {
    SendPath,
    SendPathOnUnaffectedPeer,
    ReceivePath,
    SocketOptionPath,
}

impl DetectionMethod {
    pub const ALL: [Self; 4] = [
        Self::SendPath,
        Self::SendPathOnUnaffectedPeer,
        Self::ReceivePath,
        Self::SocketOptionPath,
    ];
}

impl Display for DetectionMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SendPath => write!(f, "SendPath"),
            Self::SendPathOnUnaffectedPeer => write!(f, "SendPathOnUnaffectedPeer"),
            Self::ReceivePath => write!(f, "ReceivePath"),
            Self::SocketOptionPath => write!(f, "SocketOptionPath"),
        }
    }
}

/// The error a detection step is expected to observe.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ExpectedOutcome {
    NoError,
    Error(Errno),
}

impl ExpectedOutcome {
    /// The outcome for a flow in `mode` that received an ICMP error of `kind`.
    ///
    /// Only a port unreachable on a connected socket is surfaced to the application.
    #[must_use]
    pub const fn for_flow(mode: ConnectionMode, kind: IcmpErrorKind) -> Self {
        match (mode, kind) {
            (ConnectionMode::Connected, IcmpErrorKind::PortUnreachable) => {
                Self::Error(Errno::ECONNREFUSED)
            }
            _ => Self::NoError,
        }
    }

    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl Display for ExpectedOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "no error"),
            Self::Error(errno) => write!(f, "{errno:?} ({})", *errno as i32),
        }
    }
}

/// An opaque handle to a socket owned by the DUT.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SocketHandle(pub u32);

impl Display for SocketHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A UDP port.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Port(pub u16);

/// The transport protocol of a DUT socket.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransportProtocol {
    Udp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ConnectionMode::Connected, IcmpErrorKind::PortUnreachable, ExpectedOutcome::Error(Errno::ECONNREFUSED))]
    #[test_case(ConnectionMode::Connected, IcmpErrorKind::TimeToLiveExceeded, ExpectedOutcome::NoError)]
    #[test_case(ConnectionMode::Connectionless, IcmpErrorKind::PortUnreachable, ExpectedOutcome::NoError)]
    #[test_case(ConnectionMode::Connectionless, IcmpErrorKind::TimeToLiveExceeded, ExpectedOutcome::NoError)]
    fn test_expected_outcome_for_flow(
        mode: ConnectionMode,
        kind: IcmpErrorKind,
        expected: ExpectedOutcome,
    ) {
        assert_eq!(expected, ExpectedOutcome::for_flow(mode, kind));
    }

    #[test_case(IcmpErrorKind::PortUnreachable, 3, 3)]
    #[test_case(IcmpErrorKind::TimeToLiveExceeded, 11, 0)]
    fn test_icmp_type_and_code(kind: IcmpErrorKind, icmp_type: u8, icmp_code: u8) {
        assert_eq!(icmp_type, kind.icmp_type());
        assert_eq!(icmp_code, kind.icmp_code());
    }

    #[test]
    fn test_expected_outcome_display() {
        assert_eq!("no error", ExpectedOutcome::NoError.to_string());
        assert_eq!(
            format!("ECONNREFUSED ({})", Errno::ECONNREFUSED as i32),
            ExpectedOutcome::Error(Errno::ECONNREFUSED).to_string()
        );
    }
}
