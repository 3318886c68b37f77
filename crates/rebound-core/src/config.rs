use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Default values for configuration.
pub mod defaults {
    use std::net::Ipv4Addr;
    use std::num::NonZeroUsize;
    use std::time::Duration;

    /// The default network address routed to the tun device.
    pub const DEFAULT_TUN_NETWORK_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 0);

    /// The default prefix length of the network routed to the tun device.
    pub const DEFAULT_TUN_NETWORK_PREFIX: u8 = 24;

    /// The default address assigned to the tun device, which the DUT sockets bind to.
    pub const DEFAULT_DUT_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

    /// The default address the peers send from.
    pub const DEFAULT_PEER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    /// The default first port handed out to peers.
    pub const DEFAULT_PEER_PORT_BASE: u16 = 50000;

    /// The default value for `call-timeout`, the bound on a bounded send or receive.
    pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(1);

    /// The default value for `expect-timeout`, the bound on a peer waiting for a datagram.
    pub const DEFAULT_EXPECT_TIMEOUT: Duration = Duration::from_secs(1);

    /// The default value for `scenario-timeout`.
    pub const DEFAULT_SCENARIO_TIMEOUT: Duration = Duration::from_secs(10);

    /// The default bound on closing a socket during teardown.
    pub const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(1);

    /// The default pause between injecting an ICMP error and detecting it.
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(20);

    /// The default UDP payload sent by the DUT and the peers.
    pub const DEFAULT_PAYLOAD: &[u8] = &[];

    /// The default maximum number of bytes read by a DUT receive.
    pub const DEFAULT_MAX_RECV_LEN: usize = 100;

    /// The default number of scenarios run concurrently.
    pub const DEFAULT_PARALLELISM: NonZeroUsize = NonZeroUsize::MIN;
}

/// Harness configuration.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HarnessConfig {
    pub tun_network: Ipv4Network,
    pub dut_addr: Ipv4Addr,
    pub peer_addr: Ipv4Addr,
    pub peer_port_base: u16,
    pub call_timeout: Duration,
    pub expect_timeout: Duration,
    pub scenario_timeout: Duration,
    pub teardown_timeout: Duration,
    pub settle_delay: Duration,
    pub payload: Vec<u8>,
    pub max_recv_len: usize,
    pub parallelism: NonZeroUsize,
}
