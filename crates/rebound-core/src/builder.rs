use crate::config::{defaults, HarnessConfig};
use crate::error::{Error, Result};
use crate::net::ipv4::MAX_UDP_PAYLOAD;
use ipnetwork::Ipv4Network;
use std::net::Ipv4Addr;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Build a [`HarnessConfig`].
///
/// Every setting starts from its value in [`defaults`] and is validated by
/// [`Builder::build`].
///
/// # Examples
///
/// ```
/// # fn main() -> anyhow::Result<()> {
/// use rebound_core::Builder;
/// use std::time::Duration;
///
/// let config = Builder::new()
///     .expect_timeout(Duration::from_millis(500))
///     .payload(b"ping".to_vec())
///     .build()?;
/// assert_eq!(Duration::from_millis(500), config.expect_timeout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    tun_network_addr: Ipv4Addr,
    tun_network_prefix: u8,
    dut_addr: Ipv4Addr,
    peer_addr: Ipv4Addr,
    peer_port_base: u16,
    call_timeout: Duration,
    expect_timeout: Duration,
    scenario_timeout: Duration,
    teardown_timeout: Duration,
    settle_delay: Duration,
    payload: Vec<u8>,
    max_recv_len: usize,
    parallelism: NonZeroUsize,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            tun_network_addr: defaults::DEFAULT_TUN_NETWORK_ADDR,
            tun_network_prefix: defaults::DEFAULT_TUN_NETWORK_PREFIX,
            dut_addr: defaults::DEFAULT_DUT_ADDR,
            peer_addr: defaults::DEFAULT_PEER_ADDR,
            peer_port_base: defaults::DEFAULT_PEER_PORT_BASE,
            call_timeout: defaults::DEFAULT_CALL_TIMEOUT,
            expect_timeout: defaults::DEFAULT_EXPECT_TIMEOUT,
            scenario_timeout: defaults::DEFAULT_SCENARIO_TIMEOUT,
            teardown_timeout: defaults::DEFAULT_TEARDOWN_TIMEOUT,
            settle_delay: defaults::DEFAULT_SETTLE_DELAY,
            payload: defaults::DEFAULT_PAYLOAD.to_vec(),
            max_recv_len: defaults::DEFAULT_MAX_RECV_LEN,
            parallelism: defaults::DEFAULT_PARALLELISM,
        }
    }
}

impl Builder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the network routed to the tun device.
    #[must_use]
    pub fn tun_network(self, network: Ipv4Network) -> Self {
        Self {
            tun_network_addr: network.ip(),
            tun_network_prefix: network.prefix(),
            ..self
        }
    }

    /// Set the address of the tun device, which the DUT sockets bind to.
    #[must_use]
    pub fn dut_addr(self, dut_addr: Ipv4Addr) -> Self {
        Self { dut_addr, ..self }
    }

    /// Set the address the peers send from.
    #[must_use]
    pub fn peer_addr(self, peer_addr: Ipv4Addr) -> Self {
        Self { peer_addr, ..self }
    }

    #[must_use]
    pub fn peer_port_base(self, peer_port_base: u16) -> Self {
        Self {
            peer_port_base,
            ..self
        }
    }

    /// Set the bound on a bounded DUT send or receive.
    #[must_use]
    pub fn call_timeout(self, call_timeout: Duration) -> Self {
        Self {
            call_timeout,
            ..self
        }
    }

    /// Set how long a peer waits for a datagram from the DUT.
    #[must_use]
    pub fn expect_timeout(self, expect_timeout: Duration) -> Self {
        Self {
            expect_timeout,
            ..self
        }
    }

    /// Set the deadline after which in-flight calls of a scenario are cancelled.
    #[must_use]
    pub fn scenario_timeout(self, scenario_timeout: Duration) -> Self {
        Self {
            scenario_timeout,
            ..self
        }
    }

    #[must_use]
    pub fn teardown_timeout(self, teardown_timeout: Duration) -> Self {
        Self {
            teardown_timeout,
            ..self
        }
    }

    #[must_use]
    pub fn settle_delay(self, settle_delay: Duration) -> Self {
        Self {
            settle_delay,
            ..self
        }
    }

    #[must_use]
    pub fn payload(self, payload: Vec<u8>) -> Self {
        Self { payload, ..self }
    }

    #[must_use]
    pub fn max_recv_len(self, max_recv_len: usize) -> Self {
        Self {
            max_recv_len,
            ..self
        }
    }

    /// Set the number of scenarios run concurrently.
    #[must_use]
    pub fn parallelism(self, parallelism: NonZeroUsize) -> Self {
        Self {
            parallelism,
            ..self
        }
    }

    /// Validate the settings and build the configuration.
    pub fn build(self) -> Result<HarnessConfig> {
        let tun_network = Ipv4Network::new(self.tun_network_addr, self.tun_network_prefix)
            .map_err(|err| Error::BadConfig(format!("tun network: {err}")))?;
        if tun_network.network() != self.tun_network_addr {
            return Err(Error::BadConfig(format!(
                "tun network {tun_network} has host bits set"
            )));
        }
        for (name, addr) in [("dut", self.dut_addr), ("peer", self.peer_addr)] {
            if !tun_network.contains(addr) {
                return Err(Error::BadConfig(format!(
                    "{name} address {addr} is outside tun network {tun_network}"
                )));
            }
            if addr == tun_network.network() || addr == tun_network.broadcast() {
                return Err(Error::BadConfig(format!(
                    "{name} address {addr} is not a host address of {tun_network}"
                )));
            }
        }
        if self.dut_addr == self.peer_addr {
            return Err(Error::BadConfig(format!(
                "dut and peer share the address {}",
                self.dut_addr
            )));
        }
        if self.peer_port_base == 0 {
            return Err(Error::BadConfig(String::from("peer_port_base may not be 0")));
        }
        for (name, duration) in [
            ("call_timeout", self.call_timeout),
            ("expect_timeout", self.expect_timeout),
            ("scenario_timeout", self.scenario_timeout),
            ("teardown_timeout", self.teardown_timeout),
        ] {
            if duration.is_zero() {
                return Err(Error::BadConfig(format!("{name} may not be zero")));
            }
        }
        if self.call_timeout > self.scenario_timeout {
            return Err(Error::BadConfig(format!(
                "call_timeout {:?} > scenario_timeout {:?}",
                self.call_timeout, self.scenario_timeout
            )));
        }
        if self.payload.len() > MAX_UDP_PAYLOAD {
            return Err(Error::BadConfig(format!(
                "payload of {} bytes exceeds the maximum of {MAX_UDP_PAYLOAD}",
                self.payload.len()
            )));
        }
        if self.max_recv_len == 0 {
            return Err(Error::BadConfig(String::from("max_recv_len may not be 0")));
        }
        Ok(HarnessConfig {
            tun_network,
            dut_addr: self.dut_addr,
            peer_addr: self.peer_addr,
            peer_port_base: self.peer_port_base,
            call_timeout: self.call_timeout,
            expect_timeout: self.expect_timeout,
            scenario_timeout: self.scenario_timeout,
            teardown_timeout: self.teardown_timeout,
            settle_delay: self.settle_delay,
            payload: self.payload,
            max_recv_len: self.max_recv_len,
            parallelism: self.parallelism,
        })
    }
}
