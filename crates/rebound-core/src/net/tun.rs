use crate::config::HarnessConfig;
use crate::error::{Error, IoError, IoOperation, Result};
use crate::net::ipv4;
use crate::peer::Link;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// The largest packet read from the tun device.
const MAX_PACKET_SIZE: usize = 65_535;

/// The number of packets buffered per peer before new ones are dropped.
const LINK_QUEUE_CAPACITY: usize = 64;

/// A tun device routing the harness network to in-process peers.
///
/// The device is assigned the DUT address, so traffic the host sends into the network is read
/// back here and handed to the peer owning the destination address and port. Packets written by
/// a peer are delivered to the host as if they arrived from the network.
pub struct TunNetwork {
    _runtime: tokio::runtime::Runtime,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

struct Shared {
    writer: tokio::sync::Mutex<WriteHalf<tun::AsyncDevice>>,
    routes: Mutex<HashMap<SocketAddrV4, Sender<Vec<u8>>>>,
    runtime: tokio::runtime::Handle,
    peer_addr: Ipv4Addr,
    port_base: u16,
    next_port: AtomicU16,
}

impl TunNetwork {
    /// Create the tun device and start reading from it.
    pub fn start(config: &HarnessConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("rebound-tun")
            .enable_all()
            .build()
            .map_err(|err| IoError::Other(err, IoOperation::Runtime))?;
        let mut tun_config = tun::Configuration::default();
        tun_config
            .address(config.dut_addr)
            .netmask(config.tun_network.mask())
            .up();
        let device = {
            let _guard = runtime.enter();
            tun::create_as_async(&tun_config)?
        };
        let (reader, writer) = tokio::io::split(device);
        let shared = Arc::new(Shared {
            writer: tokio::sync::Mutex::new(writer),
            routes: Mutex::new(HashMap::new()),
            runtime: runtime.handle().clone(),
            peer_addr: config.peer_addr,
            port_base: config.peer_port_base,
            next_port: AtomicU16::new(0),
        });
        let cancel = CancellationToken::new();
        runtime.spawn(read_loop(reader, Arc::clone(&shared), cancel.clone()));
        tracing::info!(
            network = %config.tun_network,
            dut = %config.dut_addr,
            peer = %config.peer_addr,
            "tun network started"
        );
        Ok(Self {
            _runtime: runtime,
            shared,
            cancel,
        })
    }

    /// A new peer endpoint on a port no other live endpoint uses.
    #[must_use]
    pub fn link(&self) -> TunLink {
        let (tx, rx) = channel::bounded(LINK_QUEUE_CAPACITY);
        let addr = self.shared.register(tx);
        tracing::debug!(%addr, "peer link registered");
        TunLink {
            shared: Arc::clone(&self.shared),
            addr,
            rx,
        }
    }
}

impl Drop for TunNetwork {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Shared {
    fn register(&self, tx: Sender<Vec<u8>>) -> SocketAddrV4 {
        let mut routes = self.routes.lock();
        loop {
            let offset = self.next_port.fetch_add(1, Ordering::Relaxed);
            let port = self.port_base.wrapping_add(offset);
            let addr = SocketAddrV4::new(self.peer_addr, port);
            if port != 0 && !routes.contains_key(&addr) {
                routes.insert(addr, tx);
                return addr;
            }
        }
    }

    fn dispatch(&self, packet: &[u8]) {
        match ipv4::extract_udp(packet) {
            Ok(Some(info)) => {
                let routes = self.routes.lock();
                match routes.get(&info.destination) {
                    Some(tx) => {
                        if tx.try_send(packet.to_vec()).is_err() {
                            tracing::warn!(destination = %info.destination, "peer queue full, dropping packet");
                        }
                    }
                    None => tracing::trace!(destination = %info.destination, "no peer for packet"),
                }
            }
            Ok(None) => tracing::trace!(len = packet.len(), "ignoring non udp packet"),
            Err(err) => tracing::trace!(%err, "ignoring malformed packet"),
        }
    }
}

async fn read_loop(
    mut reader: ReadHalf<tun::AsyncDevice>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0_u8; MAX_PACKET_SIZE];
    loop {
        let bytes_read = tokio::select! {
            () = cancel.cancelled() => break,
            res = reader.read(&mut buf) => match res {
                Ok(0) => break,
                Ok(bytes_read) => bytes_read,
                Err(err) => {
                    tracing::warn!(err = %IoError::Other(err, IoOperation::TunRead), "tun reader failed");
                    break;
                }
            }
        };
        shared.dispatch(&buf[..bytes_read]);
    }
    shared.routes.lock().clear();
    tracing::debug!("tun reader stopped");
}

/// A peer endpoint on a [`TunNetwork`].
pub struct TunLink {
    shared: Arc<Shared>,
    addr: SocketAddrV4,
    rx: Receiver<Vec<u8>>,
}

impl Link for TunLink {
    fn local_addr(&self) -> SocketAddrV4 {
        self.addr
    }

    #[instrument(skip(self, packet), fields(addr = %self.addr, len = packet.len()), level = "trace")]
    fn send_packet(&self, packet: &[u8]) -> Result<()> {
        self.shared
            .runtime
            .block_on(async {
                let mut writer = self.shared.writer.lock().await;
                writer.write_all(packet).await?;
                writer.flush().await
            })
            .map_err(|err| IoError::Other(err, IoOperation::TunWrite))?;
        Ok(())
    }

    fn recv_packet(&self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match self.rx.recv_timeout(timeout) {
            Ok(packet) => Ok(Some(packet)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::NetworkClosed),
        }
    }
}

impl Drop for TunLink {
    fn drop(&mut self) {
        self.shared.routes.lock().remove(&self.addr);
        tracing::debug!(addr = %self.addr, "peer link released");
    }
}
