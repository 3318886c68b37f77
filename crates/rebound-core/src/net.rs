/// `IPv4` / `UDP` / `ICMP` packet construction and inspection.
pub mod ipv4;

/// A tun device the peers live behind.
#[cfg(any(target_os = "macos", target_os = "linux"))]
pub mod tun;
