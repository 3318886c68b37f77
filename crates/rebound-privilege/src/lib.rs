//! Discover whether the current process may bring up the TUN device the harness peers live behind.
//!
//! On Linux this is the `CAP_NET_ADMIN` capability in the effective set, which is raised from the
//! permitted set when available. On other Unix platforms the effective user must be root.
//!
//! # Example
//!
//! ```rust
//! # fn main() -> anyhow::Result<()> {
//! use rebound_privilege::Privilege;
//!
//! let privilege = Privilege::acquire_privileges()?;
//! if !privilege.has_privileges() {
//!     println!("missing: {}", Privilege::requirement());
//! }
//! # Ok(())
//! # }
//! ```

/// A privilege error result.
pub type Result<T> = std::result::Result<T, Error>;

/// A privilege error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(target_os = "linux")]
    #[error("caps error: {0}")]
    CapsError(#[from] caps::errors::CapsError),
}

/// The privileges of the running process.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Privilege {
    has_privileges: bool,
}

impl Privilege {
    /// Inspect the privileges of the current process without changing them.
    pub fn discover() -> Result<Self> {
        let has_privileges = Self::check_has_privileges()?;
        tracing::debug!(has_privileges);
        Ok(Self { has_privileges })
    }

    #[must_use]
    pub const fn new(has_privileges: bool) -> Self {
        Self { has_privileges }
    }

    /// Whether the process may create and configure a TUN device.
    #[must_use]
    pub const fn has_privileges(&self) -> bool {
        self.has_privileges
    }

    /// A human readable description of what is required.
    #[must_use]
    pub const fn requirement() -> &'static str {
        if cfg!(target_os = "linux") {
            "CAP_NET_ADMIN in the effective capability set"
        } else {
            "an effective user id of root"
        }
    }

    #[cfg(target_os = "linux")]
    pub fn acquire_privileges() -> Result<Self> {
        use caps::{CapSet, Capability};
        if !caps::has_cap(None, CapSet::Effective, Capability::CAP_NET_ADMIN)?
            && caps::has_cap(None, CapSet::Permitted, Capability::CAP_NET_ADMIN)?
        {
            tracing::debug!("raising CAP_NET_ADMIN from the permitted set");
            caps::raise(None, CapSet::Effective, Capability::CAP_NET_ADMIN)?;
        }
        Self::discover()
    }

    #[cfg(target_os = "linux")]
    fn check_has_privileges() -> Result<bool> {
        Ok(caps::has_cap(
            None,
            caps::CapSet::Effective,
            caps::Capability::CAP_NET_ADMIN,
        )?)
    }

    #[cfg(not(target_os = "linux"))]
    pub fn acquire_privileges() -> Result<Self> {
        Self::discover()
    }

    #[cfg(not(target_os = "linux"))]
    #[expect(clippy::unnecessary_wraps)]
    fn check_has_privileges() -> Result<bool> {
        Ok(nix::unistd::Uid::effective().is_root())
    }
}
