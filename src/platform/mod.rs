//! Platform counter transport.
//!
//! The kernel maintains named bundles of statistic fields ("counter
//! containers") for network interfaces and transport protocols. The
//! [`Platform`] trait is the only surface through which the rest of the
//! crate reaches them: interface discovery, container enumeration, field
//! lookup, administrative flags, boot time, and link parameters. The
//! shipped implementation is [`ProcfsPlatform`]; tests use the mocks in
//! [`mock`].

pub mod mock;
mod procfs;
mod traits;

pub use procfs::ProcfsPlatform;
pub use traits::{FileSystem, RealFs};

use std::fmt;
use std::io;

/// Opaque handle into the platform counter namespace.
///
/// Minted by a platform implementation, meaningful only to it. Handles are
/// cheap to clone and compare; the resolver stores one per metric category.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceHandle(String);

impl SourceHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A kernel counter container as seen by the resolver.
///
/// `class` groups containers by subsystem ("net" for link statistics,
/// "mib2" for transport protocol counters). `module`, `instance` and `name`
/// follow the kernel's own naming of the container; the same interface may
/// be reachable through several containers with different naming
/// conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub class: String,
    pub module: String,
    pub instance: u32,
    pub name: String,
    pub handle: SourceHandle,
}

/// Administrative interface flags, from the platform's interface layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminFlags {
    pub up: bool,
    pub loopback: bool,
}

/// Negotiated duplex mode of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Duplex {
    #[default]
    Unknown,
    Half,
    Full,
}

impl Duplex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Duplex::Half => "half",
            Duplex::Full => "full",
            Duplex::Unknown => "unkn",
        }
    }
}

/// Errors from the platform counter transport.
///
/// `Io` covers the transport being unreachable; `Format` means a file or
/// record the platform contract guarantees was present but had an
/// unexpected shape. Both are fatal to the poll loop: derived figures
/// would be untrustworthy.
#[derive(Debug)]
pub enum PlatformError {
    Io(io::Error),
    Format { source: String, message: String },
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::Io(e) => write!(f, "I/O error: {}", e),
            PlatformError::Format { source, message } => {
                write!(f, "{}: {}", source, message)
            }
        }
    }
}

impl std::error::Error for PlatformError {}

impl From<io::Error> for PlatformError {
    fn from(e: io::Error) -> Self {
        PlatformError::Io(e)
    }
}

/// The opaque lookup surface supplied by the operating system layer.
///
/// All methods are blocking and must not be called concurrently; the poll
/// loop is single-threaded.
pub trait Platform {
    /// Current list of interface names, in the platform's own order.
    fn interfaces(&self) -> Result<Vec<String>, PlatformError>;

    /// Counter containers whose classification matches `class`.
    fn containers(&self, class: &str) -> Result<Vec<Container>, PlatformError>;

    /// Current value of a named field in a container.
    ///
    /// Returns `Ok(None)` when the container does not report the field.
    fn read_field(
        &self,
        handle: &SourceHandle,
        field: &str,
    ) -> Result<Option<u64>, PlatformError>;

    /// Administrative flags for an interface, or `None` when the
    /// administrative layer cannot answer for it.
    fn admin_flags(&self, name: &str) -> Result<Option<AdminFlags>, PlatformError>;

    /// System boot time, seconds since the epoch.
    fn boot_time(&self) -> Result<f64, PlatformError>;

    /// Direct link speed/duplex query (bits per second), for platforms
    /// where the counter containers do not carry link parameters.
    fn link_speed_duplex(&self, name: &str) -> Result<Option<(u64, Duplex)>, PlatformError>;

    /// Monotone generation counter for the container namespace.
    ///
    /// Advances whenever the namespace is rebuilt; source resolution is
    /// reused until it does.
    fn topology_generation(&self) -> u64;
}
