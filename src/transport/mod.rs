//! Process-wide TCP and UDP counter tracking.
//!
//! Unlike interfaces there is exactly one TCP and one UDP counter set, so
//! no reconciliation is needed: each tracker keeps a resolved source
//! handle plus the previous/current sample pair and derives per-second
//! rates the same way the interface engine does, including the boot-time
//! seeding of the very first report.

use crate::engine::{delta, elapsed_secs};
use crate::platform::{Platform, PlatformError, SourceHandle};
use crate::resolver;

/// TCP counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TcpSample {
    pub timestamp: f64,
    pub in_segs: u64,
    pub out_segs: u64,
    pub retrans_segs: u64,
    pub estab_resets: u64,
    pub out_rsts: u64,
    pub attempt_fails: u64,
    pub active_opens: u64,
    pub passive_opens: u64,
    pub listen_drops: u64,
}

/// UDP counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UdpSample {
    pub timestamp: f64,
    pub in_datagrams: u64,
    pub out_datagrams: u64,
    pub in_errors: u64,
    pub out_errors: u64,
}

/// Per-second TCP figures.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TcpRates {
    pub timestamp: f64,
    pub in_segs_sec: f64,
    pub out_segs_sec: f64,
    /// Established-connection resets plus outgoing RSTs.
    pub resets_sec: f64,
    pub attempt_fails_sec: f64,
    /// Retransmitted share of outgoing segments over the window, percent.
    pub retrans_pct: f64,
    /// Inbound connections (passive opens).
    pub in_conn_sec: f64,
    /// Outbound connections (active opens).
    pub out_conn_sec: f64,
    /// Listen-queue drops.
    pub drops_sec: f64,
}

/// Per-second UDP figures.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UdpRates {
    pub timestamp: f64,
    pub in_datagrams_sec: f64,
    pub out_datagrams_sec: f64,
    pub in_errors_sec: f64,
    pub out_errors_sec: f64,
}

/// Shared tracker state: resolved source and the sample pair.
struct TrackerCore {
    proto: &'static str,
    source: Option<SourceHandle>,
    resolved_at: Option<u64>,
    boot_time: f64,
}

impl TrackerCore {
    fn new(proto: &'static str, boot_time: f64) -> Self {
        Self {
            proto,
            source: None,
            resolved_at: None,
            boot_time,
        }
    }

    /// Resolves (or re-resolves after a namespace rebuild) the source.
    fn source(
        &mut self,
        platform: &dyn Platform,
    ) -> Result<Option<SourceHandle>, PlatformError> {
        let generation = platform.topology_generation();
        if self.resolved_at != Some(generation) {
            self.source = resolver::resolve_transport(platform, self.proto)?;
            self.resolved_at = Some(generation);
            if self.source.is_none() {
                tracing::warn!(protocol = self.proto, "no transport counter source");
            }
        }
        Ok(self.source.clone())
    }
}

fn field(
    platform: &dyn Platform,
    handle: &SourceHandle,
    name: &str,
) -> Result<u64, PlatformError> {
    Ok(platform.read_field(handle, name)?.unwrap_or(0))
}

/// Tracker for the process-wide TCP counters.
pub struct TcpTracker {
    core: TrackerCore,
    previous: Option<TcpSample>,
    current: Option<TcpSample>,
}

impl TcpTracker {
    pub fn new(boot_time: f64) -> Self {
        Self {
            core: TrackerCore::new("tcp", boot_time),
            previous: None,
            current: None,
        }
    }

    /// Captures a new snapshot at `now` (epoch seconds). A missing source
    /// leaves the tracker idle; `rates()` then reports nothing.
    pub fn sample(&mut self, platform: &dyn Platform, now: f64) -> Result<(), PlatformError> {
        let Some(h) = self.core.source(platform)? else {
            return Ok(());
        };
        let sample = TcpSample {
            timestamp: now,
            in_segs: field(platform, &h, "in_segs")?,
            out_segs: field(platform, &h, "out_segs")?,
            retrans_segs: field(platform, &h, "retrans_segs")?,
            estab_resets: field(platform, &h, "estab_resets")?,
            out_rsts: field(platform, &h, "out_rsts")?,
            attempt_fails: field(platform, &h, "attempt_fails")?,
            active_opens: field(platform, &h, "active_opens")?,
            passive_opens: field(platform, &h, "passive_opens")?,
            listen_drops: field(platform, &h, "listen_drops")?,
        };
        let previous = match self.current.take() {
            Some(current) => current,
            None => TcpSample {
                timestamp: self.core.boot_time,
                ..TcpSample::default()
            },
        };
        if sample.in_segs < previous.in_segs || sample.out_segs < previous.out_segs {
            tracing::warn!(
                protocol = "tcp",
                "segment counter moved backwards, reporting a zero delta this cycle"
            );
        }
        self.previous = Some(previous);
        self.current = Some(sample);
        Ok(())
    }

    pub fn rates(&self) -> Option<TcpRates> {
        let current = self.current.as_ref()?;
        let previous = self.previous.as_ref()?;
        let elapsed = elapsed_secs(current.timestamp, previous.timestamp);

        let out_segs = delta(current.out_segs, previous.out_segs);
        let retrans = delta(current.retrans_segs, previous.retrans_segs);
        let retrans_pct = if out_segs > 0.0 {
            retrans * 100.0 / out_segs
        } else {
            0.0
        };
        Some(TcpRates {
            timestamp: current.timestamp,
            in_segs_sec: delta(current.in_segs, previous.in_segs) / elapsed,
            out_segs_sec: out_segs / elapsed,
            resets_sec: (delta(current.estab_resets, previous.estab_resets)
                + delta(current.out_rsts, previous.out_rsts))
                / elapsed,
            attempt_fails_sec: delta(current.attempt_fails, previous.attempt_fails) / elapsed,
            retrans_pct,
            in_conn_sec: delta(current.passive_opens, previous.passive_opens) / elapsed,
            out_conn_sec: delta(current.active_opens, previous.active_opens) / elapsed,
            drops_sec: delta(current.listen_drops, previous.listen_drops) / elapsed,
        })
    }
}

/// Tracker for the process-wide UDP counters.
pub struct UdpTracker {
    core: TrackerCore,
    previous: Option<UdpSample>,
    current: Option<UdpSample>,
}

impl UdpTracker {
    pub fn new(boot_time: f64) -> Self {
        Self {
            core: TrackerCore::new("udp", boot_time),
            previous: None,
            current: None,
        }
    }

    pub fn sample(&mut self, platform: &dyn Platform, now: f64) -> Result<(), PlatformError> {
        let Some(h) = self.core.source(platform)? else {
            return Ok(());
        };
        let sample = UdpSample {
            timestamp: now,
            in_datagrams: field(platform, &h, "in_datagrams")?,
            out_datagrams: field(platform, &h, "out_datagrams")?,
            in_errors: field(platform, &h, "in_errors")?,
            out_errors: field(platform, &h, "out_errors")?,
        };
        let previous = match self.current.take() {
            Some(current) => current,
            None => UdpSample {
                timestamp: self.core.boot_time,
                ..UdpSample::default()
            },
        };
        self.previous = Some(previous);
        self.current = Some(sample);
        Ok(())
    }

    pub fn rates(&self) -> Option<UdpRates> {
        let current = self.current.as_ref()?;
        let previous = self.previous.as_ref()?;
        let elapsed = elapsed_secs(current.timestamp, previous.timestamp);
        Some(UdpRates {
            timestamp: current.timestamp,
            in_datagrams_sec: delta(current.in_datagrams, previous.in_datagrams) / elapsed,
            out_datagrams_sec: delta(current.out_datagrams, previous.out_datagrams) / elapsed,
            in_errors_sec: delta(current.in_errors, previous.in_errors) / elapsed,
            out_errors_sec: delta(current.out_errors, previous.out_errors) / elapsed,
        })
    }
}
