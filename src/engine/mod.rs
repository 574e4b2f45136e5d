//! Sampling and rate derivation.
//!
//! A `Sample` is a timestamped snapshot of one interface's counters; the
//! engine turns the previous/current pair held by an `InterfaceRecord` into
//! per-second rates, average packet sizes, a composite saturation figure,
//! and duplex-aware link utilization.

use crate::platform::{Duplex, Platform, PlatformError, SourceHandle};
use crate::registry::InterfaceRecord;

/// Timestamped counter snapshot for one interface. Immutable once captured.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    /// Epoch seconds at capture time.
    pub timestamp: f64,
    pub rbytes: u64,
    pub wbytes: u64,
    pub rpackets: u64,
    pub wpackets: u64,
    pub ierr: u64,
    pub oerr: u64,
    pub coll: u64,
    /// Sum of the congestion-indicator counters.
    pub sat: u64,
}

/// Per-second figures derived from two consecutive samples.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateReport {
    /// Timestamp of the newer sample.
    pub timestamp: f64,
    pub rbytes_sec: f64,
    pub wbytes_sec: f64,
    pub rpackets_sec: f64,
    pub wpackets_sec: f64,
    pub ierr_sec: f64,
    pub oerr_sec: f64,
    pub coll_sec: f64,
    pub sat_sec: f64,
    /// Average read packet size in bytes (0 when no packets).
    pub ravg_size: f64,
    /// Average write packet size in bytes (0 when no packets).
    pub wavg_size: f64,
    /// Read utilization, percent of link capacity (0 when speed unknown).
    pub rutil: f64,
    /// Write utilization, percent of link capacity.
    pub wutil: f64,
    /// Combined utilization: max of read/write on full duplex, the summed
    /// formula on half duplex.
    pub util: f64,
}

/// Elapsed seconds between two samples, floored to 1.0 when the
/// timestamps are identical so rates degrade to the raw delta instead of
/// dividing by zero.
pub(crate) fn elapsed_secs(current: f64, previous: f64) -> f64 {
    let elapsed = current - previous;
    if elapsed == 0.0 { 1.0 } else { elapsed }
}

/// Counter delta as a float; a counter that moved backwards contributes
/// zero (rollback is detected and logged at sample time).
pub(crate) fn delta(current: u64, previous: u64) -> f64 {
    current.saturating_sub(previous) as f64
}

/// Computes a rate engine over a platform's counter fields.
pub struct RateEngine {
    boot_time: f64,
}

impl RateEngine {
    /// Creates an engine seeded with the platform's boot time, so an
    /// interface's very first report covers "since boot" instead of
    /// spiking or dividing by zero.
    pub fn new(platform: &dyn Platform) -> Result<Self, PlatformError> {
        Ok(Self {
            boot_time: platform.boot_time()?,
        })
    }

    pub fn with_boot_time(boot_time: f64) -> Self {
        Self { boot_time }
    }

    /// Captures a new sample for `record` at `now` (epoch seconds).
    ///
    /// Rotates the record's current sample into its previous slot first;
    /// on the first-ever sample the previous slot is seeded with a zeroed
    /// snapshot at boot time. Also refreshes link speed/duplex and, when
    /// the counter container doubles as the link-state source, the link
    /// state itself.
    pub fn sample(
        &self,
        platform: &dyn Platform,
        record: &mut InterfaceRecord,
        now: f64,
    ) -> Result<(), PlatformError> {
        let Some(source) = record.resolution.counters.clone() else {
            return Ok(());
        };
        let h = &source.handle;

        let sample = Sample {
            timestamp: now,
            rbytes: fetch64(platform, h, &["rbytes64", "rbytes"])?,
            wbytes: fetch64(platform, h, &["obytes64", "obytes"])?,
            rpackets: fetch64(platform, h, &["ipackets64", "ipackets"])?,
            wpackets: fetch64(platform, h, &["opackets64", "opackets"])?,
            ierr: fetch64(platform, h, &["ierrors"])?,
            oerr: fetch64(platform, h, &["oerrors"])?,
            coll: fetch64(platform, h, &["collisions"])?,
            sat: 0,
        };
        let defers = fetch64(platform, h, &["defer_xmts"])?;
        let nocp = fetch_nocanput(platform, h)?;
        let noxmt = fetch64(platform, h, &["noxmtbuf"])?;
        let sample = Sample {
            sat: defers + nocp + sample.coll + noxmt,
            ..sample
        };

        self.refresh_link_parameters(platform, record, h)?;
        if record.resolution.shared_source {
            record.caps.link_up = crate::resolver::read_link_state(platform, h)?;
        }

        let previous = match record.current.take() {
            Some(current) => current,
            None => Sample {
                timestamp: self.boot_time,
                ..Sample::default()
            },
        };
        warn_on_rollback(&record.name, &previous, &sample);
        record.previous = Some(previous);
        record.current = Some(sample);
        Ok(())
    }

    /// Derives the rate report from the record's sample pair.
    ///
    /// Pure: calling it twice without an intervening `sample()` yields the
    /// same report. Returns `None` until the record has been sampled.
    pub fn rates(&self, record: &InterfaceRecord) -> Option<RateReport> {
        let current = record.current.as_ref()?;
        let previous = record.previous.as_ref()?;
        let elapsed = elapsed_secs(current.timestamp, previous.timestamp);

        let rbytes_sec = delta(current.rbytes, previous.rbytes) / elapsed;
        let wbytes_sec = delta(current.wbytes, previous.wbytes) / elapsed;
        let rpackets_sec = delta(current.rpackets, previous.rpackets) / elapsed;
        let wpackets_sec = delta(current.wpackets, previous.wpackets) / elapsed;

        let (rutil, wutil, util) = utilization(
            rbytes_sec,
            wbytes_sec,
            record.speed,
            record.duplex,
        );

        Some(RateReport {
            timestamp: current.timestamp,
            rbytes_sec,
            wbytes_sec,
            rpackets_sec,
            wpackets_sec,
            ierr_sec: delta(current.ierr, previous.ierr) / elapsed,
            oerr_sec: delta(current.oerr, previous.oerr) / elapsed,
            coll_sec: delta(current.coll, previous.coll) / elapsed,
            sat_sec: delta(current.sat, previous.sat) / elapsed,
            ravg_size: avg_size(rbytes_sec, rpackets_sec),
            wavg_size: avg_size(wbytes_sec, wpackets_sec),
            rutil,
            wutil,
            util,
        })
    }

    /// Speed/duplex refresh order: static override (already pinned on the
    /// record), counter-container fields, direct kernel query. A failed
    /// query is cached so it is not repeated every cycle.
    fn refresh_link_parameters(
        &self,
        platform: &dyn Platform,
        record: &mut InterfaceRecord,
        handle: &SourceHandle,
    ) -> Result<(), PlatformError> {
        if record.speed_from_override {
            return Ok(());
        }
        if let Some(speed) = platform.read_field(handle, "ifspeed")? {
            record.speed = speed;
            record.duplex = match platform.read_field(handle, "link_duplex")? {
                Some(2) => Duplex::Full,
                Some(1) => Duplex::Half,
                _ => Duplex::Unknown,
            };
            return Ok(());
        }
        if record.speed == 0 && !record.speed_probe_failed {
            match platform.link_speed_duplex(&record.name)? {
                Some((speed, duplex)) => {
                    record.speed = speed;
                    record.duplex = duplex;
                }
                None => {
                    tracing::debug!(
                        interface = %record.name,
                        "link speed unavailable, not asking again"
                    );
                    record.speed_probe_failed = true;
                }
            }
        }
        Ok(())
    }
}

fn avg_size(bytes_sec: f64, packets_sec: f64) -> f64 {
    if packets_sec > 0.0 {
        bytes_sec / packets_sec
    } else {
        0.0
    }
}

/// Utilization percentages. The 800 folds together 8 bits per byte and the
/// conversion to percent.
fn utilization(rbps: f64, wbps: f64, speed: u64, duplex: Duplex) -> (f64, f64, f64) {
    if speed == 0 {
        return (0.0, 0.0, 0.0);
    }
    let speed = speed as f64;
    let rutil = (rbps * 800.0 / speed).min(100.0);
    let wutil = (wbps * 800.0 / speed).min(100.0);
    let util = match duplex {
        Duplex::Full => rutil.max(wutil),
        // Half duplex shares capacity between directions; unknown duplex
        // gets the conservative figure.
        Duplex::Half | Duplex::Unknown => ((rbps + wbps) * 800.0 / speed).min(100.0),
    };
    (rutil, wutil, util)
}

/// Reads the first field a container reports from an ordered candidate
/// list (the 64-bit counter names are preferred over their 32-bit
/// ancestors), defaulting to 0.
fn fetch64(
    platform: &dyn Platform,
    handle: &SourceHandle,
    names: &[&str],
) -> Result<u64, PlatformError> {
    for name in names {
        if let Some(value) = platform.read_field(handle, name)? {
            return Ok(value);
        }
    }
    Ok(0)
}

/// Receive-buffer exhaustion counter, whose name is driver-dependent:
/// `norcvbuf`, then `nocanput`, then the split `rx_nocanput` +
/// `tx_nocanput` pair.
fn fetch_nocanput(
    platform: &dyn Platform,
    handle: &SourceHandle,
) -> Result<u64, PlatformError> {
    if let Some(v) = platform.read_field(handle, "norcvbuf")? {
        return Ok(v);
    }
    if let Some(v) = platform.read_field(handle, "nocanput")? {
        return Ok(v);
    }
    if let Some(rx) = platform.read_field(handle, "rx_nocanput")? {
        let tx = platform.read_field(handle, "tx_nocanput")?.unwrap_or(0);
        return Ok(rx + tx);
    }
    Ok(0)
}

fn warn_on_rollback(name: &str, previous: &Sample, current: &Sample) {
    let pairs = [
        ("rbytes", previous.rbytes, current.rbytes),
        ("obytes", previous.wbytes, current.wbytes),
        ("ipackets", previous.rpackets, current.rpackets),
        ("opackets", previous.wpackets, current.wpackets),
        ("ierrors", previous.ierr, current.ierr),
        ("oerrors", previous.oerr, current.oerr),
        ("collisions", previous.coll, current.coll),
        ("saturation", previous.sat, current.sat),
    ];
    for (counter, prev, cur) in pairs {
        if cur < prev {
            tracing::warn!(
                interface = name,
                counter,
                previous = prev,
                current = cur,
                "counter moved backwards, reporting a zero delta this cycle"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockPlatform;
    use crate::registry::InterfaceRecord;
    use crate::resolver;

    fn gigabit_record(p: &mut MockPlatform) -> InterfaceRecord {
        let h = p.add_container(
            "net",
            "link",
            0,
            "eth0",
            &[
                ("link_state", 1),
                ("rbytes", 0),
                ("obytes", 0),
                ("ipackets", 0),
                ("opackets", 0),
                ("ierrors", 0),
                ("oerrors", 0),
                ("collisions", 0),
            ],
        );
        let mut record = InterfaceRecord::new("eth0", 0);
        record.resolution = resolver::resolve(p, "eth0").unwrap();
        assert_eq!(record.resolution.counters.as_ref().unwrap().handle, h);
        record.speed = 1_000_000_000;
        record.duplex = Duplex::Full;
        record.speed_from_override = true;
        record
    }

    #[test]
    fn read_rate_and_utilization_on_gigabit_full_duplex() {
        let mut p = MockPlatform::new();
        let mut record = gigabit_record(&mut p);
        let h = record.resolution.counters.as_ref().unwrap().handle.clone();
        let engine = RateEngine::with_boot_time(0.0);

        engine.sample(&p, &mut record, 0.0).unwrap();
        p.set_field(&h, "rbytes", 100_000_000);
        engine.sample(&p, &mut record, 1.0).unwrap();

        let rates = engine.rates(&record).unwrap();
        assert_eq!(rates.rbytes_sec, 100_000_000.0);
        // 100_000_000 B/s * 8 * 100 / 1e9 = 80%.
        assert_eq!(rates.rutil, 80.0);
        assert_eq!(rates.wutil, 0.0);
        assert_eq!(rates.util, 80.0);
    }

    #[test]
    fn half_duplex_combines_both_directions() {
        let (rutil, wutil, util) = utilization(500.0, 700.0, 9600, Duplex::Half);
        assert!((rutil - (500.0 * 800.0 / 9600.0)).abs() < 1e-9);
        assert!((wutil - (700.0 * 800.0 / 9600.0)).abs() < 1e-9);
        assert_eq!(util, 100.0); // capped

        let (_, _, full) = utilization(500.0, 700.0, 10_000_000, Duplex::Full);
        assert!((full - (700.0 * 800.0 / 10_000_000.0)).abs() < 1e-9);
    }

    #[test]
    fn unknown_speed_reports_zero_utilization() {
        assert_eq!(utilization(1e9, 1e9, 0, Duplex::Full), (0.0, 0.0, 0.0));
    }

    #[test]
    fn first_sample_is_seeded_with_boot_time() {
        let mut p = MockPlatform::new();
        let mut record = gigabit_record(&mut p);
        let h = record.resolution.counters.as_ref().unwrap().handle.clone();
        p.set_field(&h, "rbytes", 600);
        let engine = RateEngine::with_boot_time(1000.0);

        engine.sample(&p, &mut record, 1060.0).unwrap();
        let previous = record.previous.unwrap();
        assert_eq!(previous.timestamp, 1000.0);
        assert_eq!(previous.rbytes, 0);

        // 600 bytes over the 60 seconds since boot.
        let rates = engine.rates(&record).unwrap();
        assert_eq!(rates.rbytes_sec, 10.0);
    }

    #[test]
    fn zero_elapsed_degrades_to_raw_delta() {
        let mut p = MockPlatform::new();
        let mut record = gigabit_record(&mut p);
        let h = record.resolution.counters.as_ref().unwrap().handle.clone();
        let engine = RateEngine::with_boot_time(50.0);

        engine.sample(&p, &mut record, 50.0).unwrap();
        p.set_field(&h, "rbytes", 4096);
        engine.sample(&p, &mut record, 50.0).unwrap();

        let rates = engine.rates(&record).unwrap();
        assert_eq!(rates.rbytes_sec, 4096.0);
    }

    #[test]
    fn rates_are_idempotent_without_an_intervening_sample() {
        let mut p = MockPlatform::new();
        let mut record = gigabit_record(&mut p);
        let h = record.resolution.counters.as_ref().unwrap().handle.clone();
        let engine = RateEngine::with_boot_time(0.0);

        engine.sample(&p, &mut record, 1.0).unwrap();
        p.set_field(&h, "rbytes", 1500);
        p.set_field(&h, "ipackets", 1);
        engine.sample(&p, &mut record, 2.0).unwrap();

        let first = engine.rates(&record).unwrap();
        let second = engine.rates(&record).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.ravg_size, 1500.0);
    }

    #[test]
    fn previous_is_exactly_the_last_current() {
        let mut p = MockPlatform::new();
        let mut record = gigabit_record(&mut p);
        let h = record.resolution.counters.as_ref().unwrap().handle.clone();
        let engine = RateEngine::with_boot_time(0.0);

        engine.sample(&p, &mut record, 1.0).unwrap();
        let first = record.current.unwrap();
        p.set_field(&h, "obytes", 999);
        engine.sample(&p, &mut record, 2.0).unwrap();
        assert_eq!(record.previous.unwrap(), first);
    }

    #[test]
    fn rollback_is_clamped_to_zero() {
        let mut p = MockPlatform::new();
        let mut record = gigabit_record(&mut p);
        let h = record.resolution.counters.as_ref().unwrap().handle.clone();
        let engine = RateEngine::with_boot_time(0.0);

        p.set_field(&h, "rbytes", 5000);
        engine.sample(&p, &mut record, 1.0).unwrap();
        p.set_field(&h, "rbytes", 100); // driver reset
        engine.sample(&p, &mut record, 2.0).unwrap();

        let rates = engine.rates(&record).unwrap();
        assert_eq!(rates.rbytes_sec, 0.0);
    }

    #[test]
    fn saturation_sums_congestion_counters() {
        let mut p = MockPlatform::new();
        let h = p.add_container(
            "net",
            "bge",
            0,
            "mac",
            &[
                ("opackets", 10),
                ("collisions", 2),
                ("defer_xmts", 3),
                ("norcvbuf", 5),
                ("noxmtbuf", 7),
            ],
        );
        let mut record = InterfaceRecord::new("bge0", 0);
        record.resolution = resolver::resolve(&p, "bge0").unwrap();
        assert_eq!(record.resolution.counters.as_ref().unwrap().handle, h);
        let engine = RateEngine::with_boot_time(0.0);
        engine.sample(&p, &mut record, 1.0).unwrap();
        assert_eq!(record.current.unwrap().sat, 2 + 3 + 5 + 7);
    }

    #[test]
    fn split_nocanput_counters_are_summed() {
        let mut p = MockPlatform::new();
        p.add_container(
            "net",
            "ce",
            0,
            "mac",
            &[("opackets", 1), ("rx_nocanput", 4), ("tx_nocanput", 6)],
        );
        let mut record = InterfaceRecord::new("ce0", 0);
        record.resolution = resolver::resolve(&p, "ce0").unwrap();
        let engine = RateEngine::with_boot_time(0.0);
        engine.sample(&p, &mut record, 1.0).unwrap();
        assert_eq!(record.current.unwrap().sat, 10);
    }

    #[test]
    fn speed_probe_failure_is_cached() {
        let mut p = MockPlatform::new();
        p.add_container("net", "wlan", 0, "wlan0", &[("opackets", 1)]);
        let mut record = InterfaceRecord::new("wlan0", 0);
        record.resolution = resolver::resolve(&p, "wlan0").unwrap();
        let engine = RateEngine::with_boot_time(0.0);

        engine.sample(&p, &mut record, 1.0).unwrap();
        assert_eq!(record.speed, 0);
        assert!(record.speed_probe_failed);

        // A later successful query would be ignored; the unknown is cached.
        p.set_speed_duplex("wlan0", 100_000_000, Duplex::Full);
        engine.sample(&p, &mut record, 2.0).unwrap();
        assert_eq!(record.speed, 0);
    }

    #[test]
    fn speed_comes_from_container_fields_when_present() {
        let mut p = MockPlatform::new();
        p.add_container(
            "net",
            "link",
            0,
            "eth1",
            &[("opackets", 1), ("ifspeed", 10_000_000), ("link_duplex", 1)],
        );
        let mut record = InterfaceRecord::new("eth1", 0);
        record.resolution = resolver::resolve(&p, "eth1").unwrap();
        let engine = RateEngine::with_boot_time(0.0);
        engine.sample(&p, &mut record, 1.0).unwrap();
        assert_eq!(record.speed, 10_000_000);
        assert_eq!(record.duplex, Duplex::Half);
    }

    #[test]
    fn shared_source_refreshes_link_state_during_sampling() {
        let mut p = MockPlatform::new();
        let mut record = gigabit_record(&mut p);
        let h = record.resolution.counters.as_ref().unwrap().handle.clone();
        assert!(record.resolution.shared_source);
        let engine = RateEngine::with_boot_time(0.0);

        engine.sample(&p, &mut record, 1.0).unwrap();
        assert_eq!(record.caps.link_up, Some(true));
        p.set_field(&h, "link_state", 0);
        engine.sample(&p, &mut record, 2.0).unwrap();
        assert_eq!(record.caps.link_up, Some(false));
    }
}
