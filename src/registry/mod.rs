//! Live interface set across polling cycles.
//!
//! The registry reconciles each discovery pass against the records it
//! already holds: known interfaces are reused (keeping their samples, link
//! parameters, and resolved sources), new ones get capability detection
//! and source resolution, and anything absent from the pass is evicted
//! immediately. Source resolution is comparatively expensive and is only
//! redone when the platform's topology generation advances.

use std::collections::{HashMap, HashSet};

use crate::config::SpeedOverride;
use crate::engine::Sample;
use crate::platform::{Duplex, Platform, PlatformError};
use crate::resolver::{self, Resolution};

/// Capability and classification state of an interface.
///
/// Resolved on first sight (and again when the counter namespace is
/// rebuilt); distinct from per-cycle transient state, which lives in the
/// refresh pass itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Administratively up, `None` when the administrative layer cannot
    /// answer for this interface.
    pub admin_up: Option<bool>,
    pub loopback: bool,
    /// Kernel link state, `None` when no link-state source resolved.
    pub link_up: Option<bool>,
    /// No source reports link state for this interface.
    pub no_link_state: bool,
    /// No source reports traffic counters; the interface can never be
    /// reported on.
    pub no_counters: bool,
}

/// Everything tracked for one interface.
#[derive(Debug, Clone)]
pub struct InterfaceRecord {
    pub name: String,
    pub caps: Capabilities,
    pub resolution: Resolution,
    /// Topology generation the sources were resolved at.
    pub resolved_at: u64,
    /// Negotiated link speed in bits/sec, 0 when unknown.
    pub speed: u64,
    pub duplex: Duplex,
    /// Speed/duplex pinned by the static override table.
    pub speed_from_override: bool,
    /// A direct speed query already failed; do not repeat it.
    pub speed_probe_failed: bool,
    pub previous: Option<Sample>,
    pub current: Option<Sample>,
    seq: u64,
}

impl InterfaceRecord {
    pub fn new(name: &str, seq: u64) -> Self {
        Self {
            name: name.to_string(),
            caps: Capabilities::default(),
            resolution: Resolution::default(),
            resolved_at: 0,
            speed: 0,
            duplex: Duplex::Unknown,
            speed_from_override: false,
            speed_probe_failed: false,
            previous: None,
            current: None,
            seq,
        }
    }

    /// Discovery sequence number; iteration order follows it.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Whether this record may appear in output.
    ///
    /// Requires a usable counter source and a positive up signal from
    /// either the administrative layer or the kernel link state; an
    /// interface whose state cannot be determined stays registered but is
    /// never selected. Loopback is suppressed under the non-local policy.
    pub fn reportable(&self, nonlocal_only: bool) -> bool {
        if self.caps.no_counters {
            return false;
        }
        if nonlocal_only && self.caps.loopback {
            return false;
        }
        self.caps.admin_up == Some(true) || self.caps.link_up == Some(true)
    }
}

/// Which interfaces to track and how to report them.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    /// Allow-list of interface names; `None` tracks everything.
    pub tracked: Option<Vec<String>>,
    /// Suppress loopback interfaces from output.
    pub nonlocal_only: bool,
    /// Static interface speed/duplex overrides.
    pub speed_overrides: Vec<SpeedOverride>,
}

impl Policy {
    fn ignores(&self, name: &str) -> bool {
        match &self.tracked {
            Some(names) => !names.iter().any(|n| n == name),
            None => false,
        }
    }

    fn override_for(&self, name: &str) -> Option<&SpeedOverride> {
        self.speed_overrides.iter().find(|o| o.name == name)
    }
}

/// Registry of tracked interfaces, keyed by name.
#[derive(Default)]
pub struct Registry {
    policy: Policy,
    records: HashMap<String, InterfaceRecord>,
    next_seq: u64,
}

impl Registry {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            records: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Number of registered interfaces.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&InterfaceRecord> {
        self.records.get(name)
    }

    /// Records in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &InterfaceRecord> {
        let mut records: Vec<&InterfaceRecord> = self.records.values().collect();
        records.sort_by_key(|r| r.seq);
        records.into_iter()
    }

    /// Mutable records in discovery order, for the sampling pass.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut InterfaceRecord> {
        let mut records: Vec<&mut InterfaceRecord> = self.records.values_mut().collect();
        records.sort_by_key(|r| r.seq);
        records.into_iter()
    }

    /// Reconciles the registry against a fresh discovery pass.
    ///
    /// Returns the number of currently reportable interfaces.
    pub fn refresh(&mut self, platform: &dyn Platform) -> Result<usize, PlatformError> {
        let generation = platform.topology_generation();
        let mut seen: HashSet<String> = HashSet::new();

        for name in platform.interfaces()? {
            if self.policy.ignores(&name) {
                continue;
            }
            if !seen.insert(name.clone()) {
                // The platform listed the same interface twice.
                continue;
            }
            if !self.records.contains_key(&name) {
                let record = self.admit(platform, &name, generation)?;
                tracing::debug!(interface = %name, "interface appeared");
                self.records.insert(name, record);
                continue;
            }
            if let Some(record) = self.records.get_mut(&name) {
                if record.resolved_at != generation {
                    apply_resolution(platform, record, generation)?;
                }
                refresh_state(platform, record)?;
            }
        }

        self.records.retain(|name, _| {
            let keep = seen.contains(name);
            if !keep {
                tracing::debug!(interface = %name, "interface disappeared, evicting");
            }
            keep
        });

        let nonlocal = self.policy.nonlocal_only;
        Ok(self
            .records
            .values()
            .filter(|r| r.reportable(nonlocal))
            .count())
    }

    fn admit(
        &mut self,
        platform: &dyn Platform,
        name: &str,
        generation: u64,
    ) -> Result<InterfaceRecord, PlatformError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let mut record = InterfaceRecord::new(name, seq);

        if let Some(ovr) = self.policy.override_for(name) {
            record.speed = ovr.speed;
            record.duplex = ovr.duplex;
            record.speed_from_override = true;
        }
        apply_resolution(platform, &mut record, generation)?;
        refresh_state(platform, &mut record)?;
        Ok(record)
    }
}

fn apply_resolution(
    platform: &dyn Platform,
    record: &mut InterfaceRecord,
    generation: u64,
) -> Result<(), PlatformError> {
    record.resolution = resolver::resolve(platform, &record.name)?;
    record.caps.no_link_state = record.resolution.link_state.is_none();
    record.caps.no_counters = record.resolution.counters.is_none();
    record.resolved_at = generation;
    Ok(())
}

/// Per-cycle state refresh: administrative flags and, unless the sampling
/// pass will read it from the shared container anyway, the link state.
fn refresh_state(
    platform: &dyn Platform,
    record: &mut InterfaceRecord,
) -> Result<(), PlatformError> {
    match platform.admin_flags(&record.name)? {
        Some(flags) => {
            record.caps.admin_up = Some(flags.up);
            record.caps.loopback = flags.loopback;
        }
        None => {
            record.caps.admin_up = None;
            record.caps.loopback = record.caps.loopback || record.name == "lo";
        }
    }
    if !record.resolution.shared_source
        && let Some(ls) = &record.resolution.link_state
    {
        record.caps.link_up = resolver::read_link_state(platform, &ls.handle)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RateEngine;
    use crate::platform::mock::MockPlatform;

    fn up_interface(p: &mut MockPlatform, name: &str) {
        p.add_interface(name);
        p.add_container(
            "net",
            name,
            0,
            name,
            &[("opackets", 10), ("rbytes", 100), ("obytes", 100), ("ipackets", 10)],
        );
        p.set_admin_flags(name, true, false);
    }

    #[test]
    fn samples_survive_across_refreshes() {
        let mut p = MockPlatform::new();
        up_interface(&mut p, "eth0");
        let mut registry = Registry::new(Policy::default());
        registry.refresh(&p).unwrap();

        let engine = RateEngine::with_boot_time(0.0);
        for record in registry.iter_mut() {
            engine.sample(&p, record, 1.0).unwrap();
        }
        let before = registry.get("eth0").unwrap().clone();
        assert!(before.current.is_some());

        registry.refresh(&p).unwrap();
        let after = registry.get("eth0").unwrap();
        assert_eq!(after.previous, before.previous);
        assert_eq!(after.current, before.current);
        assert_eq!(after.resolution, before.resolution);
    }

    #[test]
    fn absent_interfaces_are_evicted_unconditionally() {
        let mut p = MockPlatform::new();
        up_interface(&mut p, "eth0");
        up_interface(&mut p, "eth1");
        let mut registry = Registry::new(Policy::default());
        registry.refresh(&p).unwrap();
        assert_eq!(registry.len(), 2);

        p.remove_interface("eth1");
        registry.refresh(&p).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("eth1").is_none());
    }

    #[test]
    fn duplicate_discovery_entries_collapse_to_one_record() {
        let mut p = MockPlatform::new();
        up_interface(&mut p, "eth0");
        p.add_interface("eth0");
        let mut registry = Registry::new(Policy::default());
        registry.refresh(&p).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn allow_list_skips_at_discovery() {
        let mut p = MockPlatform::new();
        up_interface(&mut p, "eth0");
        up_interface(&mut p, "lo");
        let mut registry = Registry::new(Policy {
            tracked: Some(vec!["eth0".to_string()]),
            ..Policy::default()
        });
        let count = registry.refresh(&p).unwrap();
        assert_eq!(count, 1);
        assert!(registry.get("lo").is_none());
    }

    #[test]
    fn loopback_under_nonlocal_policy_is_tracked_but_not_reportable() {
        let mut p = MockPlatform::new();
        up_interface(&mut p, "eth0");
        up_interface(&mut p, "lo");
        p.set_admin_flags("lo", true, true);
        let mut registry = Registry::new(Policy {
            nonlocal_only: true,
            ..Policy::default()
        });
        let count = registry.refresh(&p).unwrap();
        assert_eq!(count, 1);
        assert!(registry.get("lo").is_some());
        assert!(!registry.get("lo").unwrap().reportable(true));
    }

    #[test]
    fn interface_without_counters_is_registered_but_never_reportable() {
        let mut p = MockPlatform::new();
        p.add_interface("ppp0");
        p.set_admin_flags("ppp0", true, false);
        let mut registry = Registry::new(Policy::default());
        let count = registry.refresh(&p).unwrap();
        assert_eq!(count, 0);
        let record = registry.get("ppp0").unwrap();
        assert!(record.caps.no_counters);
        assert!(record.caps.no_link_state);
        assert!(!record.reportable(false));
    }

    #[test]
    fn undeterminable_state_is_never_selected_for_output() {
        let mut p = MockPlatform::new();
        p.add_interface("mystery0");
        p.add_container("net", "mystery0", 0, "mystery0", &[("opackets", 1)]);
        // No admin flags, no link-state source.
        let mut registry = Registry::new(Policy::default());
        let count = registry.refresh(&p).unwrap();
        assert_eq!(count, 0);
        let record = registry.get("mystery0").unwrap();
        assert_eq!(record.caps.admin_up, None);
        assert_eq!(record.caps.link_up, None);
    }

    #[test]
    fn link_state_alone_makes_an_interface_reportable() {
        let mut p = MockPlatform::new();
        p.add_interface("bge0");
        p.add_container("net", "link", 0, "bge0", &[("opackets", 1), ("link_state", 1)]);
        let mut registry = Registry::new(Policy::default());
        let count = registry.refresh(&p).unwrap();
        // Shared source: link state is read by the sampling pass, so after
        // the first refresh alone the state is still unknown.
        assert_eq!(count, 0);

        let engine = RateEngine::with_boot_time(0.0);
        for record in registry.iter_mut() {
            engine.sample(&p, record, 1.0).unwrap();
        }
        assert_eq!(registry.refresh(&p).unwrap(), 1);
    }

    #[test]
    fn sources_are_reresolved_only_when_generation_advances() {
        let mut p = MockPlatform::new();
        p.add_interface("bge0");
        p.add_container("net", "bge0", 0, "bge0", &[("opackets", 1), ("link_state", 1)]);
        p.set_admin_flags("bge0", true, false);
        let mut registry = Registry::new(Policy::default());
        registry.refresh(&p).unwrap();
        let low_tier = registry.get("bge0").unwrap().resolution.clone();

        // A better source appears, but the namespace has not signalled a
        // rebuild: resolution must be reused.
        p.add_container("net", "link", 0, "bge0", &[("opackets", 1), ("link_state", 1)]);
        registry.refresh(&p).unwrap();
        assert_eq!(registry.get("bge0").unwrap().resolution, low_tier);

        p.bump_generation();
        registry.refresh(&p).unwrap();
        let resolved = &registry.get("bge0").unwrap().resolution;
        assert_ne!(*resolved, low_tier);
        assert_eq!(
            resolved.counters.as_ref().unwrap().tier,
            crate::resolver::Tier::Link
        );
    }

    #[test]
    fn iteration_follows_discovery_order() {
        let mut p = MockPlatform::new();
        up_interface(&mut p, "eth1");
        up_interface(&mut p, "eth0");
        let mut registry = Registry::new(Policy::default());
        registry.refresh(&p).unwrap();

        let names: Vec<&str> = registry.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["eth1", "eth0"]);

        // A later arrival sorts after the survivors.
        up_interface(&mut p, "wlan0");
        registry.refresh(&p).unwrap();
        let names: Vec<&str> = registry.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["eth1", "eth0", "wlan0"]);
    }

    #[test]
    fn speed_overrides_pin_link_parameters() {
        let mut p = MockPlatform::new();
        up_interface(&mut p, "eth0");
        let mut registry = Registry::new(Policy {
            speed_overrides: vec![SpeedOverride {
                name: "eth0".to_string(),
                speed: 100_000_000,
                duplex: Duplex::Half,
            }],
            ..Policy::default()
        });
        registry.refresh(&p).unwrap();
        let record = registry.get("eth0").unwrap();
        assert_eq!(record.speed, 100_000_000);
        assert_eq!(record.duplex, Duplex::Half);
        assert!(record.speed_from_override);
    }
}
