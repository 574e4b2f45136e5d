//! Source resolution for interface and transport counters.
//!
//! The kernel may expose the same physical interface's statistics under
//! several naming conventions at once: a generic per-link container, a
//! driver "mac" sub-container, a driver/instance container, or a legacy
//! per-interface-name container. Resolution walks every container of the
//! "net" class, classifies each match with a fixed preference tier, and
//! keeps the highest-tier source per metric category (link state and
//! traffic counters are resolved independently).

use crate::platform::{Container, Platform, PlatformError, SourceHandle};

/// Preference rank of a counter source. Higher wins.
///
/// The order mirrors the kernel naming conventions from most modern and
/// specific to most legacy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    /// `<ifname>:*:*` - legacy container named after the interface.
    LegacyName,
    /// `<drv>:<n>:*` - driver/instance container with an unrelated name.
    Driver,
    /// `<drv>:<n>:<ifname>` - driver/instance container named after the
    /// interface.
    DriverInstance,
    /// `<drv>:<n>:mac` - driver "mac" sub-container.
    DriverMac,
    /// `link:*:<ifname>` - generic per-link container.
    Link,
}

/// One resolved counter source: its preference tier and opaque handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub tier: Tier,
    pub handle: SourceHandle,
}

/// Outcome of source resolution for one interface.
///
/// `None` in a category is a resolution miss: the interface is retained by
/// the registry but flagged accordingly. `shared_source` records that both
/// categories resolved to the identical container, which lets the sampling
/// pass refresh link state without a second container visit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub link_state: Option<ResolvedSource>,
    pub counters: Option<ResolvedSource>,
    pub shared_source: bool,
}

/// Splits an interface name into driver prefix and instance number.
///
/// The instance is the largest set of trailing digits; `bge0` splits into
/// `("bge", 0)` and `e1000g7001` into `("e1000g", 7001)`. Names with no
/// trailing digits, or nothing but digits, do not split - the driver-tier
/// matchers simply never apply to them.
pub fn split_ifname(name: &str) -> Option<(String, u32)> {
    let digits = name.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits == name.len() {
        return None;
    }
    let split_at = name.len() - digits;
    let instance = name[split_at..].parse::<u32>().ok()?;
    Some((name[..split_at].to_string(), instance))
}

type Matcher = fn(&Container, &str, Option<&(String, u32)>) -> Option<Tier>;

fn match_link(c: &Container, ifname: &str, _split: Option<&(String, u32)>) -> Option<Tier> {
    (c.module == "link" && c.name == ifname).then_some(Tier::Link)
}

fn match_driver_mac(c: &Container, _ifname: &str, split: Option<&(String, u32)>) -> Option<Tier> {
    let (drv, instance) = split?;
    (c.module == *drv && c.instance == *instance && c.name == "mac").then_some(Tier::DriverMac)
}

fn match_driver_instance(
    c: &Container,
    ifname: &str,
    split: Option<&(String, u32)>,
) -> Option<Tier> {
    let (drv, instance) = split?;
    (c.module == *drv && c.instance == *instance && c.name == ifname)
        .then_some(Tier::DriverInstance)
}

fn match_driver(c: &Container, _ifname: &str, split: Option<&(String, u32)>) -> Option<Tier> {
    let (drv, instance) = split?;
    (c.module == *drv && c.instance == *instance).then_some(Tier::Driver)
}

fn match_legacy_name(c: &Container, ifname: &str, _split: Option<&(String, u32)>) -> Option<Tier> {
    (c.module == ifname).then_some(Tier::LegacyName)
}

/// Ordered from most specific to most generic; the first match classifies
/// the container.
const MATCHERS: &[Matcher] = &[
    match_link,
    match_driver_mac,
    match_driver_instance,
    match_driver,
    match_legacy_name,
];

fn classify(c: &Container, ifname: &str, split: Option<&(String, u32)>) -> Option<Tier> {
    MATCHERS.iter().find_map(|m| m(c, ifname, split))
}

/// Keeps the higher-tier candidate; on an equal tier the earlier one wins.
///
/// Container order within one scan is whatever the platform reports, so an
/// equal-tier tie is not deterministic across namespace rebuilds.
fn keep_best(best: &mut Option<ResolvedSource>, tier: Tier, handle: &SourceHandle) {
    let better = match best {
        Some(current) => tier > current.tier,
        None => true,
    };
    if better {
        *best = Some(ResolvedSource {
            tier,
            handle: handle.clone(),
        });
    }
}

/// Resolves the best link-state and counter sources for `ifname`.
pub fn resolve(platform: &dyn Platform, ifname: &str) -> Result<Resolution, PlatformError> {
    let split = split_ifname(ifname);
    let mut link_state: Option<ResolvedSource> = None;
    let mut counters: Option<ResolvedSource> = None;

    for container in platform.containers("net")? {
        let Some(tier) = classify(&container, ifname, split.as_ref()) else {
            continue;
        };
        if platform.read_field(&container.handle, "link_state")?.is_some() {
            keep_best(&mut link_state, tier, &container.handle);
        }
        if platform.read_field(&container.handle, "opackets")?.is_some() {
            keep_best(&mut counters, tier, &container.handle);
        }
    }

    let shared_source = match (&link_state, &counters) {
        (Some(ls), Some(op)) => ls.handle == op.handle,
        _ => false,
    };
    Ok(Resolution {
        link_state,
        counters,
        shared_source,
    })
}

/// Resolves the process-wide counter container for a transport protocol.
///
/// There is exactly one TCP and one UDP counter set; no tier arbitration is
/// needed, the first `proto:*:proto` container wins.
pub fn resolve_transport(
    platform: &dyn Platform,
    proto: &str,
) -> Result<Option<SourceHandle>, PlatformError> {
    Ok(platform
        .containers("mib2")?
        .into_iter()
        .find(|c| c.module == proto && c.name == proto)
        .map(|c| c.handle))
}

/// Reads the link state from a resolved source; `Some(true)` means up.
pub fn read_link_state(
    platform: &dyn Platform,
    handle: &SourceHandle,
) -> Result<Option<bool>, PlatformError> {
    Ok(platform.read_field(handle, "link_state")?.map(|v| v != 0))
}
