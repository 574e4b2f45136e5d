//! Linux platform: counters from `/proc`, link attributes from `/sys`.
//!
//! Interface traffic counters come from `/proc/net/dev`, transport protocol
//! counters from `/proc/net/snmp` (plus `/proc/net/netstat` for the listen
//! queue), boot time from the `btime` line of `/proc/stat`, and link state,
//! administrative flags, speed and duplex from `/sys/class/net/<if>/`.

use std::collections::HashMap;
use std::path::Path;

use crate::platform::traits::FileSystem;
use crate::platform::{
    AdminFlags, Container, Duplex, Platform, PlatformError, SourceHandle,
};

/// Expected header of `/proc/net/dev`; anything else means the kernel
/// contract changed and every derived figure would be untrustworthy.
const NET_DEV_HEADER_FIELDS: usize = 16;

const IFF_UP: u64 = 0x1;
const IFF_LOOPBACK: u64 = 0x8;

/// One parsed `/proc/net/dev` row: interface name plus the 16 counter
/// columns (8 receive, 8 transmit).
struct NetDevRow {
    name: String,
    cols: [u64; NET_DEV_HEADER_FIELDS],
}

/// Platform implementation backed by procfs and sysfs.
pub struct ProcfsPlatform<F: FileSystem> {
    fs: F,
    proc_path: String,
    sys_path: String,
}

impl<F: FileSystem> ProcfsPlatform<F> {
    /// Creates a new procfs platform.
    ///
    /// # Arguments
    /// * `fs` - Filesystem implementation (real or mock)
    /// * `proc_path` - Base path of the proc filesystem (usually "/proc")
    /// * `sys_path` - Base path of the sys filesystem (usually "/sys")
    pub fn new(fs: F, proc_path: impl Into<String>, sys_path: impl Into<String>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            sys_path: sys_path.into(),
        }
    }

    fn net_dev_path(&self) -> String {
        format!("{}/net/dev", self.proc_path)
    }

    fn sys_attr_path(&self, name: &str, attr: &str) -> String {
        format!("{}/class/net/{}/{}", self.sys_path, name, attr)
    }

    fn read_net_dev(&self) -> Result<Vec<NetDevRow>, PlatformError> {
        let path = self.net_dev_path();
        let content = self.fs.read_to_string(Path::new(&path))?;
        parse_net_dev(&content, &path)
    }

    /// Reads a sysfs attribute for an interface, trimmed.
    ///
    /// Unreadable attributes are normal (virtual devices, carrier while the
    /// link is down) and map to `None`.
    fn sys_attr(&self, name: &str, attr: &str) -> Option<String> {
        let path = self.sys_attr_path(name, attr);
        match self.fs.read_to_string(Path::new(&path)) {
            Ok(s) => Some(s.trim().to_string()),
            Err(e) => {
                tracing::debug!(interface = name, attr, error = %e, "sysfs attribute unreadable");
                None
            }
        }
    }

    fn net_field(&self, name: &str, field: &str) -> Result<Option<u64>, PlatformError> {
        // Link parameters live in sysfs, not in the counter table.
        match field {
            "link_state" => {
                return Ok(self
                    .sys_attr(name, "carrier")
                    .and_then(|s| s.parse::<u64>().ok()));
            }
            "ifspeed" => {
                let speed = self
                    .sys_attr(name, "speed")
                    .and_then(|s| s.parse::<i64>().ok())
                    .filter(|mbps| *mbps > 0)
                    .map(|mbps| mbps as u64 * 1_000_000);
                return Ok(speed);
            }
            "link_duplex" => {
                return Ok(self.sys_attr(name, "duplex").and_then(|s| match s.as_str() {
                    "full" => Some(2),
                    "half" => Some(1),
                    _ => None,
                }));
            }
            _ => {}
        }

        let rows = self.read_net_dev()?;
        let Some(row) = rows.iter().find(|r| r.name == name) else {
            return Ok(None);
        };
        let c = &row.cols;
        // Column layout: rx bytes packets errs drop fifo frame compressed
        // multicast, then tx bytes packets errs drop fifo colls carrier
        // compressed.
        let value = match field {
            "rbytes" => Some(c[0]),
            "ipackets" => Some(c[1]),
            "ierrors" => Some(c[2]),
            "obytes" => Some(c[8]),
            "opackets" => Some(c[9]),
            "oerrors" => Some(c[10]),
            "collisions" => Some(c[13]),
            // Receive-side buffer exhaustion: drops plus fifo overruns.
            "norcvbuf" => Some(c[3] + c[4]),
            // Transmit-side: drops plus fifo overruns.
            "noxmtbuf" => Some(c[11] + c[12]),
            // Carrier losses are the closest procfs has to deferred
            // transmits.
            "defer_xmts" => Some(c[14]),
            _ => None,
        };
        Ok(value)
    }

    fn snmp_field(&self, proto: &str, field: &str) -> Result<Option<u64>, PlatformError> {
        if proto == "tcp" && field == "listen_drops" {
            return self.listen_drops();
        }
        let snmp_name = match (proto, field) {
            ("tcp", "in_segs") => "InSegs",
            ("tcp", "out_segs") => "OutSegs",
            ("tcp", "retrans_segs") => "RetransSegs",
            ("tcp", "estab_resets") => "EstabResets",
            ("tcp", "out_rsts") => "OutRsts",
            ("tcp", "attempt_fails") => "AttemptFails",
            ("tcp", "active_opens") => "ActiveOpens",
            ("tcp", "passive_opens") => "PassiveOpens",
            ("udp", "in_datagrams") => "InDatagrams",
            ("udp", "out_datagrams") => "OutDatagrams",
            ("udp", "in_errors") => "InErrors",
            ("udp", "out_errors") => "SndbufErrors",
            _ => return Ok(None),
        };
        let prefix = if proto == "tcp" { "Tcp" } else { "Udp" };
        let path = format!("{}/net/snmp", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        let table = snmp_table(&content, prefix, &path)?;
        Ok(table.get(snmp_name).copied())
    }

    /// Listen-queue drops: TcpExt `ListenOverflows + ListenDrops` from
    /// `/proc/net/netstat`.
    fn listen_drops(&self) -> Result<Option<u64>, PlatformError> {
        let path = format!("{}/net/netstat", self.proc_path);
        if !self.fs.exists(Path::new(&path)) {
            return Ok(None);
        }
        let content = self.fs.read_to_string(Path::new(&path))?;
        let table = snmp_table(&content, "TcpExt", &path)?;
        match (table.get("ListenOverflows"), table.get("ListenDrops")) {
            (None, None) => Ok(None),
            (overflows, drops) => {
                Ok(Some(overflows.copied().unwrap_or(0) + drops.copied().unwrap_or(0)))
            }
        }
    }
}

impl<F: FileSystem> Platform for ProcfsPlatform<F> {
    fn interfaces(&self) -> Result<Vec<String>, PlatformError> {
        let rows = self.read_net_dev()?;
        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    fn containers(&self, class: &str) -> Result<Vec<Container>, PlatformError> {
        match class {
            "net" => {
                let rows = self.read_net_dev()?;
                Ok(rows
                    .into_iter()
                    .map(|r| Container {
                        class: "net".to_string(),
                        module: r.name.clone(),
                        instance: 0,
                        name: r.name.clone(),
                        handle: SourceHandle::new(format!("net:{}", r.name)),
                    })
                    .collect())
            }
            "mib2" => {
                let path = format!("{}/net/snmp", self.proc_path);
                if !self.fs.exists(Path::new(&path)) {
                    return Ok(Vec::new());
                }
                Ok(["tcp", "udp"]
                    .into_iter()
                    .map(|proto| Container {
                        class: "mib2".to_string(),
                        module: proto.to_string(),
                        instance: 0,
                        name: proto.to_string(),
                        handle: SourceHandle::new(format!("mib2:{}", proto)),
                    })
                    .collect())
            }
            _ => Ok(Vec::new()),
        }
    }

    fn read_field(
        &self,
        handle: &SourceHandle,
        field: &str,
    ) -> Result<Option<u64>, PlatformError> {
        if let Some(name) = handle.as_str().strip_prefix("net:") {
            return self.net_field(name, field);
        }
        if let Some(proto) = handle.as_str().strip_prefix("mib2:") {
            return self.snmp_field(proto, field);
        }
        Ok(None)
    }

    fn admin_flags(&self, name: &str) -> Result<Option<AdminFlags>, PlatformError> {
        let path = self.sys_attr_path(name, "flags");
        if !self.fs.exists(Path::new(&path)) {
            return Ok(None);
        }
        let content = self.fs.read_to_string(Path::new(&path))?;
        let raw = content.trim().trim_start_matches("0x");
        let bits = u64::from_str_radix(raw, 16).map_err(|_| PlatformError::Format {
            source: path,
            message: format!("expected hex flags, got {:?}", content.trim()),
        })?;
        Ok(Some(AdminFlags {
            up: bits & IFF_UP != 0,
            loopback: bits & IFF_LOOPBACK != 0,
        }))
    }

    fn boot_time(&self) -> Result<f64, PlatformError> {
        let path = format!("{}/stat", self.proc_path);
        let content = self.fs.read_to_string(Path::new(&path))?;
        for line in content.lines() {
            if let Some(rest) = line.strip_prefix("btime ")
                && let Ok(secs) = rest.trim().parse::<u64>()
            {
                return Ok(secs as f64);
            }
        }
        Err(PlatformError::Format {
            source: path,
            message: "no btime line".to_string(),
        })
    }

    fn link_speed_duplex(&self, name: &str) -> Result<Option<(u64, Duplex)>, PlatformError> {
        let Some(speed) = self
            .sys_attr(name, "speed")
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|mbps| *mbps > 0)
        else {
            return Ok(None);
        };
        let duplex = match self.sys_attr(name, "duplex").as_deref() {
            Some("full") => Duplex::Full,
            Some("half") => Duplex::Half,
            _ => Duplex::Unknown,
        };
        Ok(Some((speed as u64 * 1_000_000, duplex)))
    }

    fn topology_generation(&self) -> u64 {
        // Procfs containers are per-interface; a new interface is resolved
        // on first observation, so the namespace never needs a rebuild
        // signal.
        0
    }
}

fn parse_net_dev(content: &str, path: &str) -> Result<Vec<NetDevRow>, PlatformError> {
    let malformed = |message: String| PlatformError::Format {
        source: path.to_string(),
        message,
    };

    let mut lines = content.lines();
    let header_ok = matches!(lines.next(), Some(l) if l.contains("Inter-|"))
        && matches!(lines.next(), Some(l) if l.contains("face |bytes"));
    if !header_ok {
        return Err(malformed("unrecognized header".to_string()));
    }

    let mut rows = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, counters) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("no interface separator in {:?}", line)))?;
        let mut cols = [0u64; NET_DEV_HEADER_FIELDS];
        let mut n = 0;
        for field in counters.split_whitespace() {
            if n == NET_DEV_HEADER_FIELDS {
                n += 1;
                break;
            }
            cols[n] = field
                .parse::<u64>()
                .map_err(|_| malformed(format!("non-numeric counter {:?}", field)))?;
            n += 1;
        }
        if n != NET_DEV_HEADER_FIELDS {
            return Err(malformed(format!(
                "expected {} counters for {}, found {}",
                NET_DEV_HEADER_FIELDS,
                name.trim(),
                n
            )));
        }
        rows.push(NetDevRow {
            name: name.trim().to_string(),
            cols,
        });
    }
    Ok(rows)
}

/// Parses one table of an SNMP-style header/value line pair file.
///
/// `/proc/net/snmp` and `/proc/net/netstat` interleave `Prefix: k1 k2 ...`
/// key lines with `Prefix: v1 v2 ...` value lines.
fn snmp_table(
    content: &str,
    prefix: &str,
    path: &str,
) -> Result<HashMap<String, u64>, PlatformError> {
    let tag = format!("{}:", prefix);
    let mut keys: Option<Vec<&str>> = None;
    for line in content.lines() {
        let Some(rest) = line.strip_prefix(&tag) else {
            continue;
        };
        match keys.take() {
            None => keys = Some(rest.split_whitespace().collect()),
            Some(names) => {
                let values: Vec<&str> = rest.split_whitespace().collect();
                if values.len() != names.len() {
                    return Err(PlatformError::Format {
                        source: path.to_string(),
                        message: format!(
                            "{} header has {} fields but value row has {}",
                            prefix,
                            names.len(),
                            values.len()
                        ),
                    });
                }
                let mut table = HashMap::with_capacity(names.len());
                for (name, value) in names.iter().zip(values) {
                    // Signed fields exist (Tcp MaxConn is -1); clamp them,
                    // the counters we care about are non-negative.
                    let value = value.parse::<i64>().map_err(|_| PlatformError::Format {
                        source: path.to_string(),
                        message: format!("non-numeric {} value {:?}", prefix, value),
                    })?;
                    table.insert(name.to_string(), value.max(0) as u64);
                }
                return Ok(table);
            }
        }
    }
    // Absent table: not every kernel exposes every prefix.
    Ok(HashMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::MockFs;

    fn platform(fs: MockFs) -> ProcfsPlatform<MockFs> {
        ProcfsPlatform::new(fs, "/proc", "/sys")
    }

    #[test]
    fn lists_interfaces_from_net_dev() {
        let p = platform(MockFs::typical_system());
        let names = p.interfaces().unwrap();
        assert_eq!(names, vec!["lo", "eth0"]);
    }

    #[test]
    fn net_containers_resolve_by_interface_name() {
        let p = platform(MockFs::typical_system());
        let containers = p.containers("net").unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[1].class, "net");
        assert_eq!(containers[1].module, "eth0");
        assert_eq!(containers[1].name, "eth0");
        assert_eq!(containers[1].handle.as_str(), "net:eth0");
    }

    #[test]
    fn reads_traffic_counters_with_procfs_column_mapping() {
        let p = platform(MockFs::typical_system());
        let h = SourceHandle::new("net:eth0");
        assert_eq!(p.read_field(&h, "rbytes").unwrap(), Some(987654321));
        assert_eq!(p.read_field(&h, "ipackets").unwrap(), Some(654321));
        assert_eq!(p.read_field(&h, "ierrors").unwrap(), Some(5));
        assert_eq!(p.read_field(&h, "obytes").unwrap(), Some(123456789));
        assert_eq!(p.read_field(&h, "opackets").unwrap(), Some(98765));
        assert_eq!(p.read_field(&h, "oerrors").unwrap(), Some(2));
        assert_eq!(p.read_field(&h, "collisions").unwrap(), Some(3));
        // norcvbuf folds rx drop (10) + rx fifo (1); noxmtbuf tx drop (5)
        // + tx fifo (2).
        assert_eq!(p.read_field(&h, "norcvbuf").unwrap(), Some(11));
        assert_eq!(p.read_field(&h, "noxmtbuf").unwrap(), Some(7));
        assert_eq!(p.read_field(&h, "defer_xmts").unwrap(), Some(4));
        assert_eq!(p.read_field(&h, "rbytes64").unwrap(), None);
    }

    #[test]
    fn link_attributes_come_from_sysfs() {
        let p = platform(MockFs::typical_system());
        let h = SourceHandle::new("net:eth0");
        assert_eq!(p.read_field(&h, "link_state").unwrap(), Some(1));
        assert_eq!(p.read_field(&h, "ifspeed").unwrap(), Some(1_000_000_000));
        assert_eq!(p.read_field(&h, "link_duplex").unwrap(), Some(2));
        assert_eq!(
            p.link_speed_duplex("eth0").unwrap(),
            Some((1_000_000_000, Duplex::Full))
        );
    }

    #[test]
    fn unknown_speed_reports_none_and_admin_flags_parse() {
        let mut fs = MockFs::typical_system();
        fs.add_file("/sys/class/net/eth0/speed", "-1\n");
        let p = platform(fs);
        assert_eq!(p.link_speed_duplex("eth0").unwrap(), None);

        assert_eq!(
            p.admin_flags("eth0").unwrap(),
            Some(AdminFlags {
                up: true,
                loopback: false
            })
        );
        assert_eq!(
            p.admin_flags("lo").unwrap(),
            Some(AdminFlags {
                up: true,
                loopback: true
            })
        );
        assert_eq!(p.admin_flags("wlan9").unwrap(), None);
    }

    #[test]
    fn boot_time_from_proc_stat_btime() {
        let p = platform(MockFs::typical_system());
        assert_eq!(p.boot_time().unwrap(), 1700000000.0);
    }

    #[test]
    fn transport_containers_and_fields() {
        let p = platform(MockFs::typical_system());
        let containers = p.containers("mib2").unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].module, "tcp");

        let tcp = SourceHandle::new("mib2:tcp");
        assert_eq!(p.read_field(&tcp, "in_segs").unwrap(), Some(100000));
        assert_eq!(p.read_field(&tcp, "out_segs").unwrap(), Some(90000));
        assert_eq!(p.read_field(&tcp, "retrans_segs").unwrap(), Some(450));
        assert_eq!(p.read_field(&tcp, "attempt_fails").unwrap(), Some(7));
        // ListenOverflows (12) + ListenDrops (30) from /proc/net/netstat.
        assert_eq!(p.read_field(&tcp, "listen_drops").unwrap(), Some(42));

        let udp = SourceHandle::new("mib2:udp");
        assert_eq!(p.read_field(&udp, "in_datagrams").unwrap(), Some(5000));
        assert_eq!(p.read_field(&udp, "out_errors").unwrap(), Some(1));
    }

    #[test]
    fn malformed_net_dev_is_a_format_error() {
        let mut fs = MockFs::new();
        fs.add_file("/proc/net/dev", "garbage\nmore garbage\n");
        let p = platform(fs);
        assert!(matches!(
            p.interfaces(),
            Err(PlatformError::Format { .. })
        ));

        let mut fs = MockFs::typical_system();
        fs.add_file(
            "/proc/net/dev",
            "Inter-|   Receive                                                |  Transmit\n \
             face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed\n \
             eth0: 1 2 3\n",
        );
        let p = platform(fs);
        assert!(matches!(
            p.interfaces(),
            Err(PlatformError::Format { .. })
        ));
    }
}
