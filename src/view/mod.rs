//! Plain-text row rendering for the binary.
//!
//! Column sets follow the classic interface-stat layout: a summary style
//! (throughput only), the full style with packet rates, average packet
//! sizes, utilization and saturation, and an extended style with the
//! error counters. Values pick their precision by magnitude so columns
//! stay aligned without losing small rates.

use chrono::{Local, TimeZone};

use crate::engine::RateReport;
use crate::registry::InterfaceRecord;
use crate::transport::{TcpRates, UdpRates};

/// Output style for interface rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Summary,
    Full,
    /// Full with separate read/write utilization columns.
    FullUtil,
    Extended,
    /// Extended with separate read/write utilization columns.
    ExtendedUtil,
}

/// Decimal places for a 7-wide rate column.
fn precision(value: f64) -> usize {
    if value < 100.0 {
        2
    } else if value < 100_000.0 {
        1
    } else {
        0
    }
}

/// Decimal places for a 5-wide column.
fn precision4(value: f64) -> usize {
    if value < 10.0 {
        2
    } else if value < 100.0 {
        1
    } else {
        0
    }
}

fn timestr(epoch: f64) -> String {
    match Local.timestamp_opt(epoch as i64, 0) {
        chrono::LocalResult::Single(dt) => dt.format("%H:%M:%S").to_string(),
        _ => "--:--:--".to_string(),
    }
}

/// Throughput unit conversion: KB/s by default, Mbit/s with `mbps`.
fn throughput(bytes_sec: f64, mbps: bool) -> f64 {
    if mbps {
        bytes_sec / 1024.0 / 128.0
    } else {
        bytes_sec / 1024.0
    }
}

pub fn header(style: Style, mbps: bool, now_epoch: f64) -> String {
    let (runit, wunit) = if mbps {
        ("rMbps", "wMbps")
    } else {
        ("rKB/s", "wKB/s")
    };
    match style {
        Style::Summary => format!("{:>8} {:>8} {:>14} {:>14}", "Time", "Int", runit, wunit),
        Style::Full => format!(
            "{:>8} {:>8} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>5} {:>6}",
            "Time", "Int", runit, wunit, "rPk/s", "wPk/s", "rAvs", "wAvs", "%Util", "Sat"
        ),
        Style::FullUtil => format!(
            "{:>8} {:>8} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7} {:>6} {:>6}",
            "Time", "Int", runit, wunit, "rPk/s", "wPk/s", "rAvs", "wAvs", "%rUtil", "%wUtil"
        ),
        Style::Extended => format!(
            "{:<10} {:>7} {:>7} {:>7} {:>7}  {:>5} {:>5} {:>5} {:>6}  {:>5}",
            timestr(now_epoch),
            runit,
            wunit,
            "RdPkt",
            "WrPkt",
            "IErr",
            "OErr",
            "Coll",
            "Sat",
            "%Util"
        ),
        Style::ExtendedUtil => format!(
            "{:<10} {:>7} {:>7} {:>7} {:>7}  {:>5} {:>5} {:>5} {:>6} {:>6} {:>6}",
            timestr(now_epoch),
            runit,
            wunit,
            "RdPkt",
            "WrPkt",
            "IErr",
            "OErr",
            "Coll",
            "Sat",
            "%rUtil",
            "%wUtil"
        ),
    }
}

pub fn interface_row(style: Style, name: &str, r: &RateReport, mbps: bool) -> String {
    let rk = throughput(r.rbytes_sec, mbps);
    let wk = throughput(r.wbytes_sec, mbps);
    match style {
        Style::Summary => format!(
            "{} {:>8} {:>14.3} {:>14.3}",
            timestr(r.timestamp),
            name,
            rk,
            wk
        ),
        Style::Full => format!(
            "{} {:>8} {:>7.*} {:>7.*} {:>7.*} {:>7.*} {:>7.*} {:>7.*} {:>5.*} {:>6.*}",
            timestr(r.timestamp),
            name,
            precision(rk),
            rk,
            precision(wk),
            wk,
            precision(r.rpackets_sec),
            r.rpackets_sec,
            precision(r.wpackets_sec),
            r.wpackets_sec,
            precision(r.ravg_size),
            r.ravg_size,
            precision(r.wavg_size),
            r.wavg_size,
            precision4(r.util),
            r.util,
            precision(r.sat_sec),
            r.sat_sec
        ),
        Style::FullUtil => format!(
            "{} {:>8} {:>7.*} {:>7.*} {:>7.*} {:>7.*} {:>7.*} {:>7.*} {:>6.*} {:>6.*}",
            timestr(r.timestamp),
            name,
            precision(rk),
            rk,
            precision(wk),
            wk,
            precision(r.rpackets_sec),
            r.rpackets_sec,
            precision(r.wpackets_sec),
            r.wpackets_sec,
            precision(r.ravg_size),
            r.ravg_size,
            precision(r.wavg_size),
            r.wavg_size,
            precision4(r.rutil),
            r.rutil,
            precision4(r.wutil),
            r.wutil
        ),
        Style::Extended => format!(
            "{:<10} {:>7.*} {:>7.*} {:>7.*} {:>7.*}  {:>5.*} {:>5.*} {:>5.*} {:>6.*}  {:>5.*}",
            name,
            precision(rk),
            rk,
            precision(wk),
            wk,
            precision(r.rpackets_sec),
            r.rpackets_sec,
            precision(r.wpackets_sec),
            r.wpackets_sec,
            precision4(r.ierr_sec),
            r.ierr_sec,
            precision4(r.oerr_sec),
            r.oerr_sec,
            precision4(r.coll_sec),
            r.coll_sec,
            precision4(r.sat_sec),
            r.sat_sec,
            precision4(r.util),
            r.util
        ),
        Style::ExtendedUtil => format!(
            "{:<10} {:>7.*} {:>7.*} {:>7.*} {:>7.*}  {:>5.*} {:>5.*} {:>5.*} {:>6.*} {:>6.*} {:>6.*}",
            name,
            precision(rk),
            rk,
            precision(wk),
            wk,
            precision(r.rpackets_sec),
            r.rpackets_sec,
            precision(r.wpackets_sec),
            r.wpackets_sec,
            precision4(r.ierr_sec),
            r.ierr_sec,
            precision4(r.oerr_sec),
            r.oerr_sec,
            precision4(r.coll_sec),
            r.coll_sec,
            precision4(r.sat_sec),
            r.sat_sec,
            precision4(r.rutil),
            r.rutil,
            precision4(r.wutil),
            r.wutil
        ),
    }
}

pub fn tcp_header(now_epoch: f64) -> String {
    format!(
        "{:>8} {:>7} {:>7} {:>5} {:>5} {:>5} {:>6} {:>6} {:>5}",
        timestr(now_epoch),
        "InSeg",
        "OutSeg",
        "Reset",
        "AttF",
        "%ReTX",
        "InConn",
        "OutCon",
        "Drops"
    )
}

pub fn tcp_row(r: &TcpRates) -> String {
    format!(
        "TCP      {:>7.*} {:>7.*} {:>5.*} {:>5.*} {:>5.*} {:>6.*} {:>6.*} {:>5.*}",
        precision(r.in_segs_sec),
        r.in_segs_sec,
        precision(r.out_segs_sec),
        r.out_segs_sec,
        precision4(r.resets_sec),
        r.resets_sec,
        precision4(r.attempt_fails_sec),
        r.attempt_fails_sec,
        precision4(r.retrans_pct),
        r.retrans_pct,
        precision4(r.in_conn_sec),
        r.in_conn_sec,
        precision4(r.out_conn_sec),
        r.out_conn_sec,
        precision4(r.drops_sec),
        r.drops_sec
    )
}

pub fn udp_header(now_epoch: f64) -> String {
    format!(
        "{:>8}          {:>7} {:>7}   {:>7} {:>7}",
        timestr(now_epoch),
        "InDG",
        "OutDG",
        "InErr",
        "OutErr"
    )
}

pub fn udp_row(r: &UdpRates) -> String {
    format!(
        "UDP               {:>7.*} {:>7.*}   {:>7.*} {:>7.*}",
        precision(r.in_datagrams_sec),
        r.in_datagrams_sec,
        precision(r.out_datagrams_sec),
        r.out_datagrams_sec,
        precision(r.in_errors_sec),
        r.in_errors_sec,
        precision(r.out_errors_sec),
        r.out_errors_sec
    )
}

pub fn listing_header() -> String {
    format!(
        "{:<12} {:>8} {:>8} {:>6} {:>5}",
        "Int", "Loopback", "Mbit/s", "Duplex", "State"
    )
}

pub fn listing_row(record: &InterfaceRecord) -> String {
    let up = record.caps.admin_up == Some(true) || record.caps.link_up == Some(true);
    let speed = if record.speed > 0 {
        format!("{}", record.speed / 1_000_000)
    } else {
        "-".to_string()
    };
    format!(
        "{:<12} {:>8} {:>8} {:>6} {:>5}",
        record.name,
        if record.caps.loopback { "Yes" } else { "No" },
        speed,
        record.duplex.as_str(),
        if up { "up" } else { "down" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RateReport;

    fn report() -> RateReport {
        RateReport {
            timestamp: 0.0,
            rbytes_sec: 102_400.0,
            wbytes_sec: 51_200.0,
            rpackets_sec: 80.0,
            wpackets_sec: 40.0,
            ravg_size: 1280.0,
            wavg_size: 1280.0,
            util: 12.5,
            sat_sec: 0.0,
            ..RateReport::default()
        }
    }

    #[test]
    fn full_row_reports_kilobytes() {
        let row = interface_row(Style::Full, "eth0", &report(), false);
        assert!(row.contains("eth0"));
        assert!(row.contains("100.0")); // 102400 B/s = 100 KB/s
        assert!(row.contains("50.00")); // 51200 B/s = 50 KB/s
        assert!(row.contains("12.5"));
    }

    #[test]
    fn mbps_conversion_applies() {
        let row = interface_row(Style::Summary, "eth0", &report(), true);
        // 102400 B/s = 0.781 Mbit/s
        assert!(row.contains("0.781"));
    }

    #[test]
    fn headers_match_styles() {
        assert!(header(Style::Summary, false, 0.0).contains("rKB/s"));
        assert!(header(Style::Summary, true, 0.0).contains("rMbps"));
        assert!(header(Style::Full, false, 0.0).contains("%Util"));
        assert!(header(Style::FullUtil, false, 0.0).contains("%rUtil"));
        assert!(header(Style::Extended, false, 0.0).contains("IErr"));
    }

    #[test]
    fn precision_narrows_as_values_grow() {
        assert_eq!(precision(5.0), 2);
        assert_eq!(precision(500.0), 1);
        assert_eq!(precision(500_000.0), 0);
        assert_eq!(precision4(5.0), 2);
        assert_eq!(precision4(50.0), 1);
        assert_eq!(precision4(500.0), 0);
    }

    #[test]
    fn listing_row_shows_link_parameters() {
        use crate::platform::Duplex;
        use crate::registry::InterfaceRecord;

        let mut record = InterfaceRecord::new("eth0", 0);
        record.speed = 1_000_000_000;
        record.duplex = Duplex::Full;
        record.caps.admin_up = Some(true);
        let row = listing_row(&record);
        assert!(row.contains("eth0"));
        assert!(row.contains("1000"));
        assert!(row.contains("full"));
        assert!(row.contains("up"));
    }
}
