//! nicmon - print network traffic, utilization, and protocol rates.
//!
//! Usage:
//!   nicmon              # one summary report covering the time since boot
//!   nicmon 1            # report every second, forever
//!   nicmon 1 5          # report every second, five times
//!   nicmon -i eth0 1    # track eth0 only
//!   nicmon -z 1         # skip zero-value lines
//!   nicmon -S eth0:1000fd 1   # pin eth0 to 1 Gbit/s full duplex

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use tikv_jemallocator::Jemalloc;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use nicmon::config::parse_speed_overrides;
use nicmon::engine::RateEngine;
use nicmon::platform::{Platform, ProcfsPlatform, RealFs};
use nicmon::registry::{Policy, Registry};
use nicmon::sched::{CycleControl, Scheduler, SysClock, install_resume_handler};
use nicmon::transport::{TcpTracker, UdpTracker};
use nicmon::view::{self, Style};

/// Lines of output between repeated headers for a single interface.
const PAGE_SIZE: usize = 20;

/// Network interface throughput, utilization, and protocol statistics.
#[derive(Parser)]
#[command(name = "nicmon", about = "Network interface statistics")]
struct Args {
    /// Update interval in seconds. Without it, print one report covering
    /// the time since boot.
    #[arg(value_name = "INTERVAL")]
    interval: Option<u64>,

    /// Number of reports, then exit. Requires an interval; without it the
    /// loop runs forever.
    #[arg(value_name = "COUNT")]
    count: Option<u64>,

    /// Track these interfaces only (comma-separated).
    #[arg(short = 'i', long = "interfaces", value_name = "LIST")]
    interfaces: Option<String>,

    /// Show non-local interfaces only (exclude loopback).
    #[arg(short = 'n', long)]
    nonlocal: bool,

    /// Summary output: throughput columns only.
    #[arg(short = 's', long)]
    summary: bool,

    /// Extended output: error, collision, and saturation columns.
    #[arg(short = 'x', long)]
    extended: bool,

    /// Skip lines with zero packet rates.
    #[arg(short = 'z', long)]
    skip_zero: bool,

    /// Show TCP statistics.
    #[arg(short = 't', long)]
    tcp: bool,

    /// Show UDP statistics.
    #[arg(short = 'u', long)]
    udp: bool,

    /// Equivalent to -x -t -u.
    #[arg(short = 'a', long)]
    all: bool,

    /// List interfaces and exit.
    #[arg(short = 'l', long)]
    list: bool,

    /// Report throughput in Mbit/s instead of KB/s.
    #[arg(short = 'M', long)]
    mbps: bool,

    /// Separate read and write utilization columns.
    #[arg(short = 'U', long = "split-util")]
    split_util: bool,

    /// Static interface speeds: name:mbps[fd|hd], comma-separated, for
    /// drivers that do not report link parameters.
    #[arg(short = 'S', long = "speed", value_name = "LIST")]
    speeds: Option<String>,

    /// Path to the proc filesystem.
    #[arg(long, default_value = "/proc")]
    proc_path: String,

    /// Path to the sys filesystem.
    #[arg(long, default_value = "/sys")]
    sys_path: String,
}

fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if args.count.is_some() && args.interval.is_none() {
        eprintln!("nicmon: a report count requires an interval");
        std::process::exit(1);
    }

    if let Err(e) = run(args) {
        eprintln!("nicmon: {}", e);
        std::process::exit(2);
    }
}

fn run(mut args: Args) -> Result<(), Box<dyn std::error::Error>> {
    if args.all {
        args.extended = true;
        args.tcp = true;
        args.udp = true;
    }

    // Interval-less invocations print a single summary-since-boot report.
    let (interval, cycles) = match args.interval {
        Some(secs) if secs > 0 => (Duration::from_secs(secs), args.count),
        Some(_) => return Err("interval must be positive".into()),
        None => (Duration::from_secs(1), Some(1)),
    };

    let style = if args.list {
        None
    } else if args.summary {
        Some(Style::Summary)
    } else if args.extended {
        Some(if args.split_util {
            Style::ExtendedUtil
        } else {
            Style::Extended
        })
    } else if args.tcp || args.udp {
        // Protocol-only report unless an interface style was asked for.
        None
    } else {
        Some(if args.split_util {
            Style::FullUtil
        } else {
            Style::Full
        })
    };

    let policy = Policy {
        tracked: args.interfaces.as_ref().map(|list| {
            list.split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }),
        nonlocal_only: args.nonlocal,
        speed_overrides: match &args.speeds {
            Some(list) => parse_speed_overrides(list)?,
            None => Vec::new(),
        },
    };
    let nonlocal = policy.nonlocal_only;

    let platform = ProcfsPlatform::new(RealFs::new(), &args.proc_path, &args.sys_path);
    let engine = RateEngine::new(&platform)?;
    let boot_time = platform.boot_time()?;
    let mut registry = Registry::new(policy);
    let mut tcp = args.tcp.then(|| TcpTracker::new(boot_time));
    let mut udp = args.udp.then(|| UdpTracker::new(boot_time));

    install_resume_handler()?;
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))?;
    }

    let mut lines = PAGE_SIZE;
    let mut scheduler = Scheduler::new(SysClock::new(), interval, cycles);
    scheduler.run(|_cycle| -> Result<CycleControl, Box<dyn std::error::Error>> {
        let now = epoch_now();
        let reportable = registry.refresh(&platform)?;
        if reportable == 0 {
            return Err("no matching interface".into());
        }

        for record in registry.iter_mut() {
            if record.caps.no_counters {
                continue;
            }
            engine.sample(&platform, record, now)?;
        }

        if args.list {
            println!("{}", view::listing_header());
            for record in registry.iter() {
                println!("{}", view::listing_row(record));
            }
            return Ok(CycleControl::Stop);
        }

        if let Some(tracker) = tcp.as_mut() {
            tracker.sample(&platform, now)?;
            if let Some(rates) = tracker.rates() {
                println!("{}", view::tcp_header(now));
                println!("{}", view::tcp_row(&rates));
            }
        }
        if let Some(tracker) = udp.as_mut() {
            tracker.sample(&platform, now)?;
            if let Some(rates) = tracker.rates() {
                println!("{}", view::udp_header(now));
                println!("{}", view::udp_row(&rates));
            }
        }

        if let Some(style) = style {
            // Repeat the header every page, or every cycle when more than
            // one interface prints.
            if args.tcp || args.udp || lines >= PAGE_SIZE {
                lines = 0;
                println!("{}", view::header(style, args.mbps, now));
            }
            let mut printed = 0;
            for record in registry.iter() {
                if !record.reportable(nonlocal) {
                    continue;
                }
                let Some(rates) = engine.rates(record) else {
                    continue;
                };
                if args.skip_zero && rates.rpackets_sec == 0.0 && rates.wpackets_sec == 0.0 {
                    continue;
                }
                println!("{}", view::interface_row(style, &record.name, &rates, args.mbps));
                printed += 1;
            }
            lines += if printed > 1 { PAGE_SIZE } else { printed };
        }

        use std::io::Write;
        std::io::stdout().flush()?;

        if stop.load(Ordering::Relaxed) {
            return Ok(CycleControl::Stop);
        }
        Ok(CycleControl::Continue)
    })?;
    Ok(())
}
