//! Pre-built `MockFs` scenarios.

use super::filesystem::MockFs;

const NET_DEV_TYPICAL: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo: 12345678    9876    0    0    0     0          0         0 12345678    9876    0    0    0     0       0          0
  eth0: 987654321  654321    5   10    1     0          0         0 123456789   98765    2    5    2     3       4          0
";

const PROC_STAT_TYPICAL: &str = "\
cpu  10000 200 5000 80000 300 0 100 0 0 0
ctxt 500000
btime 1700000000
processes 10000
procs_running 2
procs_blocked 0
";

const NET_SNMP_TYPICAL: &str = "\
Tcp: RtoAlgorithm RtoMin RtoMax MaxConn ActiveOpens PassiveOpens AttemptFails EstabResets CurrEstab InSegs OutSegs RetransSegs InErrs OutRsts InCsumErrors
Tcp: 1 200 120000 -1 1000 500 7 20 50 100000 90000 450 3 60 0
Udp: InDatagrams NoPorts InErrors OutDatagrams RcvbufErrors SndbufErrors InCsumErrors
Udp: 5000 2 4 4500 0 1 0
";

const NET_NETSTAT_TYPICAL: &str = "\
TcpExt: SyncookiesSent SyncookiesRecv ListenOverflows ListenDrops TCPTimeouts
TcpExt: 0 0 12 30 77
";

impl MockFs {
    /// A small healthy system: loopback plus a gigabit full-duplex `eth0`
    /// with a few errors and drops, TCP/UDP tables present.
    pub fn typical_system() -> Self {
        let mut fs = Self::new();
        fs.add_file("/proc/net/dev", NET_DEV_TYPICAL);
        fs.add_file("/proc/stat", PROC_STAT_TYPICAL);
        fs.add_file("/proc/net/snmp", NET_SNMP_TYPICAL);
        fs.add_file("/proc/net/netstat", NET_NETSTAT_TYPICAL);
        fs.add_file("/sys/class/net/eth0/carrier", "1\n");
        fs.add_file("/sys/class/net/eth0/speed", "1000\n");
        fs.add_file("/sys/class/net/eth0/duplex", "full\n");
        fs.add_file("/sys/class/net/eth0/flags", "0x1003\n");
        fs.add_file("/sys/class/net/lo/flags", "0x10049\n");
        fs
    }
}
