//! Run configuration helpers.
//!
//! The binary owns CLI parsing; this module holds the pieces the library
//! needs: the static speed/duplex override table and its parser.

use crate::platform::Duplex;

/// Static speed/duplex override for one interface, for drivers that do not
/// report link parameters. Speed is in bits per second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedOverride {
    pub name: String,
    pub speed: u64,
    pub duplex: Duplex,
}

/// Error type for override-list parsing failures.
#[derive(Debug, Clone)]
pub struct SpeedParseError {
    pub input: String,
    pub message: String,
}

impl std::fmt::Display for SpeedParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid speed override '{}': {}",
            self.input, self.message
        )
    }
}

impl std::error::Error for SpeedParseError {}

/// Parses a comma-separated override list of `name:mbps[fd|hd]` entries.
///
/// The speed is given in megabits per second; the optional suffix selects
/// the duplex mode and defaults to full.
///
/// # Examples
///
/// ```
/// use nicmon::config::parse_speed_overrides;
///
/// let list = parse_speed_overrides("eth0:1000fd,eth1:100hd").unwrap();
/// assert_eq!(list.len(), 2);
/// assert_eq!(list[0].speed, 1_000_000_000);
/// ```
pub fn parse_speed_overrides(list: &str) -> Result<Vec<SpeedOverride>, SpeedParseError> {
    let error = |entry: &str, message: &str| SpeedParseError {
        input: entry.to_string(),
        message: message.to_string(),
    };

    let mut overrides = Vec::new();
    for entry in list.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((name, rest)) = entry.split_once(':') else {
            return Err(error(entry, "expected name:mbps[fd|hd]"));
        };
        if name.is_empty() {
            return Err(error(entry, "empty interface name"));
        }
        let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
        let mbps = rest[..digits]
            .parse::<u64>()
            .map_err(|_| error(entry, "expected a speed in Mbit/s"))?;
        if mbps == 0 {
            return Err(error(entry, "speed must be positive"));
        }
        let duplex = match rest[digits..].chars().next() {
            Some('h') | Some('H') => Duplex::Half,
            Some('f') | Some('F') | None => Duplex::Full,
            _ => Duplex::Unknown,
        };
        overrides.push(SpeedOverride {
            name: name.to_string(),
            speed: mbps * 1_000_000,
            duplex,
        });
    }
    Ok(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_speed_and_duplex_suffixes() {
        let list = parse_speed_overrides("eth0:1000,eth1:100hd,eth2:10fd").unwrap();
        assert_eq!(
            list[0],
            SpeedOverride {
                name: "eth0".to_string(),
                speed: 1_000_000_000,
                duplex: Duplex::Full,
            }
        );
        assert_eq!(list[1].speed, 100_000_000);
        assert_eq!(list[1].duplex, Duplex::Half);
        assert_eq!(list[2].duplex, Duplex::Full);
    }

    #[test]
    fn unrecognized_duplex_suffix_is_unknown() {
        let list = parse_speed_overrides("eth0:100x").unwrap();
        assert_eq!(list[0].duplex, Duplex::Unknown);
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(parse_speed_overrides("eth0").is_err());
        assert!(parse_speed_overrides("eth0:").is_err());
        assert!(parse_speed_overrides("eth0:0").is_err());
        assert!(parse_speed_overrides(":100").is_err());
        assert!(parse_speed_overrides("eth0:fast").is_err());
    }

    #[test]
    fn empty_entries_are_skipped() {
        assert!(parse_speed_overrides("").unwrap().is_empty());
        assert_eq!(parse_speed_overrides("eth0:100,,").unwrap().len(), 1);
    }
}
