//! Filesystem abstraction for the procfs/sysfs counter transport.
//!
//! The `FileSystem` trait lets the platform layer read the real `/proc` and
//! `/sys` trees on Linux, or a mock implementation in tests and on other
//! operating systems.

use std::io;
use std::path::Path;

/// Abstraction for the read-only filesystem operations the platform needs.
pub trait FileSystem {
    /// Reads the entire contents of a file as a string.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Checks if a path exists.
    fn exists(&self, path: &Path) -> bool;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn real_fs_reads_files_and_checks_existence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carrier");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "1").unwrap();

        let fs = RealFs::new();
        assert_eq!(fs.read_to_string(&path).unwrap(), "1\n");
        assert!(fs.exists(&path));
        assert!(!fs.exists(&dir.path().join("missing")));
    }
}
