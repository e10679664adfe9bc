//! Server version parsing.
//!
//! Version strings reported by `SELECT VERSION()` carry vendor suffixes
//! (`8.0.22-0ubuntu0.20.04.2`, `5.7.44-log`). Parsing degrades to zeros
//! instead of failing, so callers always get a comparable version.

use std::fmt;

/// First release writing CRC32 checksums into binlog events.
pub const BINLOG_CHECKSUM_VERSION: ServerVersion = ServerVersion::new(5, 6, 1);

/// First release where `SHOW MASTER STATUS` became `SHOW BINARY LOG STATUS`.
pub const BINARY_LOG_STATUS_VERSION: ServerVersion = ServerVersion::new(8, 2, 0);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a raw version string. Never fails; unparsable parts become 0.
    pub fn parse(raw: &str) -> Self {
        let mut tokens = raw.trim().split('.');

        let major = match tokens.next().and_then(|t| t.parse::<u32>().ok()) {
            Some(major) => major,
            None => return Self::default(),
        };

        let mut version = Self::new(major, 0, 0);

        let Some(minor) = tokens.next() else {
            return version;
        };
        let digits = leading_digits(minor);
        version.minor = digits.parse().unwrap_or(0);
        if digits.len() != minor.len() {
            // "8.4-0ubuntu..." has no usable patch component
            return version;
        }

        if let Some(patch) = tokens.next() {
            version.patch = leading_digits(patch).parse().unwrap_or(0);
        }

        version
    }

    /// Single integer used for ordered comparisons.
    pub const fn product(&self) -> u64 {
        ((self.major as u64) * 256 + self.minor as u64) * 256 + self.patch as u64
    }

    pub fn supports_binlog_checksum(&self) -> bool {
        self.product() >= BINLOG_CHECKSUM_VERSION.product()
    }

    pub fn uses_binary_log_status(&self) -> bool {
        self.product() >= BINARY_LOG_STATUS_VERSION.product()
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn leading_digits(token: &str) -> &str {
    let end = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    &token[..end]
}
