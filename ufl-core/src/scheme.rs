// SPDX-License-Identifier: AGPL-3.0-or-later
//! Known location schemes
//!
//! Default ports drive location canonicalization; the `pooled` flag marks
//! backends that talk to a stateful remote session.

/// Static description of a scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemeInfo {
    pub name: &'static str,
    pub scheme: &'static str,
    pub default_port: Option<u16>,
    /// Backed by a session that should go through the connection pool
    pub pooled: bool,
}

pub const SCHEMES: &[SchemeInfo] = &[
    SchemeInfo {
        name: "Local filesystem",
        scheme: "file",
        default_port: None,
        pooled: false,
    },
    SchemeInfo {
        name: "In-memory",
        scheme: "mem",
        default_port: None,
        pooled: false,
    },
    SchemeInfo {
        name: "FTP",
        scheme: "ftp",
        default_port: Some(21),
        pooled: true,
    },
    SchemeInfo {
        name: "SFTP",
        scheme: "sftp",
        default_port: Some(22),
        pooled: true,
    },
    SchemeInfo {
        name: "SMB/CIFS",
        scheme: "smb",
        default_port: Some(445),
        pooled: true,
    },
    SchemeInfo {
        name: "NFS",
        scheme: "nfs",
        default_port: Some(2049),
        pooled: true,
    },
    SchemeInfo {
        name: "HTTP",
        scheme: "http",
        default_port: Some(80),
        pooled: false,
    },
    SchemeInfo {
        name: "HTTPS",
        scheme: "https",
        default_port: Some(443),
        pooled: false,
    },
    SchemeInfo {
        name: "WebDAV",
        scheme: "webdav",
        default_port: Some(80),
        pooled: true,
    },
    SchemeInfo {
        name: "WebDAV (TLS)",
        scheme: "webdavs",
        default_port: Some(443),
        pooled: true,
    },
    SchemeInfo {
        name: "Amazon S3",
        scheme: "s3",
        default_port: Some(443),
        pooled: true,
    },
    SchemeInfo {
        name: "HDFS",
        scheme: "hdfs",
        default_port: Some(8020),
        pooled: true,
    },
];

/// Find scheme info by (lower-case) scheme
pub fn get_scheme(scheme: &str) -> Option<&'static SchemeInfo> {
    SCHEMES.iter().find(|s| s.scheme == scheme)
}

/// Default port for a scheme, if it has one
pub fn default_port(scheme: &str) -> Option<u16> {
    get_scheme(scheme).and_then(|s| s.default_port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ports() {
        assert_eq!(default_port("sftp"), Some(22));
        assert_eq!(default_port("ftp"), Some(21));
        assert_eq!(default_port("https"), Some(443));
        assert_eq!(default_port("file"), None);
        assert_eq!(default_port("gopher"), None);
    }

    #[test]
    fn test_schemes_are_unique_and_lowercase() {
        for (i, a) in SCHEMES.iter().enumerate() {
            assert_eq!(a.scheme, a.scheme.to_ascii_lowercase());
            for b in &SCHEMES[i + 1..] {
                assert_ne!(a.scheme, b.scheme);
            }
        }
    }
}
