// SPDX-License-Identifier: AGPL-3.0-or-later
//! Location model
//!
//! A [`Location`] addresses a resource on any backend:
//! `scheme://[user[:pass]@]host[:port]/path[?query]`.
//!
//! Parsing normalizes everything that does not change which resource is
//! meant: the scheme and host are lower-cased, a scheme's default port is
//! dropped, path segments are percent-decoded with `.` and `..` resolved
//! (clamped at the root), and the trailing slash is not kept. The canonical
//! string re-encodes the normalized fields with fixed encode sets, so two
//! spellings of the same resource produce the same string and compare equal.

use crate::error::{UflError, UflResult};
use crate::scheme;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const USERINFO: &AsciiSet = &PATH_SEGMENT.add(b':').add(b'@');

const QUERY: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

const REDACTED: &str = "***";

/// Login information carried by a location
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credentials {
    principal: String,
    secret: Option<String>,
}

impl Credentials {
    pub fn new(principal: impl Into<String>, secret: Option<String>) -> Self {
        Self {
            principal: principal.into(),
            secret,
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("principal", &self.principal)
            .field("secret", &self.secret.as_ref().map(|_| REDACTED))
            .finish()
    }
}

/// Canonical, comparable address of a resource
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Location {
    scheme: String,
    credentials: Option<Credentials>,
    host: String,
    /// Only set when it differs from the scheme's default
    port: Option<u16>,
    /// Decoded path segments; never empty, `.` or `..`
    segments: Vec<String>,
    query: Vec<(String, Option<String>)>,
}

fn malformed(reason: impl Into<String>) -> UflError {
    UflError::MalformedLocation(reason.into())
}

fn decode(text: &str) -> UflResult<String> {
    percent_decode_str(text)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| malformed("percent-encoded text is not valid UTF-8"))
}

fn push_segment(segments: &mut Vec<String>, segment: String) {
    match segment.as_str() {
        "" | "." => {}
        ".." => {
            segments.pop();
        }
        _ => segments.push(segment),
    }
}

/// Split a POSIX-style path into segments, dropping empty and `.` segments
/// and resolving `..` against the root (never climbing above it).
pub fn normalize_path(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    for part in path.split('/') {
        push_segment(&mut segments, part.to_string());
    }
    segments
}

fn parse_port(text: &str) -> UflResult<Option<u16>> {
    if text.is_empty() {
        return Ok(None);
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(format!("invalid port '{text}'")));
    }
    text.parse::<u16>()
        .map(Some)
        .map_err(|_| malformed(format!("port out of range '{text}'")))
}

fn parse_host_port(text: &str) -> UflResult<(String, Option<u16>)> {
    if let Some(rest) = text.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| malformed("unterminated IPv6 literal"))?;
        if host.is_empty() {
            return Err(malformed("empty IPv6 literal"));
        }
        let port = match after {
            "" => None,
            other => {
                let port = other
                    .strip_prefix(':')
                    .ok_or_else(|| malformed("unexpected text after IPv6 literal"))?;
                parse_port(port)?
            }
        };
        return Ok((host.to_ascii_lowercase(), port));
    }

    let (host, port) = match text.rsplit_once(':') {
        Some((host, port)) => (host, parse_port(port)?),
        None => (text, None),
    };
    if host.contains(':') {
        return Err(malformed("IPv6 hosts must be enclosed in brackets"));
    }
    if host
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '[' || c == ']')
    {
        return Err(malformed("invalid character in host"));
    }
    Ok((host.to_ascii_lowercase(), port))
}

fn parse_userinfo(text: &str) -> UflResult<Credentials> {
    let (principal, secret) = match text.split_once(':') {
        Some((principal, secret)) => (principal, Some(decode(secret)?)),
        None => (text, None),
    };
    if principal.is_empty() {
        return Err(malformed("credentials without a principal"));
    }
    Ok(Credentials::new(decode(principal)?, secret))
}

fn parse_query(text: &str) -> UflResult<Vec<(String, Option<String>)>> {
    let mut pairs = Vec::new();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (decode(key)?, Some(decode(value)?)),
            None => (decode(pair)?, None),
        };
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

impl Location {
    /// Parse and normalize a raw location string
    pub fn parse(raw: &str) -> UflResult<Self> {
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| malformed("missing '://' after scheme"))?;
        if !is_valid_scheme(scheme) {
            return Err(malformed(format!("invalid scheme '{scheme}'")));
        }
        let scheme = scheme.to_ascii_lowercase();

        let authority_end = rest.find(|c: char| c == '/' || c == '?').unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(authority_end);
        let (path, query) = match tail.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (tail, None),
        };

        let (credentials, host_port) = match authority.rsplit_once('@') {
            Some((userinfo, host_port)) => (Some(parse_userinfo(userinfo)?), host_port),
            None => (None, authority),
        };
        let (host, port) = parse_host_port(host_port)?;
        let port = port.filter(|p| Some(*p) != scheme::default_port(&scheme));

        let mut segments = Vec::new();
        for part in path.split('/') {
            push_segment(&mut segments, decode(part)?);
        }

        let query = match query {
            Some(query) => parse_query(query)?,
            None => Vec::new(),
        };

        Ok(Self {
            scheme,
            credentials,
            host,
            port,
            segments,
            query,
        })
    }

    /// Build a `file://` location from an absolute local path
    pub fn from_local_path(path: impl AsRef<Path>) -> UflResult<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(malformed(format!(
                "local path is not absolute: {}",
                path.display()
            )));
        }
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Prefix(prefix) => {
                    let prefix = prefix
                        .as_os_str()
                        .to_str()
                        .ok_or_else(|| malformed("local path is not valid UTF-8"))?;
                    segments.push(prefix.to_string());
                }
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    segments.pop();
                }
                Component::Normal(name) => {
                    let name = name
                        .to_str()
                        .ok_or_else(|| malformed("local path is not valid UTF-8"))?;
                    segments.push(name.to_string());
                }
            }
        }
        Ok(Self {
            scheme: "file".to_string(),
            credentials: None,
            host: String::new(),
            port: None,
            segments,
            query: Vec::new(),
        })
    }

    /// Local filesystem path for `file://` locations
    pub fn to_local_path(&self) -> Option<PathBuf> {
        if self.scheme != "file" {
            return None;
        }
        let mut path = PathBuf::from("/");
        for (i, segment) in self.segments.iter().enumerate() {
            if i == 0 && cfg!(windows) && segment.ends_with(':') {
                path = PathBuf::from(format!("{segment}\\"));
            } else {
                path.push(segment);
            }
        }
        Some(path)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port, when it differs from the scheme's default
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// Port to connect to: explicit, else the scheme's default
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| scheme::default_port(&self.scheme))
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Decoded absolute path, `/` for the root
    pub fn path(&self) -> String {
        if self.segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.segments.join("/"))
        }
    }

    pub fn query(&self) -> &[(String, Option<String>)] {
        &self.query
    }

    /// First value of a query parameter
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    pub fn extension(&self) -> Option<&str> {
        self.name().and_then(|n| n.rsplit_once('.')).map(|(_, ext)| ext)
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Same resource tree, different path; the query is dropped
    pub fn with_segments(&self, segments: Vec<String>) -> Self {
        let mut normalized = Vec::with_capacity(segments.len());
        for segment in segments {
            push_segment(&mut normalized, segment);
        }
        Self {
            scheme: self.scheme.clone(),
            credentials: self.credentials.clone(),
            host: self.host.clone(),
            port: self.port,
            segments: normalized,
            query: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            None
        } else {
            let mut segments = self.segments.clone();
            segments.pop();
            Some(self.with_segments(segments))
        }
    }

    /// Join literal (not percent-encoded) path text, e.g. a name returned by
    /// a directory listing.
    pub fn join(&self, name: impl AsRef<str>) -> Self {
        let mut segments = self.segments.clone();
        for part in name.as_ref().split('/') {
            push_segment(&mut segments, part.to_string());
        }
        self.with_segments(segments)
    }

    /// Resolve a relative reference written in location syntax
    /// (percent-encoded). A leading `/` replaces the whole path.
    pub fn resolve(&self, relative: &str) -> UflResult<Self> {
        let mut segments = if relative.starts_with('/') {
            Vec::new()
        } else {
            self.segments.clone()
        };
        for part in relative.split('/') {
            push_segment(&mut segments, decode(part)?);
        }
        Ok(self.with_segments(segments))
    }

    /// Scheme, credentials, host and port with a root path: the identity of
    /// the server-side session this location lives on.
    pub fn realm(&self) -> Self {
        self.with_segments(Vec::new())
    }

    /// Canonical string form, credentials included
    pub fn to_canonical_string(&self) -> String {
        Canonical(self).to_string()
    }

    fn write_canonical(&self, out: &mut impl fmt::Write, reveal_secret: bool) -> fmt::Result {
        write!(out, "{}://", self.scheme)?;
        if let Some(credentials) = &self.credentials {
            write!(out, "{}", utf8_percent_encode(&credentials.principal, USERINFO))?;
            if let Some(secret) = &credentials.secret {
                if reveal_secret {
                    write!(out, ":{}", utf8_percent_encode(secret, USERINFO))?;
                } else {
                    write!(out, ":{REDACTED}")?;
                }
            }
            out.write_char('@')?;
        }
        if self.host.contains(':') {
            write!(out, "[{}]", self.host)?;
        } else {
            out.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(out, ":{port}")?;
        }
        if self.segments.is_empty() {
            out.write_char('/')?;
        }
        for segment in &self.segments {
            write!(out, "/{}", utf8_percent_encode(segment, PATH_SEGMENT))?;
        }
        for (i, (key, value)) in self.query.iter().enumerate() {
            out.write_char(if i == 0 { '?' } else { '&' })?;
            write!(out, "{}", utf8_percent_encode(key, QUERY))?;
            if let Some(value) = value {
                write!(out, "={}", utf8_percent_encode(value, QUERY))?;
            }
        }
        Ok(())
    }
}

struct Canonical<'a>(&'a Location);

impl fmt::Display for Canonical<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.write_canonical(f, true)
    }
}

/// Canonical form with the secret replaced, safe for logs
impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_canonical(f, false)
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location({self})")
    }
}

impl FromStr for Location {
    type Err = UflError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Location::parse(&raw).map_err(serde::de::Error::custom)
    }
}
