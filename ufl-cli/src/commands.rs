// SPDX-License-Identifier: AGPL-3.0-or-later
//! CLI command implementations

use chrono::{DateTime, Utc};
use console::style;
use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use tabled::{Table, Tabled};
use ufl_archive::AccessMode;
use ufl_core::{File, FileKind, FileMetadata, FileRef, Location, UflError, UflResult, SCHEMES};
use ufl_vfs::{FileResolver, UflConfig};

/// Configuration and the resolver built from it
pub struct Context {
    config: UflConfig,
    resolver: FileResolver,
}

impl Context {
    pub fn load(path: Option<&Path>) -> UflResult<Self> {
        let config = UflConfig::load(path)?;
        let resolver = FileResolver::with_defaults(&config);
        Ok(Self { config, resolver })
    }

    async fn resolve(&self, path: &str) -> UflResult<FileRef> {
        let location = parse_path(path)?;
        tracing::debug!("Resolving {}", location);
        self.resolver.resolve_location(&location).await
    }
}

/// Parse a path argument into a Location
/// Supports:
/// - scheme://host/path - explicit location
/// - /absolute/path - local absolute path
/// - relative/path - local relative path
fn parse_path(path: &str) -> UflResult<Location> {
    if path.contains("://") {
        return Location::parse(path);
    }

    let path_buf = if path.starts_with('/') {
        Path::new(path).to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    // Canonicalize if it exists; paths into archives do not
    let canonical = path_buf.canonicalize().unwrap_or(path_buf);
    Location::from_local_path(canonical)
}

/// Format a timestamp for display
fn format_time(dt: Option<DateTime<Utc>>) -> String {
    dt.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Format file size
fn format_size(size: Option<u64>, human: bool) -> String {
    match size {
        Some(s) if human => bytesize::ByteSize(s).to_string(),
        Some(s) => s.to_string(),
        None => "-".to_string(),
    }
}

fn format_kind(kind: FileKind) -> String {
    match kind {
        FileKind::Directory => style("d").cyan().to_string(),
        FileKind::Regular => "-".to_string(),
        FileKind::Symlink => style("l").magenta().to_string(),
    }
}

fn kind_name(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Directory => "directory",
        FileKind::Regular => "file",
        FileKind::Symlink => "symlink",
    }
}

#[derive(Tabled)]
struct LsEntry {
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Permissions")]
    perms: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
    #[tabled(rename = "Name")]
    name: String,
}

impl LsEntry {
    fn new(name: String, metadata: Option<FileMetadata>, human: bool) -> Self {
        match metadata {
            Some(m) => Self {
                kind: format_kind(m.kind),
                perms: m.permissions.to_string(),
                size: format_size(m.size, human),
                modified: format_time(m.modified),
                name,
            },
            None => Self {
                kind: "?".to_string(),
                perms: "?????????".to_string(),
                size: "-".to_string(),
                modified: "-".to_string(),
                name,
            },
        }
    }
}

fn display_name(file: &FileRef) -> String {
    file.name().unwrap_or("/").to_string()
}

/// List directory or archive contents
pub async fn ls(ctx: &Context, path: &str, long: bool, all: bool, human: bool) -> UflResult<()> {
    let file = ctx.resolve(path).await?;

    let mut children = match file.list().await {
        Ok(children) => children,
        Err(UflError::NotADirectory(_)) => vec![file],
        Err(e) => return Err(e),
    };
    children.retain(|f| all || !display_name(f).starts_with('.'));
    children.sort_by_key(display_name);

    if children.is_empty() {
        println!("(empty directory)");
        return Ok(());
    }

    if long {
        let metadata = futures::future::join_all(children.iter().map(|f| f.metadata())).await;
        let entries: Vec<LsEntry> = children
            .iter()
            .zip(metadata)
            .map(|(f, m)| {
                if let Err(e) = &m {
                    tracing::warn!("No metadata for {}: {}", f.location(), e);
                }
                LsEntry::new(display_name(f), m.ok(), human)
            })
            .collect();
        println!("{}", Table::new(entries));
    } else {
        for child in &children {
            println!("{}", display_name(child));
        }
    }

    Ok(())
}

/// Display file contents
pub async fn cat(ctx: &Context, path: &str) -> UflResult<()> {
    let file = ctx.resolve(path).await?;

    let mut stream = file.open_read().await?;
    let mut stdout = std::io::stdout().lock();
    while let Some(chunk) = stream.next().await {
        stdout.write_all(&chunk?)?;
    }
    stdout.flush()?;

    Ok(())
}

/// Show file information
pub async fn stat(ctx: &Context, path: &str, json: bool) -> UflResult<()> {
    let file = ctx.resolve(path).await?;
    let metadata = file.metadata().await?;
    let caps = file.capabilities();

    if json {
        let value = serde_json::json!({
            "location": file.location().to_string(),
            "kind": kind_name(metadata.kind),
            "size": metadata.size,
            "modified": metadata.modified,
            "permissions": metadata.permissions.to_string(),
            "mode": format!("{:o}", metadata.permissions.bits()),
            "capabilities": {
                "list": caps.list,
                "read": caps.read,
                "write": caps.write,
                "set_permissions": caps.set_permissions,
            },
            "local_path": file.local_path(),
        });
        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| UflError::Io(std::io::Error::other(e)))?;
        println!("{text}");
        return Ok(());
    }

    println!("  Location: {}", file.location());
    println!("  Type: {}", kind_name(metadata.kind));

    if let Some(size) = metadata.size {
        println!("  Size: {} ({})", size, bytesize::ByteSize(size));
    }

    println!(
        "  Mode: {:o} ({})",
        metadata.permissions.bits(),
        metadata.permissions
    );

    if let Some(modified) = metadata.modified {
        println!("  Modified: {}", modified);
    }

    let mut can = Vec::new();
    for (flag, name) in [
        (caps.list, "list"),
        (caps.read, "read"),
        (caps.write, "write"),
        (caps.set_permissions, "chmod"),
    ] {
        if flag {
            can.push(name);
        }
    }
    println!("  Supports: {}", can.join(", "));

    if let Some(local) = file.local_path() {
        println!("  Local path: {}", local.display());
    }

    Ok(())
}

#[derive(Tabled)]
struct SchemeRow {
    #[tabled(rename = "Scheme")]
    scheme: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Default port")]
    port: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// List known and registered schemes
pub fn schemes(ctx: &Context) -> UflResult<()> {
    let protocols = ctx.resolver.protocols();

    let mut rows: Vec<SchemeRow> = SCHEMES
        .iter()
        .map(|info| {
            let status = if protocols.contains(info.scheme) {
                style("registered").green().to_string()
            } else {
                style("no provider").dim().to_string()
            };
            SchemeRow {
                scheme: info.scheme.to_string(),
                name: info.name.to_string(),
                port: info
                    .default_port
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                status,
            }
        })
        .collect();

    for scheme in protocols.schemes() {
        if SCHEMES.iter().any(|info| info.scheme == scheme) {
            continue;
        }
        let name = protocols
            .get(scheme)
            .map(|p| p.display_name().to_string())
            .unwrap_or_default();
        rows.push(SchemeRow {
            scheme: scheme.to_string(),
            name,
            port: "-".to_string(),
            status: style("registered").green().to_string(),
        });
    }

    println!("{}", Table::new(rows));
    Ok(())
}

#[derive(Tabled)]
struct FormatRow {
    #[tabled(rename = "Format")]
    name: String,
    #[tabled(rename = "Extensions")]
    extensions: String,
    #[tabled(rename = "Access")]
    access: String,
}

/// List archive formats in precedence order
pub fn formats(ctx: &Context) -> UflResult<()> {
    let rows: Vec<FormatRow> = ctx
        .resolver
        .archives()
        .formats()
        .iter()
        .map(|format| FormatRow {
            name: format.name().to_string(),
            extensions: format
                .extensions()
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect::<Vec<_>>()
                .join(" "),
            access: match format.access() {
                AccessMode::Random => "random".to_string(),
                AccessMode::Sequential => "sequential".to_string(),
            },
        })
        .collect();

    println!("{}", Table::new(rows));
    Ok(())
}

/// Print the effective configuration
pub fn config(ctx: &Context) -> UflResult<()> {
    if let Some(path) = UflConfig::default_path() {
        println!("# default path: {}", path.display());
    }
    print!("{}", ctx.config.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_keeps_locations() {
        let location = parse_path("mem://vol/a/b.zip/c").unwrap();
        assert_eq!(location.scheme(), "mem");
        assert_eq!(location.path(), "/a/b.zip/c");
    }

    #[test]
    fn test_parse_path_local() {
        let dir = tempfile::tempdir().unwrap();
        let location = parse_path(dir.path().to_str().unwrap()).unwrap();
        assert_eq!(location.scheme(), "file");
        assert_eq!(
            location.to_local_path(),
            Some(dir.path().canonicalize().unwrap())
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(None, true), "-");
        assert_eq!(format_size(Some(12), false), "12");
    }
}
