//! Filesystem operations.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

use base64::Engine as _;
use ignore::WalkBuilder;
use regex::RegexBuilder;
use similar::{ChangeTag, TextDiff};

use super::{Confirm, ToolContext, blocked};

/// Directories never descended into by `find` and `grep`.
const NOISE_DIRS: &[&str] = &["node_modules", ".git"];

/// Directories hidden from `tree`, on top of dot entries.
const TREE_SKIP: &[&str] = &["node_modules", "vendor", "target"];

pub(super) fn read(ctx: &ToolContext, path: &str) -> String {
    let full = ctx.resolve(path);
    let bytes = match std::fs::read(&full) {
        Ok(bytes) => bytes,
        Err(e) => return format!("Error: {e}"),
    };

    let content = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = content.lines().collect();
    let cap = ctx.limits.read_lines;

    let mut out = format!("─── {} ({} lines) ───\n", full.display(), lines.len());
    for (i, line) in lines.iter().take(cap).enumerate() {
        let _ = writeln!(out, "{:>4}│ {line}", i + 1);
    }
    if lines.len() > cap {
        let _ = writeln!(out, "... +{} more lines", lines.len() - cap);
    }
    out
}

pub(super) fn list(ctx: &ToolContext, path: &str) -> String {
    let full = if path.is_empty() {
        ctx.workspace.cwd().to_path_buf()
    } else {
        ctx.resolve(path)
    };

    let entries = match sorted_entries(&full) {
        Ok(entries) => entries,
        Err(e) => return format!("Error: {e}"),
    };

    let (dirs, files): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| e.is_dir);

    let mut out = format!("{}\n", full.display());
    for dir in &dirs {
        let _ = writeln!(out, "  {}/", dir.name);
    }
    for file in &files {
        let _ = writeln!(out, "  {:<30} {}", file.name, format_size(file.size));
    }
    let _ = write!(out, "\n{} dirs, {} files", dirs.len(), files.len());
    out
}

pub(super) fn tree(ctx: &ToolContext, path: &str) -> String {
    let full = if path.is_empty() {
        ctx.workspace.cwd().to_path_buf()
    } else {
        ctx.resolve(path)
    };

    if !full.is_dir() {
        return "Error: not a directory".to_string();
    }

    let mut out = format!("{}\n", full.display());
    walk_tree(&full, "", 0, ctx.limits.tree_depth, ctx.limits.tree_entries, &mut out);
    out
}

fn walk_tree(dir: &Path, prefix: &str, depth: usize, max_depth: usize, max_entries: usize, out: &mut String) {
    if depth >= max_depth {
        return;
    }

    let Ok(entries) = sorted_entries(dir) else {
        return;
    };
    let shown: Vec<_> = entries
        .into_iter()
        .filter(|e| !e.name.starts_with('.') && !TREE_SKIP.contains(&e.name.as_str()))
        .take(max_entries)
        .collect();

    for (i, entry) in shown.iter().enumerate() {
        let last = i + 1 == shown.len();
        let connector = if last { "└── " } else { "├── " };
        if entry.is_dir {
            let _ = writeln!(out, "{prefix}{connector}{}/", entry.name);
            let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
            walk_tree(
                &dir.join(&entry.name),
                &child_prefix,
                depth + 1,
                max_depth,
                max_entries,
                out,
            );
        } else {
            let _ = writeln!(out, "{prefix}{connector}{}", entry.name);
        }
    }
}

pub(super) fn find(ctx: &ToolContext, pattern: &str) -> String {
    let needle = pattern.to_lowercase();
    let root = ctx.workspace.cwd();

    let matches: Vec<String> = walker(root, Some(ctx.limits.find_depth))
        .filter(|entry| entry.depth() > 0)
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .to_lowercase()
                .contains(&needle)
        })
        .map(|entry| entry.path().display().to_string())
        .collect();

    if matches.is_empty() {
        return "No files found".to_string();
    }
    format!(
        "Found {}:\n{}",
        matches.len(),
        capped(&matches, ctx.limits.find_results)
    )
}

pub(super) fn grep(ctx: &ToolContext, pattern: &str, path: Option<&str>) -> String {
    let root = path.map_or_else(|| ctx.workspace.cwd().to_path_buf(), |p| ctx.resolve(p));

    let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => re,
        Err(_) => match RegexBuilder::new(&regex::escape(pattern))
            .case_insensitive(true)
            .build()
        {
            Ok(re) => re,
            Err(e) => return format!("Error: {e}"),
        },
    };

    let mut matches = Vec::new();
    for entry in walker(&root, None) {
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        // skip binary and unreadable files
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for (n, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                matches.push(format!("{}:{}:{}", entry.path().display(), n + 1, line.trim_end()));
            }
        }
    }

    if matches.is_empty() {
        return "No matches".to_string();
    }
    format!(
        "Matched {}:\n{}",
        matches.len(),
        capped(&matches, ctx.limits.grep_results)
    )
}

pub(super) fn write(ctx: &mut ToolContext, path: &str, content: &str) -> String {
    let full = ctx.resolve(path);
    if let Err(e) = ctx.undo.snapshot(&full) {
        return format!("Error: {e}");
    }

    if let Some(parent) = full.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            return format!("Error: {e}");
        }
    }

    match std::fs::write(&full, content) {
        Ok(()) => format!("✓ Written: {} ({} bytes)", full.display(), content.len()),
        Err(e) => format!("Error: {e}"),
    }
}

pub(super) fn replace(
    ctx: &mut ToolContext,
    path: &str,
    old: &str,
    new: &str,
    confirm: Option<&dyn Confirm>,
) -> String {
    let full = ctx.resolve(path);
    let content = match std::fs::read_to_string(&full) {
        Ok(content) => content,
        Err(e) => return format!("Error: {e}"),
    };

    if old.is_empty() || !content.contains(old) {
        return "Text not found".to_string();
    }

    let preview = generate_diff(old, new);
    if let Some(confirm) = confirm {
        let description = format!("Replace in {}\n{preview}", full.display());
        if !confirm.confirm(&description) {
            return blocked(&format!("Replace in {}", full.display()));
        }
    }

    if let Err(e) = ctx.undo.snapshot(&full) {
        return format!("Error: {e}");
    }

    match std::fs::write(&full, content.replacen(old, new, 1)) {
        Ok(()) => format!("✓ Replaced in {}\n{preview}", full.display()),
        Err(e) => format!("Error: {e}"),
    }
}

pub(super) fn append(ctx: &mut ToolContext, path: &str, content: &str) -> String {
    let full = ctx.resolve(path);
    if let Err(e) = ctx.undo.snapshot(&full) {
        return format!("Error: {e}");
    }

    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&full)
        .and_then(|mut file| file.write_all(content.as_bytes()));

    match result {
        Ok(()) => format!("✓ Appended to {}", full.display()),
        Err(e) => format!("Error: {e}"),
    }
}

pub(super) fn change_dir(ctx: &mut ToolContext, path: &str) -> String {
    let target = ctx.resolve(if path.is_empty() { "~" } else { path });
    if !target.is_dir() {
        return "Error: not a directory".to_string();
    }
    let shown = format!("→ {}", target.display());
    ctx.workspace.change_dir(target);
    shown
}

pub(super) fn image(ctx: &ToolContext, path: &str) -> String {
    let full = ctx.resolve(path);

    let size = match std::fs::metadata(&full) {
        Ok(meta) => meta.len(),
        Err(e) => return format!("Error: {e}"),
    };
    if size > ctx.limits.image_max_bytes {
        return format!(
            "Error: Image too large (max {}MB)",
            ctx.limits.image_max_bytes / (1024 * 1024)
        );
    }

    let extension = full
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let mime = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return "Error: Unsupported image format".to_string(),
    };

    let data = match std::fs::read(&full) {
        Ok(data) => data,
        Err(e) => return format!("Error: {e}"),
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
    let excerpt = if encoded.len() > 70 {
        format!("{}...{}", &encoded[..50], &encoded[encoded.len() - 20..])
    } else {
        encoded
    };

    format!(
        "Image loaded: {} ({mime}, {} bytes)\nBase64: {excerpt}",
        full.display(),
        data.len()
    )
}

struct Entry {
    name: String,
    is_dir: bool,
    size: u64,
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata().ok();
        entries.push(Entry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: meta.as_ref().is_some_and(std::fs::Metadata::is_dir),
            size: meta.as_ref().map_or(0, std::fs::Metadata::len),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Walk `root` in name order, skipping [`NOISE_DIRS`] and nothing else.
fn walker(root: &Path, max_depth: Option<usize>) -> impl Iterator<Item = ignore::DirEntry> {
    WalkBuilder::new(root)
        .standard_filters(false)
        .max_depth(max_depth)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry| {
            !NOISE_DIRS
                .iter()
                .any(|noise| entry.file_name() == std::ffi::OsStr::new(noise))
        })
        .build()
        .flatten()
}

/// Join up to `cap` lines, then a `+N more` marker.
fn capped(lines: &[String], cap: usize) -> String {
    let mut out = lines
        .iter()
        .take(cap)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    if lines.len() > cap {
        let _ = write!(out, "\n+{} more", lines.len() - cap);
    }
    out
}

/// Human-readable size: `512B`, `1.5KB`, `3.0MB`.
#[allow(clippy::cast_precision_loss)]
pub(super) fn format_size(size: u64) -> String {
    const UNIT: u64 = 1024;
    if size < UNIT {
        return format!("{size}B");
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = size / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let suffix = ["K", "M", "G", "T", "P", "E"][exp];
    format!("{:.1}{suffix}B", size as f64 / div as f64)
}

/// Line diff between old and new text.
fn generate_diff(old: &str, new: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        output.push_str(sign);
        output.push_str(change.value());
        if !change.value().ends_with('\n') {
            output.push('\n');
        }
    }

    output
}
