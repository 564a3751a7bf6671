//! Path resolution for a flat, slash-delimited key namespace.
//!
//! Keys never carry a leading or trailing slash, empty and `.` segments are
//! dropped, and `..` can only climb within the relative part being resolved,
//! never above the root it is resolved against.

/// Key delimiter used by every object store we talk to.
pub const DELIMITER: char = '/';

/// Normalize a relative path into its segments.
fn segments(path: &str) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split(DELIMITER) {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            part => out.push(part),
        }
    }
    out
}

/// Resolve `rel` underneath `root`.
///
/// `rel` is normalized on its own before being appended, so the result
/// always lives under `root`.
pub fn resolve(root: &str, rel: &str) -> String {
    let mut parts = segments(root);
    parts.extend(segments(rel));
    parts.join("/")
}

/// Join two relative paths, normalizing the result.
pub fn join(base: &str, rel: &str) -> String {
    let mut joined = String::with_capacity(base.len() + rel.len() + 1);
    joined.push_str(base);
    joined.push(DELIMITER);
    joined.push_str(rel);
    segments(&joined).join("/")
}

/// Last segment of a path, or an empty string for an empty path.
pub fn base_name(path: &str) -> &str {
    path.trim_end_matches(DELIMITER)
        .rsplit(DELIMITER)
        .next()
        .unwrap_or("")
}

/// Everything but the last segment of a normalized path.
pub fn parent(path: &str) -> String {
    let mut parts = segments(path);
    parts.pop();
    parts.join("/")
}

/// Whether `path` equals `dir` or lives somewhere beneath it.
///
/// The empty directory contains everything.
pub fn is_within(dir: &str, path: &str) -> bool {
    if dir.is_empty() {
        return true;
    }
    match path.strip_prefix(dir) {
        Some(rest) => rest.is_empty() || rest.starts_with(DELIMITER),
        None => false,
    }
}
