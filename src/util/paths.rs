//! Relative path handling shared by the tree builder, the manifest source
//! and the batch decoder.
//!
//! All comparisons in this crate are done on `/` separated relative paths,
//! which is the convention the release manifests use.

use std::path::{Component, MAIN_SEPARATOR, Path};

/// Unifies directory separators and strips leading `./` segments.
pub fn normalize_relative(path: &str) -> String {
    let unified = if MAIN_SEPARATOR == '/' {
        path.to_string()
    } else {
        path.replace(MAIN_SEPARATOR, "/")
    };

    let mut rest = unified.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.to_string()
}

/// Returns true if joining `path` onto a root can never leave that root.
///
/// Rejects empty paths, absolute paths, drive prefixes and `..` segments.
pub fn is_contained(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') {
        return false;
    }

    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Builds the `/` separated key of `path` relative to `root`.
///
/// Returns `None` if `path` is not below `root` or is not valid UTF-8.
pub fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Splits off the first segment of a `/` separated path.
pub fn split_first_segment(path: &str) -> (&str, Option<&str>) {
    match path.split_once('/') {
        Some((first, rest)) => (first, Some(rest)),
        None => (path, None),
    }
}
