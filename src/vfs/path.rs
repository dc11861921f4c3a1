//! Virtual path normalization.
//!
//! Every path entering the VFS layer (router, local driver, read guard) is
//! normalized the same way so equivalent spellings address the same entry:
//! absolute, duplicate separators collapsed, `.`/`..` resolved lexically
//! (clamped at the root), no trailing separator except for the root itself.

/// Normalize a virtual path.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Whether `path` equals `mount` or lives strictly below it.
///
/// Both arguments must already be normalized.
pub fn is_within(mount: &str, path: &str) -> bool {
    if mount == "/" {
        return true;
    }
    path == mount || path.strip_prefix(mount).is_some_and(|r| r.starts_with('/'))
}

/// The backing filesystem's local path for `path` under `mount`.
///
/// An empty remainder maps to the backing filesystem's root.
pub fn remainder(mount: &str, path: &str) -> String {
    let rest = if mount == "/" {
        path
    } else {
        path.strip_prefix(mount).unwrap_or("")
    };
    if rest.is_empty() {
        "/".to_string()
    } else {
        rest.to_string()
    }
}

/// Join a child segment onto a normalized base path.
pub fn join(base: &str, segment: &str) -> String {
    if base == "/" {
        format!("/{segment}")
    } else {
        format!("{base}/{segment}")
    }
}

/// First segment of `path` strictly below `ancestor`, if any.
///
/// Both arguments must already be normalized and `path` must live below
/// `ancestor`.
pub fn first_segment_below<'a>(ancestor: &str, path: &'a str) -> Option<&'a str> {
    let rest = if ancestor == "/" {
        path.strip_prefix('/')?
    } else {
        path.strip_prefix(ancestor)?.strip_prefix('/')?
    };
    let first = rest.split('/').next()?;
    if first.is_empty() { None } else { Some(first) }
}
