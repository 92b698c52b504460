//! Path normalisation.

/// Canonical absolute form: one leading `/`, no empty or `.` segments, `..`
/// folded into its predecessor. A `..` with nothing to pop is dropped.
pub fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    let mut out = String::with_capacity(path.len() + 1);
    out.push('/');
    out.push_str(&parts.join("/"));
    out
}

pub fn is_root(normalized: &str) -> bool {
    normalized == "/"
}

/// Segments of a normalized path, root first.
pub fn segments(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split('/').filter(|s| !s.is_empty())
}

/// `("/a/b", "c")` for `"/a/b/c"`; `None` for the root.
pub fn split_parent(normalized: &str) -> Option<(&str, &str)> {
    if is_root(normalized) {
        return None;
    }
    let idx = normalized.rfind('/')?;
    let parent = if idx == 0 { "/" } else { &normalized[..idx] };
    Some((parent, &normalized[idx + 1..]))
}

/// Joins a normalized directory path and one child name.
pub fn join(dir: &str, name: &str) -> String {
    if is_root(dir) {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Whether `path` is `ancestor` itself or lies beneath it. Both normalized.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    if is_root(ancestor) {
        return true;
    }
    match path.strip_prefix(ancestor) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes() {
        assert_eq!(normalize("/a/b/../c"), "/a/c");
        assert_eq!(normalize("a//./b"), "/a/b");
        assert_eq!(normalize("/../a"), "/a");
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/a/b/"), "/a/b");
        assert_eq!(normalize("/a/../../b/./c/.."), "/b");
    }

    #[test]
    fn normalize_is_idempotent() {
        for p in ["/a/b/../c", "a//./b", "/../a", "x/y/z/..", "/", "./.."] {
            let once = normalize(p);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn splits_parent() {
        assert_eq!(split_parent("/"), None);
        assert_eq!(split_parent("/a"), Some(("/", "a")));
        assert_eq!(split_parent("/a/b/c"), Some(("/a/b", "c")));
        assert_eq!(segments("/a/b").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(segments("/").count(), 0);
        assert_eq!(join("/", "a"), "/a");
        assert_eq!(join("/a", "b"), "/a/b");
    }

    #[test]
    fn subtree_membership() {
        assert!(is_within("/a", "/a"));
        assert!(is_within("/a/b", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(!is_within("/b", "/a"));
        assert!(is_within("/anything", "/"));
    }
}
