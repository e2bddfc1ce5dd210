//! Canonical path helpers
//!
//! Paths inside drivefs are slash separated with no leading or trailing
//! slash. The root is the empty string, so direct children of the root have
//! paths equal to their bare name.

/// Normalize a host path (`/docs/a.txt`, `docs/a.txt/`, `/`) to canonical form
pub fn canonicalize(path: &str) -> String {
    path.trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a parent path and a child name
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Directory component of a canonical path (`""` for root children)
pub fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Last component of a canonical path
pub fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

/// Whether `path` lies strictly below `ancestor`
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return !path.is_empty();
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Whether a remote name can be used as a single path segment
pub fn is_valid_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize() {
        assert_eq!(canonicalize(""), "");
        assert_eq!(canonicalize("/"), "");
        assert_eq!(canonicalize("foo"), "foo");
        assert_eq!(canonicalize("/foo"), "foo");
        assert_eq!(canonicalize("/foo/"), "foo");
        assert_eq!(canonicalize("/foo//bar"), "foo/bar");
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "docs"), "docs");
        assert_eq!(join("docs", "a.txt"), "docs/a.txt");
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent(""), "");
        assert_eq!(parent("foo"), "");
        assert_eq!(parent("foo/bar"), "foo");
        assert_eq!(parent("foo/bar/baz"), "foo/bar");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name(""), "");
        assert_eq!(base_name("foo"), "foo");
        assert_eq!(base_name("foo/bar.txt"), "bar.txt");
    }

    #[test]
    fn test_is_descendant() {
        assert!(is_descendant("docs/a.txt", "docs"));
        assert!(is_descendant("docs/sub/a.txt", "docs"));
        assert!(!is_descendant("docs", "docs"));
        assert!(!is_descendant("docsx/a.txt", "docs"));
        assert!(is_descendant("docs", ""));
        assert!(!is_descendant("", ""));
    }

    #[test]
    fn test_is_valid_segment() {
        assert!(is_valid_segment("a.txt"));
        assert!(!is_valid_segment(""));
        assert!(!is_valid_segment("."));
        assert!(!is_valid_segment(".."));
        assert!(!is_valid_segment("a/b"));
    }
}
