use crate::common::error::{Error, Result};

/// Normalize a path to ensure it starts with / and doesn't end with /
pub fn normalize_path(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(Error::InvalidPath("Path cannot be empty".to_string()));
    }

    let mut normalized = path.to_string();

    // Ensure path starts with /
    if !normalized.starts_with('/') {
        normalized.insert(0, '/');
    }

    // Remove trailing slash unless it's the root
    if normalized.len() > 1 && normalized.ends_with('/') {
        normalized.pop();
    }

    // Remove duplicate slashes
    while normalized.contains("//") {
        normalized = normalized.replace("//", "/");
    }

    Ok(normalized)
}

/// Get the parent path
pub fn parent_path(path: &str) -> Option<String> {
    let normalized = normalize_path(path).ok()?;

    if normalized == "/" {
        return None;
    }

    let parts: Vec<&str> = normalized.rsplitn(2, '/').collect();
    if parts.len() == 2 {
        let parent = parts[1];
        if parent.is_empty() {
            Some("/".to_string())
        } else {
            Some(parent.to_string())
        }
    } else {
        Some("/".to_string())
    }
}

/// The value written to the secondary-indexed parent column. The root has
/// no parent, so the literal string "null" stands in for it.
pub fn parent_for_index(path: &str) -> String {
    parent_path(path).unwrap_or_else(|| "null".to_string())
}

/// Upper bound for a deep-listing range scan: the path with its last
/// character advanced to the next code point. Descendants of `path` all
/// sort strictly below it. Returns None for the root, which has no upper
/// bound (every path is a descendant).
pub fn successor(path: &str) -> Option<String> {
    if path.len() <= 1 {
        return None;
    }

    let mut chars: Vec<char> = path.chars().collect();
    let last = chars.pop()?;
    let bumped = char::from_u32(last as u32 + 1)?;
    chars.push(bumped);
    Some(chars.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/foo/bar").unwrap(), "/foo/bar");
        assert_eq!(normalize_path("foo/bar").unwrap(), "/foo/bar");
        assert_eq!(normalize_path("/foo/bar/").unwrap(), "/foo/bar");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("//foo//bar//").unwrap(), "/foo/bar");
        assert!(normalize_path("").is_err());
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/foo/bar").unwrap(), "/foo");
        assert_eq!(parent_path("/foo").unwrap(), "/");
        assert_eq!(parent_path("/"), None);
    }

    #[test]
    fn test_parent_for_index() {
        assert_eq!(parent_for_index("/foo/bar"), "/foo");
        assert_eq!(parent_for_index("/"), "null");
    }

    #[test]
    fn test_successor() {
        assert_eq!(successor("/foo").unwrap(), "/fop");
        assert_eq!(successor("/a").unwrap(), "/b");
        assert_eq!(successor("/"), None);
    }
}
