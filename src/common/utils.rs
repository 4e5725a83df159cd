//! Utility functions for weedfiler

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::time::{SystemTime, UNIX_EPOCH};

/// Characters escaped in the userinfo part of a connection URL
const USERINFO_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b':')
    .add(b'@')
    .add(b'%')
    .add(b'?')
    .add(b'#');

/// Encode a password or user name for use inside a URL
pub fn encode_userinfo(s: &str) -> String {
    utf8_percent_encode(s, USERINFO_ENCODE_SET).to_string()
}

/// Get current Unix timestamp (seconds)
pub fn timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Normalize a filer path: leading slash, no trailing slash, no empty segments.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

/// Split a path into its parent directory and final name.
///
/// `/a/b/c.txt` becomes (`/a/b`, `c.txt`); the root has an empty name.
pub fn split_path(path: &str) -> (String, String) {
    let path = normalize_path(path);
    match path.rfind('/') {
        Some(0) => ("/".to_string(), path[1..].to_string()),
        Some(i) => (path[..i].to_string(), path[i + 1..].to_string()),
        None => ("/".to_string(), path),
    }
}

/// Join a directory and a name
pub fn join_path(dir: &str, name: &str) -> String {
    normalize_path(&format!("{}/{}", dir, name))
}

/// Is `path` equal to `dir` or somewhere beneath it?
pub fn is_within(path: &str, dir: &str) -> bool {
    dir == "/" || path == dir || path.starts_with(&format!("{}/", dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("a/b/"), "/a/b");
        assert_eq!(normalize_path("//a//./b"), "/a/b");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/a/b/c.txt"), ("/a/b".into(), "c.txt".into()));
        assert_eq!(split_path("/c.txt"), ("/".into(), "c.txt".into()));
        assert_eq!(split_path("/"), ("/".into(), "".into()));
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/anything", "/"));
    }

    #[test]
    fn test_encode_userinfo() {
        assert_eq!(encode_userinfo("p@ss:w/rd"), "p%40ss%3Aw%2Frd");
        assert_eq!(encode_userinfo("plain"), "plain");
    }
}
