//! Virtual path helpers
//!
//! Every path inside the gateway is absolute, `/`-separated, without `.`/`..`
//! segments, duplicate separators or a trailing separator (except the root).

/// Normalize a path: leading `/`, no empty, `.` or `..` segments
///
/// Only `/` separates segments; a backslash is an ordinary name character.
pub fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Join a directory and a name into a clean path
pub fn join_path(dir: &str, name: &str) -> String {
    clean_path(&format!("{dir}/{name}"))
}

/// Last segment of a path, empty for the root
pub fn base_name(path: &str) -> String {
    let cleaned = clean_path(path);
    cleaned
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Parent directory of a path; the root is its own parent
pub fn parent_dir(path: &str) -> String {
    let cleaned = clean_path(path);
    match cleaned.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => cleaned[..idx].to_string(),
    }
}

/// Whether `child` equals `parent` or lives underneath it
pub fn is_sub_path(parent: &str, child: &str) -> bool {
    let parent = clean_path(parent);
    let child = clean_path(child);
    if parent == "/" {
        return true;
    }
    child == parent || child.starts_with(&format!("{parent}/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path(""), "/");
        assert_eq!(clean_path("a//b/"), "/a/b");
        assert_eq!(clean_path("/a/./b/../c"), "/a/c");
        assert_eq!(clean_path("/../.."), "/");
    }

    #[test]
    fn test_join_and_base() {
        assert_eq!(join_path("/dst", "dir"), "/dst/dir");
        assert_eq!(join_path("/", "a.txt"), "/a.txt");
        assert_eq!(base_name("/src/dir/a.txt"), "a.txt");
        assert_eq!(base_name("/"), "");
    }

    #[test]
    fn test_backslash_is_part_of_a_name() {
        assert_eq!(clean_path("/d/a\\b.txt"), "/d/a\\b.txt");
        assert_eq!(join_path("/d", "a\\b.txt"), "/d/a\\b.txt");
        assert_eq!(base_name("/d/a\\b.txt"), "a\\b.txt");
        assert_eq!(parent_dir("/d/a\\b.txt"), "/d");
        assert_eq!(clean_path("/d/..\\x"), "/d/..\\x");
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("/a/b"), "/a");
        assert_eq!(parent_dir("/a"), "/");
        assert_eq!(parent_dir("/"), "/");
    }

    #[test]
    fn test_is_sub_path() {
        assert!(is_sub_path("/a", "/a"));
        assert!(is_sub_path("/a", "/a/b"));
        assert!(!is_sub_path("/a", "/ab"));
        assert!(is_sub_path("/", "/anything"));
    }
}
