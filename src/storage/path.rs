//! Path helpers for the storage namespace
//!
//! Storage paths are `/`-separated and relative to the backend root,
//! regardless of the host platform.

/// Join path elements with `/`, skipping empty elements and collapsing
/// duplicate separators at the boundaries.
pub fn join<S: AsRef<str>>(parts: &[S]) -> String {
    let mut out = String::new();
    for part in parts {
        let part = part.as_ref().trim_matches('/');
        if part.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part);
    }
    out
}

/// Split a path into its directory and final component.
///
/// A path without a separator lives in the root directory (`""`).
pub fn split(path: &str) -> (&str, &str) {
    let path = path.trim_matches('/');
    match path.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", path),
    }
}

/// Normalize a path by removing leading and trailing separators.
pub fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join(&["exports", "fingerprint.delta.2021-01.csv.gz"]), "exports/fingerprint.delta.2021-01.csv.gz");
        assert_eq!(join(&["", "a.gz"]), "a.gz");
        assert_eq!(join(&["a/", "/b/", "c"]), "a/b/c");
        assert_eq!(join::<&str>(&[]), "");
    }

    #[test]
    fn test_split() {
        assert_eq!(split("a/b/c.gz"), ("a/b", "c.gz"));
        assert_eq!(split("c.gz"), ("", "c.gz"));
        assert_eq!(split("/a/c.gz/"), ("a", "c.gz"));
    }
}
