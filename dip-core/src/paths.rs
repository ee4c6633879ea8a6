//! Path helpers: tracked files are stored relative to the DIP root and
//! resolved back to absolute paths for comparison.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` lexically, without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Best-effort real path: canonical when the path exists, otherwise the
/// lexically normalized absolute path.
pub fn real_path(path: &Path) -> PathBuf {
    if let Ok(p) = path.canonicalize() {
        return p;
    }
    match std::path::absolute(path) {
        Ok(p) => normalize(&p),
        Err(_) => normalize(path),
    }
}

/// Express `path` relative to `base`. Both must be absolute and normalized.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path_parts: Vec<Component> = path.components().collect();
    let base_parts: Vec<Component> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &path_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}

/// Serialize a relative path with `/` separators regardless of platform.
pub fn to_record_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolve a stored record path against the DIP root.
pub fn resolve(base: &Path, record_path: &str) -> PathBuf {
    normalize(&base.join(record_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_relative_to_sibling() {
        let rel = relative_to(Path::new("/data/files/a.txt"), Path::new("/data/dip"));
        assert_eq!(to_record_path(&rel), "../files/a.txt");
    }

    #[test]
    fn test_relative_to_inside() {
        let rel = relative_to(Path::new("/data/dip/metadata/dcterms.xml"), Path::new("/data/dip"));
        assert_eq!(to_record_path(&rel), "metadata/dcterms.xml");
    }

    #[test]
    fn test_resolve_inverts_relative() {
        let base = Path::new("/data/dip");
        let target = Path::new("/data/files/a.txt");
        let stored = to_record_path(&relative_to(target, base));
        assert_eq!(resolve(base, &stored), target);
    }
}
