use std::path::Path;

/// Forward-slash, lossy-UTF8 form of a path, as required by the tracker file format
/// ("Paths use forward slashes").
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn converts_backslashes_to_forward_slashes() {
        let p = PathBuf::from("a\\b\\c.rs");
        assert_eq!(normalize_path(&p), "a/b/c.rs");
    }
}
