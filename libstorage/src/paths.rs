//! Deterministic mountpoint naming.
//!
//! A remote path such as `"host:/export/data"` must map to a single
//! flat directory name under the repository mount root, and the same
//! remote path must always map to the same name so that repeated
//! connect / disconnect calls agree on the mountpoint.

/// Transform a remote path into a flat, deterministic mountpoint name.
///
/// Underscores are escaped before slashes are folded, so the mapping
/// is injective: two distinct remote paths never collide on the same
/// local name.
pub fn transform_path(remote_path: &str) -> String {
    remote_path.replace('_', "__").replace('/', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slashes_become_underscores() {
        assert_eq!(transform_path("host:/export/data"), "host:_export_data");
    }

    #[test]
    fn deterministic() {
        assert_eq!(
            transform_path("server:/vol/a"),
            transform_path("server:/vol/a")
        );
    }

    #[test]
    fn escaping_keeps_mapping_injective() {
        // Without underscore escaping these two would collide.
        assert_ne!(transform_path("a/b"), transform_path("a_b"));
        assert_eq!(transform_path("a_b"), "a__b");
        assert_eq!(transform_path("a/b"), "a_b");
    }
}
