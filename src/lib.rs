pub mod application;
pub mod commands;
pub mod error;
pub mod license;
pub mod package;
pub mod plugin;
pub mod query;
pub mod resolver;
pub mod retry;
pub mod runtime;
pub mod source;
pub mod uninstall;

/// Test utilities for building feed directories on disk.
#[cfg(test)]
pub mod test_utils {
    use std::path::Path;

    /// Write a manifest and its content file into a feed directory.
    ///
    /// The content of `id@version` is the text `"<id-lowercase>-<version>"`.
    pub fn write_feed_package(
        dir: &Path,
        id: &str,
        version: &str,
        deps: &[(&str, &str)],
        requires_license: bool,
    ) {
        std::fs::create_dir_all(dir).unwrap();

        let dependencies: Vec<serde_json::Value> = deps
            .iter()
            .map(|(id, range)| serde_json::json!({ "id": id, "range": range }))
            .collect();
        let manifest = serde_json::json!({
            "id": id,
            "version": version,
            "description": format!("{} package", id),
            "requires_license_acceptance": requires_license,
            "dependency_groups": [{ "dependencies": dependencies }],
        });
        std::fs::write(
            dir.join(format!("{}.{}.json", id, version)),
            serde_json::to_vec_pretty(&manifest).unwrap(),
        )
        .unwrap();

        let key = id.to_lowercase();
        std::fs::write(
            dir.join(format!("{}.{}.pkg", key, version)),
            format!("{}-{}", key, version),
        )
        .unwrap();
    }
}
