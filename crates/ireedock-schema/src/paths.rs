//! Logical path handling for in-container mount points.
//!
//! Request paths name locations inside the toolchain container, so they are
//! never resolved against the host filesystem.

/// Resolve `.` and `..` components in a path without touching the filesystem.
///
/// The result is always absolute; `..` at the root stays at the root.
pub fn canonicalize_logical(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Whether `path` is written with the `mount` prefix and still names a file
/// strictly below it after logical canonicalization.
pub fn is_under_mount(path: &str, mount: &str) -> bool {
    if !path.starts_with(&format!("{mount}/")) {
        return false;
    }
    let canonical = canonicalize_logical(path);
    canonical
        .strip_prefix(mount)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty())
}

/// Final component of a `/`-separated path. Empty when the path ends in `/`.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// Place `path` under `mount`.
///
/// A path already inside the mount is returned in canonical form. Anything
/// else keeps only its base name, so caller directory structure never leaks
/// into the container.
pub fn rebase_onto_mount(path: &str, mount: &str) -> String {
    if is_under_mount(path, mount) {
        return canonicalize_logical(path);
    }
    let name = base_name(path);
    if name.is_empty() || name == "." || name == ".." {
        return format!("{mount}/");
    }
    format!("{mount}/{name}")
}
