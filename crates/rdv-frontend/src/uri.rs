//! URI/path resolution for worker launch inputs. URIs of the form
//! `fmu://...` are rewritten to be relative to the FMU location; three
//! schemes are supported: absolute path, `file://`, and `fmu://`.

use std::path::{Path, PathBuf};

/// Resolves `location` (absolute path, `file://` URI, or `fmu://` URI)
/// against `fmu_location`, rewriting vendor-declared executable/entry-point
/// URIs before launch.
pub fn resolve(location: &str, fmu_location: &Path) -> PathBuf {
    if let Some(rest) = location.strip_prefix("fmu://") {
        return fmu_location.join(rest.trim_start_matches('/'));
    }
    if let Some(rest) = location.strip_prefix("file://") {
        return PathBuf::from(rest);
    }
    let as_path = Path::new(location);
    if as_path.is_absolute() {
        as_path.to_path_buf()
    } else {
        fmu_location.join(as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmu_scheme_is_relative_to_location() {
        let resolved = resolve("fmu://bin/worker", Path::new("/opt/models/a"));
        assert_eq!(resolved, PathBuf::from("/opt/models/a/bin/worker"));
    }

    #[test]
    fn file_scheme_is_absolute() {
        let resolved = resolve("file:///usr/bin/worker", Path::new("/opt/models/a"));
        assert_eq!(resolved, PathBuf::from("/usr/bin/worker"));
    }

    #[test]
    fn absolute_path_passes_through() {
        let resolved = resolve("/usr/bin/worker", Path::new("/opt/models/a"));
        assert_eq!(resolved, PathBuf::from("/usr/bin/worker"));
    }

    #[test]
    fn bare_name_is_relative_to_location() {
        let resolved = resolve("worker.dat", Path::new("/opt/models/a"));
        assert_eq!(resolved, PathBuf::from("/opt/models/a/worker.dat"));
    }
}
