//! Logical path handling.
//!
//! Every file the build tools track is addressed by a path *relative* to one
//! of the configured roots (source, destination, dependency, publish). These
//! helpers make sure such a path can't climb out of its root and give it a
//! single canonical spelling, so that `Cars\BMW\body.mesh`, `Cars/./BMW//body.mesh`
//! and `Cars/BMW/body.mesh` end up as the same dependency key.

use crate::error::{ErrorKind, Result};
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` in a path that must stay inside its root.
///
/// Leading separators are dropped (node files sometimes carry them), but a
/// `..` that would climb above the root, a drive prefix, an embedded NUL or
/// a path that resolves to nothing is rejected.
///
/// ```
/// use std::path::Path;
/// use databuild_storage::validate_path;
/// assert!(validate_path("Cars/BMW/body.mesh").is_ok());
/// assert!(validate_path("Cars/../Fonts/ui.font").is_ok());
/// assert!(validate_path("../outside.bin").is_err());
/// assert_eq!(
///     validate_path("Tracks/./Track1//../Track2/track.bin").unwrap(),
///     Path::new("Tracks/Track2/track.bin")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let invalid = || ErrorKind::InvalidPath(path.to_path_buf());
    let mut resolved: Vec<&OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir if resolved.pop().is_none() => exn::bail!(invalid()),
            Component::ParentDir => {},
            // Unix paths may carry a NUL that truncates the name at the syscall.
            Component::Normal(name) if name.as_encoded_bytes().contains(&0) => exn::bail!(invalid()),
            Component::Normal(name) => resolved.push(name),
        }
    }
    if resolved.is_empty() {
        exn::bail!(invalid());
    }
    Ok(resolved.into_iter().collect())
}

/// The `/`-separated spelling of a relative path, as written into cache files
/// and used for path-derived identifiers.
///
/// Backslashes are treated as separators regardless of platform: node files
/// and dependency records written on Windows must still resolve elsewhere.
///
/// ```
/// use databuild_storage::logical_name;
/// assert_eq!(logical_name("Cars\\BMW\\body.mesh"), "Cars/BMW/body.mesh");
/// assert_eq!(logical_name("./Fonts//ui.font"), "Fonts/ui.font");
/// ```
pub fn logical_name(path: impl AsRef<Path>) -> String {
    let raw = path.as_ref().to_string_lossy().replace('\\', "/");
    raw.split('/').filter(|part| !part.is_empty() && *part != ".").collect::<Vec<_>>().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Cars/BMW/body.mesh", "Cars/BMW/body.mesh")]
    #[case("Cars//BMW/./body.mesh", "Cars/BMW/body.mesh")]
    #[case("Tracks/Track1/../Track2/track.bin", "Tracks/Track2/track.bin")]
    #[case("Fonts/", "Fonts")]
    #[case("/Game.gdn", "Game.gdn")]
    fn test_valid_paths(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("../Game.gda")]
    #[case("Cars/../../Game.gda")]
    #[case("..")]
    #[case("")]
    #[case("./")]
    #[case("a\0b")]
    fn test_invalid_paths(#[case] input: &str) {
        assert!(validate(input).is_err());
    }

    #[rstest]
    #[case("Menu\\FrontEnd\\main.ui", "Menu/FrontEnd/main.ui")]
    #[case("Menu/FrontEnd/main.ui", "Menu/FrontEnd/main.ui")]
    #[case("./Menu//main.ui", "Menu/main.ui")]
    #[case("main.ui", "main.ui")]
    fn test_logical_name(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(logical_name(input), expected);
    }
}
