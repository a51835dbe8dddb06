//! The tool version.

/// The version number of the current graupel release.
///
/// Participates in the state fingerprint the build server compares,
/// so upgrading the tool retires any resident servers.
pub const VERSION: &str = "0.1.0";
