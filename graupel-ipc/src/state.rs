//! The state the server and client compare before building.

use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

/// Everything that can affect a build, serialized for comparison.
///
/// The server captures a fingerprint at boot; a client sends its own
/// with every request. Only a bytewise-equal fingerprint may be served,
/// so a change of arguments, tool version, or tool binary retires the
/// resident server instead of producing a stale build.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fingerprint
{
    bytes: Vec<u8>,
}

impl Fingerprint
{
    /// Serialize the given argv and tool version,
    /// together with the identity of the running binary.
    pub fn capture<I, S>(argv: I, version: &str) -> Self
        where I: IntoIterator<Item = S>
            , S: AsRef<OsStr>
    {
        let mut bytes = Vec::new();

        for arg in argv {
            bytes.extend_from_slice(arg.as_ref().as_bytes());
            bytes.push(0);
        }

        bytes.extend_from_slice(version.as_bytes());
        bytes.push(0);

        append_binary_identity(&mut bytes);

        Self{bytes}
    }

    /// The serialized form, as sent over the transport.
    pub fn as_bytes(&self) -> &[u8]
    {
        &self.bytes
    }

    /// Whether a received serialized fingerprint equals this one.
    pub fn matches(&self, received: &[u8]) -> bool
    {
        self.bytes == received
    }
}

/// Append the mtime of the running executable.
///
/// Convenient during development: every new build of the tool has a new
/// mtime, so a stale resident server is never accidentally reused.
/// Silently omitted when the executable cannot be inspected.
#[cfg(target_os = "linux")]
fn append_binary_identity(bytes: &mut Vec<u8>)
{
    use std::{ffi::CString, os::unix::ffi::OsStringExt};

    let Ok(exe) = os_ext::readlink(c"/proc/self/exe")
        else { return };
    let Ok(exe) = CString::new(exe.into_vec())
        else { return };
    let Ok(statbuf) = os_ext::stat(&exe)
        else { return };

    bytes.extend_from_slice(&statbuf.st_mtime.to_ne_bytes());
    bytes.extend_from_slice(&statbuf.st_mtime_nsec.to_ne_bytes());
}

#[cfg(not(target_os = "linux"))]
fn append_binary_identity(_bytes: &mut Vec<u8>)
{
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn deterministic()
    {
        let a = Fingerprint::capture(["graupel", "-j8"], "1.0");
        let b = Fingerprint::capture(["graupel", "-j8"], "1.0");
        assert_eq!(a, b);
        assert!(a.matches(b.as_bytes()));
    }

    #[test]
    fn sensitive_to_argv_and_version()
    {
        let base = Fingerprint::capture(["graupel", "-j8"], "1.0");
        assert_ne!(base, Fingerprint::capture(["graupel", "-j9"], "1.0"));
        assert_ne!(base, Fingerprint::capture(["graupel"], "1.0"));
        assert_ne!(base, Fingerprint::capture(["graupel", "-j8"], "1.1"));
    }

    #[test]
    fn nul_separates_arguments()
    {
        // ["ab", "c"] and ["a", "bc"] must not collide.
        let a = Fingerprint::capture(["ab", "c"], "1.0");
        let b = Fingerprint::capture(["a", "bc"], "1.0");
        assert_ne!(a, b);
    }
}
