//! Writing the deplist wire format.
//!
//! A deplist is the normalized list of input paths the build graph
//! ingests, regardless of which compiler produced them. The layout is
//! a magic line, a little-endian `u32` entry count, and then each path
//! as a little-endian `u32` byte length followed by the raw bytes;
//! paths need not be valid UTF-8.

use std::io::{self, Write};

/// The bytes every deplist starts with.
pub const MAGIC: &[u8] = b"#deplist\n";

/// Write `paths` as a deplist.
pub fn write<W>(out: &mut W, paths: &[&[u8]]) -> io::Result<()>
    where W: Write
{
    out.write_all(MAGIC)?;
    out.write_all(&(paths.len() as u32).to_le_bytes())?;
    for path in paths {
        out.write_all(&(path.len() as u32).to_le_bytes())?;
        out.write_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn layout()
    {
        let mut buf = Vec::new();
        write(&mut buf, &[b"ninja.cc", b"ninja.h"]).unwrap();
        assert_eq!(
            buf,
            b"#deplist\n\
              \x02\x00\x00\x00\
              \x08\x00\x00\x00ninja.cc\
              \x07\x00\x00\x00ninja.h".as_slice(),
        );
    }

    #[test]
    fn no_paths()
    {
        let mut buf = Vec::new();
        write(&mut buf, &[]).unwrap();
        assert_eq!(buf, b"#deplist\n\x00\x00\x00\x00".as_slice());
    }
}
