//! Parsing the `/showIncludes` output of MSVC's cl.exe.
//!
//! cl.exe reports each included file on standard error as a line of the
//! form `Note: including file: <path>`, interleaved with ordinary
//! compiler output. This module extracts the file list and returns the
//! remaining output (which may contain e.g. warning information).

/// The fixed prefix cl.exe puts in front of every include note.
const MAGIC_PREFIX: &[u8] = b"Note: including file: ";

/// Split compiler output into include notes and everything else.
///
/// Included files are appended to `includes` as spans borrowing from
/// `output`, with the leading spaces cl.exe uses for nesting depth and
/// any trailing line terminator removed. All other lines are copied
/// verbatim into the returned filtered output.
pub fn filter<'a>(output: &'a [u8], includes: &mut Vec<&'a [u8]>) -> Vec<u8>
{
    let mut filtered = Vec::new();

    let mut pos = 0;
    while pos < output.len() {
        let next = match output[pos ..].iter().position(|&c| c == b'\n') {
            Some(offset) => pos + offset + 1,
            None         => output.len(),
        };

        if output.len() - pos > MAGIC_PREFIX.len()
            && output[pos ..].starts_with(MAGIC_PREFIX) {
            let mut start = pos + MAGIC_PREFIX.len();
            while start < next && output[start] == b' ' {
                start += 1;
            }
            let mut len = next - start;
            while len > 0 && matches!(output[start + len - 1], b'\n' | b'\r') {
                len -= 1;
            }
            includes.push(&output[start .. start + len]);
        } else {
            filtered.extend_from_slice(&output[pos .. next]);
        }

        pos = next;
    }

    filtered
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn empty()
    {
        let mut includes = Vec::new();
        let filtered = filter(b"", &mut includes);
        assert_eq!(filtered, b"");
        assert!(includes.is_empty());
    }

    #[test]
    fn simple()
    {
        let mut includes = Vec::new();
        let filtered = filter(
            b"Sample compiler output\r\n\
              Note: including file: c:\\Program Files\\foobar.h\r\n\
              another text line\r\n\
              Note: including file:   c:\\initspaces.h\r\n",
            &mut includes,
        );
        assert_eq!(
            filtered,
            b"Sample compiler output\r\nanother text line\r\n",
        );
        assert_eq!(
            includes,
            [
                b"c:\\Program Files\\foobar.h".as_slice(),
                b"c:\\initspaces.h",
            ],
        );
    }

    #[test]
    fn note_on_last_line_without_newline()
    {
        let mut includes = Vec::new();
        let filtered = filter(
            b"Note: including file: c:\\last.h",
            &mut includes,
        );
        assert_eq!(filtered, b"");
        assert_eq!(includes, [b"c:\\last.h"]);
    }
}
