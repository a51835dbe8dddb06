//! Parsing the dependency information emitted by DMD's `-deps` flag.
//!
//! Each line has the shape
//!
//! ```text
//! <module> (<path>) : <attrs> : <dep-module> (<dep-path>)[:<symbol>]
//! ```
//!
//! The file being compiled appears as the first parenthesized path of the
//! first line; every line contributes its second parenthesized path as a
//! dependency. A trailing `:<symbol>` binding is irrelevant here and is
//! discarded, as are repeated dependencies.

use {
    crate::span::Span,
    thiserror::Error,
};

/// Returned when DMD dependency output could not be parsed.
#[allow(missing_docs)]
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DmdParseError
{
    #[error("expected '(' in depfile")]
    MissingParen,

    #[error("expected ')' in depfile")]
    UnterminatedPath,
}

/// The parsed product of DMD dependency output:
/// the compiled file and its deduplicated dependencies.
///
/// Like [`Depfile`][`crate::depfile::Depfile`], the record owns the
/// de-escaped parse buffer and aliases it through spans.
#[derive(Debug)]
pub struct DmdDepfile
{
    buf: Box<[u8]>,
    out: Span,
    ins: Vec<Span>,
}

impl DmdDepfile
{
    /// Parse DMD dependency output.
    ///
    /// Takes ownership of the raw file contents and de-escapes the
    /// parenthesized paths in place.
    pub fn parse(buf: Vec<u8>) -> Result<Self, DmdParseError>
    {
        let mut buf = buf.into_boxed_slice();
        let (out, ins) = parse_in_place(&mut buf)?;
        Ok(Self{buf, out, ins})
    }

    /// The path of the compiled file.
    pub fn out(&self) -> &[u8]
    {
        self.out.get(&self.buf)
    }

    /// The dependency paths, in order of first appearance.
    pub fn ins(&self) -> impl ExactSizeIterator<Item = &[u8]> + '_
    {
        self.ins.iter().map(|span| span.get(&self.buf))
    }
}

fn parse_in_place(b: &mut [u8]) -> Result<(Span, Vec<Span>), DmdParseError>
{
    let end = b.len();

    // pos: current parser input point.
    // write: current output point; paths are de-escaped into
    // the already-consumed prefix of the buffer.
    let mut pos = 0;
    let mut write = 0;
    let mut out: Option<Span> = None;
    let mut ins: Vec<Span> = Vec::new();

    while pos < end {
        // Skip blank lines.
        if b[pos] == b'\n' {
            pos += 1;
            continue;
        }
        if b[pos] == b'\r' && b.get(pos + 1) == Some(&b'\n') {
            pos += 2;
            continue;
        }

        // The module's own path.
        skip_to_paren(b, &mut pos)?;
        let module_path = read_path(b, &mut pos, &mut write)?;
        if out.is_none() {
            out = Some(module_path);
        }

        // The dependency path.
        skip_to_paren(b, &mut pos)?;
        let dep_path = read_path(b, &mut pos, &mut write)?;

        // An optional `:symbol` binding and the newline.
        while pos < end && b[pos] != b'\n' {
            pos += 1;
        }
        if pos < end {
            pos += 1;
        }

        // Repeated dependencies are recorded once.
        let known = {
            let b: &[u8] = b;
            ins.iter().any(|span| span.get(b) == dep_path.get(b))
        };
        if !known {
            ins.push(dep_path);
        }
    }

    match out {
        Some(out) => Ok((out, ins)),
        None      => Err(DmdParseError::MissingParen),
    }
}

/// Advance past the next `(` on the current line.
fn skip_to_paren(b: &[u8], pos: &mut usize) -> Result<(), DmdParseError>
{
    while *pos < b.len() {
        match b[*pos] {
            b'(' => {
                *pos += 1;
                return Ok(());
            },
            b'\n' => break,
            _ => *pos += 1,
        }
    }
    Err(DmdParseError::MissingParen)
}

/// De-escape a parenthesized path into the consumed prefix of the buffer.
///
/// `\\`, `\(`, and `\)` lose their backslash;
/// every other byte passes through unchanged.
fn read_path(b: &mut [u8], pos: &mut usize, write: &mut usize)
    -> Result<Span, DmdParseError>
{
    let start = *write;

    loop {
        if *pos >= b.len() {
            return Err(DmdParseError::UnterminatedPath);
        }
        match b[*pos] {
            b'\\' if matches!(
                b.get(*pos + 1).copied(),
                Some(b'\\') | Some(b'(') | Some(b')'),
            ) => {
                b[*write] = b[*pos + 1];
                *write += 1;
                *pos += 2;
            },
            b')' => {
                *pos += 1;
                return Ok(Span::new(start, *write - start));
            },
            b'\n' => return Err(DmdParseError::UnterminatedPath),
            c => {
                b[*write] = c;
                *write += 1;
                *pos += 1;
            },
        }
    }
}
