//! Parsing the dependency information emitted by gcc's `-M` flags.

use {
    crate::span::Span,
    graupel_util::logger::{Level, Logger},
    thiserror::Error,
};

// A note on backslashes in Makefiles, from reading the docs:
// Backslash-newline is the line continuation character.
// Backslash-# escapes a # (otherwise meaningful as a comment start).
// Backslash-% escapes a % (otherwise meaningful as a special).
// Finally, quoting the GNU manual, "Backslashes that are not in danger
// of quoting '%' characters go unmolested."
//
// Rather than implement all of the above, we follow what GCC/Clang produce:
// backslashes escape a space or hash sign.
// When a space is preceded by 2N+1 backslashes, it represents N backslashes
// followed by space.
// When a space is preceded by 2N backslashes, it represents 2N backslashes at
// the end of a filename.
// A hash sign is escaped by a single backslash. All other backslashes remain
// unchanged.

/// What to do when a depfile names distinct targets on separate lines.
///
/// Distinct targets on a single line are always an error.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DistinctTargetLines
{
    Error,
    #[default]
    Warn,
    Ignore,
}

/// Options for [`Depfile::parse`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ParseOptions
{
    /// Policy for distinct targets on separate lines.
    pub distinct_target_lines: DistinctTargetLines,
}

/// Returned when a depfile could not be parsed.
#[allow(missing_docs)]
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ParseError
{
    #[error("expected ':' in depfile")]
    MissingColon,

    #[error("depfile has multiple output paths")]
    MultipleOutputs,

    #[error("depfile has multiple output paths (on separate lines)")]
    MultipleOutputsOnSeparateLines,
}

/// One parsed depfile rule: a primary target and its inputs.
///
/// The record owns the (de-escaped) parse buffer;
/// targets and inputs are spans into it.
#[derive(Debug)]
pub struct Depfile
{
    buf: Box<[u8]>,
    out: Span,
    ins: Vec<Span>,
}

impl Depfile
{
    /// Parse a depfile.
    ///
    /// Takes ownership of the raw file contents and de-escapes them
    /// in place; the returned record aliases the rewritten buffer.
    /// Warnings are reported through `logger`.
    pub fn parse(
        buf: Vec<u8>,
        options: &ParseOptions,
        logger: &dyn Logger,
    ) -> Result<Self, ParseError>
    {
        let mut buf = buf.into_boxed_slice();
        let (out, ins) = parse_in_place(&mut buf, options, logger)?;
        Ok(Self{buf, out, ins})
    }

    /// The primary target of the rule.
    pub fn out(&self) -> &[u8]
    {
        self.out.get(&self.buf)
    }

    /// The inputs of the rule, in order of appearance.
    pub fn ins(&self) -> impl ExactSizeIterator<Item = &[u8]> + '_
    {
        self.ins.iter().map(|span| span.get(&self.buf))
    }
}

/// Bytes that may appear unescaped in a filename.
fn is_filename_byte(c: u8) -> bool
{
    matches!(c,
        b'a' ..= b'z' | b'A' ..= b'Z' | b'0' ..= b'9'
        | b'+' | b',' | b'/' | b'_' | b':' | b'.' | b'~'
        | b'(' | b')' | b'{' | b'}' | b'%' | b'=' | b'@'
        | b'[' | b']' | b'!' | b'-'
        | 0x80 ..= 0xFF)
}

fn parse_in_place(
    b: &mut [u8],
    options: &ParseOptions,
    logger: &dyn Logger,
) -> Result<(Span, Vec<Span>), ParseError>
{
    let end = b.len();

    // pos: current parser input point.
    // parsing_targets: whether we are parsing targets or dependencies.
    let mut pos = 0;
    let mut out: Option<Span> = None;
    let mut ins: Vec<Span> = Vec::new();
    let mut have_target = false;
    let mut have_secondary_target_on_this_rule = false;
    let mut have_newline_since_primary_target = false;
    let mut warned_distinct_target_lines = false;
    let mut parsing_targets = true;

    while pos < end {
        let mut have_newline = false;

        // write: current output point (typically equal to pos,
        // but it falls behind as we de-escape backslashes).
        let mut write = pos;

        // filename: start of the current parsed filename.
        let filename = write;

        loop {
            if pos >= end {
                break;
            }

            // start: beginning of the current parsed span.
            let start = pos;

            match b[pos] {
                b'\\' => {
                    let mut run = 0;
                    while pos < end && b[pos] == b'\\' {
                        run += 1;
                        pos += 1;
                    }
                    match b.get(pos).copied() {
                        Some(b' ') => {
                            pos += 1;
                            if run % 2 == 1 {
                                // 2N+1 backslashes plus space ->
                                // N backslashes plus space.
                                let n = run / 2;
                                b[write .. write + n].fill(b'\\');
                                write += n;
                                b[write] = b' ';
                                write += 1;
                                continue;
                            }
                            // 2N backslashes plus space ->
                            // 2N backslashes, end of filename.
                            b[write .. write + run].fill(b'\\');
                            write += run;
                            break;
                        },
                        Some(b'#') => {
                            // De-escape hash sign,
                            // but preserve other leading backslashes.
                            pos += 1;
                            b[write .. write + run - 1].fill(b'\\');
                            write += run - 1;
                            b[write] = b'#';
                            write += 1;
                            continue;
                        },
                        Some(c) if c != b'\n' && c != b'\r' && c != 0 => {
                            // Backslashes followed by a span of plain text.
                            pos += 1;
                            let len = pos - start;
                            if write < start {
                                b.copy_within(start .. pos, write);
                            }
                            write += len;
                            continue;
                        },
                        _ if run >= 2 => {
                            // Backslashes at the end of a line or of the
                            // input pass through unchanged.
                            if write < start {
                                b.copy_within(start .. start + run, write);
                            }
                            write += run;
                            continue;
                        },
                        Some(b'\n') => {
                            // A line continuation ends the current file name.
                            pos += 1;
                            break;
                        },
                        Some(b'\r') if b.get(pos + 1) == Some(&b'\n') => {
                            // A line continuation ends the current file name.
                            pos += 2;
                            break;
                        },
                        _ => {
                            // A lone backslash before a carriage return or
                            // the end of input is swallowed.
                            break;
                        },
                    }
                },
                b'$' if b.get(pos + 1) == Some(&b'$') => {
                    // De-escape dollar character.
                    pos += 2;
                    b[write] = b'$';
                    write += 1;
                    continue;
                },
                c if is_filename_byte(c) => {
                    // Got a span of plain text.
                    while pos < end && is_filename_byte(b[pos]) {
                        pos += 1;
                    }
                    let len = pos - start;
                    // Need to shift it over if we're overwriting backslashes.
                    if write < start {
                        b.copy_within(start .. pos, write);
                    }
                    write += len;
                    continue;
                },
                b'\r' if b.get(pos + 1) == Some(&b'\n') => {
                    // A newline ends the current file name
                    // and the current rule.
                    pos += 2;
                    have_newline = true;
                    break;
                },
                b'\n' => {
                    // A newline ends the current file name
                    // and the current rule.
                    pos += 1;
                    have_newline = true;
                    break;
                },
                _ => {
                    // For any other character (e.g. whitespace), swallow it
                    // here, allowing the outer logic to loop around again.
                    pos += 1;
                    break;
                },
            }
        }

        let mut len = write - filename;
        let is_dependency = !parsing_targets;
        if len > 0 && b[filename + len - 1] == b':' {
            len -= 1;  // Strip off trailing colon, if any.
            parsing_targets = false;
            have_target = true;
        }

        if len > 0 {
            let span = Span::new(filename, len);
            if is_dependency {
                if have_secondary_target_on_this_rule {
                    if !have_newline_since_primary_target {
                        return Err(ParseError::MultipleOutputs);
                    }
                    match options.distinct_target_lines {
                        DistinctTargetLines::Error => {
                            return Err(
                                ParseError::MultipleOutputsOnSeparateLines
                            );
                        },
                        DistinctTargetLines::Warn => {
                            if !warned_distinct_target_lines {
                                warned_distinct_target_lines = true;
                                logger.on_message(
                                    Level::Warning,
                                    "depfile has multiple output paths \
                                     (on separate lines); continuing anyway",
                                );
                            }
                            continue;
                        },
                        DistinctTargetLines::Ignore => continue,
                    }
                }
                ins.push(span);
            } else if out.is_none() {
                out = Some(span);
            } else if span.get(b) != out.unwrap().get(b) {
                have_secondary_target_on_this_rule = true;
            }
        }

        if have_newline {
            // A newline ends a rule, so the next filename
            // will be a new target.
            parsing_targets = true;
            have_secondary_target_on_this_rule = false;
            if have_target {
                have_newline_since_primary_target = true;
            }
        }
    }

    if !have_target {
        return Err(ParseError::MissingColon);
    }

    Ok((out.unwrap_or_default(), ins))
}
