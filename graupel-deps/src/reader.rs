//! Reading depfiles from disk, including aggregated ones.
//!
//! Aggregated depfiles (conventionally `.D`) hold one Make-style rule
//! per output. They are read and parsed once, and the per-output
//! records are handed out from a cache, each to at most one caller.

use {
    crate::depfile::{Depfile, ParseError, ParseOptions},
    graupel_util::logger::Logger,
    std::{
        collections::HashMap,
        fs, io,
        mem::take,
        path::{Path, PathBuf},
        sync::Mutex,
    },
    thiserror::Error,
};

/// Capability for reading files.
///
/// The build tool proper scans the file system through its own layer;
/// this narrow trait is what the depfile reader needs from it,
/// and what tests substitute.
pub trait Disk
{
    /// Read the entire contents of a file.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// [`Disk`] backed by the real file system.
pub struct RealDisk;

impl Disk for RealDisk
{
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>
    {
        fs::read(path)
    }
}

/// Returned when a depfile could not be read.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ReadError
{
    /// The file exists but could not be read.
    #[error("{}: {}", .path.display(), .error)]
    Io{path: PathBuf, #[source] error: io::Error},

    /// The file could not be parsed.
    #[error("{}: {}", .path.display(), .error)]
    Parse{path: PathBuf, #[source] error: ParseError},

    /// The file names a target other than the requested output.
    #[error("expected depfile '{}' to mention '{}', got '{}'",
            .path.display(),
            String::from_utf8_lossy(.expected),
            String::from_utf8_lossy(.actual))]
    OutputMismatch{path: PathBuf, expected: Vec<u8>, actual: Vec<u8>},
}

/// Reader for depfiles, with a cache for the aggregated kind.
///
/// The cache maps a depfile path to the not-yet-consumed records parsed
/// from it. One reader is shared by the whole build; the lock is held
/// across the check-read-parse-insert sequence so concurrent requests
/// for one path collapse to a single read.
#[derive(Default)]
pub struct DepfileReader
{
    cache: Mutex<HashMap<PathBuf, HashMap<Box<[u8]>, Depfile>>>,
}

impl DepfileReader
{
    /// Create a reader with an empty cache.
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Read a single-rule depfile and check it mentions `output`.
    ///
    /// A missing or empty file is not an error;
    /// the build simply proceeds without recorded dependencies.
    pub fn read(
        &self,
        disk: &dyn Disk,
        path: &Path,
        output: &[u8],
        options: &ParseOptions,
        logger: &dyn Logger,
    ) -> Result<Option<Depfile>, ReadError>
    {
        let contents = match disk.read_file(path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound =>
                return Ok(None),
            Err(error) =>
                return Err(ReadError::Io{path: path.to_owned(), error}),
        };

        if contents.is_empty() {
            return Ok(None);
        }

        let depfile =
            Depfile::parse(contents, options, logger)
            .map_err(|error| ReadError::Parse{path: path.to_owned(), error})?;

        // Check that this depfile matches our output.
        if depfile.out() != output {
            return Err(ReadError::OutputMismatch{
                path:     path.to_owned(),
                expected: output.to_vec(),
                actual:   depfile.out().to_vec(),
            });
        }

        Ok(Some(depfile))
    }

    /// Take the record for `output` out of the aggregated depfile `path`.
    ///
    /// The file is read and split on the first request for its path;
    /// every subsequent request is served from the cache. Each record
    /// is handed out once: asking again for the same output — or for an
    /// output the file never mentioned — succeeds with [`None`].
    pub fn read_group(
        &self,
        disk: &dyn Disk,
        path: &Path,
        output: &[u8],
        options: &ParseOptions,
        logger: &dyn Logger,
    ) -> Result<Option<Depfile>, ReadError>
    {
        let mut cache = self.cache.lock().unwrap();

        if !cache.contains_key(path) {
            let entries = load_group(disk, path, options, logger)?;
            cache.insert(path.to_owned(), entries);
        }

        let entries = cache.get_mut(path).unwrap();
        Ok(entries.remove(output))
    }
}

/// Read an aggregated depfile and parse its individual rules.
fn load_group(
    disk: &dyn Disk,
    path: &Path,
    options: &ParseOptions,
    logger: &dyn Logger,
) -> Result<HashMap<Box<[u8]>, Depfile>, ReadError>
{
    let mut entries = HashMap::new();

    let contents = match disk.read_file(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == io::ErrorKind::NotFound =>
            return Ok(entries),
        Err(error) =>
            return Err(ReadError::Io{path: path.to_owned(), error}),
    };

    // Split the file into rules by the Make continuation convention:
    // a rule extends while the last non-whitespace byte of the line
    // is a backslash.
    let mut rule: Vec<u8> = Vec::new();
    for line in contents.split_inclusive(|&c| c == b'\n') {
        rule.extend_from_slice(line);
        if !line.ends_with(b"\n") {
            rule.push(b'\n');
        }

        if line.trim_ascii_end().ends_with(b"\\") {
            continue;
        }

        file_rule(&mut rule, &mut entries, path, options, logger)?;
    }
    file_rule(&mut rule, &mut entries, path, options, logger)?;

    Ok(entries)
}

/// Parse one rule and file it under its primary target.
fn file_rule(
    rule: &mut Vec<u8>,
    entries: &mut HashMap<Box<[u8]>, Depfile>,
    path: &Path,
    options: &ParseOptions,
    logger: &dyn Logger,
) -> Result<(), ReadError>
{
    let rule = take(rule);

    // Blank separator lines do not make a rule.
    if rule.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }

    let depfile =
        Depfile::parse(rule, options, logger)
        .map_err(|error| ReadError::Parse{path: path.to_owned(), error})?;

    let target = depfile.out().to_vec().into_boxed_slice();
    entries.insert(target, depfile);

    Ok(())
}

#[cfg(test)]
mod tests
{
    use {
        super::*,
        graupel_util::logger::NullLogger,
        std::cell::RefCell,
    };

    struct VirtualDisk
    {
        files: HashMap<PathBuf, Vec<u8>>,
        reads: RefCell<Vec<PathBuf>>,
    }

    impl VirtualDisk
    {
        fn new() -> Self
        {
            Self{files: HashMap::new(), reads: RefCell::new(Vec::new())}
        }

        fn create(&mut self, path: &str, contents: &[u8])
        {
            self.files.insert(PathBuf::from(path), contents.to_vec());
        }

        fn reads(&self) -> usize
        {
            self.reads.borrow().len()
        }
    }

    impl Disk for VirtualDisk
    {
        fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>
        {
            match self.files.get(path) {
                Some(contents) => {
                    self.reads.borrow_mut().push(path.to_owned());
                    Ok(contents.clone())
                },
                None => Err(io::ErrorKind::NotFound.into()),
            }
        }
    }

    fn read(disk: &dyn Disk, path: &str, output: &[u8])
        -> Result<Option<Depfile>, ReadError>
    {
        DepfileReader::new().read(
            disk, Path::new(path), output,
            &ParseOptions::default(), &NullLogger,
        )
    }

    fn read_group<'a>(
        reader: &'a DepfileReader,
        disk: &dyn Disk,
        path: &str,
        output: &[u8],
    ) -> Result<Option<Depfile>, ReadError>
    {
        reader.read_group(
            disk, Path::new(path), output,
            &ParseOptions::default(), &NullLogger,
        )
    }

    fn assert_record(depfile: &Depfile, out: &[u8], ins: &[&[u8]])
    {
        assert_eq!(depfile.out(), out);
        assert_eq!(depfile.ins().collect::<Vec<_>>(), ins);
    }

    #[test]
    fn vanilla_depfile()
    {
        let mut disk = VirtualDisk::new();
        disk.create("VanillaDepfile.d", b"out1: \\\n in1 \\\n in2\n");

        let depfile =
            read(&disk, "VanillaDepfile.d", b"out1").unwrap().unwrap();
        assert_record(&depfile, b"out1", &[b"in1", b"in2"]);
    }

    #[test]
    fn output_mismatch()
    {
        let mut disk = VirtualDisk::new();
        disk.create("Mismatch.d", b"out1: in1 in2\n");

        let error = read(&disk, "Mismatch.d", b"out2").unwrap_err();
        assert_eq!(
            error.to_string(),
            "expected depfile 'Mismatch.d' to mention 'out2', got 'out1'",
        );
    }

    #[test]
    fn one_depfile()
    {
        let mut disk = VirtualDisk::new();
        disk.create("OneDepfile.D", b"out1: \\\n in1 \\\n in2\n");

        let reader = DepfileReader::new();
        let depfile =
            read_group(&reader, &disk, "OneDepfile.D", b"out1")
            .unwrap().unwrap();
        assert_record(&depfile, b"out1", &[b"in1", b"in2"]);
    }

    #[test]
    fn two_depfiles()
    {
        let mut disk = VirtualDisk::new();
        disk.create(
            "TwoDepfiles.D",
            b"out1: \\\n in1 \\\n in2\nout2:\\\n in3 \\\n in4 \\\n\n",
        );

        let reader = DepfileReader::new();

        let depfile =
            read_group(&reader, &disk, "TwoDepfiles.D", b"out1")
            .unwrap().unwrap();
        assert_record(&depfile, b"out1", &[b"in1", b"in2"]);
        assert_eq!(disk.reads(), 1);

        // The second output comes from the cache, not from disk.
        let depfile =
            read_group(&reader, &disk, "TwoDepfiles.D", b"out2")
            .unwrap().unwrap();
        assert_record(&depfile, b"out2", &[b"in3", b"in4"]);
        assert_eq!(disk.reads(), 1);

        // Ask again - get nothing (but not an error).
        let depfile =
            read_group(&reader, &disk, "TwoDepfiles.D", b"out2").unwrap();
        assert!(depfile.is_none());
        assert_eq!(disk.reads(), 1);
    }

    #[test]
    fn two_times_two_depfiles()
    {
        let mut disk = VirtualDisk::new();
        disk.create(
            "TwoDepfiles.D",
            b"out1: in1 in2\nout2: in3 in4\n\n",
        );
        disk.create(
            "AnotherTwoDepfiles.D",
            b"out3: in5 in6\nout4: in7  in8 \n",
        );

        let reader = DepfileReader::new();
        assert_eq!(disk.reads(), 0);

        // Read out1, cache out2.
        let depfile =
            read_group(&reader, &disk, "TwoDepfiles.D", b"out1")
            .unwrap().unwrap();
        assert_record(&depfile, b"out1", &[b"in1", b"in2"]);
        assert_eq!(disk.reads(), 1);

        // Read out4, cache out3.
        let depfile =
            read_group(&reader, &disk, "AnotherTwoDepfiles.D", b"out4")
            .unwrap().unwrap();
        assert_record(&depfile, b"out4", &[b"in7", b"in8"]);
        assert_eq!(disk.reads(), 2);

        // Retrieve the remaining records from the cache.
        let depfile =
            read_group(&reader, &disk, "TwoDepfiles.D", b"out2")
            .unwrap().unwrap();
        assert_record(&depfile, b"out2", &[b"in3", b"in4"]);

        let depfile =
            read_group(&reader, &disk, "AnotherTwoDepfiles.D", b"out3")
            .unwrap().unwrap();
        assert_record(&depfile, b"out3", &[b"in5", b"in6"]);

        // No new file reads.
        assert_eq!(disk.reads(), 2);
    }

    #[test]
    fn new_file_in_project()
    {
        let mut disk = VirtualDisk::new();
        disk.create("TwoDepfiles.D", b"out1: in1 in2\nout2: in3 in4\n\n");

        // An output the file never mentioned is not an error;
        // it may simply be new in the project.
        let reader = DepfileReader::new();
        let depfile =
            read_group(&reader, &disk, "TwoDepfiles.D", b"out3").unwrap();
        assert!(depfile.is_none());
    }

    #[test]
    fn non_existent_file()
    {
        let disk = VirtualDisk::new();

        let depfile = read(&disk, "NonExistent.d", b"out").unwrap();
        assert!(depfile.is_none());

        let reader = DepfileReader::new();
        let depfile =
            read_group(&reader, &disk, "NonExistent.D", b"out").unwrap();
        assert!(depfile.is_none());
    }

    #[test]
    fn empty_file()
    {
        let mut disk = VirtualDisk::new();
        disk.create("Empty.d", b"");
        disk.create("Empty.D", b"");

        let depfile = read(&disk, "Empty.d", b"out").unwrap();
        assert!(depfile.is_none());

        let reader = DepfileReader::new();
        let depfile =
            read_group(&reader, &disk, "Empty.D", b"out").unwrap();
        assert!(depfile.is_none());

        // The empty file is cached all the same.
        let depfile =
            read_group(&reader, &disk, "Empty.D", b"out").unwrap();
        assert!(depfile.is_none());
        assert_eq!(disk.reads(), 2);
    }

    #[test]
    fn parse_errors_carry_the_path()
    {
        let mut disk = VirtualDisk::new();
        disk.create("Broken.D", b"no colon on this line\n");

        let reader = DepfileReader::new();
        let error =
            read_group(&reader, &disk, "Broken.D", b"out").unwrap_err();
        assert_eq!(error.to_string(), "Broken.D: expected ':' in depfile");
    }

    #[test]
    fn real_disk()
    {
        let dir = os_ext::mkdtemp("/tmp/graupel-test-XXXXXX").unwrap();
        let path = dir.join("real.d");
        fs::write(&path, b"out1: in1 in2\n").unwrap();

        let depfile =
            DepfileReader::new().read(
                &RealDisk, &path, b"out1",
                &ParseOptions::default(), &NullLogger,
            ).unwrap().unwrap();
        assert_record(&depfile, b"out1", &[b"in1", b"in2"]);

        fs::remove_file(&path).unwrap();
        fs::remove_dir(&dir).unwrap();
    }
}
