//! Ingestion of compiler-emitted dependency information.
//!
//! Compilers report header dependencies in several shapes:
//! Make-style depfiles from GCC and Clang, module lines from DMD,
//! `/showIncludes` notes from MSVC, and bare filenames on the standard
//! error of some Unix C compilers. The parsers in this crate turn each
//! of those into lists of input files for the build graph, and the
//! [`reader`] module serves (possibly aggregated) depfiles from disk.

#![warn(missing_docs)]

pub mod depfile;
pub mod deplist;
pub mod dmd;
pub mod reader;
pub mod showincludes;
pub mod span;
pub mod unixcc;
