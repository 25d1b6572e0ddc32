//! This crate reads, represents, transforms, and writes Linux `perf.data`
//! profiling files.
//!
//! A perf.data file is the binary stream produced by `perf record`: a
//! header, a set of event-attribute descriptors, a stream of recorded
//! events (samples, memory mappings, process lifecycle, context switches,
//! auxiliary-trace data, ...) and a metadata trailer (hostname, CPU
//! topology, build ids, command line, ...). Both the "normal" layout (fixed
//! header with an offset table) and the "piped" layout (streamed, with
//! metadata delivered as synthetic events) are handled transparently, in
//! either endianness.
//!
//! Use [`PerfReader`] to turn bytes into a [`PerfData`] profile record,
//! [`PerfParser`] to reconstruct per-process address spaces and resolve
//! sample addresses to `(binary, offset)` pairs, and [`PerfWriter`] to turn
//! the record back into a normal-mode file.
//!
//! ## Example
//!
//! ```no_run
//! use perf_profile::{PerfParser, PerfReader, ParserOptions, PerfWriter};
//!
//! # fn run() -> Result<(), perf_profile::Error> {
//! let mut profile = PerfReader::read_from_file("perf.data")?;
//!
//! let mut parser = PerfParser::new(&mut profile, ParserOptions::default());
//! parser.parse()?;
//! for parsed in parser.parsed_events() {
//!     if let Some(dso) = &parsed.dso_and_offset {
//!         println!("{} + {:#x}", dso.dso_name, dso.offset);
//!     }
//! }
//! drop(parser);
//!
//! PerfWriter::new(&profile)?.write_to_file("perf.data.out")?;
//! # Ok(())
//! # }
//! ```

pub mod address_map;
pub mod attr;
pub mod buildid;
pub mod codec;
pub mod consts;
mod dso;
mod error;
pub mod parser;
pub mod profile;
pub mod reader;
pub mod record;
pub mod sample_info;
#[cfg(test)]
mod test_utils;
pub mod writer;

pub use attr::{AttrFlags, BranchSampleFormat, PerfEventAttr, PerfFileAttr, ReadFormat, SampleFormat};
pub use buildid::{BuildIdSource, ElfBuildIdSource};
pub use dso::{DsoInfo, DsoTable};
pub use error::{Error, Result};
pub use parser::{DsoAndOffset, ParsedBranch, ParsedEvent, ParserOptions, PerfParser};
pub use profile::{BuildIdRecord, ParserStats, PerfData, PerfEventType};
pub use reader::PerfReader;
pub use record::{EventData, EventHeader, EventRecord, SampleEvent, SampleInfo};
pub use sample_info::{SampleInfoReader, SampleInfoRegistry};
pub use writer::PerfWriter;
