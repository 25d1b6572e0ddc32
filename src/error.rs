use std::io;

/// The error type used throughout this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Did not recognize magic value {0:#018x}")]
    UnrecognizedMagicValue(u64),

    #[error("Header size {0} matches neither the normal nor the piped header")]
    UnrecognizedHeaderSize(u64),

    #[error("Invalid file format: {0}")]
    Format(String),

    #[error("Declared size {declared} of {what} exceeds remaining input size {remaining}")]
    Truncation {
        what: &'static str,
        declared: u64,
        remaining: u64,
    },

    #[error("Event size {size} of event {name} is less than the event header size")]
    EventSizeTooSmall { name: &'static str, size: u16 },

    #[error("Cannot byte-swap unsupported event {0} in a cross-endian file")]
    CrossEndianUnsupportedEvent(&'static str),

    #[error(
        "Event ID position {new} of the current attr does not match position {existing} \
         derived from previous attrs"
    )]
    InconsistentEventIdPosition { existing: i64, new: i64 },

    #[error("No sample info reader is registered for event ID {0}")]
    NoReaderForId(u64),

    #[error("Build ID size {0} is greater than the maximum of 20 bytes")]
    BuildIdTooLong(usize),

    #[error("Build ID hex string {0:?} does not have an even number of characters")]
    OddBuildIdHexLength(String),

    #[error(
        "Only {mapped} of {total} samples resolved to a mapping, below the \
         required {threshold}%"
    )]
    LowSampleMappingRatio {
        mapped: u64,
        total: u64,
        threshold: f32,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }
}
