//! Stream error type.

use std::io;
use std::num::TryFromIntError;

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Serialization stream error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error.
    #[error("io error: {0}")]
    Io(io::Error),
    /// The stream does not start with the expected magic and version.
    #[error("bad stream header: magic {magic:#06x}, version {version}")]
    BadHeader {
        /// The magic that was read.
        magic: u16,
        /// The version that was read.
        version: i16,
    },
    /// Unexpected lead byte at this position in the stream.
    #[error("invalid type code: {0:#04x}")]
    InvalidTypeCode(u8),
    /// Wire handle outside the allocated range, or referring to the wrong
    /// kind of entity.
    #[error("invalid handle: {0:#010x}")]
    InvalidHandle(i32),
    /// The stream uses a protocol feature this codec does not implement.
    #[error("unsupported stream feature: {0}")]
    UnsupportedFeature(&'static str),
    /// The decoder has no registered type for a class name.
    #[error("class is not registered: {0}")]
    ClassNotRegistered(String),
    /// A value is not assignable to the field it was decoded for.
    #[error("value is not assignable to field {field}")]
    TypeMismatch {
        /// Wire name of the field.
        field: String,
    },
    /// A read crossed a block-data boundary.
    #[error("read crosses block data boundary")]
    ReadAcrossBlock,
    /// A write crossed a block-data boundary.
    #[error("write crosses block data boundary")]
    WriteAcrossBlock,
    /// The underlying reader ran out of bytes mid-record.
    #[error("unexpected end of stream")]
    UnexpectedEnd,
    /// Element (string, field list or sequence) is too long for its wire width.
    #[error("element is too long: {0}")]
    TooLong(#[from] TryFromIntError),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEnd
        } else {
            Error::Io(err)
        }
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use std::io;

    use super::Error;

    #[test]
    fn short_read_is_unexpected_end() {
        let err = Error::from(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(matches!(err, Error::UnexpectedEnd));

        let err = Error::from(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn display() {
        let err = Error::BadHeader {
            magic: 0x0000,
            version: 5,
        };
        assert_eq!(err.to_string(), "bad stream header: magic 0x0000, version 5");

        let err = Error::InvalidTypeCode(0x20);
        assert_eq!(err.to_string(), "invalid type code: 0x20");
    }
}
