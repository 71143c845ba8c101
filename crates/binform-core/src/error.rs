//! Error types for the binform-core library.
//!
//! Every failure here aborts the enclosing parse call. A pointer that decodes
//! to null is not an error: it is reported as [`crate::Value::Null`].

use thiserror::Error;

/// Result type alias for binform operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all binform operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A read would run past the end of the buffer
    #[error("read of {len} byte(s) at offset {offset} exceeds buffer of {buffer_len} byte(s)")]
    OutOfBounds {
        /// Byte offset where the read started
        offset: usize,
        /// Number of bytes requested
        len: usize,
        /// Total length of the buffer
        buffer_len: usize,
    },

    /// A string read found no zero terminator before the end of the buffer
    #[error("unterminated string at offset {offset}")]
    UnterminatedString {
        /// Byte offset where the string starts
        offset: usize,
    },

    /// A dispatched struct read found a discriminant with no mapped layout
    #[error("no layout mapped for discriminant {discriminant} at offset {offset}")]
    UnknownDiscriminant {
        /// Byte offset of the discriminant
        offset: usize,
        /// The unmapped discriminant value
        discriminant: u8,
    },

    /// An array length refers to a field that is not in the record yet
    #[error("array '{member}' takes its length from '{field}', which has not been parsed")]
    MissingLengthField {
        /// Name of the array member
        member: String,
        /// Name of the length field
        field: String,
    },

    /// An array length field holds something other than a non-negative integer
    #[error("array length field '{field}' is not a non-negative integer: {value}")]
    InvalidLengthField {
        /// Name of the length field
        field: String,
        /// Rendering of the offending value
        value: String,
    },

    /// An array length cannot fit in the remaining buffer
    #[error("array '{member}' declares {count} element(s) but only {remaining} byte(s) remain")]
    ArrayTooLong {
        /// Name of the array member
        member: String,
        /// Declared element count
        count: usize,
        /// Bytes left in the buffer at the array offset
        remaining: usize,
    },

    /// A struct layout breaks a declaration-order rule
    #[error("invalid layout for member '{member}': {details}")]
    InvalidLayout {
        /// Name of the offending member
        member: String,
        /// Description of the issue
        details: String,
    },

    /// A custom decoder rejected its input
    #[error("custom decoder failed at offset {offset}: {message}")]
    Custom {
        /// Byte offset handed to the decoder
        offset: usize,
        /// Decoder-supplied description
        message: String,
    },
}

impl Error {
    /// Creates a new out-of-bounds error
    pub fn out_of_bounds(offset: usize, len: usize, buffer_len: usize) -> Self {
        Self::OutOfBounds {
            offset,
            len,
            buffer_len,
        }
    }

    /// Creates a new unterminated string error
    pub fn unterminated_string(offset: usize) -> Self {
        Self::UnterminatedString { offset }
    }

    /// Creates a new unknown discriminant error
    pub fn unknown_discriminant(offset: usize, discriminant: u8) -> Self {
        Self::UnknownDiscriminant {
            offset,
            discriminant,
        }
    }

    /// Creates a new missing length field error
    pub fn missing_length_field(member: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingLengthField {
            member: member.into(),
            field: field.into(),
        }
    }

    /// Creates a new invalid layout error
    pub fn invalid_layout(member: impl Into<String>, details: impl Into<String>) -> Self {
        Self::InvalidLayout {
            member: member.into(),
            details: details.into(),
        }
    }

    /// Creates a new custom decoder error
    pub fn custom(offset: usize, message: impl Into<String>) -> Self {
        Self::Custom {
            offset,
            message: message.into(),
        }
    }

    /// Returns true if the input bytes, rather than the layout, caused the error.
    ///
    /// Callers scanning many candidate offsets can skip these and move on.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. }
                | Self::UnterminatedString { .. }
                | Self::UnknownDiscriminant { .. }
                | Self::InvalidLengthField { .. }
                | Self::ArrayTooLong { .. }
                | Self::Custom { .. }
        )
    }
}
