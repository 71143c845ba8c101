//! Decode steps and their configuration.

use super::Member;
use crate::error::Result;
use crate::read::{Endian, Primitive};
use crate::structure::Struct;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Discriminant byte to the layout it selects
pub type DispatchTable = BTreeMap<u8, Rc<Struct>>;

/// Per-step options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOptions {
    /// Report the step's result to the parse call's tracer
    pub debug: bool,
    /// Byte order for multi-byte primitives (pointers are always little-endian)
    pub endian: Endian,
    /// Decode a zero pointer as `0` instead of null
    pub allow_null_pointer: bool,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            debug: false,
            endian: Endian::Little,
            allow_null_pointer: false,
        }
    }
}

impl StepOptions {
    /// Creates options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the step is traced
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the byte order
    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Shorthand for `endian(Endian::Big)`
    pub fn big_endian(self) -> Self {
        self.endian(Endian::Big)
    }

    /// Sets whether a zero pointer is a valid address
    pub fn allow_null_pointer(mut self, allow: bool) -> Self {
        self.allow_null_pointer = allow;
        self
    }
}

/// Where an array step gets its element count
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayLength {
    /// Count fixed when the layout is built
    Fixed(usize),
    /// Count read from a sibling field parsed earlier in the same struct
    Field(String),
}

impl From<usize> for ArrayLength {
    fn from(count: usize) -> Self {
        ArrayLength::Fixed(count)
    }
}

impl From<&str> for ArrayLength {
    fn from(field: &str) -> Self {
        ArrayLength::Field(field.to_string())
    }
}

impl From<String> for ArrayLength {
    fn from(field: String) -> Self {
        ArrayLength::Field(field)
    }
}

/// Output of a custom decoder
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The decoded value
    pub value: Value,
    /// Bytes the value occupies in the enclosing layout
    pub width: usize,
}

impl Decoded {
    /// Creates a new decoded value
    pub fn new(value: Value, width: usize) -> Self {
        Self { value, width }
    }
}

type DecodeFn = dyn Fn(&[u8], usize) -> Result<Decoded>;

/// A user-supplied decoder called with the whole buffer and the step offset
#[derive(Clone)]
pub struct CustomDecoder(Rc<DecodeFn>);

impl CustomDecoder {
    /// Wraps a decoding function
    pub fn new<F>(decode: F) -> Self
    where
        F: Fn(&[u8], usize) -> Result<Decoded> + 'static,
    {
        Self(Rc::new(decode))
    }

    pub(crate) fn decode(&self, buffer: &[u8], offset: usize) -> Result<Decoded> {
        (self.0)(buffer, offset)
    }
}

impl fmt::Debug for CustomDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomDecoder(..)")
    }
}

/// One decode operation in a member's chain
#[derive(Debug, Clone)]
pub enum Step {
    /// Fixed-width number
    Primitive {
        /// Which primitive to read
        kind: Primitive,
        /// Step options
        options: StepOptions,
    },
    /// 4-byte address; the next step decodes at that address
    Pointer {
        /// Step options
        options: StepOptions,
    },
    /// Zero-terminated UTF-8 text
    String {
        /// Step options
        options: StepOptions,
    },
    /// Another layout parsed in place
    Struct {
        /// The nested layout
        layout: Rc<Struct>,
        /// Step options
        options: StepOptions,
    },
    /// Layout chosen by the byte at the step offset
    Dispatch {
        /// Candidate layouts by discriminant
        variants: DispatchTable,
        /// Step options
        options: StepOptions,
    },
    /// Repeated element laid out back to back
    Array {
        /// Element count
        length: ArrayLength,
        /// Template decoding one element
        element: Member,
        /// Step options
        options: StepOptions,
    },
    /// User-supplied decoder
    Custom {
        /// The decoder
        decoder: CustomDecoder,
        /// Step options
        options: StepOptions,
    },
}

impl Step {
    /// Returns the short step name used in traces
    pub fn kind_str(&self) -> &'static str {
        match self {
            Step::Primitive { kind, .. } => kind.as_str(),
            Step::Pointer { .. } => "pointer",
            Step::String { .. } => "string",
            Step::Struct { .. } => "struct",
            Step::Dispatch { .. } => "dispatch",
            Step::Array { .. } => "array",
            Step::Custom { .. } => "custom",
        }
    }

    /// Returns the step's options
    pub fn options(&self) -> &StepOptions {
        match self {
            Step::Primitive { options, .. }
            | Step::Pointer { options }
            | Step::String { options }
            | Step::Struct { options, .. }
            | Step::Dispatch { options, .. }
            | Step::Array { options, .. }
            | Step::Custom { options, .. } => options,
        }
    }
}
