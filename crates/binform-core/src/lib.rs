//! # binform-core
//!
//! A library for describing binary record layouts declaratively and parsing
//! them out of raw byte buffers.
//!
//! This crate provides the core functionality for:
//! - Fixed-width primitives with per-field byte order
//! - Nullable 4-byte pointer indirection
//! - Nested layouts and layouts selected by a discriminant byte
//! - Arrays sized by a literal or by a previously parsed field
//! - User-supplied decoders for anything else
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`structure`]: Record layouts ([`Struct`]) and the parse pass
//! - [`member`]: Field descriptors ([`Member`]) and their decode steps
//! - [`read`]: Bounds-checked primitive, pointer and string reads
//! - [`value`]: Decoded values and records
//! - [`trace`]: Per-step trace side channel
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```
//! use binform_core::{DispatchTable, Struct, Value};
//! use std::rc::Rc;
//!
//! // Entity { kind: u8, hp: u16 } behind a pointer, preceded by a name pointer
//! let mut monster = Struct::new();
//! monster.add_member("kind").uint8();
//! monster.add_member("hp").uint16();
//!
//! let mut variants = DispatchTable::new();
//! variants.insert(1, Rc::new(monster));
//!
//! let mut entry = Struct::new();
//! entry.add_member("name").pointer().string();
//! entry.add_member("entity").pointer().dispatch(variants);
//!
//! let buffer = [8, 0, 0, 0, 12, 0, 0, 0, b'o', b'r', b'c', 0, 1, 50, 0];
//! let record = entry.parse(&buffer, 0)?;
//!
//! assert_eq!(record["name"], Value::String("orc".into()));
//! assert_eq!(record["entity"].as_record().map(|e| &e["hp"]), Some(&Value::U16(50)));
//! # Ok::<(), binform_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`Member::custom`]: decode anything the built-in steps do not cover
//! - [`Tracer`]: receive the output of steps configured with `debug`
//!

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod error;
pub mod member;
pub mod read;
pub mod structure;
pub mod trace;
pub mod value;

// Re-export primary types for convenience
pub use error::{Error, Result};
pub use member::{ArrayLength, CustomDecoder, Decoded, DispatchTable, Member, Step, StepOptions};
pub use read::{Endian, Primitive};
pub use structure::{ParseOptions, Struct};
pub use trace::{LogTracer, NullTracer, RecordingTracer, TraceEvent, TracedStep, Tracer};
pub use value::{display_record, Record, Value};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
