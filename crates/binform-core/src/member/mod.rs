//! Field descriptors.
//!
//! A [`Member`] is one named field of a layout, decoded by replaying an
//! ordered chain of [`Step`]s. Step 0 reads at the member's offset. A pointer
//! step turns its output into the offset of the next step; every other step
//! produces the member's value and ends the chain.
//!
//! ## Width accounting
//!
//! The member occupies the width claimed by the first step that knows its own
//! size. For `pointer -> u64` that is the pointer's 4 bytes: the enclosing
//! layout advances past the pointer, whatever lives at the target address.
//!
//! ## Null
//!
//! A zero pointer (unless allowed) makes the value [`Value::Null`] and skips
//! the rest of the chain. The pointer's width is still claimed, so fields
//! after it stay aligned.

mod step;

use crate::error::{Error, Result};
use crate::read::{self, Primitive, POINTER_WIDTH};
use crate::structure::Struct;
use crate::trace::{LogTracer, TraceEvent, Tracer};
use crate::value::{Record, Value};
use std::rc::Rc;
use tracing::{debug, trace};

pub use step::{ArrayLength, CustomDecoder, Decoded, DispatchTable, Step, StepOptions};

/// State shared by every step of one parse call
pub(crate) struct Pass<'a> {
    pub(crate) buffer: &'a [u8],
    pub(crate) tracer: &'a dyn Tracer,
}

/// Width slot of a member, live for one parse call.
///
/// Set at most once: later claims are ignored.
#[derive(Debug, Default, Clone, Copy)]
struct ClaimedWidth(Option<usize>);

impl ClaimedWidth {
    fn claim(&mut self, width: usize) {
        self.0.get_or_insert(width);
    }

    fn take(&mut self) -> usize {
        self.0.take().unwrap_or(0)
    }
}

/// What a step hands to the rest of the chain
enum Flow {
    /// Continue at this offset
    Address(usize),
    /// The chain is finished with this value
    Done(Value),
}

/// A named field and the chain of steps that decodes it
#[derive(Debug, Clone)]
pub struct Member {
    name: String,
    steps: Vec<Step>,
}

impl Member {
    /// Creates a member with an empty chain
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// The record key this member writes
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configured chain
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Appends a primitive read
    pub fn read(&mut self, kind: Primitive, options: StepOptions) {
        self.steps.push(Step::Primitive { kind, options });
    }

    /// Appends a signed 8-bit read
    pub fn int8(&mut self) {
        self.read(Primitive::I8, StepOptions::default())
    }

    /// Appends an unsigned 8-bit read
    pub fn uint8(&mut self) {
        self.read(Primitive::U8, StepOptions::default())
    }

    /// Appends a little-endian signed 16-bit read
    pub fn int16(&mut self) {
        self.read(Primitive::I16, StepOptions::default())
    }

    /// Appends a little-endian unsigned 16-bit read
    pub fn uint16(&mut self) {
        self.read(Primitive::U16, StepOptions::default())
    }

    /// Appends a little-endian signed 32-bit read
    pub fn int32(&mut self) {
        self.read(Primitive::I32, StepOptions::default())
    }

    /// Appends a little-endian unsigned 32-bit read
    pub fn uint32(&mut self) {
        self.read(Primitive::U32, StepOptions::default())
    }

    /// Appends a little-endian signed 64-bit read
    pub fn int64(&mut self) {
        self.read(Primitive::I64, StepOptions::default())
    }

    /// Appends a little-endian unsigned 64-bit read
    pub fn uint64(&mut self) {
        self.read(Primitive::U64, StepOptions::default())
    }

    /// Appends a little-endian 32-bit float read
    pub fn float32(&mut self) {
        self.read(Primitive::F32, StepOptions::default())
    }

    /// Appends a little-endian 64-bit float read
    pub fn float64(&mut self) {
        self.read(Primitive::F64, StepOptions::default())
    }

    /// Appends a pointer read; zero decodes to null
    pub fn pointer(&mut self) -> &mut Self {
        self.pointer_with(StepOptions::default())
    }

    /// Appends a pointer read with explicit options
    pub fn pointer_with(&mut self, options: StepOptions) -> &mut Self {
        self.steps.push(Step::Pointer { options });
        self
    }

    /// Appends a zero-terminated string read
    pub fn string(&mut self) {
        self.string_with(StepOptions::default())
    }

    /// Appends a zero-terminated string read with explicit options
    pub fn string_with(&mut self, options: StepOptions) {
        self.steps.push(Step::String { options });
    }

    /// Appends a nested layout, parsed in place
    pub fn nested(&mut self, layout: Rc<Struct>) {
        self.nested_with(layout, StepOptions::default())
    }

    /// Appends a nested layout with explicit options
    pub fn nested_with(&mut self, layout: Rc<Struct>, options: StepOptions) {
        self.steps.push(Step::Struct { layout, options });
    }

    /// Appends a layout selected by the byte at the step offset.
    ///
    /// The chosen layout is parsed from that same offset, so it normally
    /// declares the discriminant as its first member.
    pub fn dispatch(&mut self, variants: DispatchTable) {
        self.dispatch_with(variants, StepOptions::default())
    }

    /// Appends a dispatched layout with explicit options
    pub fn dispatch_with(&mut self, variants: DispatchTable, options: StepOptions) {
        self.steps.push(Step::Dispatch { variants, options });
    }

    /// Appends an array read and returns the element template to configure.
    ///
    /// A [`ArrayLength::Field`] count names a sibling that must be declared
    /// (and so parsed) before this member; see [`Struct::validate`].
    pub fn array(&mut self, length: impl Into<ArrayLength>) -> &mut Member {
        self.array_with(length, StepOptions::default())
    }

    /// Appends an array read with explicit options
    pub fn array_with(
        &mut self,
        length: impl Into<ArrayLength>,
        options: StepOptions,
    ) -> &mut Member {
        self.steps.push(Step::Array {
            length: length.into(),
            element: Member::new(self.name.clone()),
            options,
        });

        match self.steps.last_mut() {
            Some(Step::Array { element, .. }) => element,
            _ => unreachable!("array step was just pushed"),
        }
    }

    /// Appends a user-supplied decoder
    pub fn custom<F>(&mut self, decode: F)
    where
        F: Fn(&[u8], usize) -> Result<Decoded> + 'static,
    {
        self.custom_with(CustomDecoder::new(decode), StepOptions::default())
    }

    /// Appends a user-supplied decoder with explicit options
    pub fn custom_with(&mut self, decoder: CustomDecoder, options: StepOptions) {
        self.steps.push(Step::Custom { decoder, options });
    }

    /// Decodes this member at `offset` into `record` and returns the bytes it occupies.
    ///
    /// Traced steps go to the `tracing` crate; use [`Member::parse_with`] to
    /// route them elsewhere.
    pub fn parse(&self, buffer: &[u8], offset: usize, record: &mut Record) -> Result<usize> {
        self.parse_with(buffer, offset, record, &LogTracer)
    }

    /// Like [`Member::parse`], sending traced steps to `tracer`
    pub fn parse_with(
        &self,
        buffer: &[u8],
        offset: usize,
        record: &mut Record,
        tracer: &dyn Tracer,
    ) -> Result<usize> {
        let pass = Pass { buffer, tracer };
        self.parse_in(&pass, offset, record)
    }

    pub(crate) fn parse_in(
        &self,
        pass: &Pass<'_>,
        offset: usize,
        record: &mut Record,
    ) -> Result<usize> {
        let (value, width) = self.decode(pass, offset, record)?;
        record.insert(self.name.clone(), value);
        Ok(width)
    }

    /// Runs the chain without writing the result.
    ///
    /// `record` holds the siblings decoded so far, for array counts.
    fn decode(&self, pass: &Pass<'_>, offset: usize, record: &Record) -> Result<(Value, usize)> {
        let mut width = ClaimedWidth::default();
        let mut flow = Flow::Address(offset);

        for step in &self.steps {
            let &Flow::Address(at) = &flow else {
                break;
            };
            flow = self.apply(step, pass, at, record, &mut width)?;
        }

        let value = match flow {
            Flow::Done(value) => value,
            // the chain ended on a pointer: its address is the value
            Flow::Address(address) if !self.steps.is_empty() => Value::U32(address as u32),
            Flow::Address(_) => Value::Null,
        };

        Ok((value, width.take()))
    }

    fn apply(
        &self,
        step: &Step,
        pass: &Pass<'_>,
        offset: usize,
        record: &Record,
        width: &mut ClaimedWidth,
    ) -> Result<Flow> {
        let flow = match step {
            Step::Primitive { kind, options } => {
                let value = read::read_primitive(pass.buffer, offset, *kind, options.endian)?;
                width.claim(kind.width());
                Flow::Done(value)
            }
            Step::Pointer { options } => {
                let address = read::read_pointer(pass.buffer, offset)?;
                width.claim(POINTER_WIDTH);
                if address == 0 && !options.allow_null_pointer {
                    Flow::Done(Value::Null)
                } else {
                    Flow::Address(address as usize)
                }
            }
            Step::String { .. } => {
                let (text, len) = read::read_c_string(pass.buffer, offset)?;
                width.claim(len);
                Flow::Done(Value::String(text))
            }
            Step::Struct { layout, .. } => {
                let (nested, len) = parse_nested(layout, pass, offset)?;
                width.claim(len);
                Flow::Done(nested)
            }
            Step::Dispatch { variants, .. } => {
                let discriminant = read::read_u8(pass.buffer, offset)?;
                let layout = variants
                    .get(&discriminant)
                    .ok_or_else(|| Error::unknown_discriminant(offset, discriminant))?;
                debug!(member = %self.name, discriminant, offset, "dispatching variant");

                let (nested, len) = parse_nested(layout, pass, offset)?;
                width.claim(len);
                Flow::Done(nested)
            }
            Step::Array { length, element, .. } => {
                let count = self.resolve_length(length, pass.buffer, offset, record)?;
                trace!(member = %self.name, count, offset, "reading array");

                let mut values = Vec::with_capacity(count);
                let mut consumed = 0usize;
                for _ in 0..count {
                    let at = offset
                        .checked_add(consumed)
                        .ok_or_else(|| Error::out_of_bounds(offset, consumed, pass.buffer.len()))?;
                    let (value, len) = element.decode(pass, at, record)?;
                    values.push(value);
                    consumed = consumed.saturating_add(len);
                }

                width.claim(consumed);
                Flow::Done(Value::Array(values))
            }
            Step::Custom { decoder, .. } => {
                let Decoded { value, width: len } = decoder.decode(pass.buffer, offset)?;
                width.claim(len);
                Flow::Done(value)
            }
        };

        if step.options().debug {
            let traced = match &flow {
                Flow::Address(address) => Value::U32(*address as u32),
                Flow::Done(value) => value.clone(),
            };
            pass.tracer.trace(&TraceEvent {
                field: &self.name,
                step: step.kind_str(),
                offset,
                value: &traced,
            });
        }

        Ok(flow)
    }

    /// Element count of an array step, bounded by the bytes left after `offset`
    fn resolve_length(
        &self,
        length: &ArrayLength,
        buffer: &[u8],
        offset: usize,
        record: &Record,
    ) -> Result<usize> {
        let count = match length {
            ArrayLength::Fixed(count) => *count,
            ArrayLength::Field(field) => {
                let value = record
                    .get(field)
                    .ok_or_else(|| Error::missing_length_field(&self.name, field))?;
                value
                    .as_u64()
                    .and_then(|count| usize::try_from(count).ok())
                    .ok_or_else(|| Error::InvalidLengthField {
                        field: field.clone(),
                        value: value.to_string(),
                    })?
            }
        };

        let remaining = buffer.len().saturating_sub(offset);
        if count > remaining {
            return Err(Error::ArrayTooLong {
                member: self.name.clone(),
                count,
                remaining,
            });
        }

        Ok(count)
    }
}

/// Parses `layout` at `offset`, returning the record and the span it covered
fn parse_nested(layout: &Struct, pass: &Pass<'_>, offset: usize) -> Result<(Value, usize)> {
    let record = layout.parse_in(pass, Some(offset), false)?;
    let span = layout.current_offset().saturating_sub(offset);
    Ok((Value::Record(record), span))
}
