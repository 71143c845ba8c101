//! Record layouts.
//!
//! A [`Struct`] is an ordered list of [`Member`]s plus a cursor. Parsing walks
//! the members in declaration order; each one decodes at the cursor and the
//! cursor advances by the bytes the member occupies.
//!
//! ## Cursor
//!
//! The cursor outlives a parse call only when asked to
//! ([`ParseOptions::keep_cursor`]). Nested and dispatched struct steps use
//! that to measure how many bytes a sub-layout covered.
//!
//! ## Threads
//!
//! The cursor lives in a [`Cell`], so a `Struct` is neither `Sync` nor (behind
//! its `Rc` members) `Send`. Build one layout per thread.

use crate::error::{Error, Result};
use crate::member::{ArrayLength, Member, Pass, Step};
use crate::trace::{LogTracer, Tracer};
use crate::value::Record;
use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Options for one [`Struct::parse_with`] call
#[derive(Clone, Copy)]
pub struct ParseOptions<'t> {
    /// Offset to start at; `None` continues from the current cursor
    pub start: Option<usize>,
    /// Put the cursor back to 0 when the call returns
    pub reset_cursor: bool,
    /// Receiver for steps configured with `debug`
    pub tracer: &'t dyn Tracer,
}

impl Default for ParseOptions<'_> {
    fn default() -> Self {
        Self {
            start: None,
            reset_cursor: true,
            tracer: &LogTracer,
        }
    }
}

impl fmt::Debug for ParseOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("start", &self.start)
            .field("reset_cursor", &self.reset_cursor)
            .finish_non_exhaustive()
    }
}

impl<'t> ParseOptions<'t> {
    /// Creates options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the start offset
    pub fn start(mut self, offset: usize) -> Self {
        self.start = Some(offset);
        self
    }

    /// Leaves the cursor at the end of the parsed bytes
    pub fn keep_cursor(mut self) -> Self {
        self.reset_cursor = false;
        self
    }

    /// Sets the trace receiver
    pub fn tracer(mut self, tracer: &'t dyn Tracer) -> Self {
        self.tracer = tracer;
        self
    }
}

/// An ordered record layout
///
/// # Example
///
/// ```
/// use binform_core::{Struct, Value};
///
/// let mut layout = Struct::new();
/// layout.add_member("count").uint8();
/// layout.add_member("values").array("count").uint8();
///
/// let record = layout.parse(&[4, 40, 41, 42, 43], 0)?;
/// assert_eq!(record["count"], Value::U8(4));
/// assert_eq!(record["values"].as_array().map(|v| v.len()), Some(4));
/// # Ok::<(), binform_core::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Struct {
    members: Vec<Rc<Member>>,
    cursor: Cell<usize>,
}

impl Struct {
    /// Creates an empty layout
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a layout that starts with `parent`'s current members.
    ///
    /// Members are shared, not copied. Members added afterwards belong to the
    /// new layout only, and reconfiguring a shared member through
    /// [`Struct::member_mut`] clones it first, so `parent` never changes.
    pub fn derive(parent: &Struct) -> Self {
        Self {
            members: parent.members.clone(),
            cursor: Cell::new(0),
        }
    }

    /// Appends a member and returns it for step configuration
    pub fn add_member(&mut self, name: impl Into<String>) -> &mut Member {
        self.members.push(Rc::new(Member::new(name)));
        let last = self.members.len() - 1;
        Rc::make_mut(&mut self.members[last])
    }

    /// Looks up a member by name
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|member| member.name() == name)
            .map(|member| &**member)
    }

    /// Looks up a member by name for further configuration
    pub fn member_mut(&mut self, name: &str) -> Option<&mut Member> {
        self.members
            .iter_mut()
            .find(|member| member.name() == name)
            .map(Rc::make_mut)
    }

    /// Members in declaration order
    pub fn members(&self) -> &[Rc<Member>] {
        &self.members
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns true if the layout has no members
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Current cursor
    pub fn current_offset(&self) -> usize {
        self.cursor.get()
    }

    /// Moves the cursor
    pub fn set_current_offset(&self, offset: usize) {
        self.cursor.set(offset);
    }

    /// Parses one record at `offset`, then resets the cursor
    pub fn parse(&self, buffer: &[u8], offset: usize) -> Result<Record> {
        self.parse_with(buffer, ParseOptions::new().start(offset))
    }

    /// Parses one record with explicit options
    pub fn parse_with(&self, buffer: &[u8], options: ParseOptions<'_>) -> Result<Record> {
        let pass = Pass {
            buffer,
            tracer: options.tracer,
        };
        self.parse_in(&pass, options.start, options.reset_cursor)
    }

    pub(crate) fn parse_in(
        &self,
        pass: &Pass<'_>,
        start: Option<usize>,
        reset_cursor: bool,
    ) -> Result<Record> {
        if let Some(start) = start {
            self.cursor.set(start);
        }

        let start = self.cursor.get();
        debug!(members = self.members.len(), offset = start, "parsing struct");

        let result = self.parse_members(pass);

        if let Ok(record) = &result {
            debug!(
                fields = record.len(),
                consumed = self.cursor.get().saturating_sub(start),
                "struct parsed"
            );
        }

        if reset_cursor {
            self.cursor.set(0);
        }

        result
    }

    fn parse_members(&self, pass: &Pass<'_>) -> Result<Record> {
        let mut record = Record::with_capacity(self.members.len());

        for member in &self.members {
            let offset = self.cursor.get();
            let consumed = member.parse_in(pass, offset, &mut record)?;
            trace!(member = member.name(), offset, consumed, "parsed member");
            self.cursor.set(offset.saturating_add(consumed));
        }

        Ok(record)
    }

    /// Checks the layout for mistakes that would only show up at parse time.
    ///
    /// Member names must be unique, and every array whose length comes from a
    /// field must name a member declared before it. Nested layouts are checked
    /// too.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.members.len());

        for member in &self.members {
            validate_steps(member.name(), member.steps(), &seen)?;

            if !seen.insert(member.name()) {
                return Err(Error::invalid_layout(member.name(), "duplicate member name"));
            }
        }

        Ok(())
    }
}

fn validate_steps(member: &str, steps: &[Step], declared: &HashSet<&str>) -> Result<()> {
    for step in steps {
        match step {
            Step::Array {
                length, element, ..
            } => {
                if let ArrayLength::Field(field) = length {
                    if !declared.contains(field.as_str()) {
                        return Err(Error::invalid_layout(
                            member,
                            format!("array length field '{}' is not declared before it", field),
                        ));
                    }
                }
                validate_steps(member, element.steps(), declared)?;
            }
            Step::Struct { layout, .. } => layout.validate()?,
            Step::Dispatch { variants, .. } => {
                for layout in variants.values() {
                    layout.validate()?;
                }
            }
            Step::Primitive { .. }
            | Step::Pointer { .. }
            | Step::String { .. }
            | Step::Custom { .. } => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::DispatchTable;
    use crate::trace::RecordingTracer;
    use crate::value::Value;
    use crate::StepOptions;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_struct_is_empty() {
        let layout = Struct::new();
        assert_eq!(layout.len(), 0);
        assert!(layout.is_empty());
    }

    #[test]
    fn test_manual_offset() {
        let layout = Struct::new();
        layout.set_current_offset(100);
        assert_eq!(layout.current_offset(), 100);
    }

    #[test]
    fn test_derive_copies_members() {
        let mut original = Struct::new();
        original.add_member("test").uint8();

        let mut derived = Struct::derive(&original);
        assert_eq!(derived.len(), 1);
        assert!(Rc::ptr_eq(&original.members()[0], &derived.members()[0]));

        derived.add_member("extra").uint16();
        assert_eq!(derived.len(), 2);
        assert_eq!(original.len(), 1);
    }

    #[test]
    fn test_derive_reconfigure_leaves_parent_alone() {
        let mut original = Struct::new();
        original.add_member("id").pointer();

        let mut derived = Struct::derive(&original);
        if let Some(member) = derived.member_mut("id") {
            member.uint32();
        }

        assert_eq!(original.member("id").map(|m| m.steps().len()), Some(1));
        assert_eq!(derived.member("id").map(|m| m.steps().len()), Some(2));
    }

    #[test]
    fn test_derived_parse_extends_parent() {
        let mut base = Struct::new();
        base.add_member("kind").uint8();

        let mut extended = Struct::derive(&base);
        extended.add_member("size").uint16();

        let buffer = [1, 0x10, 0x00];
        assert_eq!(base.parse(&buffer, 0).unwrap().len(), 1);

        let record = extended.parse(&buffer, 0).unwrap();
        assert_eq!(record["kind"], Value::U8(1));
        assert_eq!(record["size"], Value::U16(16));
    }

    #[test]
    fn test_parse_resets_cursor() {
        let mut layout = Struct::new();
        layout.add_member("a").uint32();

        layout.parse(&[0; 8], 4).unwrap();
        assert_eq!(layout.current_offset(), 0);
    }

    #[test]
    fn test_keep_cursor_and_continue() {
        let mut layout = Struct::new();
        layout.add_member("a").uint16();

        let buffer = [1, 0, 2, 0];
        let first = layout
            .parse_with(&buffer, ParseOptions::new().start(0).keep_cursor())
            .unwrap();
        assert_eq!(layout.current_offset(), 2);

        let second = layout.parse_with(&buffer, ParseOptions::new()).unwrap();
        assert_eq!(first["a"], Value::U16(1));
        assert_eq!(second["a"], Value::U16(2));
        assert_eq!(layout.current_offset(), 0);
    }

    #[test]
    fn test_record_follows_declaration_order() {
        let mut layout = Struct::new();
        layout.add_member("z").uint8();
        layout.add_member("a").uint8();
        layout.add_member("m").uint8();

        let record = layout.parse(&[1, 2, 3], 0).unwrap();
        let names: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_nested_width_is_cursor_span() {
        let mut header = Struct::new();
        header.add_member("name").pointer().string();
        header.add_member("flags").uint16();
        let header = Rc::new(header);

        let mut layout = Struct::new();
        layout.add_member("header").nested(Rc::clone(&header));
        layout.add_member("tail").uint8();

        // header: pointer (4) + u16 (2) = 6 bytes, then tail
        let buffer = [8, 0, 0, 0, 3, 0, 0x7F, 0, b'o', b'k', 0, 0];
        let record = layout.parse(&buffer, 0).unwrap();
        assert_eq!(record["tail"], Value::U8(0x7F));

        let mut expected = Record::new();
        expected.insert("name".to_string(), Value::String("ok".to_string()));
        expected.insert("flags".to_string(), Value::U16(3));
        assert_eq!(record["header"], Value::Record(expected));
    }

    #[test]
    fn test_error_aborts_and_resets() {
        let mut layout = Struct::new();
        layout.add_member("a").uint8();
        layout.add_member("b").uint32();

        assert!(matches!(
            layout.parse(&[1, 2], 0),
            Err(Error::OutOfBounds { offset: 1, .. })
        ));
        assert_eq!(layout.current_offset(), 0);
    }

    #[test]
    fn test_dispatch_unknown_discriminant() {
        let mut variant = Struct::new();
        variant.add_member("kind").uint8();

        let mut variants = DispatchTable::new();
        variants.insert(1, Rc::new(variant));

        let mut layout = Struct::new();
        layout.add_member("body").dispatch(variants);

        assert!(layout.parse(&[1], 0).is_ok());
        assert!(matches!(
            layout.parse(&[9], 0),
            Err(Error::UnknownDiscriminant {
                offset: 0,
                discriminant: 9
            })
        ));
    }

    #[test]
    fn test_parse_with_tracer() {
        let mut layout = Struct::new();
        layout
            .add_member("value")
            .read(crate::Primitive::U8, StepOptions::new().debug(true));

        let tracer = RecordingTracer::new();
        layout
            .parse_with(&[0, 42], ParseOptions::new().start(1).tracer(&tracer))
            .unwrap();

        let steps = tracer.take();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].field, "value");
        assert_eq!(steps[0].offset, 1);
        assert_eq!(steps[0].value, Value::U8(42));
    }

    #[test]
    fn test_validate_accepts_ordered_length() {
        let mut layout = Struct::new();
        layout.add_member("count").uint8();
        layout.add_member("values").array("count").uint8();
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_length_after_array() {
        let mut layout = Struct::new();
        layout.add_member("values").array("count").uint8();
        layout.add_member("count").uint8();
        assert!(matches!(
            layout.validate(),
            Err(Error::InvalidLayout { ref member, .. }) if member == "values"
        ));
    }

    #[test]
    fn test_validate_rejects_self_length() {
        let mut layout = Struct::new();
        layout.add_member("values").array("values").uint8();
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut layout = Struct::new();
        layout.add_member("a").uint8();
        layout.add_member("a").uint16();
        assert!(layout.validate().is_err());
    }

    #[test]
    fn test_validate_checks_nested() {
        let mut inner = Struct::new();
        inner.add_member("items").array("missing").uint8();

        let mut layout = Struct::new();
        layout.add_member("inner").nested(Rc::new(inner));
        assert!(layout.validate().is_err());
    }
}
