// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Packed attribute records
//!
//! A [`Svrattrl`] owns exactly one payload buffer reserved for the budget
//! the sender declared. Name, optional resource and value sit back-to-back in
//! that buffer, each followed by a nul byte, and are addressed by spans
//! rather than pointers.

use std::fmt;

use thiserror::Error;

/// Size of the fixed portion of a record, counted into [`Svrattrl::total_size`]
pub const HEADER_SIZE: usize = size_of::<Svrattrl>();

/// Operation attached to an attribute
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum BatchOp {
    Set = 0,
    Unset,
    #[strum(serialize = "incr")]
    Increment,
    #[strum(serialize = "decr")]
    Decrement,
    Eq,
    Ne,
    Ge,
    Gt,
    Le,
    Lt,
    #[strum(serialize = "dflt")]
    Default,
    Internal,
}

impl TryFrom<u32> for BatchOp {
    type Error = u32;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        let op = match code {
            0 => BatchOp::Set,
            1 => BatchOp::Unset,
            2 => BatchOp::Increment,
            3 => BatchOp::Decrement,
            4 => BatchOp::Eq,
            5 => BatchOp::Ne,
            6 => BatchOp::Ge,
            7 => BatchOp::Gt,
            8 => BatchOp::Le,
            9 => BatchOp::Lt,
            10 => BatchOp::Default,
            11 => BatchOp::Internal,
            c => return Err(c),
        };
        Ok(op)
    }
}

impl From<BatchOp> for u32 {
    fn from(op: BatchOp) -> Self {
        op as u32
    }
}

/// Which string of a record is being placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Field {
    Name,
    Resource,
    Value,
}

/// Location of one nul terminated string within a payload.
/// `len` includes the terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    offset: usize,
    len: usize,
}

impl Span {
    fn bytes(self, payload: &[u8]) -> &[u8] {
        &payload[self.offset..self.offset + self.len - 1]
    }
}

/// Source of record payloads
///
/// Hands out an empty buffer able to hold `budget` bytes without growing.
/// Strings are appended as they arrive, the rest of the budget is left
/// untouched.
pub trait Allocator {
    fn allocate(&mut self, budget: usize) -> Result<Vec<u8>, AllocError>;
}

impl<A: Allocator + ?Sized> Allocator for &mut A {
    fn allocate(&mut self, budget: usize) -> Result<Vec<u8>, AllocError> {
        (**self).allocate(budget)
    }
}

/// Largest payload [`System::default`] hands out
pub const DEFAULT_RECORD_LIMIT: usize = 16 * 1024 * 1024;

/// Heap allocator which reports failure instead of aborting
#[derive(Debug, Clone, Copy)]
pub struct System {
    /// Largest payload handed out, `None` for no ceiling
    pub limit: Option<usize>,
}

impl System {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }
}

impl Default for System {
    fn default() -> Self {
        Self::with_limit(DEFAULT_RECORD_LIMIT)
    }
}

impl Allocator for System {
    fn allocate(&mut self, budget: usize) -> Result<Vec<u8>, AllocError> {
        if self.limit.is_some_and(|limit| budget > limit) {
            return Err(AllocError { budget });
        }

        let mut payload = Vec::new();
        payload.try_reserve_exact(budget).map_err(|_| AllocError { budget })?;

        Ok(payload)
    }
}

/// A record under construction
///
/// Strings are placed in order (name, optional resource, value). The
/// remaining budget is checked before every placement, each string
/// needing its length plus one byte for the terminator.
#[derive(Debug)]
pub struct Layout {
    payload: Vec<u8>,
    budget: usize,
    name: Option<Span>,
    resource: Option<Span>,
    value: Option<Span>,
}

impl Layout {
    pub fn allocate<A: Allocator + ?Sized>(allocator: &mut A, budget: usize) -> Result<Self, AllocError> {
        Ok(Self {
            payload: allocator.allocate(budget)?,
            budget,
            name: None,
            resource: None,
            value: None,
        })
    }

    /// Declared payload size
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Bytes still unclaimed, terminators included
    pub fn remaining(&self) -> usize {
        self.budget - self.payload.len()
    }

    /// Largest string the next placement can hold
    pub fn max_string(&self) -> usize {
        self.remaining().saturating_sub(1)
    }

    /// Copy `bytes` in as `field`, returning the new cursor
    pub fn place(&mut self, field: Field, bytes: &[u8]) -> Result<usize, LayoutError> {
        self.check(field, bytes.len())?;

        let offset = self.payload.len();
        self.payload.extend_from_slice(bytes);

        Ok(self.terminate(field, offset))
    }

    /// Let `read` append at most [`Layout::max_string`] bytes as `field`,
    /// then terminate them and return the new cursor
    pub fn fill<E>(&mut self, field: Field, read: impl FnOnce(&mut Vec<u8>, usize) -> Result<(), E>) -> Result<usize, E>
    where
        E: From<LayoutError>,
    {
        self.check(field, 0)?;

        let offset = self.payload.len();
        let max = self.max_string();

        if let Err(error) = read(&mut self.payload, max) {
            self.payload.truncate(offset);
            return Err(error);
        }

        let len = self.payload.len() - offset;
        if len > max {
            self.payload.truncate(offset);
            return Err(LayoutError::Exhausted {
                field,
                needed: len + 1,
                remaining: self.remaining(),
            }
            .into());
        }

        Ok(self.terminate(field, offset))
    }

    fn terminate(&mut self, field: Field, offset: usize) -> usize {
        self.payload.push(b'\0');

        let span = Span {
            offset,
            len: self.payload.len() - offset,
        };

        match field {
            Field::Name => self.name = Some(span),
            Field::Resource => self.resource = Some(span),
            Field::Value => self.value = Some(span),
        }

        self.payload.len()
    }

    fn check(&self, field: Field, len: usize) -> Result<(), LayoutError> {
        let in_order = match field {
            Field::Name => self.name.is_none(),
            Field::Resource => self.name.is_some() && self.resource.is_none() && self.value.is_none(),
            Field::Value => self.name.is_some() && self.value.is_none(),
        };

        if !in_order {
            return Err(LayoutError::OutOfOrder(field));
        }

        if len >= self.remaining() {
            return Err(LayoutError::Exhausted {
                field,
                needed: len + 1,
                remaining: self.remaining(),
            });
        }

        Ok(())
    }

    /// Freeze into a record carrying `op`
    pub fn finish(self, op: u32) -> Result<Svrattrl, LayoutError> {
        let name = self.name.ok_or(LayoutError::Missing(Field::Name))?;
        let value = self.value.ok_or(LayoutError::Missing(Field::Value))?;

        Ok(Svrattrl {
            payload: self.payload,
            budget: self.budget,
            name,
            resource: self.resource,
            value,
            op,
        })
    }
}

/// Server attribute record: name, optional resource, value and op
/// packed into a single payload
#[derive(Clone)]
pub struct Svrattrl {
    payload: Vec<u8>,
    budget: usize,
    name: Span,
    resource: Option<Span>,
    value: Span,
    op: u32,
}

impl Svrattrl {
    /// Build a record with an exact budget
    pub fn new(name: impl AsRef<[u8]>, resource: Option<&[u8]>, value: impl AsRef<[u8]>, op: impl Into<u32>) -> Self {
        let (name, value) = (name.as_ref(), value.as_ref());
        let budget = name.len() + 1 + resource.map_or(0, |r| r.len() + 1) + value.len() + 1;

        let mut payload = Vec::with_capacity(budget);
        let mut push = |bytes: &[u8]| {
            let offset = payload.len();
            payload.extend_from_slice(bytes);
            payload.push(b'\0');
            Span {
                offset,
                len: bytes.len() + 1,
            }
        };

        let name = push(name);
        let resource = resource.map(&mut push);
        let value = push(value);

        Self {
            payload,
            budget,
            name,
            resource,
            value,
            op: op.into(),
        }
    }

    pub fn name(&self) -> &[u8] {
        self.name.bytes(&self.payload)
    }

    pub fn resource(&self) -> Option<&[u8]> {
        self.resource.map(|span| span.bytes(&self.payload))
    }

    pub fn value(&self) -> &[u8] {
        self.value.bytes(&self.payload)
    }

    /// Bytes used by the name, terminator included
    pub fn name_len(&self) -> usize {
        self.name.len
    }

    /// Bytes used by the resource, terminator included, 0 when absent
    pub fn resource_len(&self) -> usize {
        self.resource.map_or(0, |span| span.len)
    }

    /// Bytes used by the value, terminator included
    pub fn value_len(&self) -> usize {
        self.value.len
    }

    /// Offset of the value within the payload
    pub fn value_offset(&self) -> usize {
        self.value.offset
    }

    /// Sum of the string lengths, what an encoder announces
    pub fn used(&self) -> usize {
        self.name_len() + self.resource_len() + self.value_len()
    }

    /// Payload size declared by the sender
    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn total_size(&self) -> usize {
        HEADER_SIZE + self.budget()
    }

    /// Placed strings with their terminators, the unused tail of the
    /// budget is never exposed
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn op(&self) -> u32 {
        self.op
    }

    pub fn batch_op(&self) -> Option<BatchOp> {
        BatchOp::try_from(self.op).ok()
    }
}

/// Logical equality, the declared budget is not compared
impl PartialEq for Svrattrl {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
            && self.resource() == other.resource()
            && self.value() == other.value()
            && self.op == other.op
    }
}

impl Eq for Svrattrl {}

impl fmt::Debug for Svrattrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Svrattrl")
            .field("name", &String::from_utf8_lossy(self.name()))
            .field("resource", &self.resource().map(String::from_utf8_lossy))
            .field("value", &String::from_utf8_lossy(self.value()))
            .field("op", &self.op)
            .field("budget", &self.budget())
            .finish()
    }
}

impl fmt::Display for Svrattrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.name()))?;
        if let Some(resource) = self.resource() {
            write!(f, ".{}", String::from_utf8_lossy(resource))?;
        }
        write!(f, " = {}", String::from_utf8_lossy(self.value()))
    }
}

#[derive(Debug, Error)]
#[error("cannot allocate {budget} byte record")]
pub struct AllocError {
    pub budget: usize,
}

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("{field} needs {needed} bytes, {remaining} remaining")]
    Exhausted {
        field: Field,
        needed: usize,
        remaining: usize,
    },
    #[error("{0} placed out of order")]
    OutOfOrder(Field),
    #[error("{0} never placed")]
    Missing(Field),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn place_sequential() {
        let mut layout = Layout::allocate(&mut System::default(), 32).unwrap();

        assert_eq!(layout.place(Field::Name, b"Resource_List").unwrap(), 14);
        assert_eq!(layout.place(Field::Resource, b"ncpus").unwrap(), 20);
        assert_eq!(layout.place(Field::Value, b"4").unwrap(), 22);
        assert_eq!(layout.remaining(), 10);

        let record = layout.finish(BatchOp::Set.into()).unwrap();

        assert_eq!(record.name(), b"Resource_List");
        assert_eq!(record.resource(), Some(b"ncpus".as_slice()));
        assert_eq!(record.value(), b"4");
        assert_eq!((record.name_len(), record.resource_len(), record.value_len()), (14, 6, 2));
        assert_eq!(record.budget(), 32);
        assert_eq!(record.total_size(), HEADER_SIZE + 32);
        assert_eq!(record.payload(), b"Resource_List\0ncpus\04\0");
        assert_eq!(record.to_string(), "Resource_List.ncpus = 4");
    }

    #[test]
    fn value_follows_name_without_resource() {
        let record = Svrattrl::new("Job_Name", None, "STDIN", BatchOp::Set);

        assert_eq!(record.resource(), None);
        assert_eq!(record.resource_len(), 0);
        assert_eq!(record.value_offset(), record.name_len());
        assert_eq!(record.used(), record.budget());
    }

    #[test]
    fn exhausted_budget() {
        let mut layout = Layout::allocate(&mut System::default(), 5).unwrap();

        // four bytes plus the terminator fill it exactly
        layout.place(Field::Name, b"abcd").unwrap();
        assert_eq!(layout.max_string(), 0);
        assert_eq!(layout.remaining(), 1);

        assert!(matches!(
            layout.place(Field::Value, b""),
            Err(LayoutError::Exhausted {
                field: Field::Value,
                needed: 1,
                remaining: 0
            })
        ));
    }

    #[test]
    fn placement_order() {
        let mut layout = Layout::allocate(&mut System::default(), 16).unwrap();

        assert!(matches!(
            layout.place(Field::Value, b"x"),
            Err(LayoutError::OutOfOrder(Field::Value))
        ));

        layout.place(Field::Name, b"a").unwrap();
        layout.place(Field::Value, b"b").unwrap();

        assert!(matches!(
            layout.place(Field::Resource, b"c"),
            Err(LayoutError::OutOfOrder(Field::Resource))
        ));
    }

    #[test]
    fn finish_requires_value() {
        let mut layout = Layout::allocate(&mut System::default(), 16).unwrap();
        layout.place(Field::Name, b"a").unwrap();

        assert!(matches!(layout.finish(0), Err(LayoutError::Missing(Field::Value))));
    }

    #[test]
    fn system_limit() {
        let mut system = System::with_limit(8);

        assert!(Layout::allocate(&mut system, 8).is_ok());
        assert!(matches!(Layout::allocate(&mut system, 9), Err(AllocError { budget: 9 })));

        let mut system = System::default();
        let huge = DEFAULT_RECORD_LIMIT + 1;

        assert!(matches!(Layout::allocate(&mut system, huge), Err(AllocError { budget }) if budget == huge));
    }

    #[test]
    fn payload_reserved_not_filled() {
        let payload = System::default().allocate(4096).unwrap();

        assert!(payload.is_empty());
        assert!(payload.capacity() >= 4096);
    }

    #[test]
    fn fill_bounded() {
        let mut layout = Layout::allocate(&mut System::default(), 8).unwrap();

        let cursor = layout
            .fill(Field::Name, |payload, max| {
                assert_eq!(max, 7);
                payload.extend_from_slice(b"abc");
                Ok::<_, LayoutError>(())
            })
            .unwrap();
        assert_eq!(cursor, 4);

        // Overrunning the offered room is rejected and rolled back
        let result = layout.fill(Field::Value, |payload, _| {
            payload.extend_from_slice(b"defgh");
            Ok::<_, LayoutError>(())
        });
        assert!(matches!(result, Err(LayoutError::Exhausted { field: Field::Value, .. })));
        assert_eq!(layout.remaining(), 4);

        layout.place(Field::Value, b"de").unwrap();
        let record = layout.finish(0).unwrap();

        assert_eq!(record.payload(), b"abc\0de\0");
        assert_eq!(record.budget(), 8);
        assert_eq!(record.used(), 7);
    }

    #[test]
    fn batch_op_names() {
        assert_eq!(BatchOp::try_from(2u32), Ok(BatchOp::Increment));
        assert_eq!(BatchOp::try_from(99u32), Err(99));
        assert_eq!(BatchOp::Default.to_string(), "dflt");
        assert_eq!("unset".parse::<BatchOp>().unwrap(), BatchOp::Unset);
    }
}
