// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Attribute list codec
//!
//! The list is a count followed by that many entries:
//!
//! ```text
//! u int   size of name, resource and value including their nuls
//! string  attribute name
//! u int   1 if a resource name follows, 0 otherwise
//! string  resource name (only if flagged)
//! string  value
//! u int   op
//! ```
//!
//! Server `svrattrl` lists and client `attrl` / `attropl` lists share this
//! encoding, so any of them decodes into any other.

use std::io::{Read, Write};

use log::{debug, trace, warn};
use thiserror::Error;

use crate::ext::{self, ReadExt, WriteExt};
use crate::list::AttrList;
use crate::record::{AllocError, Allocator, Field, Layout, LayoutError, Svrattrl, System};

/// What happens to records already linked when a later entry fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PartialPolicy {
    /// Leave them linked, the caller decides
    #[default]
    Keep,
    /// Unlink everything this decode appended
    Discard,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    pub partial: PartialPolicy,
    /// Largest entry count accepted from the wire
    pub max_entries: Option<u32>,
}

/// Decodes attribute lists, drawing record payloads from `A`
#[derive(Debug, Default)]
pub struct Decoder<A = System> {
    allocator: A,
    options: Options,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<A: Allocator> Decoder<A> {
    pub fn with_allocator(allocator: A) -> Self {
        Self {
            allocator,
            options: Options::default(),
        }
    }

    pub fn with_options(self, options: Options) -> Self {
        Self { options, ..self }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Decode one attribute list from `reader`, appending to `list`
    ///
    /// On failure, records appended before the failing entry are kept or
    /// removed according to [`Options::partial`]. Records already in
    /// `list` before the call are never touched.
    pub fn decode<R: Read>(&mut self, mut reader: R, list: &mut AttrList) -> Result<(), DecodeError> {
        let start = list.len();

        let result = self.decode_entries(&mut reader, list);

        if let Err(error) = &result {
            let decoded = list.len() - start;

            match self.options.partial {
                PartialPolicy::Keep => {
                    debug!("attribute list failed after {decoded} records: {error}");
                }
                PartialPolicy::Discard => {
                    warn!("discarding {decoded} partially decoded records: {error}");
                    list.truncate(start);
                }
            }
        }

        result
    }

    fn decode_entries<R: Read>(&mut self, reader: &mut R, list: &mut AttrList) -> Result<(), DecodeError> {
        let count = reader.read_ui()?;

        if let Some(max) = self.options.max_entries {
            if count > max {
                return Err(ext::Error::Protocol(format!("{count} attributes exceeds limit of {max}")).into());
            }
        }

        debug!("decoding {count} attributes");

        for _ in 0..count {
            let record = decode_record(reader, &mut self.allocator)?;

            trace!("decoded {record} ({} of {} bytes)", record.used(), record.budget());

            list.append(record);
        }

        Ok(())
    }
}

/// Decode one list with default options
pub fn decode_svrattrl<R: Read>(reader: R, list: &mut AttrList) -> Result<(), DecodeError> {
    Decoder::new().decode(reader, list)
}

fn decode_record<R: Read, A: Allocator>(reader: &mut R, allocator: &mut A) -> Result<Svrattrl, DecodeError> {
    let budget = reader.read_ui()? as usize;

    // Dropped, and so released, on any failure below
    let mut layout = Layout::allocate(allocator, budget)?;

    read_field(reader, &mut layout, Field::Name)?;

    if reader.read_ui()? != 0 {
        read_field(reader, &mut layout, Field::Resource)?;
    }

    // Value takes whatever budget remains
    read_field(reader, &mut layout, Field::Value)?;

    let op = reader.read_ui()?;

    Ok(layout.finish(op)?)
}

fn read_field<R: Read>(reader: &mut R, layout: &mut Layout, field: Field) -> Result<usize, DecodeError> {
    // Not even room for a terminator
    if layout.remaining() == 0 {
        return Err(ext::Error::Overflow.into());
    }

    layout.fill(field, |payload, max| {
        reader.read_counted_string(max, payload)?;
        Ok(())
    })
}

/// Encode `list` in order
///
/// Each entry announces its record's declared budget, so forwarded records
/// keep their size.
pub fn encode_svrattrl<W: Write>(writer: &mut W, list: &AttrList) -> Result<(), EncodeError> {
    writer.write_uint(list.len() as u64)?;

    for record in list {
        encode_entry(
            writer,
            record.budget(),
            record.name(),
            record.resource(),
            record.value(),
            record.op(),
        )?;
    }

    Ok(())
}

fn encode_entry<W: Write>(
    writer: &mut W,
    budget: usize,
    name: &[u8],
    resource: Option<&[u8]>,
    value: &[u8],
    op: u32,
) -> Result<(), EncodeError> {
    writer.write_uint(budget as u64)?;
    writer.write_counted_string(name)?;

    match resource {
        Some(resource) => {
            writer.write_uint(1)?;
            writer.write_counted_string(resource)?;
        }
        None => writer.write_uint(0)?,
    }

    writer.write_counted_string(value)?;
    writer.write_uint(op.into())?;

    Ok(())
}

/// Client side attribute, as carried by `attrl` and `attropl` lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attrl {
    pub name: String,
    pub resource: Option<String>,
    pub value: String,
    pub op: u32,
}

impl Attrl {
    pub fn new(name: impl ToString, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            resource: None,
            value: value.to_string(),
            op: 0,
        }
    }

    pub fn with_resource(self, resource: impl ToString) -> Self {
        Self {
            resource: Some(resource.to_string()),
            ..self
        }
    }

    pub fn with_op(self, op: impl Into<u32>) -> Self {
        Self { op: op.into(), ..self }
    }
}

impl From<&Attrl> for Svrattrl {
    fn from(attrl: &Attrl) -> Self {
        Svrattrl::new(
            &attrl.name,
            attrl.resource.as_deref().map(str::as_bytes),
            &attrl.value,
            attrl.op,
        )
    }
}

impl TryFrom<&Svrattrl> for Attrl {
    type Error = DecodeError;

    fn try_from(record: &Svrattrl) -> Result<Self, Self::Error> {
        let string = |bytes: &[u8], field| {
            String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::Utf8(field))
        };

        Ok(Self {
            name: string(record.name(), Field::Name)?,
            resource: record
                .resource()
                .map(|resource| string(resource, Field::Resource))
                .transpose()?,
            value: string(record.value(), Field::Value)?,
            op: record.op(),
        })
    }
}

/// Encode a client attribute list
pub fn encode_attrl<W: Write>(writer: &mut W, attributes: &[Attrl]) -> Result<(), EncodeError> {
    writer.write_uint(attributes.len() as u64)?;

    for attrl in attributes {
        let name = attrl.name.as_bytes();
        let resource = attrl.resource.as_deref().map(str::as_bytes);
        let value = attrl.value.as_bytes();

        let budget = name.len() + 1 + resource.map_or(0, |resource| resource.len() + 1) + value.len() + 1;

        encode_entry(writer, budget, name, resource, value, attrl.op)?;
    }

    Ok(())
}

/// Decode a client attribute list, strings must be UTF-8
pub fn decode_attrl<R: Read>(reader: R) -> Result<Vec<Attrl>, DecodeError> {
    let mut list = AttrList::new();
    decode_svrattrl(reader, &mut list)?;
    list.iter().map(Attrl::try_from).collect()
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("transport")]
    Transport(#[from] ext::Error),
    #[error("out of memory")]
    OutOfMemory(#[from] AllocError),
    #[error("{0} is not valid UTF-8")]
    Utf8(Field),
}

impl DecodeError {
    /// Numeric DIS status
    pub fn code(&self) -> i32 {
        match self {
            DecodeError::Transport(error) => error.code(),
            DecodeError::OutOfMemory(_) => 8,
            DecodeError::Utf8(_) => 9,
        }
    }
}

impl From<LayoutError> for DecodeError {
    fn from(error: LayoutError) -> Self {
        DecodeError::Transport(ext::Error::Protocol(error.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("transport")]
    Transport(#[from] ext::Error),
}

impl EncodeError {
    /// Numeric DIS status
    pub fn code(&self) -> i32 {
        match self {
            EncodeError::Transport(error) => error.code(),
        }
    }
}
