// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! DIS ("Data Is Strings") wire codec and attribute lists
//!
//! [`ext`] provides the integer and counted string primitives over any
//! blocking [`std::io::Read`] / [`std::io::Write`], [`record`] the packed
//! attribute record, [`list`] the caller owned list records are decoded
//! into and [`attrl`] the attribute list codec tying them together.

pub mod attrl;
pub mod ext;
pub mod list;
pub mod record;

pub use self::attrl::{
    decode_attrl, decode_svrattrl, encode_attrl, encode_svrattrl, Attrl, DecodeError, Decoder, EncodeError, Options,
    PartialPolicy,
};
pub use self::ext::{Error, ReadExt, WriteExt};
pub use self::list::{AttrList, Handle};
pub use self::record::{
    AllocError, Allocator, BatchOp, Field, Layout, LayoutError, Svrattrl, System, DEFAULT_RECORD_LIMIT, HEADER_SIZE,
};
