// SPDX-FileCopyrightText: Copyright © 2020-2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! DIS ("Data Is Strings") primitives layered over [`Read`] and [`Write`]
//!
//! Integers travel as decimal text. The digits are preceded by a sign and,
//! while the last emitted run is longer than one character, by its length:
//!
//! | value        | wire             |
//! |--------------|------------------|
//! | `0`          | `+0`             |
//! | `12345`      | `5+12345`        |
//! | `1234567890` | `210+1234567890` |
//!
//! Counted strings are an unsigned length followed by that many raw bytes,
//! with no terminator.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Widest decimal run we accept, `u64::MAX` has 20 digits
const MAX_DIGITS: u64 = 20;

pub trait ReadExt: Read {
    fn read_u8(&mut self) -> Result<u8, Error> {
        let mut byte = [0u8; 1];
        self.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    /// Read a DIS unsigned integer
    fn read_uint(&mut self) -> Result<u64, Error> {
        let (negative, magnitude) = read_signed_magnitude(self)?;

        if negative {
            return Err(Error::BadSign);
        }

        Ok(magnitude)
    }

    /// Read a DIS unsigned integer which must fit an `unsigned int`
    fn read_ui(&mut self) -> Result<u32, Error> {
        u32::try_from(self.read_uint()?).map_err(|_| Error::Overflow)
    }

    /// Read a DIS signed integer
    fn read_int(&mut self) -> Result<i64, Error> {
        let (negative, magnitude) = read_signed_magnitude(self)?;

        if negative {
            // i64::MIN has no positive counterpart
            0i64.checked_sub_unsigned(magnitude).ok_or(Error::Overflow)
        } else {
            i64::try_from(magnitude).map_err(|_| Error::Overflow)
        }
    }

    /// Read a counted string, appending it to `dest` and returning its
    /// length. The declared length must not exceed `max`. Nothing past
    /// the length prefix is consumed on overflow.
    fn read_counted_string(&mut self, max: usize, dest: &mut Vec<u8>) -> Result<usize, Error> {
        let length = self.read_uint()?;

        let length = usize::try_from(length)
            .ok()
            .filter(|length| *length <= max)
            .ok_or(Error::Overflow)?;

        // Only bytes actually received are written into `dest`
        let read = Read::take(&mut *self, length as u64).read_to_end(dest)?;

        if read < length {
            return Err(Error::EndOfData);
        }

        Ok(length)
    }

    /// Read a counted string of at most `max` bytes into a new buffer
    fn read_string(&mut self, max: usize) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.read_counted_string(max, &mut bytes)?;
        Ok(bytes)
    }
}

impl<T: Read + ?Sized> ReadExt for T {}

pub trait WriteExt: Write {
    /// Write a DIS unsigned integer
    fn write_uint(&mut self, item: u64) -> Result<(), Error> {
        write_signed_magnitude(self, false, item)
    }

    /// Write a DIS signed integer
    fn write_int(&mut self, item: i64) -> Result<(), Error> {
        write_signed_magnitude(self, item < 0, item.unsigned_abs())
    }

    /// Write `bytes` as a counted string
    fn write_counted_string(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write_uint(bytes.len() as u64)?;
        self.write_all(bytes)?;
        Ok(())
    }
}

impl<T: Write + ?Sized> WriteExt for T {}

fn read_signed_magnitude<R: Read + ?Sized>(reader: &mut R) -> Result<(bool, u64), Error> {
    let mut count = 1;

    loop {
        let byte = reader.read_u8()?;

        match byte {
            b'+' | b'-' => return Ok((byte == b'-', read_digits(reader, count)?)),
            b'0' => return Err(Error::LeadingZero),
            b'1'..=b'9' => {
                let rest = read_digits(reader, count - 1)?;
                let next = u64::from(byte - b'0')
                    .checked_mul(10u64.pow((count - 1) as u32))
                    .and_then(|head| head.checked_add(rest))
                    .ok_or(Error::Overflow)?;

                if next > MAX_DIGITS {
                    return Err(Error::Overflow);
                }

                count = next;
            }
            _ => return Err(Error::NonDigit),
        }
    }
}

/// Read exactly `count` decimal digits
fn read_digits<R: Read + ?Sized>(reader: &mut R, count: u64) -> Result<u64, Error> {
    let mut value = 0u64;

    for _ in 0..count {
        let byte = reader.read_u8()?;

        if !byte.is_ascii_digit() {
            return Err(Error::NonDigit);
        }

        value = value
            .checked_mul(10)
            .and_then(|value| value.checked_add(u64::from(byte - b'0')))
            .ok_or(Error::Overflow)?;
    }

    Ok(value)
}

fn write_signed_magnitude<W: Write + ?Sized>(writer: &mut W, negative: bool, magnitude: u64) -> Result<(), Error> {
    let digits = magnitude.to_string();
    let sign = if negative { '-' } else { '+' };

    let mut encoded = format!("{sign}{digits}");
    let mut length = digits.len();

    while length > 1 {
        let prefix = length.to_string();
        length = prefix.len();
        encoded.insert_str(0, &prefix);
    }

    writer.write_all(encoded.as_bytes())?;

    Ok(())
}

/// Failure of a DIS primitive
#[derive(Debug, Error)]
pub enum Error {
    #[error("value or length exceeds the allowed maximum")]
    Overflow,
    #[error("negative value where unsigned expected")]
    BadSign,
    #[error("leading zero in count prefix")]
    LeadingZero,
    #[error("non-digit where digit expected")]
    NonDigit,
    #[error("premature end of data")]
    EndOfData,
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("io")]
    Io(#[source] io::Error),
}

impl Error {
    /// Numeric DIS status carried on the wire and in logs
    pub fn code(&self) -> i32 {
        match self {
            Error::Overflow => 1,
            Error::BadSign => 3,
            Error::LeadingZero => 4,
            Error::NonDigit => 5,
            Error::EndOfData => 7,
            Error::Protocol(_) => 9,
            Error::Io(_) => 11,
        }
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::UnexpectedEof => Error::EndOfData,
            _ => Error::Io(error),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode_uint(value: u64) -> Vec<u8> {
        let mut bytes = vec![];
        bytes.write_uint(value).unwrap();
        bytes
    }

    #[test]
    fn uint_wire_format() {
        assert_eq!(encode_uint(0), b"+0");
        assert_eq!(encode_uint(7), b"+7");
        assert_eq!(encode_uint(42), b"2+42");
        assert_eq!(encode_uint(12345), b"5+12345");
        assert_eq!(encode_uint(1_234_567_890), b"210+1234567890");
        assert_eq!(encode_uint(u64::MAX), b"220+18446744073709551615");
    }

    #[test]
    fn uint_decodes_canonical_forms() {
        for value in [0, 1, 9, 10, 99, 100, 12345, 1_234_567_890, u32::MAX as u64, u64::MAX] {
            let bytes = encode_uint(value);
            let mut reader = bytes.as_slice();

            assert_eq!(reader.read_uint().unwrap(), value);
            assert!(reader.is_empty(), "trailing bytes after {value}");
        }
    }

    #[test]
    fn int_wire_format() {
        let mut bytes = vec![];
        bytes.write_int(-12).unwrap();
        bytes.write_int(5).unwrap();
        bytes.write_int(i64::MIN).unwrap();
        assert_eq!(&bytes[..6], b"2-12+5");

        let mut reader = bytes.as_slice();
        assert_eq!(reader.read_int().unwrap(), -12);
        assert_eq!(reader.read_int().unwrap(), 5);
        assert_eq!(reader.read_int().unwrap(), i64::MIN);
    }

    #[test]
    fn uint_rejects_malformed_input() {
        assert!(matches!(b"05+12345".as_slice().read_uint(), Err(Error::LeadingZero)));
        assert!(matches!(b"x".as_slice().read_uint(), Err(Error::NonDigit)));
        assert!(matches!(b"3+1a2".as_slice().read_uint(), Err(Error::NonDigit)));
        assert!(matches!(b"-5".as_slice().read_uint(), Err(Error::BadSign)));
        assert!(matches!(b"5+123".as_slice().read_uint(), Err(Error::EndOfData)));
        assert!(matches!(b"".as_slice().read_uint(), Err(Error::EndOfData)));
        // 21 digits can't be represented
        assert!(matches!(b"221+".as_slice().read_uint(), Err(Error::Overflow)));
        assert!(matches!(
            b"220+99999999999999999999".as_slice().read_uint(),
            Err(Error::Overflow)
        ));
    }

    #[test]
    fn ui_range() {
        let bytes = encode_uint(u32::MAX as u64 + 1);
        assert!(matches!(bytes.as_slice().read_ui(), Err(Error::Overflow)));

        let bytes = encode_uint(u32::MAX as u64);
        assert_eq!(bytes.as_slice().read_ui().unwrap(), u32::MAX);
    }

    #[test]
    fn counted_string() {
        let mut bytes = vec![];
        bytes.write_counted_string(b"walltime").unwrap();
        bytes.write_counted_string(b"").unwrap();
        assert_eq!(bytes, b"+8walltime+0");

        let mut reader = bytes.as_slice();
        let mut dest = b"Job_Name\0".to_vec();

        let length = reader.read_counted_string(16, &mut dest).unwrap();
        assert_eq!(length, 8);
        assert_eq!(dest, b"Job_Name\0walltime");
        assert_eq!(reader.read_string(0).unwrap(), b"");
    }

    #[test]
    fn counted_string_overflow() {
        let mut reader = b"+8walltime".as_slice();
        let mut dest = vec![];

        assert!(matches!(reader.read_counted_string(7, &mut dest), Err(Error::Overflow)));
        // Body is left unread
        assert_eq!(reader, b"walltime");

        let mut reader = b"+8wall".as_slice();
        assert!(matches!(reader.read_string(8), Err(Error::EndOfData)));
    }

    #[test]
    fn status_codes() {
        assert_eq!(Error::Overflow.code(), 1);
        assert_eq!(Error::EndOfData.code(), 7);
        assert_eq!(Error::Protocol(String::new()).code(), 9);
    }
}
