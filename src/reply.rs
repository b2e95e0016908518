// https://redis.io/docs/reference/protocol-spec

use std::fmt;
use std::io::Cursor;

use bytes::{Buf, Bytes};
use thiserror::Error as ThisError;

use crate::error::Error;

static CRLF: &[u8; 2] = b"\r\n";

// Replies nested deeper than this are rejected rather than risking the reader's stack.
const MAX_DEPTH: usize = 512;

#[derive(Debug, ThisError, PartialEq)]
pub(crate) enum DecodeError {
    #[error("not enough data is available to parse an entire reply")]
    Incomplete,
    #[error("invalid reply data type: {0:#04x}")]
    InvalidDataType(u8),
    #[error("{0}")]
    Invalid(&'static str),
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Error {
        Error::BadProtocol(err.to_string())
    }
}

/// A decoded server reply.
///
/// `Bulk(None)` and `MultiBulk(None)` are the protocol's nil values and are distinct from an
/// empty payload or an empty array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    Status(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    MultiBulk(Option<Vec<Reply>>),
}

/// Decodes one reply from the start of `buf`.
///
/// Returns `Ok(None)` when `buf` holds only part of a reply; nothing is consumed in that case and
/// the caller retries with more bytes. On success the reply is returned together with the exact
/// number of bytes it occupied. Bytes past the reply are never inspected.
///
/// An unknown type marker or malformed header is a `BadProtocol` error. The stream cannot be
/// resynchronized after that and must be dropped.
pub fn decode(buf: &[u8]) -> Result<Option<(Reply, usize)>, Error> {
    let mut cursor = Cursor::new(buf);

    match Reply::parse(&mut cursor, 0) {
        Ok(reply) => Ok(Some((reply, cursor.position() as usize))),
        Err(DecodeError::Incomplete) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl Reply {
    pub(crate) fn parse(src: &mut Cursor<&[u8]>, depth: usize) -> Result<Reply, DecodeError> {
        // The first byte identifies the reply type, the rest is the type's contents.
        let first_byte = get_byte(src)?;
        let data_type = DataType::try_from(first_byte)?;

        match data_type {
            DataType::Status => Ok(Reply::Status(get_text(src)?)),
            DataType::Error => Ok(Reply::Error(get_text(src)?)),
            DataType::Integer => Ok(Reply::Integer(get_decimal(src)?)),
            // $<length>\r\n<data>\r\n
            DataType::Bulk => {
                let length = get_decimal(src)?;
                if length == -1 {
                    return Ok(Reply::Bulk(None));
                }
                let length =
                    usize::try_from(length).map_err(|_| DecodeError::Invalid("negative bulk length"))?;

                let data = get_payload(src, length)?;
                Ok(Reply::Bulk(Some(data)))
            }
            // *<count>\r\n<reply-1>...<reply-n>
            DataType::MultiBulk => {
                let count = get_decimal(src)?;
                if count == -1 {
                    return Ok(Reply::MultiBulk(None));
                }
                let count = usize::try_from(count)
                    .map_err(|_| DecodeError::Invalid("negative multi-bulk count"))?;
                if count > 0 && depth >= MAX_DEPTH {
                    return Err(DecodeError::Invalid("multi-bulk nested too deeply"));
                }

                // The count comes off the wire, don't let it size the allocation on its own.
                let mut replies = Vec::with_capacity(count.min(src.remaining()));
                for _ in 0..count {
                    replies.push(Self::parse(src, depth + 1)?);
                }

                Ok(Reply::MultiBulk(Some(replies)))
            }
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes);
        bytes
    }

    fn write_to(&self, bytes: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                bytes.push(u8::from(DataType::Status));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                bytes.push(u8::from(DataType::Error));
                bytes.extend_from_slice(s.as_bytes());
                bytes.extend_from_slice(CRLF);
            }
            Reply::Integer(i) => {
                bytes.push(u8::from(DataType::Integer));
                bytes.extend_from_slice(i.to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
            }
            Reply::Bulk(None) => bytes.extend_from_slice(b"$-1\r\n"),
            Reply::Bulk(Some(data)) => {
                bytes.push(u8::from(DataType::Bulk));
                bytes.extend_from_slice(data.len().to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
                bytes.extend_from_slice(data);
                bytes.extend_from_slice(CRLF);
            }
            Reply::MultiBulk(None) => bytes.extend_from_slice(b"*-1\r\n"),
            Reply::MultiBulk(Some(replies)) => {
                bytes.push(u8::from(DataType::MultiBulk));
                bytes.extend_from_slice(replies.len().to_string().as_bytes());
                bytes.extend_from_slice(CRLF);
                for reply in replies {
                    reply.write_to(bytes);
                }
            }
        }
    }

    /// Short name of the reply shape, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(Some(_)) => "bulk",
            Reply::Bulk(None) => "nil bulk",
            Reply::MultiBulk(Some(_)) => "multi-bulk",
            Reply::MultiBulk(None) => "nil multi-bulk",
        }
    }

    /// Raw bytes of a status line or a non-nil bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Status(s) => Some(s.as_bytes()),
            Reply::Bulk(Some(data)) => Some(data),
            _ => None,
        }
    }
}

impl From<Reply> for Vec<u8> {
    fn from(reply: Reply) -> Self {
        reply.serialize()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "+{}", s),
            Reply::Error(s) => write!(f, "-{}", s),
            Reply::Integer(i) => write!(f, ":{}", i),
            Reply::Bulk(Some(bytes)) => write!(f, "${}", String::from_utf8_lossy(bytes)),
            Reply::Bulk(None) => write!(f, "$-1"),
            Reply::MultiBulk(Some(replies)) => {
                write!(f, "*{}", replies.len())?;
                for reply in replies {
                    write!(f, " {}", reply)?;
                }
                Ok(())
            }
            Reply::MultiBulk(None) => write!(f, "*-1"),
        }
    }
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, DecodeError> {
    if !src.has_remaining() {
        return Err(DecodeError::Incomplete);
    }
    Ok(src.get_u8())
}

/// Returns the bytes up to the next CRLF and moves the cursor past it.
fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], DecodeError> {
    let start = src.position() as usize;
    let buf: &'a [u8] = *src.get_ref();

    let line_end = buf[start..]
        .windows(2)
        .position(|window| window == CRLF)
        .map(|index| start + index)
        .ok_or(DecodeError::Incomplete)?;

    src.set_position((line_end + CRLF.len()) as u64);

    Ok(&buf[start..line_end])
}

fn get_text(src: &mut Cursor<&[u8]>) -> Result<String, DecodeError> {
    let line = get_line(src)?;
    Ok(String::from_utf8_lossy(line).into_owned())
}

fn get_decimal(src: &mut Cursor<&[u8]>) -> Result<i64, DecodeError> {
    let line = get_line(src)?;

    let (negative, digits) = match line.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, line),
    };
    if digits.is_empty() {
        return Err(DecodeError::Invalid("empty integer"));
    }

    // Accumulate towards the sign so that i64::MIN is representable.
    let mut value: i64 = 0;
    for &byte in digits {
        if !byte.is_ascii_digit() {
            return Err(DecodeError::Invalid("invalid digit in integer"));
        }
        let digit = i64::from(byte - b'0');
        value = value
            .checked_mul(10)
            .and_then(|v| {
                if negative {
                    v.checked_sub(digit)
                } else {
                    v.checked_add(digit)
                }
            })
            .ok_or(DecodeError::Invalid("integer overflow"))?;
    }

    Ok(value)
}

/// Copies exactly `length` payload bytes once the payload and its CRLF are both available.
fn get_payload(src: &mut Cursor<&[u8]>, length: usize) -> Result<Bytes, DecodeError> {
    let start = src.position() as usize;
    let buf = *src.get_ref();

    let end = start
        .checked_add(length)
        .ok_or(DecodeError::Invalid("bulk length overflow"))?;
    if buf.len() < end + CRLF.len() {
        return Err(DecodeError::Incomplete);
    }
    if &buf[end..end + CRLF.len()] != CRLF {
        return Err(DecodeError::Invalid("bulk payload is not terminated by CRLF"));
    }

    src.set_position((end + CRLF.len()) as u64);

    Ok(Bytes::copy_from_slice(&buf[start..end]))
}

#[derive(Debug)]
enum DataType {
    Status,    // '+'
    Error,     // '-'
    Integer,   // ':'
    Bulk,      // '$'
    MultiBulk, // '*'
}

impl TryFrom<u8> for DataType {
    type Error = DecodeError;

    fn try_from(byte: u8) -> Result<Self, DecodeError> {
        match byte {
            b'+' => Ok(Self::Status),
            b'-' => Ok(Self::Error),
            b':' => Ok(Self::Integer),
            b'$' => Ok(Self::Bulk),
            b'*' => Ok(Self::MultiBulk),
            _ => Err(DecodeError::InvalidDataType(byte)),
        }
    }
}

impl From<DataType> for u8 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::Status => b'+',
            DataType::Error => b'-',
            DataType::Integer => b':',
            DataType::Bulk => b'$',
            DataType::MultiBulk => b'*',
        }
    }
}
