// https://redis.io/docs/reference/protocol-spec

use std::io::Cursor;

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error as ThisError;
use tokio_util::codec::Decoder;

use crate::value::{parse_i64, Value};

static CRLF: &[u8; 2] = b"\r\n";

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("not enough data is available to parse an entire frame")]
    Incomplete,
    #[error("invalid frame data type: {0}")]
    InvalidDataType(u8),
    #[error("frame header CR followed by {0:#04x} instead of LF")]
    InvalidLineTerminator(u8),
    #[error("invalid integer field in frame header")]
    InvalidInteger,
    #[error("bulk string payload not terminated by CRLF")]
    UnterminatedBulkString,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parses one frame from the cursor. On success the cursor has advanced
/// past the frame, so its position is the number of bytes consumed.
///
/// `Error::Incomplete` means the buffer holds a truncated frame: nothing
/// has been consumed as far as the caller is concerned, and the parse must
/// be retried from the frame's first byte once more data arrives. Every
/// other error is a protocol violation and unrecoverable for the
/// connection that produced the bytes.
pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Value, Error> {
    // The first byte of a frame identifies its type, the rest its contents.
    let first_byte = get_byte(src)?;

    match first_byte {
        b'+' => {
            let line = get_line(src)?;
            Ok(Value::String(Bytes::copy_from_slice(line)))
        }
        b'-' => {
            let line = get_line(src)?;
            Ok(Value::Error(Bytes::copy_from_slice(line)))
        }
        b':' => {
            let line = get_line(src)?;
            let integer = parse_i64(line).ok_or(Error::InvalidInteger)?;
            Ok(Value::Integer(integer))
        }
        // $<length>\r\n<data>\r\n
        b'$' => {
            let length = parse_i64(get_line(src)?).ok_or(Error::InvalidInteger)?;
            // A length of -1 denotes the null bulk string.
            if length < 0 {
                return Ok(Value::Null);
            }
            let length = length as usize;
            let start = src.position() as usize;
            let buf = *src.get_ref();
            if start + length + CRLF.len() > buf.len() {
                return Err(Error::Incomplete);
            }
            // The payload may itself contain CRLF, so the declared length is
            // authoritative and the terminator is checked positionally.
            if &buf[start + length..start + length + CRLF.len()] != CRLF {
                return Err(Error::UnterminatedBulkString);
            }
            src.set_position((start + length + CRLF.len()) as u64);
            Ok(Value::String(Bytes::copy_from_slice(
                &buf[start..start + length],
            )))
        }
        // *<number-of-elements>\r\n<element-1>...<element-n>
        b'*' => {
            let length = parse_i64(get_line(src)?).ok_or(Error::InvalidInteger)?;
            // A length of -1 denotes the null array.
            if length < 0 {
                return Ok(Value::Null);
            }
            let mut values = Vec::with_capacity(length as usize);
            for _ in 0..length {
                // A truncated element propagates Incomplete for the whole
                // array; the retry re-parses from the array's first byte.
                values.push(parse(src)?);
            }
            Ok(Value::Array(values))
        }
        byte => Err(Error::InvalidDataType(byte)),
    }
}

/// Encodes a value as an outbound command frame: a bulk string, or an array
/// of recursively encoded elements. Integers are rendered as decimal text
/// because commands carry only bulk strings by protocol convention.
pub fn encode_request(value: &Value, output: &mut Vec<u8>) {
    match value {
        Value::Null => output.extend_from_slice(b"$-1\r\n"),
        Value::String(bytes) | Value::Error(bytes) => encode_bulk(bytes, output),
        Value::Integer(integer) => encode_bulk(integer.to_string().as_bytes(), output),
        Value::Array(values) => {
            output.push(b'*');
            output.extend_from_slice(values.len().to_string().as_bytes());
            output.extend_from_slice(CRLF);
            for value in values {
                encode_request(value, output);
            }
        }
    }
}

fn encode_bulk(payload: &[u8], output: &mut Vec<u8>) {
    output.push(b'$');
    output.extend_from_slice(payload.len().to_string().as_bytes());
    output.extend_from_slice(CRLF);
    output.extend_from_slice(payload);
    output.extend_from_slice(CRLF);
}

fn get_line<'a>(src: &mut Cursor<&'a [u8]>) -> Result<&'a [u8], Error> {
    let start = src.position() as usize;
    let buf = *src.get_ref();

    for i in start..buf.len() {
        if buf[i] != b'\r' {
            continue;
        }
        return match buf.get(i + 1) {
            // Not enough data to know whether a LF follows the CR.
            None => Err(Error::Incomplete),
            Some(&b'\n') => {
                src.set_position((i + CRLF.len()) as u64);
                Ok(&buf[start..i])
            }
            Some(&byte) => Err(Error::InvalidLineTerminator(byte)),
        };
    }
    Err(Error::Incomplete)
}

fn get_byte(src: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    if !src.has_remaining() {
        return Err(Error::Incomplete);
    }
    Ok(src.get_u8())
}

pub struct ValueCodec;

impl Decoder for ValueCodec {
    type Item = Value;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut cursor = Cursor::new(&src[..]);

        let value = match parse(&mut cursor) {
            Ok(value) => value,
            // Not enough data buffered for a whole frame yet.
            Err(Error::Incomplete) => return Ok(None),
            Err(err) => return Err(err),
        };

        // Remove the parsed frame from the buffer.
        let consumed = cursor.position() as usize;
        src.advance(consumed);

        Ok(Some(value))
    }
}
