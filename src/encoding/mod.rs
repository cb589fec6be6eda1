// Fixed-width field primitives for the trie file format.
//
// Every integer in a record is unsigned big-endian and padded on the left with
// zero bytes to its field width. Characters are stored as their UTF-8 bytes,
// left-padded the same way.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};

const BYTE_LENGTH: u32 = 8;

pub const VALUE_FIELD_LENGTH: usize = 2;
pub const CHILD_COUNT_FIELD_LENGTH: usize = 2;
pub const LETTER_FIELD_LENGTH: usize = 3;
pub const POSITION_FIELD_LENGTH: usize = 3;

pub const VALUE_MAX: u64 = field_max(VALUE_FIELD_LENGTH);
pub const POSITION_MAX: u64 = field_max(POSITION_FIELD_LENGTH);

pub const fn field_max(width: usize) -> u64 {
    (1 << (width as u32 * BYTE_LENGTH)) - 1
}

/// Number of significant bytes in `v`: zero for zero, otherwise
/// ceil(bit_length / 8).
pub fn int_bytesize(v: u64) -> usize {
    let bits = u64::BITS - v.leading_zeros();
    ((bits + BYTE_LENGTH - 1) / BYTE_LENGTH) as usize
}

pub fn encode_int(field: &'static str, v: u64, width: usize, out: &mut Vec<u8>) -> Result<()> {
    let actual = int_bytesize(v);
    if actual > width {
        return Err(Error::FieldOverflow {
            field,
            value: v,
            width,
        });
    }
    out.extend(std::iter::repeat(0).take(width - actual));
    for i in (0..actual).rev() {
        out.push((v >> (i as u32 * BYTE_LENGTH)) as u8);
    }
    Ok(())
}

pub fn decode_int(buf: &[u8]) -> u64 {
    buf.iter().fold(0, |acc, b| (acc << BYTE_LENGTH) | u64::from(*b))
}

pub fn encode_char(ch: char) -> Result<[u8; LETTER_FIELD_LENGTH]> {
    let mut utf8 = [0_u8; 4];
    let bytes = ch.encode_utf8(&mut utf8).as_bytes();
    if bytes.len() > LETTER_FIELD_LENGTH {
        return Err(Error::CharacterFieldOverflow {
            character: ch,
            width: LETTER_FIELD_LENGTH,
        });
    }
    let mut field = [0_u8; LETTER_FIELD_LENGTH];
    field[LETTER_FIELD_LENGTH - bytes.len()..].copy_from_slice(bytes);
    Ok(field)
}

/// Strips the zero padding and reads what is left as one UTF-8 character. An
/// all-zero field is NUL. No UTF-8 sequence for a non-NUL character starts
/// with a zero byte, so stripping never eats content.
pub fn decode_char(field: &[u8; LETTER_FIELD_LENGTH], offset: u64) -> Result<char> {
    let content = match field.iter().position(|b| *b != 0) {
        Some(idx) => &field[idx..],
        None => return Ok('\0'),
    };
    let s = std::str::from_utf8(content).map_err(|_| {
        Error::malformed(offset, format!("letter field {:?} is not valid UTF-8", field))
    })?;
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch),
        _ => Err(Error::malformed(
            offset,
            format!("letter field {:?} holds more than one character", field),
        )),
    }
}

/// Writes fields and tracks how many bytes have gone out, so the codec can
/// check each record starts where the layout put it.
#[derive(Debug)]
pub struct FieldWriter<W: Write> {
    w: W,
    buf: Vec<u8>,
    written: u64,
}

impl<W: Write> FieldWriter<W> {
    pub fn new(w: W) -> Self {
        FieldWriter {
            w,
            buf: Vec::with_capacity(64),
            written: 0,
        }
    }

    pub fn position(&self) -> u64 {
        self.written
    }

    pub fn write_int(&mut self, field: &'static str, v: u64, width: usize) -> Result<()> {
        self.buf.clear();
        encode_int(field, v, width, &mut self.buf)?;
        self.w.write_all(&self.buf)?;
        self.written += width as u64;
        Ok(())
    }

    pub fn write_char(&mut self, ch: char) -> Result<()> {
        let field = encode_char(ch)?;
        self.write_bytes(&field)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.w.write_all(bytes)?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

/// Reads fields from a seekable stream. The position is tracked here rather
/// than asked of the stream.
#[derive(Debug)]
pub struct FieldReader<R: Read + Seek> {
    r: R,
    pos: u64,
}

impl<R: Read + Seek> FieldReader<R> {
    pub fn new(r: R) -> Self {
        FieldReader { r, pos: 0 }
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.r.seek(SeekFrom::Start(pos))?;
        self.pos = pos;
        Ok(())
    }

    fn fill(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        match self.r.read_exact(buf) {
            Ok(()) => {
                self.pos += buf.len() as u64;
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::malformed(
                self.pos,
                format!("stream ended while reading {}", what),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub fn read_int(&mut self, width: usize, what: &str) -> Result<u64> {
        let mut buf = [0_u8; 8];
        self.fill(&mut buf[..width], what)?;
        Ok(decode_int(&buf[..width]))
    }

    pub fn read_bytes(&mut self, n: usize, what: &str) -> Result<Vec<u8>> {
        let mut buf = vec![0; n];
        self.fill(&mut buf, what)?;
        Ok(buf)
    }

    pub fn read_letter_field(&mut self) -> Result<[u8; LETTER_FIELD_LENGTH]> {
        let mut field = [0_u8; LETTER_FIELD_LENGTH];
        self.fill(&mut field, "letter")?;
        Ok(field)
    }
}
