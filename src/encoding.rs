//! Big-endian wire primitives shared by the grid block, measurement block and index file.
//!
//! Writers go through any `io::Write`; readers walk a borrowed slice and turn every
//! out-of-bounds access into [`IndexError::Corruption`] instead of panicking.

use crate::error::IndexError;
use std::io::{self, Write};

// --- Writing ---

/// `io::Write` adapter that counts bytes written through it.
#[derive(Debug)]
pub struct CountingWriter<W> {
    inner: W,
    n: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, n: 0 }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.n
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let nn = self.inner.write(buf)?;
        self.n += nn as u64;
        Ok(nn)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

pub fn write_var_u64<W: Write>(w: &mut W, mut v: u64) -> io::Result<()> {
    let mut buf = [0u8; 10];
    let mut i = 0;
    while v >= 0x80 {
        buf[i] = (v as u8) | 0x80;
        v >>= 7;
        i += 1;
    }
    buf[i] = v as u8;
    w.write_all(&buf[..=i])
}

/// Writes `bytes` preceded by its length as a fixed-width u64.
pub fn write_u64_prefixed<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_u64(w, bytes.len() as u64)?;
    w.write_all(bytes)
}

/// Writes `bytes` preceded by its length as a uvarint.
pub fn write_var_prefixed<W: Write>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    write_var_u64(w, bytes.len() as u64)?;
    w.write_all(bytes)
}

// --- Reading ---

/// Bounds-checked cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: u64) -> Result<&'a [u8], IndexError> {
        let len = usize::try_from(len)
            .ok()
            .filter(|l| *l <= self.remaining())
            .ok_or_else(|| {
                IndexError::corruption(format!(
                    "Truncated field at byte {}: need {} bytes, have {}",
                    self.pos,
                    len,
                    self.remaining()
                ))
            })?;
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], IndexError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N as u64)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, IndexError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, IndexError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, IndexError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_var_u64(&mut self) -> Result<u64, IndexError> {
        let mut out: u64 = 0;
        let mut shift: u32 = 0;
        for _ in 0..10 {
            let byte = self.read_u8()?;
            out |= ((byte & 0x7F) as u64) << shift;
            if (byte & 0x80) == 0 {
                return Ok(out);
            }
            shift += 7;
        }
        Err(IndexError::corruption(format!(
            "Varint too long at byte {}",
            self.pos
        )))
    }

    pub fn read_u64_prefixed(&mut self) -> Result<&'a [u8], IndexError> {
        let len = self.read_u64()?;
        self.read_bytes(len)
    }

    pub fn read_var_prefixed(&mut self) -> Result<&'a [u8], IndexError> {
        let len = self.read_var_u64()?;
        self.read_bytes(len)
    }

    pub fn read_string_u64_prefixed(&mut self) -> Result<String, IndexError> {
        utf8(self.read_u64_prefixed()?)
    }
}

pub(crate) fn utf8(bytes: &[u8]) -> Result<String, IndexError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| IndexError::corruption(format!("Invalid UTF-8 string: {}", e)))
}

// --- Ranges ---

/// A byte range `[offset, offset + size)` inside a larger buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockRange {
    pub offset: u64,
    pub size: u64,
}

impl BlockRange {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }

    /// Borrows this range out of `buf`, failing if it does not fit.
    pub fn slice<'a>(&self, buf: &'a [u8]) -> Result<&'a [u8], IndexError> {
        let (start, end) = self.bounds(buf.len())?;
        Ok(&buf[start..end])
    }

    /// `(start, end)` as `usize` if the range fits in a buffer of `len` bytes.
    pub fn bounds(&self, len: usize) -> Result<(usize, usize), IndexError> {
        self.end()
            .filter(|end| *end <= len as u64)
            .map(|end| (self.offset as usize, end as usize))
            .ok_or_else(|| {
                IndexError::corruption(format!(
                    "Range {}+{} exceeds buffer of {} bytes",
                    self.offset, self.size, len
                ))
            })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_u64(w, self.offset)?;
        write_u64(w, self.size)
    }

    pub fn read_from(r: &mut SliceReader<'_>) -> Result<Self, IndexError> {
        Ok(Self {
            offset: r.read_u64()?,
            size: r.read_u64()?,
        })
    }
}
