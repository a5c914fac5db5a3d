//! Block-data framing.
//!
//! Inside a serialized object's custom-write payload, primitive writes are
//! wrapped in length-prefixed `TC_BLOCKDATA` / `TC_BLOCKDATALONG` segments so
//! that a reader can skip a malformed custom payload. Block-data mode is off
//! during structured records (class descriptors, nested object headers,
//! reference handles) and on during the body of a custom write/read method.

use std::io;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use num_traits::FromPrimitive;

use crate::error::{Error, Result};
use crate::TypeCode;

const BLOCK_BUFFER_LEN: usize = 1024;

/// Mode-aware writer wrapping the byte sink of an encoder.
///
/// While block-data mode is on, writes accumulate in a fixed buffer that is
/// flushed as a length-prefixed block when it fills up, when the mode is
/// switched off, or at the end of a custom write. With the mode off, writes
/// pass straight through to the sink.
pub(crate) struct BlockWriter<W> {
    inner: W,
    mode: bool,
    buf: [u8; BLOCK_BUFFER_LEN],
    len: usize,
}

impl<W: io::Write> BlockWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        BlockWriter {
            inner,
            mode: false,
            buf: [0; BLOCK_BUFFER_LEN],
            len: 0,
        }
    }

    pub(crate) fn mode(&self) -> bool {
        self.mode
    }

    pub(crate) fn set_mode_on(&mut self) -> Result<()> {
        if self.mode {
            return Err(Error::WriteAcrossBlock);
        }
        self.mode = true;
        Ok(())
    }

    /// Emit the buffered bytes as one block. A flush with an empty buffer is
    /// a no-op and emits nothing.
    pub(crate) fn flush_block(&mut self) -> io::Result<()> {
        if !self.mode || self.len == 0 {
            return Ok(());
        }
        if self.len <= 0xFF {
            self.inner.write_u8(TypeCode::BlockData as u8)?;
            self.inner.write_u8(self.len as u8)?;
        } else {
            self.inner.write_u8(TypeCode::BlockDataLong as u8)?;
            self.inner.write_i32::<BigEndian>(self.len as i32)?;
        }
        self.inner.write_all(&self.buf[..self.len])?;
        self.len = 0;
        Ok(())
    }

    /// Flush any buffered block and switch block-data mode off.
    pub(crate) fn finish_block(&mut self) -> io::Result<()> {
        self.flush_block()?;
        self.mode = false;
        Ok(())
    }
}

impl<W: io::Write> io::Write for BlockWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.mode {
            self.inner.write_all(buf)?;
            return Ok(buf.len());
        }
        let mut remaining = buf;
        while !remaining.is_empty() {
            if self.len == self.buf.len() {
                self.flush_block()?;
            }
            let n = remaining.len().min(self.buf.len() - self.len);
            self.buf[self.len..self.len + n].copy_from_slice(&remaining[..n]);
            self.len += n;
            remaining = &remaining[n..];
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Mode-aware reader wrapping the byte source of a decoder.
///
/// While block-data mode is on, a read that finds an empty reservoir consumes
/// a block header to refill it; subsequent reads drain the reservoir. A read
/// larger than the remaining reservoir fails instead of spilling into the
/// next record. With the mode off, reads pass straight through.
#[derive(Debug)]
pub(crate) struct BlockReader<R> {
    inner: R,
    mode: bool,
    unread: usize,
}

impl<R: io::Read> BlockReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        BlockReader {
            inner,
            mode: false,
            unread: 0,
        }
    }

    pub(crate) fn mode(&self) -> bool {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, on: bool) {
        self.mode = on;
    }

    pub(crate) fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if !self.mode {
            self.inner.read_exact(buf)?;
            return Ok(());
        }
        if buf.is_empty() {
            return Ok(());
        }
        if self.unread == 0 {
            self.next_block()?;
        }
        if buf.len() > self.unread {
            return Err(Error::ReadAcrossBlock);
        }
        self.inner.read_exact(buf)?;
        self.unread -= buf.len();
        Ok(())
    }

    fn next_block(&mut self) -> Result<()> {
        let code = self.inner.read_u8()?;
        match TypeCode::from_u8(code) {
            Some(TypeCode::BlockData) => {
                self.unread = self.inner.read_u8()? as usize;
            }
            Some(TypeCode::BlockDataLong) => {
                let len = self.inner.read_i32::<BigEndian>()?;
                self.unread = usize::try_from(len).map_err(|_| Error::ReadAcrossBlock)?;
            }
            _ => return Err(Error::InvalidTypeCode(code)),
        }
        Ok(())
    }
}
