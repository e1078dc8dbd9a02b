//! Fixed-width fields in a configurable byte order.

use crate::config::Endian;
use crate::error::{ErrorKind, Result};

pub(crate) struct ByteWriter {
    buf: Vec<u8>,
    endian: Endian,
}
impl ByteWriter {
    pub(crate) fn new(endian: Endian) -> Self {
        Self { buf: Vec::new(), endian }
    }

    pub(crate) fn u32(&mut self, value: u32) {
        match self.endian {
            Endian::Little => self.buf.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => self.buf.extend_from_slice(&value.to_be_bytes()),
        }
    }

    pub(crate) fn u64(&mut self, value: u64) {
        match self.endian {
            Endian::Little => self.buf.extend_from_slice(&value.to_le_bytes()),
            Endian::Big => self.buf.extend_from_slice(&value.to_be_bytes()),
        }
    }

    /// Lengths and indices are stored as `u32`.
    pub(crate) fn len(&mut self, value: usize) -> Result<()> {
        let Ok(field) = u32::try_from(value) else {
            exn::bail!(ErrorKind::malformed(format!("{value} does not fit a 32-bit field")));
        };
        self.u32(field);
        Ok(())
    }

    pub(crate) fn bytes(&mut self, value: &[u8]) {
        self.buf.extend_from_slice(value);
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

pub(crate) struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
    what: &'static str,
}
impl<'a> ByteReader<'a> {
    pub(crate) fn new(data: &'a [u8], endian: Endian, what: &'static str) -> Self {
        Self { data, pos: 0, endian, what }
    }

    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            exn::bail!(ErrorKind::malformed(format!("{} ends early at byte {}", self.what, self.pos)));
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes(bytes),
            Endian::Big => u32::from_be_bytes(bytes),
        })
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(match self.endian {
            Endian::Little => u64::from_le_bytes(bytes),
            Endian::Big => u64::from_be_bytes(bytes),
        })
    }

    pub(crate) fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub(crate) fn finish(&self) -> Result<()> {
        if self.pos != self.data.len() {
            exn::bail!(ErrorKind::malformed(format!("trailing bytes after {}", self.what)));
        }
        Ok(())
    }
}
