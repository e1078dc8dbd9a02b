//! Compact binary records.
//!
//! Layout (little-endian):
//!
//! | field        | size                                     |
//! |--------------|------------------------------------------|
//! | magic        | 8 (`DBDEPEND`)                           |
//! | record count | 4                                        |
//! | records      | variable                                 |
//! | CRC-32       | 4, over everything before it             |
//!
//! A record is its main entry, the user key, then the input and output
//! entries each preceded by a `u32` count. An entry is the filename and
//! folder (`u32` length + UTF-8 each), a method byte, a rule byte and the
//! 16-byte digest. A torn or corrupted write fails the checksum and the whole
//! blob is rejected.

use crate::error::{ErrorKind, Result};
use crate::file::DepFile;
use crate::record::{DepRecord, DepRule};
use databuild_hash::{Digest, HashMethod};
use std::path::PathBuf;

const MAGIC: [u8; 8] = *b"DBDEPEND";
const CRC_SIZE: usize = 4;

pub(super) fn is_binary(bytes: &[u8]) -> bool {
    bytes.starts_with(&MAGIC)
}

pub(super) fn write(files: &[DepFile]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 * files.len() + MAGIC.len() + 8);
    buf.extend_from_slice(&MAGIC);
    put_u32(&mut buf, files.len());
    for file in files {
        put_entry(&mut buf, file.main());
        put_str(&mut buf, file.user_key());
        for records in [file.inputs(), file.outputs()] {
            put_u32(&mut buf, records.len());
            records.iter().for_each(|record| put_entry(&mut buf, record));
        }
    }
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

fn put_u32(buf: &mut Vec<u8>, value: usize) {
    // Nothing tracked comes close to 4 billion of anything.
    buf.extend_from_slice(&u32::try_from(value).unwrap_or(u32::MAX).to_le_bytes());
}

fn put_str(buf: &mut Vec<u8>, value: &str) {
    put_u32(buf, value.len());
    buf.extend_from_slice(value.as_bytes());
}

fn put_entry(buf: &mut Vec<u8>, record: &DepRecord) {
    put_str(buf, record.filename());
    put_str(buf, &record.folder().to_string_lossy());
    buf.push(match record.method() {
        HashMethod::Timestamp => 0,
        HashMethod::ContentHash => 1,
    });
    buf.push(match record.rule() {
        DepRule::OnChange => 0,
        DepRule::MustExist => 1,
    });
    buf.extend_from_slice(record.hash().as_bytes());
}

pub(super) fn read(bytes: &[u8]) -> Result<Vec<DepFile>> {
    if bytes.len() < MAGIC.len() + 4 + CRC_SIZE {
        exn::bail!(ErrorKind::malformed("binary record is truncated"));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - CRC_SIZE);
    let mut expected = [0; CRC_SIZE];
    expected.copy_from_slice(trailer);
    if crc32fast::hash(body) != u32::from_le_bytes(expected) {
        exn::bail!(ErrorKind::malformed("binary record checksum mismatch"));
    }
    let mut reader = Reader { data: body, pos: MAGIC.len() };
    let count = reader.u32()?;
    let mut files = Vec::new();
    for _ in 0..count {
        let mut file = DepFile::from_main(reader.entry()?);
        file.set_user_key(reader.str()?);
        for _ in 0..reader.u32()? {
            file.push_in(reader.entry()?);
        }
        for _ in 0..reader.u32()? {
            file.push_out(reader.entry()?);
        }
        files.push(file);
    }
    if reader.pos != body.len() {
        exn::bail!(ErrorKind::malformed("trailing bytes after binary records"));
    }
    Ok(files)
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}
impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            exn::bail!(ErrorKind::malformed(format!("binary record ends early at byte {}", self.pos)));
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let mut bytes = [0; 4];
        bytes.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(bytes))
    }

    fn str(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        match std::str::from_utf8(bytes) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => exn::bail!(ErrorKind::malformed("binary record string is not valid UTF-8")),
        }
    }

    fn entry(&mut self) -> Result<DepRecord> {
        let filename = self.str()?;
        let folder = PathBuf::from(self.str()?);
        let method = match self.u8()? {
            0 => HashMethod::Timestamp,
            1 => HashMethod::ContentHash,
            other => exn::bail!(ErrorKind::malformed(format!("unknown method {other}"))),
        };
        let rule = match self.u8()? {
            0 => DepRule::OnChange,
            1 => DepRule::MustExist,
            other => exn::bail!(ErrorKind::malformed(format!("unknown rule {other}"))),
        };
        let mut hash = [0; Digest::LEN];
        hash.copy_from_slice(self.take(Digest::LEN)?);
        Ok(DepRecord::new(filename, folder)
            .with_method(method)
            .with_rule(rule)
            .with_hash(Digest::from_bytes(hash)))
    }
}
