//! Persisted record formats.
//!
//! Records are written either as diffable text or as a compact binary blob;
//! readers tell the two apart by the binary magic so either can be loaded
//! whatever the current configuration says.

mod binary;
mod text;

use crate::error::{ErrorKind, Result};
use crate::file::DepFile;
use crate::record::DepRule;
use databuild_hash::HashMethod;
use exn::OptionExt;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    #[default]
    Text,
    Binary,
}

/// Serialize any number of records into one blob.
pub fn encode(files: &[DepFile], format: RecordFormat) -> Vec<u8> {
    match format {
        RecordFormat::Text => text::write(files).into_bytes(),
        RecordFormat::Binary => binary::write(files),
    }
}

/// Read every record in a blob.
///
/// Binary blobs are all or nothing. Text is read record by record: a
/// malformed record stops reading, but the ones before it are kept (and the
/// problem logged) unless there weren't any.
pub fn decode(bytes: &[u8]) -> Result<Vec<DepFile>> {
    if binary::is_binary(bytes) {
        return binary::read(bytes);
    }
    let text = std::str::from_utf8(bytes).map_err(|_| ErrorKind::malformed("text record is not valid UTF-8"))?;
    text::read_all(text)
}

/// Read a blob that's supposed to hold exactly one record (extra ones are
/// ignored).
pub fn decode_single(bytes: &[u8]) -> Result<DepFile> {
    decode(bytes)?.into_iter().next().ok_or_raise(|| ErrorKind::malformed("no record found"))
}

fn method_token(method: HashMethod) -> &'static str {
    match method {
        HashMethod::Timestamp => "TIMESTAMP",
        HashMethod::ContentHash => "HASH",
    }
}

fn parse_method(token: &str) -> Option<HashMethod> {
    match token.trim().to_ascii_uppercase().as_str() {
        "TIMESTAMP" => Some(HashMethod::Timestamp),
        // MD5 is what older records call a content hash.
        "HASH" | "MD5" | "CONTENT_HASH" => Some(HashMethod::ContentHash),
        _ => None,
    }
}

fn rule_token(rule: DepRule) -> &'static str {
    match rule {
        DepRule::OnChange => "ON_CHANGE",
        DepRule::MustExist => "MUST_EXIST",
    }
}

fn parse_rule(token: &str) -> Option<DepRule> {
    match token.trim().to_ascii_uppercase().as_str() {
        "ON_CHANGE" => Some(DepRule::OnChange),
        "MUST_EXIST" => Some(DepRule::MustExist),
        _ => None,
    }
}
