use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum bytes of a config line name.
pub const MAX_NAME_LENGTH: usize = 32;
/// Maximum bytes of a config line uri.
pub const MAX_URI_LENGTH: usize = 200;
/// Size of one stored config slot: two length-prefixed, zero-padded strings.
pub const CONFIG_LINE_SIZE: usize = 4 + MAX_NAME_LENGTH + 4 + MAX_URI_LENGTH;

/// One config slot: the display name and content link of an item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigLine {
    pub name: String,
    pub uri: String,
}

impl ConfigLine {
    /// Build a line, rejecting names or uris the program cannot store.
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Result<Self, TypeError> {
        let line = Self {
            name: name.into(),
            uri: uri.into(),
        };
        line.validate()?;
        Ok(line)
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        if self.name.len() > MAX_NAME_LENGTH {
            return Err(TypeError::NameTooLong {
                len: self.name.len(),
                max: MAX_NAME_LENGTH,
            });
        }
        if self.uri.len() > MAX_URI_LENGTH {
            return Err(TypeError::UriTooLong {
                len: self.uri.len(),
                max: MAX_URI_LENGTH,
            });
        }
        Ok(())
    }

    /// The slot as the program stores it: each string padded with zero
    /// bytes to its maximum length, length prefix set to that maximum.
    pub fn to_slot(&self) -> Result<[u8; CONFIG_LINE_SIZE], TypeError> {
        self.validate()?;
        let mut slot = [0u8; CONFIG_LINE_SIZE];
        slot[..4].copy_from_slice(&(MAX_NAME_LENGTH as u32).to_le_bytes());
        slot[4..4 + self.name.len()].copy_from_slice(self.name.as_bytes());
        let uri_at = 4 + MAX_NAME_LENGTH;
        slot[uri_at..uri_at + 4].copy_from_slice(&(MAX_URI_LENGTH as u32).to_le_bytes());
        slot[uri_at + 4..uri_at + 4 + self.uri.len()].copy_from_slice(self.uri.as_bytes());
        Ok(slot)
    }

    /// Decode a stored slot, trimming the zero padding.
    pub fn from_slot(slot: &[u8]) -> Result<Self, TypeError> {
        if slot.len() < CONFIG_LINE_SIZE {
            return Err(TypeError::InvalidSlot(format!(
                "expected {CONFIG_LINE_SIZE} bytes, got {}",
                slot.len()
            )));
        }
        let (name, rest) = read_padded(slot, MAX_NAME_LENGTH)?;
        let (uri, _) = read_padded(rest, MAX_URI_LENGTH)?;
        Ok(Self { name, uri })
    }

    /// An all-zero slot has never been written.
    pub fn is_blank_slot(slot: &[u8]) -> bool {
        slot.iter().all(|b| *b == 0)
    }
}

fn read_padded(buf: &[u8], max: usize) -> Result<(String, &[u8]), TypeError> {
    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > max {
        return Err(TypeError::InvalidSlot(format!(
            "string length {len} exceeds {max}"
        )));
    }
    let raw = &buf[4..4 + max];
    let text = &raw[..len];
    let end = text.iter().rposition(|b| *b != 0).map_or(0, |p| p + 1);
    let value = std::str::from_utf8(&text[..end])
        .map_err(|e| TypeError::InvalidSlot(e.to_string()))?
        .to_string();
    Ok((value, &buf[4 + max..]))
}
