//! Shard text encodings.
//!
//! A shard's encoding is configurable per device (`spec.md` §6). UTF-8 is
//! the default; a Latin-1 encoding is offered for the float codec (C12) to
//! mirror `taransaydb`'s accelerated numeric I/O path, where cells never
//! contain anything outside the Latin-1 range.

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Utf8,
    Latin1,
}

impl Encoding {
    pub fn decode(&self, bytes: &[u8]) -> Result<String, Error> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::Usage(format!("invalid UTF-8 in shard line: {e}"))),
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>, Error> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Latin1 => text
                .chars()
                .map(|c| {
                    u32::from(c)
                        .try_into()
                        .ok()
                        .filter(|&b: &u8| b <= 0xFF)
                        .ok_or_else(|| {
                            Error::Usage(format!("character {c:?} is not representable in Latin-1"))
                        })
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_round_trips_full_byte_range() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let text = Encoding::Latin1.decode(&bytes).unwrap();
        assert_eq!(Encoding::Latin1.encode(&text).unwrap(), bytes);
    }

    #[test]
    fn utf8_rejects_non_utf8_bytes() {
        let bytes = vec![0xFF, 0xFE];
        assert!(Encoding::Utf8.decode(&bytes).is_err());
    }
}
