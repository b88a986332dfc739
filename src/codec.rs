//! Content-hash coercion.
//!
//! Blob listings report `Content-MD5` either as raw bytes or as base64 text,
//! depending on the client. Both are rendered as lowercase hex so that natural
//! keys built from them compare equal.

use base64::Engine as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentHash {
    Bytes(Vec<u8>),
    Base64(String),
}

pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

impl ContentHash {
    /// Lowercase hex of the hash bytes.
    ///
    /// Base64 text that does not decode is passed through lowercased, so a
    /// malformed header still yields a stable key.
    pub fn to_hex(&self) -> String {
        match self {
            Self::Bytes(bytes) => to_hex(bytes),
            Self::Base64(text) => match base64::engine::general_purpose::STANDARD.decode(text) {
                Ok(bytes) => to_hex(&bytes),
                Err(_) => text.to_lowercase(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_and_base64_agree() {
        let raw = vec![0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04];
        let b64 = base64::engine::general_purpose::STANDARD.encode(&raw);
        assert_eq!(ContentHash::Bytes(raw).to_hex(), "d41d8cd98f00b204");
        assert_eq!(ContentHash::Base64(b64).to_hex(), "d41d8cd98f00b204");
    }

    #[test]
    fn hex_is_lowercase() {
        assert_eq!(to_hex(&[0xde, 0xad, 0x0b]), "dead0b");
    }

    #[test]
    fn known_md5_header() {
        // Content-MD5 of an empty body.
        assert_eq!(
            ContentHash::Base64("1B2M2Y8AsgTpgAmY7PhCfg==".into()).to_hex(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn undecodable_passes_through() {
        assert_eq!(ContentHash::Base64("NOT*B64".into()).to_hex(), "not*b64");
    }
}
