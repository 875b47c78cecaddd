use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ScanError;

const SCHEMA: &str = "image_payload";

/// A single still image as `data:<mimetype>;base64,<bytes>`.
///
/// Only constructed through validation, so holding one means the prefix, MIME type and
/// base64 body have all been checked.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    raw: String,
    mime_end: usize,
    data_start: usize,
}

impl ImagePayload {
    pub fn parse(raw: &str) -> Result<Self, ScanError> {
        if raw.is_empty() {
            return Err(ScanError::schema(SCHEMA, "image data URI is empty"));
        }
        let Some(rest) = raw.strip_prefix("data:") else {
            return Err(ScanError::schema(SCHEMA, "image data URI must start with 'data:'"));
        };
        let Some((header, body)) = rest.split_once(',') else {
            return Err(ScanError::schema(SCHEMA, "image data URI has no ',' separator"));
        };
        let Some(mime) = header.strip_suffix(";base64") else {
            return Err(ScanError::schema(
                SCHEMA,
                "image data URI must declare ';base64' encoding",
            ));
        };
        if !is_valid_mime(mime) {
            return Err(ScanError::schema(
                SCHEMA,
                format!("'{mime}' is not a valid MIME type"),
            ));
        }
        if body.is_empty() {
            return Err(ScanError::schema(SCHEMA, "image data URI body is empty"));
        }
        BASE64
            .decode(body.as_bytes())
            .map_err(|err| ScanError::schema(SCHEMA, format!("invalid base64 body: {err}")))?;

        let mime_end = "data:".len() + mime.len();
        Ok(Self {
            raw: raw.to_string(),
            mime_end,
            data_start: mime_end + ";base64,".len(),
        })
    }

    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Result<Self, ScanError> {
        Self::parse(&format!("data:{mime};base64,{}", BASE64.encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn mime_type(&self) -> &str {
        &self.raw["data:".len()..self.mime_end]
    }

    /// The base64 body, without the `data:` header.
    pub fn data(&self) -> &str {
        &self.raw[self.data_start..]
    }

    pub fn decode(&self) -> Vec<u8> {
        // The body was decoded once during validation.
        BASE64.decode(self.data().as_bytes()).unwrap_or_default()
    }

    pub fn into_string(self) -> String {
        self.raw
    }
}

fn is_valid_mime(mime: &str) -> bool {
    let Some((kind, subtype)) = mime.split_once('/') else {
        return false;
    };
    is_mime_token(kind) && is_mime_token(subtype)
}

fn is_mime_token(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || "!#$&-^_.+".contains(ch))
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type())
            .field("data_len", &self.data().len())
            .finish()
    }
}

impl Serialize for ImagePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ImagePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::ImagePayload;

    #[test]
    fn accepts_well_formed_data_uris() -> anyhow::Result<()> {
        let payload = ImagePayload::parse("data:image/jpeg;base64,AAAA")?;
        assert_eq!(payload.mime_type(), "image/jpeg");
        assert_eq!(payload.data(), "AAAA");
        assert_eq!(payload.decode(), vec![0, 0, 0]);

        let png = ImagePayload::parse("data:image/svg+xml;base64,PHN2Zz4=")?;
        assert_eq!(png.mime_type(), "image/svg+xml");
        Ok(())
    }

    #[test]
    fn rejects_malformed_data_uris() {
        for raw in [
            "",
            "AAAA",
            "data:image/jpeg;base64,",
            "data:image/jpeg,AAAA",
            "data:;base64,AAAA",
            "data:image;base64,AAAA",
            "data:image/;base64,AAAA",
            "data:image/jpeg;base64,not base64!",
            "image/jpeg;base64,AAAA",
        ] {
            assert!(ImagePayload::parse(raw).is_err(), "accepted {raw:?}");
        }
    }

    #[test]
    fn from_bytes_round_trips_the_body() -> anyhow::Result<()> {
        let payload = ImagePayload::from_bytes("image/png", b"\x89PNG")?;
        assert!(payload.as_str().starts_with("data:image/png;base64,"));
        assert_eq!(payload.decode(), b"\x89PNG".to_vec());
        Ok(())
    }

    #[test]
    fn debug_output_omits_the_body() -> anyhow::Result<()> {
        let payload = ImagePayload::parse("data:image/jpeg;base64,AAAA")?;
        let rendered = format!("{payload:?}");
        assert!(rendered.contains("image/jpeg"));
        assert!(!rendered.contains("AAAA"));
        Ok(())
    }
}
