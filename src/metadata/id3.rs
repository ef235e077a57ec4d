//! ID3 tag extractor
//!
//! Reads artist, title and album from ID3v2.2/2.3/2.4 text frames, falling
//! back to an ID3v1 trailer. The filename always comes from the path.

use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::{debug, trace};

use crate::content::FileMetadata;
use crate::metadata::MetadataExtractor;

const ID3V1_LEN: usize = 128;

/// Extractor for MP3 files carrying ID3 tags
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3Extractor;

impl Id3Extractor {
    /// Create a new extractor
    pub fn new() -> Self {
        Self
    }

    /// Parse an ID3v2 tag at the start of `data`
    fn parse_v2(data: &[u8]) -> Result<Vec<(&'static str, String)>> {
        if data.len() < 10 || &data[..3] != b"ID3" {
            return Err(anyhow!("No ID3v2 header"));
        }

        let major = data[3];
        let flags = data[5];
        let tag_size = syncsafe(&data[6..10]) as usize;
        let end = (10 + tag_size).min(data.len());
        trace!("ID3v2.{} tag, {} bytes, flags {:#04x}", major, tag_size, flags);

        let (id_len, header_len) = match major {
            2 => (3, 6),
            3 | 4 => (4, 10),
            other => return Err(anyhow!("Unsupported ID3v2 version {}", other)),
        };

        let mut idx = 10;
        if flags & 0x40 != 0 && major >= 3 {
            if data.len() < idx + 4 {
                return Err(anyhow!("Truncated extended header"));
            }
            let ext_size = if major == 4 {
                syncsafe(&data[idx..idx + 4]) as usize
            } else {
                u32::from_be_bytes([data[idx], data[idx + 1], data[idx + 2], data[idx + 3]]) as usize + 4
            };
            idx += ext_size;
        }

        let mut fields = Vec::new();
        while idx + header_len <= end {
            let id = &data[idx..idx + id_len];
            if id[0] == 0 {
                // Padding
                break;
            }

            let size = match major {
                2 => u32::from_be_bytes([0, data[idx + 3], data[idx + 4], data[idx + 5]]) as usize,
                3 => u32::from_be_bytes([data[idx + 4], data[idx + 5], data[idx + 6], data[idx + 7]]) as usize,
                _ => syncsafe(&data[idx + 4..idx + 8]) as usize,
            };
            let body_start = idx + header_len;
            let body_end = body_start + size;
            if size == 0 || body_end > end {
                break;
            }

            let field = match id {
                b"TPE1" | b"TP1" => Some("artist"),
                b"TIT2" | b"TT2" => Some("title"),
                b"TALB" | b"TAL" => Some("album"),
                _ => None,
            };
            if let Some(field) = field {
                let value = decode_text_frame(&data[body_start..body_end]);
                if !value.is_empty() {
                    fields.push((field, value));
                }
            }

            idx = body_end;
        }

        Ok(fields)
    }

    /// Parse an ID3v1 trailer at the end of `data`
    fn parse_v1(data: &[u8]) -> Result<Vec<(&'static str, String)>> {
        if data.len() < ID3V1_LEN {
            return Err(anyhow!("File too short for ID3v1"));
        }
        let tag = &data[data.len() - ID3V1_LEN..];
        if &tag[..3] != b"TAG" {
            return Err(anyhow!("No ID3v1 trailer"));
        }

        let fields = [("title", &tag[3..33]), ("artist", &tag[33..63]), ("album", &tag[63..93])]
            .into_iter()
            .map(|(field, raw)| (field, latin1(trim_nulls(raw)).trim().to_string()))
            .filter(|(_, value)| !value.is_empty())
            .collect();
        Ok(fields)
    }
}

impl MetadataExtractor for Id3Extractor {
    fn extract(&self, path: &Path, data: &[u8]) -> Result<FileMetadata> {
        let mut metadata = FileMetadata::new();
        if let Some(name) = path.file_name() {
            metadata.insert("filename", name.to_string_lossy().to_string());
        }

        let v2 = Self::parse_v2(data).unwrap_or_else(|e| {
            trace!("{}: {}", path.display(), e);
            Vec::new()
        });
        let v1 = Self::parse_v1(data).unwrap_or_else(|e| {
            trace!("{}: {}", path.display(), e);
            Vec::new()
        });

        if v2.is_empty() && v1.is_empty() {
            debug!("No ID3 tags found in {}", path.display());
        }

        for (field, value) in v2.into_iter().chain(v1) {
            if metadata.get(field).is_none() {
                metadata.insert(field, value);
            }
        }

        Ok(metadata)
    }
}

fn syncsafe(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 7) | (*b as u32 & 0x7f))
}

fn trim_nulls(raw: &[u8]) -> &[u8] {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    &raw[..end]
}

fn latin1(raw: &[u8]) -> String {
    raw.iter().map(|&b| b as char).collect()
}

fn utf16(raw: &[u8], big_endian: bool) -> String {
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| {
            if big_endian {
                u16::from_be_bytes([pair[0], pair[1]])
            } else {
                u16::from_le_bytes([pair[0], pair[1]])
            }
        })
        .take_while(|&unit| unit != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Decode the body of a text frame, keeping only the first value
fn decode_text_frame(body: &[u8]) -> String {
    let (encoding, text) = match body.split_first() {
        Some((encoding, text)) => (*encoding, text),
        None => return String::new(),
    };

    let value = match encoding {
        0 => latin1(trim_nulls(text)),
        1 => match text {
            [0xff, 0xfe, rest @ ..] => utf16(rest, false),
            [0xfe, 0xff, rest @ ..] => utf16(rest, true),
            _ => utf16(text, false),
        },
        2 => utf16(text, true),
        3 => String::from_utf8_lossy(trim_nulls(text)).to_string(),
        _ => String::new(),
    };
    value.trim().to_string()
}
