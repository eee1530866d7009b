//! Bencoded metainfo decoding and info hash calculation

use sha1::{Digest, Sha1};

use crate::swarm::{InfoHash, SwarmError};

type BencodeDict<'a> = std::collections::HashMap<&'a [u8], bencode_rs::Value<'a>>;
type ParseResult<T> = Result<T, SwarmError>;

/// Complete metadata extracted from a metainfo document.
#[derive(Debug, Clone, PartialEq)]
pub struct Metainfo {
    pub info_hash: InfoHash,
    pub name: String,
    pub piece_length: u32,
    pub piece_hashes: Vec<[u8; 20]>,
    pub total_length: u64,
    pub files: Vec<MetainfoFile>,
    /// Primary announce URL followed by every announce-list tier, in order
    pub announce_urls: Vec<String>,
}

/// Individual file within a metainfo document.
///
/// Single-file documents yield one entry whose path is the document name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetainfoFile {
    pub path: Vec<String>,
    pub length: u64,
}

impl MetainfoFile {
    /// Path components joined with `/`.
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }
}

/// Bencode decoding for metainfo documents.
pub struct MetainfoParser;

impl MetainfoParser {
    /// Parses a bencoded metainfo document.
    ///
    /// # Errors
    ///
    /// - `SwarmError::InvalidMetainfo` - Malformed bencode or missing fields
    pub fn parse(data: &[u8]) -> ParseResult<Metainfo> {
        let parsed = bencode_rs::Value::parse(data).map_err(|e| invalid(format!(
            "Bencode parsing failed: {e:?}"
        )))?;

        let Some(bencode_rs::Value::Dictionary(dict)) = parsed.first() else {
            return Err(invalid("Root element must be dictionary"));
        };

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or_else(|| invalid("Missing 'info' field"))?;
        let bencode_rs::Value::Dictionary(info) = info_value else {
            return Err(invalid("Info field must be dictionary"));
        };

        let info_hash = Self::calculate_info_hash(data)?;
        let name = Self::extract_string(info, b"name")?;

        let piece_length = Self::extract_integer(info, b"piece length")?;
        let piece_length =
            u32::try_from(piece_length).map_err(|_| invalid("Invalid piece length"))?;

        let pieces = Self::extract_bytes(info, b"pieces")?;
        if pieces.len() % 20 != 0 {
            return Err(invalid("Invalid pieces length"));
        }
        let piece_hashes = pieces
            .chunks_exact(20)
            .map(|chunk| {
                let mut hash = [0u8; 20];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();

        let files = match (info.get(b"length".as_slice()), info.get(b"files".as_slice())) {
            (Some(bencode_rs::Value::Integer(length)), _) => vec![MetainfoFile {
                path: vec![name.clone()],
                length: non_negative(*length)?,
            }],
            (None, Some(bencode_rs::Value::List(entries))) => Self::extract_files(entries)?,
            (None, None) => return Err(invalid("Missing 'files' or 'length' field")),
            _ => return Err(invalid("Invalid files structure")),
        };
        let total_length = files.iter().map(|file| file.length).sum();

        Ok(Metainfo {
            info_hash,
            name,
            piece_length,
            piece_hashes,
            total_length,
            files,
            announce_urls: Self::extract_announce_urls(dict),
        })
    }

    /// SHA-1 of the raw bytes of the top-level `info` value.
    fn calculate_info_hash(data: &[u8]) -> ParseResult<InfoHash> {
        let (start, end) = Self::find_info_span(data)?;

        let digest = Sha1::digest(&data[start..end]);
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&digest);
        Ok(InfoHash::new(hash))
    }

    /// Walks the root dictionary's keys to find where `info` starts and ends.
    ///
    /// A nested key named `info` or a string containing `4:info` never matches
    /// because only root-level keys are compared.
    pub fn find_info_span(data: &[u8]) -> ParseResult<(usize, usize)> {
        if data.first() != Some(&b'd') {
            return Err(invalid("Expected dictionary start"));
        }

        let mut pos = 1;
        while pos < data.len() && data[pos] != b'e' {
            let (key, value_start) = read_string(data, pos)?;
            let value_end = bencode_value_end(data, value_start)?;
            if key == b"info" {
                return Ok((value_start, value_end));
            }
            pos = value_end;
        }

        Err(invalid("Could not find info dictionary in data"))
    }

    fn extract_files(entries: &[bencode_rs::Value<'_>]) -> ParseResult<Vec<MetainfoFile>> {
        let mut files = Vec::with_capacity(entries.len());

        for entry in entries {
            let bencode_rs::Value::Dictionary(file_dict) = entry else {
                return Err(invalid("Invalid file entry type"));
            };
            let length = non_negative(Self::extract_integer(file_dict, b"length")?)?;

            let Some(bencode_rs::Value::List(components)) = file_dict.get(b"path".as_slice())
            else {
                return Err(invalid("Missing or invalid path in file"));
            };

            let mut path = Vec::with_capacity(components.len());
            for component in components {
                let bencode_rs::Value::Bytes(bytes) = component else {
                    return Err(invalid("Invalid path component type"));
                };
                let component = String::from_utf8(bytes.to_vec())
                    .map_err(|_| invalid("Invalid UTF-8 in file path"))?;
                path.push(component);
            }
            if path.is_empty() {
                return Err(invalid("Empty file path"));
            }

            files.push(MetainfoFile { path, length });
        }

        if files.is_empty() {
            return Err(invalid("Metainfo lists no files"));
        }
        Ok(files)
    }

    fn extract_announce_urls(dict: &BencodeDict<'_>) -> Vec<String> {
        let mut urls = Vec::new();

        if let Ok(announce) = Self::extract_string(dict, b"announce") {
            urls.push(announce);
        }

        if let Some(bencode_rs::Value::List(tiers)) = dict.get(b"announce-list".as_slice()) {
            for tier in tiers {
                let bencode_rs::Value::List(tier_urls) = tier else {
                    continue;
                };
                for url_value in tier_urls {
                    if let bencode_rs::Value::Bytes(bytes) = url_value
                        && let Ok(url) = String::from_utf8(bytes.to_vec())
                        && !urls.contains(&url)
                    {
                        urls.push(url);
                    }
                }
            }
        }

        urls
    }

    fn extract_string(dict: &BencodeDict<'_>, key: &[u8]) -> ParseResult<String> {
        let bytes = Self::extract_bytes(dict, key)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| {
            invalid(format!(
                "Invalid UTF-8 in field: {:?}",
                String::from_utf8_lossy(key)
            ))
        })
    }

    fn extract_bytes<'a>(dict: &'a BencodeDict<'_>, key: &[u8]) -> ParseResult<&'a [u8]> {
        match dict.get(key) {
            Some(bencode_rs::Value::Bytes(bytes)) => Ok(bytes),
            _ => Err(invalid(format!(
                "Missing or invalid field: {:?}",
                String::from_utf8_lossy(key)
            ))),
        }
    }

    fn extract_integer(dict: &BencodeDict<'_>, key: &[u8]) -> ParseResult<i64> {
        match dict.get(key) {
            Some(bencode_rs::Value::Integer(value)) => Ok(*value),
            _ => Err(invalid(format!(
                "Missing or invalid integer field: {:?}",
                String::from_utf8_lossy(key)
            ))),
        }
    }
}

fn invalid(reason: impl Into<String>) -> SwarmError {
    SwarmError::InvalidMetainfo {
        reason: reason.into(),
    }
}

fn non_negative(value: i64) -> ParseResult<u64> {
    u64::try_from(value).map_err(|_| invalid(format!("Negative length: {value}")))
}

/// Reads a `<len>:<bytes>` string at `pos`, returning it and the offset after it.
fn read_string(data: &[u8], pos: usize) -> ParseResult<(&[u8], usize)> {
    let colon = data[pos..]
        .iter()
        .position(|&b| b == b':')
        .map(|offset| pos + offset)
        .ok_or_else(|| invalid("Invalid string format"))?;

    let length: usize = std::str::from_utf8(&data[pos..colon])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| invalid("Invalid string length"))?;

    let start = colon + 1;
    let end = start
        .checked_add(length)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| invalid("String runs past end of data"))?;

    Ok((&data[start..end], end))
}

/// Offset one past the end of the bencode value starting at `pos`.
fn bencode_value_end(data: &[u8], pos: usize) -> ParseResult<usize> {
    match data.get(pos) {
        Some(b'i') => data[pos..]
            .iter()
            .position(|&b| b == b'e')
            .map(|offset| pos + offset + 1)
            .ok_or_else(|| invalid("Unterminated integer")),
        Some(b'0'..=b'9') => read_string(data, pos).map(|(_, end)| end),
        Some(b'l') | Some(b'd') => {
            let mut cursor = pos + 1;
            loop {
                match data.get(cursor) {
                    Some(b'e') => return Ok(cursor + 1),
                    Some(_) => cursor = bencode_value_end(data, cursor)?,
                    None => return Err(invalid("Incomplete bencode container")),
                }
            }
        }
        _ => Err(invalid("Invalid bencode character")),
    }
}
