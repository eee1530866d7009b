//! Magnet link parsing

use crate::swarm::{InfoHash, SwarmError};

/// Scheme prefix every magnet URI starts with.
pub const MAGNET_PREFIX: &str = "magnet:";

/// Magnet link components.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnetLink {
    pub info_hash: InfoHash,
    pub display_name: Option<String>,
    pub trackers: Vec<String>,
}

/// Magnet link parsing utilities.
pub struct MagnetParser;

impl MagnetParser {
    /// Returns true when `candidate` uses the magnet scheme.
    pub fn is_magnet(candidate: &str) -> bool {
        candidate
            .get(..MAGNET_PREFIX.len())
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case(MAGNET_PREFIX))
    }

    /// Parses a magnet URI carrying a BitTorrent v1 exact topic.
    ///
    /// Both the 40 character hex and the 32 character base32 forms of the
    /// info hash are accepted.
    ///
    /// # Errors
    /// - `SwarmError::InvalidMagnet` - Malformed URI or missing/invalid `xt`
    pub fn parse(uri: &str) -> Result<MagnetLink, SwarmError> {
        if !Self::is_magnet(uri) {
            return Err(invalid(format!("not a magnet URI: {uri}")));
        }

        let magnet = magnet_url::Magnet::new(uri)
            .map_err(|e| invalid(e.to_string()))?;

        let info_hash = Self::extract_info_hash(uri)?;

        Ok(MagnetLink {
            info_hash,
            display_name: magnet.display_name().map(|s| s.to_string()),
            trackers: magnet.trackers().to_vec(),
        })
    }

    fn extract_info_hash(uri: &str) -> Result<InfoHash, SwarmError> {
        let query = uri
            .split_once('?')
            .map(|(_, query)| query)
            .ok_or_else(|| invalid("magnet URI has no parameters"))?;

        url::form_urlencoded::parse(query.as_bytes())
            .filter(|(key, _)| key == "xt")
            .find_map(|(_, topic)| {
                let prefix = topic.get(..9)?;
                prefix
                    .eq_ignore_ascii_case("urn:btih:")
                    .then(|| topic[9..].to_string())
            })
            .ok_or_else(|| invalid("Missing or invalid info hash"))
            .and_then(|hash| Self::decode_hash(&hash))
    }

    fn decode_hash(hash: &str) -> Result<InfoHash, SwarmError> {
        match hash.len() {
            40 => InfoHash::from_hex(hash).map_err(|e| invalid(e.to_string())),
            32 => decode_base32(hash)
                .map(InfoHash::new)
                .ok_or_else(|| invalid(format!("Invalid base32 hash: {hash}"))),
            len => Err(invalid(format!(
                "Invalid hash length: {len} (expected 40 or 32)"
            ))),
        }
    }
}

fn invalid(reason: impl Into<String>) -> SwarmError {
    SwarmError::InvalidMagnet {
        reason: reason.into(),
    }
}

/// RFC 4648 base32 without padding; 32 characters decode to exactly 20 bytes.
fn decode_base32(encoded: &str) -> Option<[u8; 20]> {
    let mut hash = [0u8; 20];
    let mut buffer = 0u64;
    let mut bits = 0u32;
    let mut written = 0;

    for c in encoded.bytes() {
        let value = match c.to_ascii_uppercase() {
            c @ b'A'..=b'Z' => c - b'A',
            c @ b'2'..=b'7' => c - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | u64::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            *hash.get_mut(written)? = (buffer >> bits) as u8;
            written += 1;
        }
    }

    (written == 20).then_some(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnet_link_parsing() {
        let uri = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=Test&tr=http://tracker.example.com/announce";
        let magnet = MagnetParser::parse(uri).unwrap();

        assert_eq!(
            magnet.info_hash.to_string(),
            "0123456789abcdef0123456789abcdef01234567"
        );
        assert_eq!(magnet.display_name.as_deref(), Some("Test"));
        assert_eq!(magnet.trackers, vec!["http://tracker.example.com/announce"]);
    }

    #[test]
    fn test_base32_hash_matches_hex_form() {
        // Same 20 bytes as the hex hash above
        let hex_link = MagnetParser::parse(
            "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567",
        )
        .unwrap();
        let base32_link =
            MagnetParser::parse("magnet:?xt=urn:btih:AERUKZ4JVPG66AJDIVTYTK6N54ASGRLH").unwrap();

        assert_eq!(hex_link.info_hash, base32_link.info_hash);
    }

    #[test]
    fn test_magnet_without_info_hash() {
        let error = MagnetParser::parse("magnet:?dn=Test&tr=http://tracker.example.com/announce")
            .unwrap_err();
        assert!(error.to_string().contains("Missing or invalid info hash"));
    }

    #[test]
    fn test_magnet_with_short_hash() {
        let error = MagnetParser::parse("magnet:?xt=urn:btih:tooshort&dn=Test").unwrap_err();
        assert!(error.to_string().contains("Invalid hash length"));
    }

    #[test]
    fn test_scheme_detection_is_case_insensitive() {
        assert!(MagnetParser::is_magnet("MAGNET:?xt=urn:btih:abc"));
        assert!(!MagnetParser::is_magnet("https://example.com/file.torrent"));
        assert!(!MagnetParser::is_magnet("mag"));
    }
}
