//! Metainfo creation from simulated or local content
//!
//! Splits content into pieces, hashes them and bencodes a document that
//! [`MetainfoParser`] accepts, so seeded content behaves like any other
//! torrent once registered.

use std::path::Path;

use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;
use undertow_core::swarm::{InfoHash, Metainfo, MetainfoParser, SwarmError};

use crate::content::FileSource;

/// Standard BitTorrent piece size (256KB)
pub const DEFAULT_PIECE_LENGTH: u32 = 262_144;

/// A bencoded document plus the content it describes.
#[derive(Debug, Clone)]
pub struct BuiltMetainfo {
    pub bytes: Vec<u8>,
    pub metainfo: Metainfo,
    pub sources: Vec<FileSource>,
}

impl BuiltMetainfo {
    pub fn info_hash(&self) -> InfoHash {
        self.metainfo.info_hash
    }

    /// Magnet URI carrying the info hash and display name.
    pub fn magnet_uri(&self) -> String {
        format!(
            "magnet:?xt=urn:btih:{}&dn={}",
            self.metainfo.info_hash,
            urlencoding::encode(&self.metainfo.name)
        )
    }
}

/// Builds metainfo documents for simulated swarms.
#[derive(Debug, Clone)]
pub struct MetainfoBuilder {
    name: String,
    piece_length: u32,
    announce: Vec<String>,
    files: Vec<(Vec<String>, FileSource)>,
}

impl MetainfoBuilder {
    /// Starts a document named `name`. With a single top-level file the
    /// document is written in single-file form under that file's name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            piece_length: DEFAULT_PIECE_LENGTH,
            announce: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn piece_length(mut self, piece_length: u32) -> Self {
        self.piece_length = piece_length.max(1);
        self
    }

    pub fn announce(mut self, url: impl Into<String>) -> Self {
        self.announce.push(url.into());
        self
    }

    /// Adds a file at `path` (components separated by `/`).
    pub fn file(mut self, path: &str, source: FileSource) -> Self {
        let components = path
            .split('/')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        self.files.push((components, source));
        self
    }

    /// Adds a file of generated content.
    pub fn pattern_file(self, path: &str, length: u64) -> Self {
        self.file(path, FileSource::Pattern { length })
    }

    /// Describes a single local file.
    ///
    /// # Errors
    /// - `SwarmError::Io` - File metadata could not be read
    /// - `SwarmError::InvalidMetainfo` - Path has no usable file name
    pub async fn from_local_file(path: &Path) -> Result<Self, SwarmError> {
        let length = tokio::fs::metadata(path).await?.len();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| SwarmError::InvalidMetainfo {
                reason: format!("Invalid filename: {}", path.display()),
            })?
            .to_string();

        Ok(Self::new(name.clone()).file(
            &name,
            FileSource::Disk {
                path: path.to_path_buf(),
                length,
            },
        ))
    }

    /// Hashes every piece and encodes the document.
    ///
    /// # Errors
    /// - `SwarmError::InvalidMetainfo` - No files were added
    /// - `SwarmError::Io` - Content could not be read
    pub async fn build(self) -> Result<BuiltMetainfo, SwarmError> {
        if self.files.is_empty() {
            return Err(SwarmError::InvalidMetainfo {
                reason: "Metainfo needs at least one file".to_string(),
            });
        }

        let pieces = self.hash_pieces().await?;
        let info = self.encode_info(&pieces);

        let mut document = Vec::with_capacity(info.len() + 64);
        document.push(b'd');
        if let Some(primary) = self.announce.first() {
            put_str(&mut document, "announce");
            put_str(&mut document, primary);
        }
        if self.announce.len() > 1 {
            put_str(&mut document, "announce-list");
            document.push(b'l');
            for url in &self.announce {
                document.push(b'l');
                put_str(&mut document, url);
                document.push(b'e');
            }
            document.push(b'e');
        }
        put_str(&mut document, "info");
        document.extend_from_slice(&info);
        document.push(b'e');

        let metainfo = MetainfoParser::parse(&document)?;
        let sources = self.files.into_iter().map(|(_, source)| source).collect();

        Ok(BuiltMetainfo {
            bytes: document,
            metainfo,
            sources,
        })
    }

    fn is_single_file(&self) -> bool {
        self.files.len() == 1 && self.files[0].0.len() == 1
    }

    /// Info dictionary with keys in sorted order.
    fn encode_info(&self, pieces: &[u8]) -> Vec<u8> {
        let mut info = Vec::with_capacity(pieces.len() + 128);
        info.push(b'd');

        if self.is_single_file() {
            let (path, source) = &self.files[0];
            put_str(&mut info, "length");
            put_int(&mut info, source.length());
            put_str(&mut info, "name");
            put_str(&mut info, &path[0]);
        } else {
            put_str(&mut info, "files");
            info.push(b'l');
            for (path, source) in &self.files {
                info.push(b'd');
                put_str(&mut info, "length");
                put_int(&mut info, source.length());
                put_str(&mut info, "path");
                info.push(b'l');
                for component in path {
                    put_str(&mut info, component);
                }
                info.extend_from_slice(b"ee");
            }
            info.push(b'e');
            put_str(&mut info, "name");
            put_str(&mut info, &self.name);
        }

        put_str(&mut info, "piece length");
        put_int(&mut info, u64::from(self.piece_length));
        put_str(&mut info, "pieces");
        put_bytes(&mut info, pieces);
        info.push(b'e');
        info
    }

    /// Concatenated SHA-1 digests of every piece; pieces span file boundaries.
    async fn hash_pieces(&self) -> Result<Vec<u8>, SwarmError> {
        let piece_length = self.piece_length as usize;
        let mut pieces = Vec::new();
        let mut piece = Vec::with_capacity(piece_length);
        let mut buffer = vec![0u8; 64 * 1024];

        for (_, source) in &self.files {
            let mut reader = source.open().await?;
            loop {
                let read = reader.read(&mut buffer).await?;
                if read == 0 {
                    break;
                }

                let mut chunk = &buffer[..read];
                while !chunk.is_empty() {
                    let take = (piece_length - piece.len()).min(chunk.len());
                    piece.extend_from_slice(&chunk[..take]);
                    chunk = &chunk[take..];
                    if piece.len() == piece_length {
                        pieces.extend_from_slice(&Sha1::digest(&piece));
                        piece.clear();
                    }
                }
            }
        }

        if !piece.is_empty() {
            pieces.extend_from_slice(&Sha1::digest(&piece));
        }
        Ok(pieces)
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    put_bytes(out, value.as_bytes());
}

fn put_int(out: &mut Vec<u8>, value: u64) {
    out.push(b'i');
    out.extend_from_slice(value.to_string().as_bytes());
    out.push(b'e');
}

#[cfg(test)]
mod tests {
    use undertow_core::swarm::MagnetParser;

    use super::*;

    #[tokio::test]
    async fn test_single_file_document() {
        let built = MetainfoBuilder::new("ignored")
            .piece_length(1024)
            .announce("udp://tracker.example:1337/announce")
            .pattern_file("Movie.2020.mkv", 4000)
            .build()
            .await
            .unwrap();

        assert_eq!(built.metainfo.name, "Movie.2020.mkv");
        assert_eq!(built.metainfo.total_length, 4000);
        assert_eq!(built.metainfo.piece_hashes.len(), 4);
        assert_eq!(
            built.metainfo.announce_urls,
            vec!["udp://tracker.example:1337/announce".to_string()]
        );
    }

    #[tokio::test]
    async fn test_multi_file_document_keeps_order() {
        let built = MetainfoBuilder::new("Show.S01")
            .piece_length(512)
            .pattern_file("Show.S01E01.mkv", 700)
            .pattern_file("extras/notes.txt", 100)
            .build()
            .await
            .unwrap();

        let paths: Vec<String> = built
            .metainfo
            .files
            .iter()
            .map(|file| file.display_path())
            .collect();
        assert_eq!(paths, vec!["Show.S01E01.mkv", "extras/notes.txt"]);
        // 800 bytes in 512 byte pieces
        assert_eq!(built.metainfo.piece_hashes.len(), 2);
        assert_eq!(built.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_magnet_uri_round_trips_hash() {
        let built = MetainfoBuilder::new("x")
            .pattern_file("A Movie.mp4", 10)
            .build()
            .await
            .unwrap();

        let magnet = MagnetParser::parse(&built.magnet_uri()).unwrap();
        assert_eq!(magnet.info_hash, built.info_hash());
    }

    #[tokio::test]
    async fn test_identical_content_gives_identical_hash() {
        let first = MetainfoBuilder::new("x").pattern_file("a.mkv", 2048).build().await.unwrap();
        let second = MetainfoBuilder::new("x").pattern_file("a.mkv", 2048).build().await.unwrap();
        let other = MetainfoBuilder::new("x").pattern_file("a.mkv", 2049).build().await.unwrap();

        assert_eq!(first.info_hash(), second.info_hash());
        assert_ne!(first.info_hash(), other.info_hash());
    }

    #[tokio::test]
    async fn test_empty_builder_fails() {
        assert!(MetainfoBuilder::new("empty").build().await.is_err());
    }
}
