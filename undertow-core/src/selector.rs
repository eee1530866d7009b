//! Picks the one file of a swarm that should be streamed.
//!
//! Only video containers are ever chosen. An episode hint selects the first
//! file whose name carries that season and episode; otherwise the largest
//! video wins.

use std::path::Path;

use regex::Regex;

use crate::swarm::SwarmFile;

/// Container extensions eligible for automatic selection.
pub const VIDEO_EXTENSIONS: [&str; 7] = ["mkv", "mp4", "avi", "mov", "wmv", "flv", "webm"];

/// Season and episode requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpisodeHint {
    pub season: u32,
    pub episode: u32,
}

impl EpisodeHint {
    /// Builds a hint only when both numbers are present and positive.
    pub fn from_request(season: Option<i64>, episode: Option<i64>) -> Option<Self> {
        let season = u32::try_from(season?).ok().filter(|&n| n > 0)?;
        let episode = u32::try_from(episode?).ok().filter(|&n| n > 0)?;
        Some(Self { season, episode })
    }

    /// Matches `S01E02`, `s1.e2`, `S01 - E02` and `1x02` style tokens.
    fn patterns(&self) -> Result<[Regex; 2], regex::Error> {
        let (season, episode) = (self.season, self.episode);
        Ok([
            Regex::new(&format!(r"(?i)s0*{season}[\s._-]*e0*{episode}\b"))?,
            Regex::new(&format!(r"(?i)\b0*{season}x0*{episode}\b"))?,
        ])
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("No suitable video file found among {file_count} files")]
    NoSuitableFile { file_count: usize },

    #[error("Invalid episode pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Returns true when the path ends in a recognised video extension.
pub fn is_video(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|video| video.eq_ignore_ascii_case(ext))
        })
}

/// Selects the file to stream from `files`.
///
/// # Errors
/// - `SelectionError::NoSuitableFile` - No video file to choose from
pub fn select_file<'a>(
    files: &'a [SwarmFile],
    hint: Option<EpisodeHint>,
) -> Result<&'a SwarmFile, SelectionError> {
    let videos: Vec<&SwarmFile> = files.iter().filter(|file| is_video(&file.path)).collect();

    if let Some(hint) = hint {
        let patterns = hint.patterns()?;
        let matched = videos
            .iter()
            .find(|file| patterns.iter().any(|pattern| pattern.is_match(&file.path)));
        if let Some(file) = matched {
            return Ok(file);
        }
    }

    // Strict comparison keeps the first of equally sized files; empty
    // files are never worth streaming.
    let mut largest: Option<&SwarmFile> = None;
    for file in videos {
        if file.length > largest.map_or(0, |current| current.length) {
            largest = Some(file);
        }
    }

    largest.ok_or(SelectionError::NoSuitableFile {
        file_count: files.len(),
    })
}
