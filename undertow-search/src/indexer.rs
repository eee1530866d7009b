//! Release search through a Prowlarr-style indexer aggregator.
//!
//! Every lookup runs an id query and a free-text query side by side. Text
//! results are only kept when the release name parses back to the requested
//! title (and year, season or episode). Results keep upstream order.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use undertow_core::config::IndexerConfig;

use crate::errors::MediaSearchError;

/// Query parameters accepted by the indexer endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerParams {
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    pub year: Option<String>,
    pub season: Option<String>,
    pub episode: Option<String>,
}

/// A validated indexer lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexerQuery {
    Movie {
        imdb_id: String,
        title: String,
        year: String,
    },
    Episode {
        imdb_id: String,
        title: String,
        season: u32,
        episode: u32,
    },
}

impl IndexerQuery {
    /// Validates raw parameters. A leading `tt` on the IMDb id is stripped.
    ///
    /// # Errors
    /// - `MediaSearchError::MissingParameter` - Required parameter absent or empty
    /// - `MediaSearchError::InvalidParameter` - Season or episode is not a number
    /// - `MediaSearchError::InvalidMediaType` - Type is neither `movie` nor `episode`
    pub fn from_params(params: &IndexerParams) -> Result<Self, MediaSearchError> {
        let media_type = required("type", &params.media_type)?;
        let imdb_id = required("imdbId", &params.imdb_id)?;
        let imdb_id = imdb_id.strip_prefix("tt").unwrap_or(imdb_id);
        if imdb_id.is_empty() {
            return Err(MediaSearchError::MissingParameter { name: "imdbId" });
        }
        let title = required("title", &params.title)?;

        match media_type {
            "movie" => Ok(IndexerQuery::Movie {
                imdb_id: imdb_id.to_string(),
                title: title.to_string(),
                year: required("year", &params.year)?.to_string(),
            }),
            "episode" => Ok(IndexerQuery::Episode {
                imdb_id: imdb_id.to_string(),
                title: title.to_string(),
                season: number("season", &params.season)?,
                episode: number("episode", &params.episode)?,
            }),
            other => Err(MediaSearchError::InvalidMediaType {
                media_type: other.to_string(),
            }),
        }
    }
}

fn required<'a>(
    name: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, MediaSearchError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(MediaSearchError::MissingParameter { name })
}

fn number(name: &'static str, value: &Option<String>) -> Result<u32, MediaSearchError> {
    let raw = required(name, value)?;
    raw.parse().map_err(|_| MediaSearchError::InvalidParameter {
        name,
        value: raw.to_string(),
    })
}

/// One release as returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexerResult {
    pub title: String,
    pub guid: String,
    /// Download URL, else magnet URL, else info page
    pub link: String,
    pub pub_date: String,
    /// Category names joined by `,`
    pub category: String,
    pub size: u64,
    pub seeders: i64,
    pub leechers: i64,
    /// Vertical resolution parsed from the title, 0 when unknown
    pub resolution: u32,
    pub indexer_id: i64,
    pub indexer_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UpstreamRelease {
    title: Option<String>,
    guid: Option<String>,
    download_url: Option<String>,
    magnet_url: Option<String>,
    info_url: Option<String>,
    publish_date: Option<String>,
    categories: Vec<UpstreamCategory>,
    size: Option<u64>,
    seeders: Option<i64>,
    leechers: Option<i64>,
    indexer_id: Option<i64>,
    indexer: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpstreamCategory {
    name: Option<String>,
}

/// Title and year parsed from a movie release name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieRelease {
    pub title: String,
    pub year: String,
}

/// Title, season and episode parsed from an episode release name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpisodeRelease {
    pub title: String,
    pub season: u32,
    pub episode: Option<u32>,
}

/// Release name parsing shared by every lookup.
#[derive(Debug, Clone)]
pub struct ReleaseParser {
    year: Regex,
    country: Regex,
    non_alphanumeric: Regex,
    resolution: Regex,
    movie: Regex,
    episode: Regex,
    season_pack: Regex,
}

impl ReleaseParser {
    /// # Errors
    /// - `regex::Error` - A pattern failed to compile
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            year: Regex::new(r"\b\d{4}\b")?,
            country: Regex::new(r"\b(us|uk|au|ca)\b")?,
            non_alphanumeric: Regex::new(r"[^a-z0-9]")?,
            resolution: Regex::new(r"(?i)\b(\d{3,4}p|4k|8k|uhd)\b")?,
            movie: Regex::new(r"(?i)^(?P<title>.+?)[._\s][\[(]?(?P<year>\d{4})[\])]?")?,
            episode: Regex::new(
                r"(?i)^(?P<title>.+?)[._\s](?:\[?\(?(?P<year>\d{4})\)?\]?[._\s])?[sS](?P<season>\d{1,2})[eE](?P<episode>\d{1,2})",
            )?,
            season_pack: Regex::new(
                r"(?i)^(?P<title>.+?)[._\s](?:\[?\(?(?P<year>\d{4})\)?\]?[._\s])?[sS](?P<season>\d{1,2})",
            )?,
        })
    }

    /// Lowercase title without years, country tags or punctuation.
    pub fn clean_title(&self, title: &str) -> String {
        let lower = title.to_lowercase();
        let without_year = self.year.replace_all(&lower, "");
        let without_country = self.country.replace_all(&without_year, "");
        self.non_alphanumeric
            .replace_all(&without_country, "")
            .into_owned()
    }

    /// Vertical resolution named in a release title, 0 when absent.
    pub fn parse_resolution(&self, title: &str) -> u32 {
        let Some(found) = self.resolution.find(title) else {
            return 0;
        };

        match found.as_str().to_lowercase().as_str() {
            "4k" | "uhd" => 2160,
            "8k" => 4320,
            other => other.trim_end_matches('p').parse().unwrap_or(0),
        }
    }

    pub fn movie(&self, title: &str) -> Option<MovieRelease> {
        let caps = self.movie.captures(title)?;
        Some(MovieRelease {
            title: caps.name("title")?.as_str().to_string(),
            year: caps.name("year")?.as_str().to_string(),
        })
    }

    pub fn episode(&self, title: &str) -> Option<EpisodeRelease> {
        let caps = self.episode.captures(title)?;
        Some(EpisodeRelease {
            title: caps.name("title")?.as_str().to_string(),
            season: caps.name("season")?.as_str().parse().ok()?,
            episode: Some(caps.name("episode")?.as_str().parse().ok()?),
        })
    }

    /// Whole-season release; names that carry an episode number are not packs.
    pub fn season_pack(&self, title: &str) -> Option<EpisodeRelease> {
        if self.episode.is_match(title) {
            return None;
        }
        let caps = self.season_pack.captures(title)?;
        Some(EpisodeRelease {
            title: caps.name("title")?.as_str().to_string(),
            season: caps.name("season")?.as_str().parse().ok()?,
            episode: None,
        })
    }
}

/// Client for the indexer aggregator.
#[derive(Debug, Clone)]
pub struct IndexerClient {
    client: reqwest::Client,
    search_url: String,
    api_key: String,
    parser: ReleaseParser,
}

impl IndexerClient {
    /// # Errors
    /// - `MediaSearchError::NetworkError` - HTTP client could not be constructed
    /// - `MediaSearchError::ParseError` - Release patterns failed to compile
    pub fn new(config: &IndexerConfig) -> Result<Self, MediaSearchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let parser = ReleaseParser::new().map_err(|e| MediaSearchError::ParseError {
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            search_url: format!("{}/api/v1/search", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            parser,
        })
    }

    pub fn parser(&self) -> &ReleaseParser {
        &self.parser
    }

    /// Runs a lookup. Upstream failures shrink the result set, never error.
    pub async fn search(&self, query: &IndexerQuery) -> Vec<IndexerResult> {
        match query {
            IndexerQuery::Movie {
                imdb_id,
                title,
                year,
            } => self.movie(imdb_id, title, year).await,
            IndexerQuery::Episode {
                imdb_id,
                title,
                season,
                episode,
            } => {
                let (mut packs, episodes) = tokio::join!(
                    self.season(imdb_id, title, *season),
                    self.episode(imdb_id, title, *season, *episode)
                );
                packs.extend(episodes);
                packs
            }
        }
    }

    async fn movie(&self, imdb_id: &str, title: &str, year: &str) -> Vec<IndexerResult> {
        let target = self.parser.clean_title(title);
        let id_query = format!("{{ImdbId:{imdb_id}}}");
        let text_query = format!("{title} {year}");
        let (mut by_id, by_text) = tokio::join!(
            self.fetch("movie", &id_query),
            self.fetch("movie", &text_query)
        );

        by_id.extend(by_text.into_iter().filter(|result| {
            self.parser.movie(&result.title).is_some_and(|release| {
                release.year == year && self.parser.clean_title(&release.title) == target
            })
        }));
        by_id
    }

    async fn season(&self, imdb_id: &str, title: &str, season: u32) -> Vec<IndexerResult> {
        let target = self.parser.clean_title(title);
        let id_query = format!("{{ImdbId:{imdb_id}}}{{Season:{season}}}");
        let text_query = format!("{title} S{season:02}");
        let (mut by_id, by_text) = tokio::join!(
            self.fetch("tvsearch", &id_query),
            self.fetch("tvsearch", &text_query)
        );

        by_id.extend(by_text.into_iter().filter(|result| {
            self.parser.season_pack(&result.title).is_some_and(|release| {
                release.season == season && self.parser.clean_title(&release.title) == target
            })
        }));
        by_id
    }

    async fn episode(
        &self,
        imdb_id: &str,
        title: &str,
        season: u32,
        episode: u32,
    ) -> Vec<IndexerResult> {
        let target = self.parser.clean_title(title);
        let id_query = format!("{{ImdbId:{imdb_id}}}{{Season:{season}}}{{Episode:{episode}}}");
        let text_query = format!("{title} S{season:02}E{episode:02}");
        let (mut by_id, by_text) = tokio::join!(
            self.fetch("tvsearch", &id_query),
            self.fetch("tvsearch", &text_query)
        );

        by_id.extend(by_text.into_iter().filter(|result| {
            self.parser.episode(&result.title).is_some_and(|release| {
                release.season == season
                    && release.episode == Some(episode)
                    && self.parser.clean_title(&release.title) == target
            })
        }));
        by_id
    }

    async fn fetch(&self, kind: &str, query: &str) -> Vec<IndexerResult> {
        match self.try_fetch(kind, query).await {
            Ok(results) => {
                debug!("Indexer {} query '{}': {} results", kind, query, results.len());
                results
            }
            Err(e) => {
                warn!("Indexer {} query '{}' failed: {}", kind, query, e);
                Vec::new()
            }
        }
    }

    async fn try_fetch(
        &self,
        kind: &str,
        query: &str,
    ) -> Result<Vec<IndexerResult>, MediaSearchError> {
        let response = self
            .client
            .get(&self.search_url)
            .header("X-Api-Key", &self.api_key)
            .query(&[("type", kind), ("query", query)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MediaSearchError::NetworkError {
                reason: format!("indexer returned HTTP {}", status.as_u16()),
            });
        }

        let releases: Vec<UpstreamRelease> =
            response
                .json()
                .await
                .map_err(|e| MediaSearchError::ParseError {
                    reason: e.to_string(),
                })?;

        Ok(releases
            .into_iter()
            .map(|release| self.to_result(release))
            .collect())
    }

    fn to_result(&self, release: UpstreamRelease) -> IndexerResult {
        let title = release.title.unwrap_or_default();
        let link = [release.download_url, release.magnet_url, release.info_url]
            .into_iter()
            .flatten()
            .find(|link| !link.is_empty())
            .unwrap_or_default();

        let names: Vec<String> = release
            .categories
            .into_iter()
            .filter_map(|category| category.name)
            .collect();
        let category = if names.is_empty() {
            "Unknown".to_string()
        } else {
            names.join(",")
        };

        IndexerResult {
            resolution: self.parser.parse_resolution(&title),
            title,
            guid: release.guid.unwrap_or_default(),
            link,
            pub_date: release.publish_date.unwrap_or_default(),
            category,
            size: release.size.unwrap_or(0),
            seeders: release.seeders.unwrap_or(0),
            leechers: release.leechers.unwrap_or(0),
            indexer_id: release.indexer_id.unwrap_or(0),
            indexer_name: release.indexer.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> ReleaseParser {
        ReleaseParser::new().unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> IndexerParams {
        let mut params = IndexerParams::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "type" => params.media_type = value,
                "imdbId" => params.imdb_id = value,
                "title" => params.title = value,
                "year" => params.year = value,
                "season" => params.season = value,
                "episode" => params.episode = value,
                _ => unreachable!(),
            }
        }
        params
    }

    #[test]
    fn test_clean_title() {
        let parser = parser();
        assert_eq!(parser.clean_title("The.Office.US"), "theoffice");
        assert_eq!(parser.clean_title("Blade Runner 2049"), "bladerunner");
        assert_eq!(parser.clean_title("Spider-Man: No Way Home"), "spidermannowayhome");
    }

    #[test]
    fn test_parse_resolution() {
        let parser = parser();
        assert_eq!(parser.parse_resolution("Movie.2020.1080p.WEB-DL"), 1080);
        assert_eq!(parser.parse_resolution("Movie 2020 720P x264"), 720);
        assert_eq!(parser.parse_resolution("Movie.2020.4K.HDR"), 2160);
        assert_eq!(parser.parse_resolution("Movie.2020.UHD.BluRay"), 2160);
        assert_eq!(parser.parse_resolution("Movie.2020.8k"), 4320);
        assert_eq!(parser.parse_resolution("Movie.2020.DVDRip"), 0);
    }

    #[test]
    fn test_movie_release() {
        let parser = parser();
        let release = parser.movie("The.Matrix.1999.1080p.BluRay").unwrap();
        assert_eq!(release.title, "The.Matrix");
        assert_eq!(release.year, "1999");

        let release = parser.movie("The Matrix (1999) [1080p]").unwrap();
        assert_eq!(parser.clean_title(&release.title), "thematrix");
        assert!(parser.movie("NoYearHere").is_none());
    }

    #[test]
    fn test_episode_and_season_pack() {
        let parser = parser();

        let episode = parser.episode("Show.Name.S01E03.720p").unwrap();
        assert_eq!(episode.title, "Show.Name");
        assert_eq!((episode.season, episode.episode), (1, Some(3)));

        let with_year = parser.episode("Show Name (2019) S02E10 1080p").unwrap();
        assert_eq!(parser.clean_title(&with_year.title), "showname");
        assert_eq!(with_year.season, 2);

        let pack = parser.season_pack("Show.Name.S01.COMPLETE.1080p").unwrap();
        assert_eq!((pack.season, pack.episode), (1, None));
        assert!(parser.season_pack("Show.Name.S01E01.1080p").is_none());
    }

    #[test]
    fn test_query_validation() {
        let movie = IndexerQuery::from_params(&params(&[
            ("type", "movie"),
            ("imdbId", "tt0133093"),
            ("title", "The Matrix"),
            ("year", "1999"),
        ]))
        .unwrap();
        assert_eq!(
            movie,
            IndexerQuery::Movie {
                imdb_id: "0133093".to_string(),
                title: "The Matrix".to_string(),
                year: "1999".to_string(),
            }
        );

        let missing_year = IndexerQuery::from_params(&params(&[
            ("type", "movie"),
            ("imdbId", "tt0133093"),
            ("title", "The Matrix"),
        ]));
        assert!(matches!(
            missing_year,
            Err(MediaSearchError::MissingParameter { name: "year" })
        ));

        let bad_type = IndexerQuery::from_params(&params(&[
            ("type", "music"),
            ("imdbId", "1"),
            ("title", "x"),
        ]));
        assert!(matches!(
            bad_type,
            Err(MediaSearchError::InvalidMediaType { .. })
        ));

        let bad_season = IndexerQuery::from_params(&params(&[
            ("type", "episode"),
            ("imdbId", "1"),
            ("title", "x"),
            ("season", "one"),
            ("episode", "2"),
        ]));
        assert!(matches!(
            bad_season,
            Err(MediaSearchError::InvalidParameter { name: "season", .. })
        ));
    }

    #[test]
    fn test_upstream_mapping_fallbacks() {
        let client = IndexerClient::new(&IndexerConfig::default()).unwrap();
        let release: UpstreamRelease = serde_json::from_str(
            r#"{
                "title": "Movie.2020.2160p",
                "guid": "g-1",
                "downloadUrl": "",
                "magnetUrl": "magnet:?xt=urn:btih:abc",
                "categories": [{"id": 2000, "name": "Movies"}, {"id": 2040, "name": "Movies/HD"}],
                "size": 1234,
                "seeders": 12,
                "indexerId": 4,
                "indexer": "Example"
            }"#,
        )
        .unwrap();

        let result = client.to_result(release);
        assert_eq!(result.link, "magnet:?xt=urn:btih:abc");
        assert_eq!(result.category, "Movies,Movies/HD");
        assert_eq!(result.resolution, 2160);
        assert_eq!(result.leechers, 0);
        assert_eq!(result.indexer_name, "Example");

        let bare: UpstreamRelease = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert_eq!(client.to_result(bare).category, "Unknown");
    }
}
