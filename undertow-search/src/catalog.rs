//! Movie and show metadata from a TMDB-style catalog.
//!
//! Detail lookups are relayed verbatim: the upstream status and JSON body
//! are handed back to the caller untouched.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use undertow_core::config::CatalogConfig;

use crate::errors::MediaSearchError;

const DETAIL_APPENDS: &str = "credits,videos,images";
const SHOW_APPENDS: &str = "credits,videos,images,external_ids";

/// Combined movie and show search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSearch {
    pub movies: Vec<Value>,
    pub shows: Vec<Value>,
}

/// Upstream status and raw JSON body of a detail lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogResponse {
    pub status: u16,
    pub body: Bytes,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<Value>,
}

/// Client for the metadata catalog.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CatalogClient {
    /// Creates a catalog client from configuration.
    ///
    /// # Errors
    /// - `MediaSearchError::NetworkError` - HTTP client could not be constructed
    pub fn new(config: &CatalogConfig) -> Result<Self, MediaSearchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Searches movies and shows concurrently. A failed half comes back empty.
    pub async fn search(&self, query: &str) -> CatalogSearch {
        let (movies, shows) = tokio::join!(
            self.search_kind("movie", query),
            self.search_kind("tv", query)
        );
        CatalogSearch { movies, shows }
    }

    /// Movie details with credits, videos and images.
    ///
    /// # Errors
    /// - `MediaSearchError::NetworkError` - Catalog unreachable
    pub async fn movie(&self, id: &str) -> Result<CatalogResponse, MediaSearchError> {
        self.relay(&format!("/movie/{}", segment(id)), Some(DETAIL_APPENDS))
            .await
    }

    /// Show details including external ids.
    ///
    /// # Errors
    /// - `MediaSearchError::NetworkError` - Catalog unreachable
    pub async fn show(&self, id: &str) -> Result<CatalogResponse, MediaSearchError> {
        self.relay(&format!("/tv/{}", segment(id)), Some(SHOW_APPENDS))
            .await
    }

    /// # Errors
    /// - `MediaSearchError::NetworkError` - Catalog unreachable
    pub async fn season(
        &self,
        id: &str,
        season: &str,
    ) -> Result<CatalogResponse, MediaSearchError> {
        self.relay(
            &format!("/tv/{}/season/{}", segment(id), segment(season)),
            None,
        )
        .await
    }

    /// # Errors
    /// - `MediaSearchError::NetworkError` - Catalog unreachable
    pub async fn episode(
        &self,
        id: &str,
        season: &str,
        episode: &str,
    ) -> Result<CatalogResponse, MediaSearchError> {
        self.relay(
            &format!(
                "/tv/{}/season/{}/episode/{}",
                segment(id),
                segment(season),
                segment(episode)
            ),
            Some(SHOW_APPENDS),
        )
        .await
    }

    async fn search_kind(&self, kind: &str, query: &str) -> Vec<Value> {
        let url = format!("{}/search/{kind}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("query", query)])
            .send()
            .await;

        let page = match response {
            Ok(response) => response.json::<SearchPage>().await,
            Err(e) => Err(e),
        };

        match page {
            Ok(page) => page.results,
            Err(e) => {
                warn!("Catalog {} search for '{}' failed: {}", kind, query, e);
                Vec::new()
            }
        }
    }

    async fn relay(
        &self,
        path: &str,
        append: Option<&str>,
    ) -> Result<CatalogResponse, MediaSearchError> {
        let url = format!("{}{path}", self.base_url);
        debug!("Catalog lookup {}", path);

        let mut request = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())]);
        if let Some(append) = append {
            request = request.query(&[("append_to_response", append)]);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(CatalogResponse { status, body })
    }
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_escapes_path_separators() {
        assert_eq!(segment("603"), "603");
        assert_eq!(segment("../x"), "..%2Fx");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = CatalogConfig {
            base_url: "http://catalog.test/3/".to_string(),
            ..CatalogConfig::default()
        };
        let client = CatalogClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://catalog.test/3");
    }
}
