//! Turns a client supplied source locator into a registered swarm.
//!
//! Magnet URIs go straight to the engine. Anything else is fetched once:
//! a redirect to a magnet URI is registered instead of followed, a
//! metainfo body is registered as metadata and a body holding magnet text
//! is registered as a magnet. Nothing is retried.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use tracing::{debug, info};

use crate::swarm::{InfoHash, MagnetParser, MetainfoParser, SwarmEngine, SwarmError};

/// Maximum number of HTTP redirects followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Fetching {url} returned HTTP {status}")]
    UpstreamStatus { url: String, status: u16 },

    #[error("Unrecognized source format")]
    UnrecognizedFormat,

    #[error("Swarm engine rejected source: {0}")]
    Engine(#[from] SwarmError),
}

/// What a fetched locator turned out to point at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSource {
    Magnet(String),
    Metainfo(Vec<u8>),
}

/// Resolves locators and registers the result with the swarm engine.
#[derive(Clone)]
pub struct SourceResolver {
    client: reqwest::Client,
    engine: Arc<dyn SwarmEngine>,
}

impl SourceResolver {
    /// Creates a resolver whose HTTP client stops at magnet redirects.
    ///
    /// # Errors
    /// - `ResolveError::Fetch` - HTTP client could not be constructed
    pub fn new(engine: Arc<dyn SwarmEngine>, timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::Client::builder()
            .redirect(magnet_aware_policy())
            .timeout(timeout)
            .build()
            .map_err(|source| ResolveError::Fetch {
                url: String::new(),
                source,
            })?;

        Ok(Self { client, engine })
    }

    /// Resolves `locator` and registers it, returning the swarm's hash.
    ///
    /// # Errors
    /// - `ResolveError::Fetch` - Network failure while fetching the locator
    /// - `ResolveError::UpstreamStatus` - Fetch returned a non-success status
    /// - `ResolveError::UnrecognizedFormat` - Body is neither metainfo nor magnet text
    /// - `ResolveError::Engine` - Engine refused the magnet or metainfo
    pub async fn resolve(&self, locator: &str) -> Result<InfoHash, ResolveError> {
        let locator = locator.trim();

        let source = if MagnetParser::is_magnet(locator) {
            ResolvedSource::Magnet(locator.to_string())
        } else {
            self.fetch(locator).await?
        };

        let info_hash = match &source {
            ResolvedSource::Magnet(uri) => self.engine.add_magnet(uri).await?,
            ResolvedSource::Metainfo(bytes) => self.engine.add_metainfo(bytes).await?,
        };

        info!(
            "Registered swarm {} from {}",
            info_hash,
            match source {
                ResolvedSource::Magnet(_) => "magnet",
                ResolvedSource::Metainfo(_) => "metainfo",
            }
        );
        Ok(info_hash)
    }

    /// Performs the single outbound fetch and classifies what came back.
    ///
    /// # Errors
    /// - `ResolveError::Fetch` - Request failed
    /// - `ResolveError::UpstreamStatus` - Non-success status without a magnet redirect
    /// - `ResolveError::UnrecognizedFormat` - Body is neither metainfo nor magnet text
    pub async fn fetch(&self, url: &str) -> Result<ResolvedSource, ResolveError> {
        debug!("Fetching source {}", url);

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            // A magnet redirect that slipped past the policy surfaces as an
            // error carrying the target URL.
            Err(e) => match e.url().filter(|target| target.scheme() == "magnet") {
                Some(target) => return Ok(ResolvedSource::Magnet(target.to_string())),
                None => {
                    return Err(ResolveError::Fetch {
                        url: url.to_string(),
                        source: e,
                    });
                }
            },
        };

        let status = response.status();
        if status.is_redirection() {
            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::trim);
            if let Some(location) = location.filter(|loc| MagnetParser::is_magnet(loc)) {
                debug!("Source {} redirected to magnet", url);
                return Ok(ResolvedSource::Magnet(location.to_string()));
            }
        }

        if !status.is_success() {
            return Err(ResolveError::UpstreamStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| ResolveError::Fetch {
            url: url.to_string(),
            source,
        })?;

        classify_body(&body)
    }
}

/// Follows HTTP redirects but stops on a magnet target so the caller can
/// read it from the `Location` header.
fn magnet_aware_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.url().scheme() == "magnet" {
            attempt.stop()
        } else if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

/// Metainfo wins over magnet text; anything else is unrecognized.
///
/// # Errors
/// - `ResolveError::UnrecognizedFormat` - Neither form matched
pub fn classify_body(body: &[u8]) -> Result<ResolvedSource, ResolveError> {
    if MetainfoParser::parse(body).is_ok() {
        return Ok(ResolvedSource::Metainfo(body.to_vec()));
    }

    let text = String::from_utf8_lossy(body);
    let trimmed = text.trim();
    if MagnetParser::is_magnet(trimmed) {
        return Ok(ResolvedSource::Magnet(trimmed.to_string()));
    }

    Err(ResolveError::UnrecognizedFormat)
}
