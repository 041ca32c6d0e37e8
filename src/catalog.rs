//! Remote music catalog client
//!
//! Wraps the search, play-url and lyrics endpoints plus plain audio
//! downloads. Every request carries the same fixed headers and an explicit
//! timeout. The client never retries; retry policy belongs to the caller.

pub mod model;
#[cfg(test)]
pub(crate) mod test_server;

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, header};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub use model::SearchHit;

use crate::lyrics::LyricLine;
use crate::settings::CatalogSettings;

/// Errors raised by catalog requests
#[derive(Debug, Error)]
pub enum RemoteServiceError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with HTTP {status}")]
    Http { url: String, status: u16 },
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("failed to write download to {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Stateless client for the remote catalog
#[derive(Clone)]
pub struct CatalogClient {
    client: Client,
    settings: CatalogSettings,
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("client", &"<HttpClient>")
            .field("search_url", &self.settings.search_url)
            .finish()
    }
}

impl CatalogClient {
    pub fn new(settings: CatalogSettings) -> Result<Self, RemoteServiceError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_str(&settings.user_agent)
                .map_err(|e| RemoteServiceError::Client(format!("invalid user agent: {}", e)))?,
        );
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
        headers.insert(
            header::CONNECTION,
            header::HeaderValue::from_static("keep-alive"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteServiceError::Client(e.to_string()))?;

        Ok(Self { client, settings })
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.request_timeout_secs)
    }

    fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.download_timeout_secs)
    }

    /// GET a URL with query parameters and return the body as text
    async fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<String, RemoteServiceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(|source| RemoteServiceError::Network {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteServiceError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|source| RemoteServiceError::Network {
                url: url.to_string(),
                source,
            })
    }

    /// Search the catalog, best match first
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, RemoteServiceError> {
        let params = [
            ("all", query),
            ("ft", "music"),
            ("newsearch", "1"),
            ("alflac", "1"),
            ("itemset", "web_2013"),
            ("client", "kt"),
            ("cluster", "0"),
            ("pn", "0"),
            ("rn", "1"),
            ("vermerge", "1"),
            ("rformat", "json"),
            ("encoding", "utf8"),
            ("show_copyright_off", "1"),
            ("pcmp4", "1"),
            ("ver", "mbox"),
            ("plat", "pc"),
            ("devid", "0"),
        ];

        let body = self.get_text(&self.settings.search_url, &params).await?;
        let hits = model::to_search_hits(&body, query)?;
        debug!("Search {:?} returned {} hits", query, hits.len());
        Ok(hits)
    }

    /// Resolve a song id to a playable URL
    pub async fn resolve_play_url(&self, song_id: &str) -> Result<String, RemoteServiceError> {
        let body = self
            .get_text(&self.settings.play_url, &[("ID", song_id)])
            .await?;
        model::to_play_url(&body)
    }

    /// Fetch timed lyrics for a song id
    pub async fn fetch_lyrics(&self, song_id: &str) -> Result<Vec<LyricLine>, RemoteServiceError> {
        let body = self
            .get_text(&self.settings.lyric_url, &[("musicId", song_id)])
            .await?;
        let lines = model::to_lyrics(&body)?;
        info!("Fetched {} lyric lines for song {}", lines.len(), song_id);
        Ok(lines)
    }

    /// Stream a remote file to `dest`, returning the number of bytes written
    ///
    /// `dest` is left partially written on failure; callers staging through
    /// the cache discard it.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, RemoteServiceError> {
        let network = |source: reqwest::Error| RemoteServiceError::Network {
            url: url.to_string(),
            source,
        };
        let io = |source: std::io::Error| RemoteServiceError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let response = self
            .client
            .get(url)
            .timeout(self.download_timeout())
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteServiceError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await.map_err(io)?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(network)?;
            file.write_all(&chunk).await.map_err(io)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io)?;

        info!("Downloaded {} bytes from {} to {:?}", written, url, dest);
        Ok(written)
    }
}
