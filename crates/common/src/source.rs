//! Fetching the ledger text from disk or over HTTP.
//!
//! `LedgerSource::load` never fails: every outcome is folded into a
//! [`LoadStatus`] so callers can tell "no data yet" from "could not fetch".

use std::path::PathBuf;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::config::{Source, SourceKind};
use crate::ledger::{parse_ledger, Ledger};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("fetching {url}: HTTP {status}")]
    Status { url: String, status: u16 },
}

impl SourceError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => "not_found",
            Self::Io { .. } => "io",
            Self::Http { source, .. } if source.is_timeout() => "timeout",
            Self::Http { .. } => "http",
            Self::Status { .. } => "status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadStatus {
    Loaded,
    /// Source was reachable but held no data rows.
    Empty,
    Unavailable {
        reason: String,
    },
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loaded => "loaded",
            Self::Empty => "empty",
            Self::Unavailable { .. } => "unavailable",
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable { .. })
    }
}

/// Result of one load attempt. `ledger` is empty unless `status` is `Loaded`.
#[derive(Debug, Clone)]
pub struct LedgerLoad {
    pub status: LoadStatus,
    pub ledger: Ledger,
    /// Hex SHA-256 of the fetched text; `None` when the fetch failed.
    pub content_hash: Option<String>,
}

impl LedgerLoad {
    pub fn from_text(text: &str) -> Self {
        let ledger = parse_ledger(text);
        let status = if ledger.is_empty() {
            LoadStatus::Empty
        } else {
            LoadStatus::Loaded
        };
        Self {
            status,
            ledger,
            content_hash: Some(content_hash(text)),
        }
    }

    pub fn unavailable(err: &SourceError) -> Self {
        Self {
            status: LoadStatus::Unavailable {
                reason: err.to_string(),
            },
            ledger: Ledger::default(),
            content_hash: None,
        }
    }
}

pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone)]
pub enum LedgerSource {
    File(PathBuf),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

impl LedgerSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn http(url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| SourceError::Http {
                url: url.clone(),
                source,
            })?;
        Ok(Self::Http { url, client })
    }

    pub fn from_config(source: &Source) -> Result<Self, SourceError> {
        match source.kind {
            SourceKind::File => Ok(Self::file(&source.location)),
            SourceKind::Http => Self::http(
                source.location.clone(),
                Duration::from_secs(source.timeout_secs),
            ),
        }
    }

    pub fn location(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Http { url, .. } => url.clone(),
        }
    }

    pub async fn fetch_text(&self) -> Result<String, SourceError> {
        match self {
            Self::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| SourceError::Io {
                        path: path.display().to_string(),
                        source,
                    })
            }
            Self::Http { url, client } => {
                let http_err = |source| SourceError::Http {
                    url: url.clone(),
                    source,
                };
                let resp = client.get(url).send().await.map_err(http_err)?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(SourceError::Status {
                        url: url.clone(),
                        status: status.as_u16(),
                    });
                }
                resp.text().await.map_err(http_err)
            }
        }
    }

    pub async fn load(&self) -> LedgerLoad {
        let start = Instant::now();
        let res = self.fetch_text().await;
        let ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::histogram!("ledger_fetch_latency_ms").record(ms);

        let load = match res {
            Ok(text) => LedgerLoad::from_text(&text),
            Err(e) => {
                metrics::counter!("ledger_load_errors_total", "kind" => e.kind()).increment(1);
                tracing::error!(location = %self.location(), error = %e, "ledger unavailable");
                LedgerLoad::unavailable(&e)
            }
        };
        metrics::counter!("ledger_loads_total", "status" => load.status.as_str()).increment(1);
        tracing::info!(
            location = %self.location(),
            status = load.status.as_str(),
            rows = load.ledger.len(),
            fetch_ms = ms,
            "ledger load finished"
        );
        load
    }
}
