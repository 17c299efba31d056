//! Client for the external transcoding helper.
//!
//! The helper turns a remote media URL into a locally streamable audio file:
//! `GET /health`, `GET /download?url=...` and `GET /stream/<file>`. Only the
//! command line talks to it, to turn `--url` into a file before decoding.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HelperError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("helper returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid stream path {0:?}")]
    StreamPath(String),
    #[error("io error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no cache directory available")]
    NoCacheDir,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    /// Seconds; zero when the source does not know (live streams).
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub thumbnail: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub uploader: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedTrack {
    /// Path on the helper, e.g. `/stream/<id>.mp3`.
    #[serde(rename = "file")]
    pub stream_url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: TrackMetadata,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cached: bool,
    #[serde(default)]
    pub video_id: Option<String>,
}

/// The helper passes through `null` for fields its extractor left unknown.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

pub trait TranscodeHelper {
    fn health(&self) -> bool;

    fn download(&self, url: &str) -> Result<DownloadedTrack, HelperError>;
}

/// Blocking HTTP client for a helper at `base_url`.
pub struct HttpHelper {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpHelper {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, HelperError> {
        let client = reqwest::blocking::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Downloads the helper's stream for `track` into `dir`, returning the file path.
    pub fn fetch_stream(&self, track: &DownloadedTrack, dir: &Path) -> Result<PathBuf, HelperError> {
        let name = stream_file_name(&track.stream_url)?;
        let dest = dir.join(name);
        if track.cached && dest.exists() {
            log::info!("Using cached stream {}", dest.display());
            return Ok(dest);
        }

        let url = format!("{}/stream/{}", self.base_url, name);
        let mut response = checked(self.client.get(&url).send()?)?;

        let io_err = |source| HelperError::Io {
            path: dest.clone(),
            source,
        };
        std::fs::create_dir_all(dir).map_err(|source| HelperError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(File::create(&dest).map_err(io_err)?);
        let bytes = response.copy_to(&mut writer)?;
        writer.flush().map_err(io_err)?;

        log::info!("Fetched {} ({} bytes)", dest.display(), bytes);
        Ok(dest)
    }
}

impl TranscodeHelper for HttpHelper {
    fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().and_then(|r| r.error_for_status()) {
            Ok(response) => match response.json::<HealthResponse>() {
                Ok(health) => health.status == "ok",
                Err(e) => {
                    log::debug!("Malformed health response: {}", e);
                    false
                }
            },
            Err(e) => {
                log::debug!("Helper unreachable at {}: {}", self.base_url, e);
                false
            }
        }
    }

    fn download(&self, url: &str) -> Result<DownloadedTrack, HelperError> {
        let endpoint = format!("{}/download", self.base_url);
        let response = self.client.get(&endpoint).query(&[("url", url)]).send()?;
        let track: DownloadedTrack = checked(response)?.json()?;
        log::info!(
            "Helper resolved \"{}\" by {} ({:.0}s{})",
            track.metadata.title,
            track.metadata.uploader,
            track.metadata.duration,
            if track.cached { ", cached" } else { "" }
        );
        Ok(track)
    }
}

fn checked(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, HelperError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    Err(HelperError::Api {
        status: status.as_u16(),
        message,
    })
}

/// File name of a `/stream/<file>` path, refusing anything that could escape a directory.
pub fn stream_file_name(stream_url: &str) -> Result<&str, HelperError> {
    let name = stream_url
        .strip_prefix("/stream/")
        .unwrap_or(stream_url)
        .trim();
    if name.is_empty() || name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(HelperError::StreamPath(stream_url.to_string()));
    }
    Ok(name)
}

/// Where fetched streams are kept between runs.
pub fn stream_cache_dir() -> Result<PathBuf, HelperError> {
    let base = dirs::cache_dir()
        .or_else(dirs::home_dir)
        .ok_or(HelperError::NoCacheDir)?;
    Ok(base.join("auralis").join("streams"))
}
