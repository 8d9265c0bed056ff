//! Image source fetch: resolve a URL or local path to raw bytes.
//!
//! Failures are classified so callers can react per kind: the source does
//! not exist ([`LarderError::NotFound`]), the network or filesystem failed
//! ([`LarderError::Fetch`]), or the download ran out of time
//! ([`LarderError::Timeout`]). Decoding is not attempted here; a corrupt
//! payload is reported later by the normalizer as `Decode`.

use crate::error::LarderError;
use crate::model::RawImage;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Fetch the image bytes behind `source`.
pub async fn fetch_image(source: &str, timeout_secs: u64) -> Result<RawImage, LarderError> {
    if is_url(source) {
        download_url(source, timeout_secs).await
    } else {
        read_local(source).await
    }
}

async fn read_local(path_str: &str) -> Result<RawImage, LarderError> {
    let path = PathBuf::from(path_str);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            debug!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(RawImage::new(path_str, bytes))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(LarderError::NotFound {
            source_ref: path_str.to_string(),
        }),
        Err(e) => Err(LarderError::Fetch {
            source_ref: path_str.to_string(),
            reason: e.to_string(),
        }),
    }
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<RawImage, LarderError> {
    info!("Downloading image from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LarderError::Fetch {
            source_ref: url.to_string(),
            reason: e.to_string(),
        })?;

    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            LarderError::Timeout {
                operation: format!("download of '{url}'"),
                secs: timeout_secs,
            }
        } else {
            LarderError::Fetch {
                source_ref: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(classify)?;

    let status = response.status();
    if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
        return Err(LarderError::NotFound {
            source_ref: url.to_string(),
        });
    }
    if !status.is_success() {
        return Err(LarderError::Fetch {
            source_ref: url.to_string(),
            reason: format!("HTTP {status}"),
        });
    }

    let bytes = response.bytes().await.map_err(classify)?;
    info!("Downloaded {} bytes", bytes.len());

    Ok(RawImage::new(url, bytes.to_vec()))
}
