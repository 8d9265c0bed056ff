//! Uploaded image storage.
//!
//! Uploads are written under a collision-free name
//! `<unix-millis><40 hex chars>.<ext>` and addressed by a public reference
//! `<base-url>/image/<name>`. That reference is what ends up in a recipe's
//! `imageReference`, and [`LocalImageStore::resolve`] maps it back to the
//! file so batch reprocessing can re-read the image without a web server.

use crate::error::LarderError;
use crate::store::write_atomic;
use async_trait::async_trait;
use rand::RngCore;
use std::path::{Path, PathBuf};
use tracing::info;

/// Extension used when the original filename has none.
const FALLBACK_EXT: &str = "bin";

/// Anything that can keep an uploaded image and hand back a reference.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store `bytes`; return the public reference.
    async fn save(&self, bytes: &[u8], original_filename: &str) -> Result<String, LarderError>;
}

/// [`ImageStore`] writing into a local directory.
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    dir: PathBuf,
    public_base_url: String,
}

impl LocalImageStore {
    pub fn new(dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Map a reference produced by [`ImageStore::save`] back to its file.
    ///
    /// Anything else (a foreign URL, a plain path) is returned unchanged, so
    /// the result can always be handed to the image fetcher.
    pub fn resolve(&self, reference: &str) -> String {
        let prefix = format!("{}/image/", self.public_base_url);
        match reference.strip_prefix(&prefix) {
            Some(name) if is_plain_file_name(name) => {
                self.dir.join(name).to_string_lossy().into_owned()
            }
            _ => reference.to_string(),
        }
    }
}

#[async_trait]
impl ImageStore for LocalImageStore {
    async fn save(&self, bytes: &[u8], original_filename: &str) -> Result<String, LarderError> {
        let name = unique_name(original_filename);
        let path = self.dir.join(&name);

        let target = path.clone();
        let data = bytes.to_vec();
        tokio::task::spawn_blocking(move || write_atomic(&target, &data))
            .await
            .map_err(|e| LarderError::Internal(format!("Image save task panicked: {e}")))??;

        info!("Stored upload {} as {}", original_filename, path.display());
        Ok(format!("{}/image/{name}", self.public_base_url))
    }
}

/// `<unix-millis><40 hex>.<ext>`
pub fn unique_name(original_filename: &str) -> String {
    let mut entropy = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut entropy);
    format!(
        "{}{}.{}",
        chrono::Utc::now().timestamp_millis(),
        hex::encode(entropy),
        extension(original_filename)
    )
}

/// Text after the last `.`, if it is a plausible extension.
fn extension(original_filename: &str) -> String {
    match original_filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            ext.to_ascii_lowercase()
        }
        _ => FALLBACK_EXT.to_string(),
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}
