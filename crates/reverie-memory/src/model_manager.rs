// SPDX-FileCopyrightText: 2026 Reverie Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! First-run download of the ONNX embedding model.
//!
//! Files land in `<data_dir>/models/<model_name>/`. Only all-MiniLM-L6-v2
//! has known download URLs; any other model must be placed there by hand.

use std::path::{Path, PathBuf};

use reverie_core::ReverieError;
use tokio::sync::OnceCell;
use tracing::info;

/// Model the download URLs below belong to.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

const MODEL_URL: &str =
    "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Resolves model paths and downloads missing files once.
pub struct ModelManager {
    data_dir: PathBuf,
    model_name: String,
    ready: OnceCell<PathBuf>,
}

impl ModelManager {
    pub fn new(data_dir: PathBuf, model_name: &str) -> Self {
        Self {
            data_dir,
            model_name: model_name.to_string(),
            ready: OnceCell::new(),
        }
    }

    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models").join(&self.model_name)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join("model.onnx")
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir().join("tokenizer.json")
    }

    /// Both model and tokenizer are on disk.
    pub fn is_model_available(&self) -> bool {
        self.model_path().exists() && self.tokenizer_path().exists()
    }

    /// Make sure the model files exist, downloading them if needed.
    ///
    /// Concurrent callers share a single download. Returns the model path.
    pub async fn ensure_model(&self) -> Result<PathBuf, ReverieError> {
        self.ready
            .get_or_try_init(|| self.fetch_missing())
            .await
            .cloned()
    }

    async fn fetch_missing(&self) -> Result<PathBuf, ReverieError> {
        if self.is_model_available() {
            return Ok(self.model_path());
        }
        if self.model_name != DEFAULT_MODEL {
            return Err(ReverieError::embedding(format!(
                "model files for {} not found in {} and no download source is known",
                self.model_name,
                self.model_dir().display()
            )));
        }

        let model_dir = self.model_dir();
        tokio::fs::create_dir_all(&model_dir).await.map_err(|e| {
            ReverieError::Internal(format!("failed to create model directory: {e}"))
        })?;

        info!(model = %self.model_name, "embedding model not found, downloading");
        for (filename, url) in [("model.onnx", MODEL_URL), ("tokenizer.json", TOKENIZER_URL)] {
            let dest = model_dir.join(filename);
            if dest.exists() {
                continue;
            }
            let size = download_file(url, &dest).await?;
            info!(file = filename, bytes = size, "downloaded");
        }

        info!(path = %model_dir.display(), "embedding model ready");
        Ok(self.model_path())
    }
}

/// Download `url` to `dest` via a `.part` file so a failed download never
/// leaves a truncated file at `dest`.
async fn download_file(url: &str, dest: &Path) -> Result<usize, ReverieError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| ReverieError::Internal(format!("failed to download {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(ReverieError::Internal(format!(
            "download failed with status {}: {url}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| ReverieError::Internal(format!("failed to read body from {url}: {e}")))?;

    let partial = dest.with_extension("part");
    let write = async {
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, dest).await
    };
    if let Err(e) = write.await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(ReverieError::Internal(format!(
            "failed to write {}: {e}",
            dest.display()
        )));
    }

    Ok(bytes.len())
}
