use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::config::ModelConfig;

/// Progress is logged every time this many more bytes have arrived.
const PROGRESS_STEP: u64 = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Model download failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Model download returned {status}")]
    Upstream { status: u16 },

    #[error("Failed to write model file: {0}")]
    Io(#[from] std::io::Error),
}

/// Make sure the model file exists, downloading it from `download_url` if not.
///
/// The body is streamed into a `.part` file next to the target and renamed
/// once complete; on any error the partial file is removed.
#[instrument(skip(config), fields(path = %config.path.display()))]
pub async fn ensure_model(config: &ModelConfig) -> Result<PathBuf, DownloadError> {
    let path = config.path.clone();
    if path.is_file() {
        info!("model already present");
        return Ok(path);
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let partial = partial_path(&path);
    match fetch_to(&config.download_url, &partial).await {
        Ok(bytes) => {
            tokio::fs::rename(&partial, &path).await?;
            info!(bytes, "model downloaded");
            Ok(path)
        }
        Err(err) => {
            warn!(error = %err, "download failed, removing partial file");
            let _ = tokio::fs::remove_file(&partial).await;
            Err(err)
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

async fn fetch_to(url: &str, target: &Path) -> Result<u64, DownloadError> {
    info!(%url, "downloading model");
    let mut response = reqwest::get(url).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Upstream {
            status: status.as_u16(),
        });
    }

    let total = response.content_length();
    let mut file = tokio::fs::File::create(target).await?;
    let mut written = 0u64;
    let mut next_report = PROGRESS_STEP;

    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
        if written >= next_report {
            info!(written_mb = written / (1024 * 1024), total_mb = total.map(|t| t / (1024 * 1024)), "download progress");
            next_report += PROGRESS_STEP;
        }
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(path: PathBuf, url: String) -> ModelConfig {
        ModelConfig {
            path,
            download_url: url,
            ..ModelConfig::default()
        }
    }

    #[tokio::test]
    async fn test_existing_model_is_not_downloaded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/model.gguf")
            .expect(0)
            .create_async()
            .await;
        let model = tempfile::NamedTempFile::new().unwrap();

        let config = config_for(model.path().to_path_buf(), format!("{}/model.gguf", server.url()));
        let path = ensure_model(&config).await.unwrap();
        assert_eq!(path, model.path());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_downloads_into_nested_directory() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/model.gguf")
            .with_status(200)
            .with_body("GGUF-bytes")
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("models").join("tiny.gguf");

        let config = config_for(target.clone(), format!("{}/model.gguf", server.url()));
        ensure_model(&config).await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "GGUF-bytes");
        assert!(!partial_path(&target).exists());
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/model.gguf")
            .with_status(404)
            .create_async()
            .await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("tiny.gguf");

        let config = config_for(target.clone(), format!("{}/model.gguf", server.url()));
        let err = ensure_model(&config).await.unwrap_err();
        assert!(matches!(err, DownloadError::Upstream { status: 404 }));
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("models/m.gguf")),
            PathBuf::from("models/m.gguf.part")
        );
    }
}
