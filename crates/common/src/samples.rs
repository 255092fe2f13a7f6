//! Sample image fetcher
//!
//! Downloads a known person/garment pair for manual runs and scenario
//! fixtures. Files that already exist are left alone.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{Error, Result};
use crate::types::SlotKind;

pub const PERSON_SAMPLE_URL: &str =
    "https://huggingface.co/franciszzj/Leffa/resolve/main/examples/person1/01350_00.jpg";
pub const GARMENT_SAMPLE_URL: &str =
    "https://huggingface.co/franciszzj/Leffa/resolve/main/examples/garment/00113_00.jpg";

/// One image to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleImage {
    pub slot: SlotKind,
    pub url: String,
    pub file_name: String,
}

/// The stock person/garment pair
pub fn default_samples() -> Vec<SampleImage> {
    vec![
        SampleImage {
            slot: SlotKind::Person,
            url: PERSON_SAMPLE_URL.to_string(),
            file_name: "human.jpg".to_string(),
        },
        SampleImage {
            slot: SlotKind::Garment,
            url: GARMENT_SAMPLE_URL.to_string(),
            file_name: "garment.jpg".to_string(),
        },
    ]
}

/// Size and digest of a completed download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Downloaded(DownloadedFile),
    AlreadyPresent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchReport {
    pub slot: SlotKind,
    pub path: PathBuf,
    pub status: FetchStatus,
}

/// Fetch every sample into `dir`, skipping files that already exist
pub async fn fetch_samples(
    client: &reqwest::Client,
    samples: &[SampleImage],
    dir: &Path,
) -> Result<Vec<FetchReport>> {
    tokio::fs::create_dir_all(dir).await?;

    let mut reports = Vec::with_capacity(samples.len());
    for sample in samples {
        let path = dir.join(&sample.file_name);
        let status = if tokio::fs::try_exists(&path).await? {
            info!("{} image already exists at {}", sample.slot, path.display());
            FetchStatus::AlreadyPresent
        } else {
            FetchStatus::Downloaded(download_file(client, &sample.url, &path).await?)
        };
        reports.push(FetchReport {
            slot: sample.slot,
            path,
            status,
        });
    }

    info!("All sample images are in place");
    Ok(reports)
}

/// Download `url` to `target`.
///
/// The body is streamed into a sibling `.part` file that is renamed once
/// complete and removed on any failure.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
) -> Result<DownloadedFile> {
    info!("Downloading {} to {}...", url, target.display());
    let partial = partial_path(target);

    match stream_to(client, url, &partial).await {
        Ok(file) => {
            tokio::fs::rename(&partial, target).await?;
            info!(
                "Download completed: {} ({} bytes, sha256 {})",
                target.display(),
                file.bytes,
                file.sha256
            );
            Ok(file)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            Err(e)
        }
    }
}

async fn stream_to(client: &reqwest::Client, url: &str, path: &Path) -> Result<DownloadedFile> {
    let mut response = client.get(url).send().await?;
    if response.status() != reqwest::StatusCode::OK {
        return Err(Error::Download(format!(
            "Failed to download {}, status code: {}",
            url,
            response.status().as_u16()
        )));
    }

    let mut file = tokio::fs::File::create(path).await?;
    let mut hasher = Sha256::new();
    let mut bytes = 0u64;
    while let Some(chunk) = response.chunk().await? {
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(DownloadedFile {
        bytes,
        sha256: hex::encode(hasher.finalize()),
    })
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/assets/human.jpg")),
            PathBuf::from("/tmp/assets/human.jpg.part")
        );
    }

    #[tokio::test]
    async fn test_existing_files_are_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("human.jpg"), b"person").unwrap();
        std::fs::write(tmp.path().join("garment.jpg"), b"garment").unwrap();

        // Unroutable URLs prove nothing is fetched
        let samples: Vec<SampleImage> = default_samples()
            .into_iter()
            .map(|s| SampleImage {
                url: "http://127.0.0.1:9/never".to_string(),
                ..s
            })
            .collect();

        let client = reqwest::Client::new();
        let reports = fetch_samples(&client, &samples, tmp.path()).await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.status == FetchStatus::AlreadyPresent));
        assert_eq!(std::fs::read(tmp.path().join("human.jpg")).unwrap(), b"person");
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("human.jpg");

        let client = reqwest::Client::new();
        let result = download_file(&client, "http://127.0.0.1:9/never", &target).await;
        assert!(result.is_err());
        assert!(!target.exists());
        assert!(!partial_path(&target).exists());
    }
}
