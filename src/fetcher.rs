use crate::config::S3Config;
use crate::error::IngestError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::Client as S3Client;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// A downloaded image held in a scoped temporary file.
///
/// The file is removed when this handle is dropped, on every exit path.
#[derive(Debug)]
pub struct FetchedImage {
    file: NamedTempFile,
}

impl FetchedImage {
    pub fn new(file: NamedTempFile) -> Self {
        Self { file }
    }

    /// Path to the downloaded image on local disk
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Trait for retrieving a remote capture image into a local file
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Download the object at (bucket, key) into a scoped temporary file.
    async fn fetch(&self, bucket: &str, key: &str) -> Result<FetchedImage, IngestError>;
}

/// S3-backed image fetcher
pub struct S3ImageFetcher {
    client: S3Client,
}

impl S3ImageFetcher {
    /// Create a new S3 image fetcher
    pub async fn new(config: &S3Config) -> Result<Self, IngestError> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "S3 image fetcher initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl ImageFetcher for S3ImageFetcher {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<FetchedImage, IngestError> {
        debug!(bucket, key, "Downloading capture image");

        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| download_error(key, format!("{e:?}")))?;

        let mut file = temp_file_for(key).map_err(|e| download_error(key, e.to_string()))?;

        let mut body = resp.body;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| download_error(key, e.to_string()))?
        {
            file.write_all(&chunk)
                .map_err(|e| download_error(key, e.to_string()))?;
        }
        file.flush().map_err(|e| download_error(key, e.to_string()))?;

        debug!(bucket, key, path = %file.path().display(), "Download complete");

        Ok(FetchedImage::new(file))
    }
}

fn download_error(key: &str, reason: String) -> IngestError {
    IngestError::Download {
        key: key.to_string(),
        reason,
    }
}

/// Create a temp file whose suffix preserves the key's extension, so the
/// scorer sees the original image format.
fn temp_file_for(key: &str) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("skysweep-");

    let suffix = Path::new(key)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()));
    if let Some(ref suffix) = suffix {
        builder.suffix(suffix.as_str());
    }

    builder.tempfile()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_file_preserves_extension() {
        let file = temp_file_for("captures/img-42.jpg").unwrap();
        let name = file.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("skysweep-"));
        assert!(name.ends_with(".jpg"));
    }

    #[test]
    fn test_temp_file_without_extension() {
        let file = temp_file_for("captures/img-42").unwrap();
        let name = file.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("skysweep-"));
    }

    #[test]
    fn test_fetched_image_removed_on_drop() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();

        let image = FetchedImage::new(file);
        assert!(path.exists());
        assert_eq!(image.path(), path.as_path());

        drop(image);
        assert!(!path.exists());
    }
}
