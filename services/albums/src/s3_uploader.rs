use crate::blob_store::{public_url, BlobStore};
use crate::config::S3Config;
use crate::error::BlobError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

/// S3 uploader for album photos
pub struct S3Uploader {
    client: S3Client,
    bucket: String,
    config: S3Config,
}

impl S3Uploader {
    /// Create a new S3 uploader
    pub async fn new(config: &S3Config) -> Result<Self> {
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

        let s3_config = s3_config_builder.build();
        let client = S3Client::from_conf(s3_config);

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 uploader initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            config: config.clone(),
        })
    }

    /// Public URL of an uploaded object
    pub fn object_url(&self, key: &str) -> String {
        object_url(&self.config, key)
    }

    /// Simple single-part upload for small files
    async fn simple_upload(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), BlobError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| classify_sdk_error(key, e, "Failed to upload photo to S3"))?;

        Ok(())
    }

    /// Multipart upload for large files
    async fn multipart_upload(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), BlobError> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| classify_sdk_error(key, e, "Failed to create multipart upload"))?;

        let upload_id = create_response
            .upload_id()
            .context("No upload ID in response")?
            .to_string();

        match self.upload_parts(key, &upload_id, &body).await {
            Ok(parts) => {
                let completed_upload = CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build();

                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(completed_upload)
                    .send()
                    .await
                    .map_err(|e| classify_sdk_error(key, e, "Failed to complete multipart upload"))?;
                Ok(())
            }
            Err(e) => {
                // Leave no dangling parts behind
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(error = %abort_err, key = %key, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(&self, key: &str, upload_id: &str, body: &Bytes) -> Result<Vec<CompletedPart>, BlobError> {
        let part_size = self.config.part_size_bytes.max(1);
        let mut completed_parts = Vec::new();
        let mut part_number = 1;

        for offset in (0..body.len()).step_by(part_size) {
            let end = (offset + part_size).min(body.len());
            let chunk = body.slice(offset..end);

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(chunk))
                .send()
                .await
                .map_err(|e| classify_sdk_error(key, e, "Failed to upload part"))?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );
            part_number += 1;
        }

        Ok(completed_parts)
    }
}

#[async_trait]
impl BlobStore for S3Uploader {
    #[instrument(skip(self, body), fields(bucket = %self.bucket, size_bytes = body.len()))]
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<String, BlobError> {
        let size_bytes = body.len();
        debug!(key = %key, size_bytes, "Uploading photo to S3");

        // Check if we should use multipart upload
        if size_bytes > self.config.multipart_threshold_bytes {
            self.multipart_upload(key, body, content_type).await?;
        } else {
            self.simple_upload(key, body, content_type).await?;
        }

        info!(key = %key, size_bytes, "Photo uploaded successfully");

        Ok(self.object_url(key))
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error(key, e, "Failed to delete photo from S3"))?;

        debug!(key = %key, "Photo deleted from S3");
        Ok(())
    }
}

/// Map SDK failures onto the blob error taxonomy
fn classify_sdk_error<E, R>(key: &str, err: SdkError<E, R>, action: &'static str) -> BlobError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    if matches!(err, SdkError::TimeoutError(_)) {
        return BlobError::Timeout {
            key: key.to_string(),
        };
    }

    let code = err.as_service_error().and_then(|e| e.code());
    if code.map(is_access_denied_code).unwrap_or(false) {
        return BlobError::PermissionDenied {
            key: key.to_string(),
        };
    }
    if code == Some("RequestTimeout") {
        return BlobError::Timeout {
            key: key.to_string(),
        };
    }

    BlobError::Other(anyhow::Error::new(err).context(action))
}

fn is_access_denied_code(code: &str) -> bool {
    matches!(
        code,
        "AccessDenied" | "AllAccessDisabled" | "InvalidAccessKeyId" | "SignatureDoesNotMatch"
    )
}

/// Public URL for `key`: the configured prefix, else the endpoint or the
/// virtual-hosted AWS address
fn object_url(config: &S3Config, key: &str) -> String {
    if let Some(prefix) = &config.public_url_prefix {
        return public_url(prefix, key);
    }

    match &config.endpoint_url {
        Some(endpoint) if config.force_path_style => {
            public_url(&format!("{}/{}", endpoint.trim_end_matches('/'), config.bucket), key)
        }
        Some(endpoint) => {
            let endpoint = endpoint.trim_end_matches('/');
            match endpoint.split_once("://") {
                Some((scheme, host)) => format!("{scheme}://{}.{host}/{key}", config.bucket),
                None => public_url(&format!("{endpoint}/{}", config.bucket), key),
            }
        }
        None => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            config.bucket, config.region, key
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> S3Config {
        S3Config {
            bucket: "album-photos".to_string(),
            region: "eu-west-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
            public_url_prefix: None,
            multipart_threshold_bytes: 5 * 1024 * 1024,
            part_size_bytes: 5 * 1024 * 1024,
        }
    }

    #[test]
    fn test_object_url_aws_default() {
        let url = object_url(&test_config(), "albums/abcd1234/1_x.jpg");
        assert_eq!(
            url,
            "https://album-photos.s3.eu-west-1.amazonaws.com/albums/abcd1234/1_x.jpg"
        );
    }

    #[test]
    fn test_object_url_path_style_endpoint() {
        let config = S3Config {
            endpoint_url: Some("http://localhost:9000/".to_string()),
            force_path_style: true,
            ..test_config()
        };
        assert_eq!(
            object_url(&config, "albums/a/1.png"),
            "http://localhost:9000/album-photos/albums/a/1.png"
        );
    }

    #[test]
    fn test_object_url_virtual_host_endpoint() {
        let config = S3Config {
            endpoint_url: Some("https://storage.example.com".to_string()),
            ..test_config()
        };
        assert_eq!(
            object_url(&config, "albums/a/1.png"),
            "https://album-photos.storage.example.com/albums/a/1.png"
        );
    }

    #[test]
    fn test_object_url_prefers_public_prefix() {
        let config = S3Config {
            public_url_prefix: Some("https://cdn.example.com".to_string()),
            endpoint_url: Some("http://localhost:9000".to_string()),
            ..test_config()
        };
        assert_eq!(
            object_url(&config, "albums/a/1.png"),
            "https://cdn.example.com/albums/a/1.png"
        );
    }

    #[test]
    fn test_access_denied_codes() {
        assert!(is_access_denied_code("AccessDenied"));
        assert!(is_access_denied_code("InvalidAccessKeyId"));
        assert!(!is_access_denied_code("NoSuchBucket"));
    }
}
