use crate::config::{load_aws_config, S3Config};
use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart, ObjectCannedAcl};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::{info, instrument, warn};

/// Durable blob storage for post media.
///
/// Keys are opaque and always supplied by the caller. A URL is only returned
/// once the object is anonymously readable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Write `bytes` under `key`, make it public, return its retrieval URL
    async fn store(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String>;

    /// Storage-location reference handed to the content classifier
    fn reference(&self, key: &str) -> String;
}

/// S3-backed media store
pub struct S3MediaStore {
    client: S3Client,
    bucket: String,
    config: S3Config,
}

impl S3MediaStore {
    /// Create a new S3 media store
    pub async fn new(config: &S3Config) -> Result<Self> {
        let aws_config = load_aws_config(&config.region).await;
        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Ok(Self::with_client(
            S3Client::from_conf(s3_config_builder.build()),
            config,
        ))
    }

    /// Wrap an already configured client
    pub fn with_client(client: S3Client, config: &S3Config) -> Self {
        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 media store initialized"
        );

        Self {
            client,
            bucket: config.bucket.clone(),
            config: config.clone(),
        }
    }

    /// Simple single-part upload for small files
    async fn simple_upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload media to S3")?;

        Ok(())
    }

    /// Multipart upload for large files
    async fn multipart_upload(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<()> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to create multipart upload")?;

        let upload_id = create_response
            .upload_id()
            .context("No upload ID in response")?
            .to_string();

        match self.upload_parts(key, &upload_id, &bytes).await {
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
                    .context("Failed to complete multipart upload")?;

                Ok(())
            }
            Err(e) => {
                // Release the uploaded parts; no object exists yet.
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .send()
                    .await
                {
                    warn!(key = %key, error = %abort_err, "Failed to abort multipart upload");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        bytes: &Bytes,
    ) -> Result<Vec<CompletedPart>> {
        let part_size = self.config.part_size_bytes.max(1);
        let mut completed_parts = Vec::with_capacity(bytes.len().div_ceil(part_size));

        for (idx, start) in (0..bytes.len()).step_by(part_size).enumerate() {
            let end = (start + part_size).min(bytes.len());
            let part_number = i32::try_from(idx + 1).context("Too many upload parts")?;

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(bytes.slice(start..end)))
                .send()
                .await
                .context("Failed to upload part")?;

            completed_parts.push(
                CompletedPart::builder()
                    .part_number(part_number)
                    .e_tag(upload_part_response.e_tag().unwrap_or_default())
                    .build(),
            );
        }

        Ok(completed_parts)
    }

    /// Grant anonymous read on an uploaded object
    async fn make_public(&self, key: &str) -> Result<()> {
        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .context("Failed to make media publicly readable")?;

        Ok(())
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    #[instrument(skip(self, bytes), fields(key = %key, size_bytes = bytes.len()))]
    async fn store(&self, key: &str, bytes: Bytes, content_type: &str) -> Result<String> {
        let size_bytes = bytes.len();

        if size_bytes > self.config.multipart_threshold_bytes {
            self.multipart_upload(key, bytes, content_type).await?;
        } else {
            self.simple_upload(key, bytes, content_type).await?;
        }

        self.make_public(key).await?;

        let url = public_url(&self.config, key);
        info!(key = %key, size_bytes, url = %url, "Media saved to S3");
        metrics::counter!("around.media.stored").increment(1);

        Ok(url)
    }

    fn reference(&self, key: &str) -> String {
        storage_reference(&self.bucket, key)
    }
}

/// Anonymous retrieval URL for an object key
pub fn public_url(config: &S3Config, key: &str) -> String {
    if let Some(ref base) = config.public_base_url {
        return format!("{}/{}", base.trim_end_matches('/'), key);
    }

    match config.endpoint_url {
        Some(ref endpoint) if config.force_path_style => {
            format!("{}/{}/{}", endpoint.trim_end_matches('/'), config.bucket, key)
        }
        Some(ref endpoint) => {
            let endpoint = endpoint.trim_end_matches('/');
            match endpoint.split_once("://") {
                Some((scheme, host)) => format!("{scheme}://{}.{host}/{key}", config.bucket),
                None => format!("{endpoint}/{}/{key}", config.bucket),
            }
        }
        None => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            config.bucket, config.region, key
        ),
    }
}

/// `s3://bucket/key` reference understood by the classifier
pub fn storage_reference(bucket: &str, key: &str) -> String {
    format!("s3://{bucket}/{key}")
}

/// Split an `s3://bucket/key` reference back into its parts
pub fn parse_storage_reference(reference: &str) -> Option<(&str, &str)> {
    let rest = reference.strip_prefix("s3://")?;
    let (bucket, key) = rest.split_once('/')?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some((bucket, key))
}
