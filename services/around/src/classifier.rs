use crate::config::{load_aws_config, ClassifierConfig};
use crate::media_store::parse_storage_reference;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_rekognition::config::Builder as RekognitionConfigBuilder;
use aws_sdk_rekognition::types::{FaceDetail, Image, S3Object};
use aws_sdk_rekognition::Client as RekognitionClient;
use tracing::{debug, info, instrument};

/// Opaque scoring service for stored image media
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentClassifier: Send + Sync {
    /// Confidence in [0, 1] for the media at `reference`
    async fn classify(&self, reference: &str) -> Result<f64>;
}

/// Face-detection scorer backed by AWS Rekognition.
///
/// The score is the most confident detected face, scaled from Rekognition's
/// 0-100 range; an image with no faces scores 0.
pub struct RekognitionClassifier {
    client: RekognitionClient,
}

impl RekognitionClassifier {
    pub async fn new(config: &ClassifierConfig) -> Result<Self> {
        let aws_config = load_aws_config(&config.region).await;
        let mut builder = RekognitionConfigBuilder::from(&aws_config);

        if let Some(ref endpoint_url) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        let client = RekognitionClient::from_conf(builder.build());

        info!(region = %config.region, "Rekognition classifier initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl ContentClassifier for RekognitionClassifier {
    #[instrument(skip(self))]
    async fn classify(&self, reference: &str) -> Result<f64> {
        let (bucket, key) = parse_storage_reference(reference)
            .ok_or_else(|| anyhow!("Unsupported media reference: {reference}"))?;

        let image = Image::builder()
            .s3_object(S3Object::builder().bucket(bucket).name(key).build())
            .build();

        let response = self
            .client
            .detect_faces()
            .image(image)
            .send()
            .await
            .context("Rekognition face detection failed")?;

        let score = face_score(response.face_details());
        debug!(faces = response.face_details().len(), score, "Image annotated");

        Ok(score)
    }
}

/// Highest face confidence scaled to [0, 1]
fn face_score(faces: &[FaceDetail]) -> f64 {
    faces
        .iter()
        .filter_map(FaceDetail::confidence)
        .map(|confidence| f64::from(confidence) / 100.0)
        .fold(0.0, f64::max)
}
