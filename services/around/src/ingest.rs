//! Ingestion coordinator.
//!
//! Turns one submission into one indexed record:
//!
//! 1. assign a fresh id
//! 2. store media (when present) under that id
//! 3. score `image` media with the content classifier
//! 4. upsert the finished record into the search index
//!
//! The steps span three independent stores and are not transactional. A
//! failure after step 2 leaves the stored object in place; it is logged with
//! its key and otherwise left alone.

use crate::classifier::ContentClassifier;
use crate::error::ServiceError;
use crate::media_store::MediaStore;
use crate::media_types::{content_type_for, MediaCategory, MediaCategoryTable};
use crate::record::{GeoPoint, Record};
use crate::search_index::SearchIndex;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// A validated submission from an authenticated author
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author: String,
    pub message: String,
    pub location: GeoPoint,
    pub media: Option<MediaUpload>,
}

/// Attached media with the filename suggested by the client
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub filename: String,
    pub bytes: Bytes,
}

pub struct IngestionCoordinator {
    media_store: Arc<dyn MediaStore>,
    classifier: Arc<dyn ContentClassifier>,
    index: Arc<dyn SearchIndex>,
    categories: MediaCategoryTable,
}

impl IngestionCoordinator {
    pub fn new(
        media_store: Arc<dyn MediaStore>,
        classifier: Arc<dyn ContentClassifier>,
        index: Arc<dyn SearchIndex>,
        categories: MediaCategoryTable,
    ) -> Self {
        Self {
            media_store,
            classifier,
            index,
            categories,
        }
    }

    /// Run the pipeline for one post, returning the indexed record
    #[instrument(skip(self, post), fields(author = %post.author, has_media = post.media.is_some()))]
    pub async fn ingest(&self, post: NewPost) -> Result<Record, ServiceError> {
        let result = self.run(post).await;

        match &result {
            Ok(record) => {
                metrics::counter!("around.records.ingested").increment(1);
                info!(
                    record_id = %record.id,
                    category = record.media_category.map(|c| c.as_str()).unwrap_or("none"),
                    quality_score = record.quality_score,
                    "Post ingested"
                );
            }
            Err(e) => {
                metrics::counter!("around.ingest.failed", "kind" => e.code()).increment(1);
            }
        }

        result
    }

    async fn run(&self, post: NewPost) -> Result<Record, ServiceError> {
        let id = Uuid::new_v4();
        let mut record = Record {
            id,
            author: post.author,
            message: post.message,
            location: post.location,
            media_url: None,
            media_category: None,
            quality_score: 0.0,
            created_at: Utc::now(),
        };

        let Some(media) = post.media else {
            return self.index_record(record, None).await;
        };

        let key = id.to_string();
        let category = self.categories.categorize(&media.filename);
        let content_type = content_type_for(&media.filename);

        let url = self
            .media_store
            .store(&key, media.bytes, content_type)
            .await
            .map_err(ServiceError::StorageWrite)?;

        record.media_url = Some(url);
        record.media_category = Some(category);

        if category == MediaCategory::Image {
            match self.score_image(&key).await {
                Ok(score) => record.quality_score = score,
                Err(e) => {
                    warn!(record_id = %id, key = %key, "Stored media orphaned by classification failure");
                    return Err(e);
                }
            }
        }

        self.index_record(record, Some(&key)).await
    }

    async fn score_image(&self, key: &str) -> Result<f64, ServiceError> {
        let reference = self.media_store.reference(key);
        let score = self
            .classifier
            .classify(&reference)
            .await
            .map_err(ServiceError::Classification)?;

        if !(0.0..=1.0).contains(&score) {
            return Err(ServiceError::Classification(anyhow::anyhow!(
                "Classifier returned out-of-range score {score} for {reference}"
            )));
        }

        Ok(score)
    }

    async fn index_record(
        &self,
        record: Record,
        stored_key: Option<&str>,
    ) -> Result<Record, ServiceError> {
        if let Err(e) = self.index.upsert(&record).await {
            if let Some(key) = stored_key {
                warn!(record_id = %record.id, key = %key, "Stored media orphaned by index failure");
            }
            return Err(ServiceError::IndexWrite(e));
        }

        Ok(record)
    }
}
