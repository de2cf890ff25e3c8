use crate::error::ServiceError;
use crate::record::{GeoPoint, NumericField, Record};
use crate::search_index::SearchIndex;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Proximity search radius when the caller gives none
pub const DEFAULT_RANGE_KM: f64 = 200.0;

/// Fixed minimum for cluster search; not caller-configurable
pub const CLUSTER_THRESHOLD: f64 = 0.9;

/// Read side: turns caller parameters into index queries
pub struct QueryService {
    index: Arc<dyn SearchIndex>,
}

impl QueryService {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }

    /// Records within `range_km` (default 200) of `center`, in arrival order
    #[instrument(skip(self))]
    pub async fn proximity(
        &self,
        center: GeoPoint,
        range_km: Option<f64>,
    ) -> Result<Vec<Record>, ServiceError> {
        let range_km = range_km.unwrap_or(DEFAULT_RANGE_KM);
        if !range_km.is_finite() || range_km < 0.0 {
            return Err(ServiceError::Validation(format!(
                "range must be a non-negative number of kilometres, got {range_km}"
            )));
        }

        metrics::counter!("around.queries", "kind" => "proximity").increment(1);

        let records = self
            .index
            .query_radius(center, range_km)
            .await
            .map_err(ServiceError::IndexRead)?;

        debug!(matches = records.len(), range_km, "Proximity search complete");
        Ok(in_arrival_order(records))
    }

    /// Records whose `term` field is at least 0.9, in arrival order
    #[instrument(skip(self))]
    pub async fn cluster(&self, term: &str) -> Result<Vec<Record>, ServiceError> {
        let field: NumericField = term.parse()?;

        metrics::counter!("around.queries", "kind" => "cluster").increment(1);

        let records = self
            .index
            .query_threshold(field, CLUSTER_THRESHOLD)
            .await
            .map_err(ServiceError::IndexRead)?;

        debug!(matches = records.len(), field = field.column(), "Cluster search complete");
        Ok(in_arrival_order(records))
    }

    /// Whether the backing index answers
    pub async fn ready(&self) -> anyhow::Result<()> {
        self.index.ping().await
    }
}

fn in_arrival_order(mut records: Vec<Record>) -> Vec<Record> {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_types::MediaCategory;
    use crate::search_index::{MemorySearchIndex, MockSearchIndex};
    use anyhow::anyhow;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn record(lat: f64, lon: f64, quality_score: f64, age_secs: i64) -> Record {
        Record {
            id: Uuid::new_v4(),
            author: "alice".to_string(),
            message: "hi".to_string(),
            location: GeoPoint::new(lat, lon),
            media_url: None,
            media_category: None,
            quality_score,
            created_at: Utc::now() - Duration::seconds(age_secs),
        }
    }

    async fn service_with(records: &[Record]) -> QueryService {
        let index = Arc::new(MemorySearchIndex::new());
        for r in records {
            index.upsert(r).await.unwrap();
        }
        QueryService::new(index)
    }

    #[tokio::test]
    async fn test_default_range_is_200km() {
        let seattle = GeoPoint::new(47.6, -122.3);
        let near = record(47.6, -122.3, 0.0, 0);
        // Roughly 190 km south and 250 km south
        let inside = record(45.9, -122.3, 0.0, 0);
        let outside = record(45.35, -122.3, 0.0, 0);
        assert!(seattle.distance_km(&inside.location) < DEFAULT_RANGE_KM);
        assert!(seattle.distance_km(&outside.location) > DEFAULT_RANGE_KM);

        let service = service_with(&[near.clone(), inside.clone(), outside]).await;
        let mut ids: Vec<Uuid> = service
            .proximity(seattle, None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();

        let mut expected = vec![near.id, inside.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_radius_boundary_is_included() {
        let center = GeoPoint::new(10.0, 20.0);
        let edge = record(10.5, 20.5, 0.0, 0);
        let radius = center.distance_km(&edge.location);

        let service = service_with(&[edge.clone()]).await;
        let found = service.proximity(center, Some(radius)).await.unwrap();
        assert_eq!(found, vec![edge]);
    }

    #[tokio::test]
    async fn test_far_query_excludes_record() {
        let post = record(47.6, -122.3, 0.95, 0);
        let service = service_with(&[post]).await;

        let found = service
            .proximity(GeoPoint::new(0.0, 0.0), Some(1.0))
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_range_is_rejected() {
        let service = service_with(&[]).await;
        for range in [-1.0, f64::NAN, f64::INFINITY] {
            let err = service
                .proximity(GeoPoint::default(), Some(range))
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::Validation(_)), "{range}");
        }
    }

    #[tokio::test]
    async fn test_cluster_threshold_is_inclusive() {
        let mut exact = record(0.0, 0.0, 0.9, 0);
        exact.media_category = Some(MediaCategory::Image);
        let mut high = record(0.0, 0.0, 0.95, 0);
        high.media_category = Some(MediaCategory::Image);
        let low = record(0.0, 0.0, 0.5, 0);

        let service = service_with(&[exact.clone(), high.clone(), low]).await;
        let mut ids: Vec<Uuid> = service
            .cluster("qualityScore")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();

        let mut expected = vec![exact.id, high.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_cluster_rejects_unknown_term_without_querying() {
        let mut index = MockSearchIndex::new();
        index.expect_query_threshold().never();
        let service = QueryService::new(Arc::new(index));

        let err = service.cluster("author").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cluster_always_uses_fixed_threshold() {
        let mut index = MockSearchIndex::new();
        index
            .expect_query_threshold()
            .withf(|field, min| *field == NumericField::QualityScore && *min == CLUSTER_THRESHOLD)
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        let service = QueryService::new(Arc::new(index));

        assert!(service.cluster("face").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_results_come_back_in_arrival_order() {
        let oldest = record(0.0, 0.0, 0.0, 30);
        let middle = record(0.0, 0.0, 0.0, 20);
        let newest = record(0.0, 0.0, 0.0, 10);
        let service = service_with(&[newest.clone(), oldest.clone(), middle.clone()]).await;

        let found = service
            .proximity(GeoPoint::new(0.0, 0.0), Some(0.0))
            .await
            .unwrap();
        assert_eq!(found, vec![oldest, middle, newest]);
    }

    #[tokio::test]
    async fn test_index_failure_is_index_read() {
        let mut index = MockSearchIndex::new();
        index
            .expect_query_radius()
            .returning(|_, _| Err(anyhow!("timeout")));
        let service = QueryService::new(Arc::new(index));

        let err = service.proximity(GeoPoint::default(), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::IndexRead(_)));
    }
}
