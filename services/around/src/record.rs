use crate::error::ServiceError;
use crate::media_types::MediaCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Latitude/longitude pair in degrees. Bounds are not validated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance in kilometres (haversine)
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let half_dlat = (other.lat - self.lat).to_radians() / 2.0;
        let half_dlon = (other.lon - self.lon).to_radians() / 2.0;

        let a = half_dlat.sin().powi(2) + lat1.cos() * lat2.cos() * half_dlon.sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}

/// One indexed post plus derived media metadata. Never mutated after indexing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: Uuid,
    pub author: String,
    pub message: String,
    pub location: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_category: Option<MediaCategory>,
    /// Only meaningful when `media_category` is `Image`; 0 otherwise
    #[serde(default)]
    pub quality_score: f64,
    pub created_at: DateTime<Utc>,
}

/// Numeric record fields a threshold query may filter on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    QualityScore,
    Latitude,
    Longitude,
}

impl NumericField {
    /// Column name in the records table
    pub fn column(&self) -> &'static str {
        match self {
            Self::QualityScore => "quality_score",
            Self::Latitude => "lat",
            Self::Longitude => "lon",
        }
    }

    pub fn value(&self, record: &Record) -> f64 {
        match self {
            Self::QualityScore => record.quality_score,
            Self::Latitude => record.location.lat,
            Self::Longitude => record.location.lon,
        }
    }
}

impl FromStr for NumericField {
    type Err = ServiceError;

    /// Accepts the JSON field name, the column name, and the legacy `face` alias
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qualityScore" | "quality_score" | "face" => Ok(Self::QualityScore),
            "lat" | "location.lat" => Ok(Self::Latitude),
            "lon" | "location.lon" => Ok(Self::Longitude),
            other => Err(ServiceError::Validation(format!(
                "unsupported search term: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        Record {
            id: Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            author: "alice".to_string(),
            message: "hi".to_string(),
            location: GeoPoint::new(47.6, -122.3),
            media_url: None,
            media_category: None,
            quality_score: 0.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = GeoPoint::new(47.6, -122.3);
        assert_eq!(p.distance_km(&p), 0.0);
    }

    #[test]
    fn test_one_degree_along_equator() {
        let d = GeoPoint::new(0.0, 0.0).distance_km(&GeoPoint::new(0.0, 1.0));
        assert!((d - 111.195).abs() < 0.01, "got {d}");
    }

    #[test]
    fn test_distance_is_symmetric_across_antimeridian() {
        let a = GeoPoint::new(10.0, 179.5);
        let b = GeoPoint::new(10.0, -179.5);
        assert!((a.distance_km(&b) - b.distance_km(&a)).abs() < 1e-9);
        assert!(a.distance_km(&b) < 110.0);
    }

    #[test]
    fn test_seattle_to_portland() {
        let seattle = GeoPoint::new(47.6062, -122.3321);
        let portland = GeoPoint::new(45.5152, -122.6784);
        let d = seattle.distance_km(&portland);
        assert!((230.0..236.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_record_json_shape_without_media() {
        let json = serde_json::to_value(sample_record()).unwrap();

        assert_eq!(json["author"], "alice");
        assert_eq!(json["location"]["lat"], 47.6);
        assert_eq!(json["qualityScore"], 0.0);
        assert!(json.get("mediaUrl").is_none());
        assert!(json.get("mediaCategory").is_none());
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_record_json_shape_with_media() {
        let mut record = sample_record();
        record.media_url = Some("https://cdn.example.com/x".to_string());
        record.media_category = Some(MediaCategory::Image);
        record.quality_score = 0.95;

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["mediaCategory"], "image");
        assert_eq!(json["mediaUrl"], "https://cdn.example.com/x");

        let decoded: Record = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_numeric_field_parsing() {
        assert_eq!("qualityScore".parse::<NumericField>().unwrap(), NumericField::QualityScore);
        assert_eq!("face".parse::<NumericField>().unwrap(), NumericField::QualityScore);
        assert_eq!("lat".parse::<NumericField>().unwrap(), NumericField::Latitude);

        let err = "message".parse::<NumericField>().unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!("quality_score; DROP TABLE records".parse::<NumericField>().is_err());
    }

    #[test]
    fn test_numeric_field_value() {
        let mut record = sample_record();
        record.quality_score = 0.42;
        assert_eq!(NumericField::QualityScore.value(&record), 0.42);
        assert_eq!(NumericField::Longitude.value(&record), -122.3);
    }
}
