use crate::config::IndexConfig;
use crate::media_types::MediaCategory;
use crate::record::{GeoPoint, NumericField, Record, EARTH_RADIUS_KM};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Document index over records keyed by id.
///
/// Result order is unspecified; callers sort if they need to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Replace-or-create the document at `record.id`, all fields or none
    async fn upsert(&self, record: &Record) -> Result<()>;

    /// Records within `radius_km` (great-circle, inclusive) of `center`
    async fn query_radius(&self, center: GeoPoint, radius_km: f64) -> Result<Vec<Record>>;

    /// Records whose `field` is `>= min_value`
    async fn query_threshold(&self, field: NumericField, min_value: f64) -> Result<Vec<Record>>;

    /// Connectivity check for readiness probes
    async fn ping(&self) -> Result<()>;
}

const RECORD_COLUMNS: &str = "id, author, message, lat, lon, media_url, media_category, \
                              quality_score, created_at";

/// Row shape of the `records` table
#[derive(Debug, Clone, FromRow)]
struct RecordRow {
    id: Uuid,
    author: String,
    message: String,
    lat: f64,
    lon: f64,
    media_url: Option<String>,
    media_category: Option<String>,
    quality_score: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for Record {
    type Error = anyhow::Error;

    fn try_from(row: RecordRow) -> Result<Self> {
        let media_category = row
            .media_category
            .as_deref()
            .map(str::parse::<MediaCategory>)
            .transpose()
            .map_err(|e| anyhow!("Record {}: {e}", row.id))?;

        Ok(Record {
            id: row.id,
            author: row.author,
            message: row.message,
            location: GeoPoint::new(row.lat, row.lon),
            media_url: row.media_url,
            media_category,
            quality_score: row.quality_score,
            created_at: row.created_at,
        })
    }
}

fn decode_rows(rows: Vec<RecordRow>) -> Result<Vec<Record>> {
    rows.into_iter().map(Record::try_from).collect()
}

/// PostgreSQL-backed search index
pub struct PgSearchIndex {
    pool: PgPool,
}

impl PgSearchIndex {
    /// Create a new index with a connection pool
    pub async fn new(config: &IndexConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .context("index.url is required for the postgres backend")?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL search index");

        Ok(Self::from_pool(pool))
    }

    /// Use an existing pool; migrations are left to the caller
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for PgSearchIndex {
    #[instrument(skip(self, record), fields(record_id = %record.id))]
    async fn upsert(&self, record: &Record) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO records (
                id, author, message, lat, lon,
                media_url, media_category, quality_score, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                author = EXCLUDED.author,
                message = EXCLUDED.message,
                lat = EXCLUDED.lat,
                lon = EXCLUDED.lon,
                media_url = EXCLUDED.media_url,
                media_category = EXCLUDED.media_category,
                quality_score = EXCLUDED.quality_score,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(record.id)
        .bind(&record.author)
        .bind(&record.message)
        .bind(record.location.lat)
        .bind(record.location.lon)
        .bind(&record.media_url)
        .bind(record.media_category.map(|c| c.as_str()))
        .bind(record.quality_score)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert record")?;

        debug!(record_id = %record.id, "Record indexed");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_radius(&self, center: GeoPoint, radius_km: f64) -> Result<Vec<Record>> {
        // Haversine, mirroring GeoPoint::distance_km
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM records
            WHERE 2 * $3 * asin(least(1.0, sqrt(
                power(sin(radians(lat - $1) / 2), 2)
                + cos(radians($1)) * cos(radians(lat))
                  * power(sin(radians(lon - $2) / 2), 2)
            ))) <= $4
            "#
        );

        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(center.lat)
            .bind(center.lon)
            .bind(EARTH_RADIUS_KM)
            .bind(radius_km)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query records by radius")?;

        decode_rows(rows)
    }

    #[instrument(skip(self))]
    async fn query_threshold(&self, field: NumericField, min_value: f64) -> Result<Vec<Record>> {
        // Column names come from a closed enum, never from caller text.
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE {} >= $1",
            field.column()
        );

        let rows = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(min_value)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query records by threshold")?;

        decode_rows(rows)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Search index unreachable")?;
        Ok(())
    }
}

/// In-process index for local development and tests
#[derive(Default)]
pub struct MemorySearchIndex {
    records: RwLock<HashMap<Uuid, Record>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<Record> {
        self.records.read().get(&id).cloned()
    }

    fn filter(&self, predicate: impl Fn(&Record) -> bool) -> Vec<Record> {
        self.records
            .read()
            .values()
            .filter(|record| predicate(*record))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn upsert(&self, record: &Record) -> Result<()> {
        self.records.write().insert(record.id, record.clone());
        Ok(())
    }

    async fn query_radius(&self, center: GeoPoint, radius_km: f64) -> Result<Vec<Record>> {
        Ok(self.filter(|record| center.distance_km(&record.location) <= radius_km))
    }

    async fn query_threshold(&self, field: NumericField, min_value: f64) -> Result<Vec<Record>> {
        Ok(self.filter(|record| field.value(record) >= min_value))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
