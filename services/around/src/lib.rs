//! Around Service
//!
//! Geotagged post ingestion and search. Authenticated users submit a short
//! message pinned to a location, optionally with a photo or video. Media is
//! written to S3 and made publicly readable, images are scored for faces by
//! Rekognition, and the finished record is indexed for proximity and quality
//! lookups.
//!
//! ## Architecture
//!
//! ```text
//!  POST /post                                      GET /search, /cluster
//!      │                                                    │
//!      ▼                                                    ▼
//! ┌──────────────┐  store   ┌──────────────┐         ┌──────────────┐
//! │ Ingestion    │─────────▶│ Media Store  │         │ Query        │
//! │ Coordinator  │          │ (S3)         │         │ Service      │
//! └──────────────┘          └──────────────┘         └──────────────┘
//!      │      │   classify  ┌──────────────┐                │
//!      │      └────────────▶│ Classifier   │                │
//!      │                    │ (Rekognition)│                │
//!      │ upsert             └──────────────┘                │
//!      ▼                                                    │
//! ┌──────────────────────────────────────────┐              │
//! │ Search Index (PostgreSQL / in-memory)    │◀─────────────┘
//! └──────────────────────────────────────────┘
//! ```
//!
//! The write path is not transactional: media stored before a later failure
//! stays in the bucket.

pub mod api;
pub mod auth;
pub mod classifier;
pub mod config;
pub mod error;
pub mod ingest;
pub mod media_store;
pub mod media_types;
pub mod query;
pub mod record;
pub mod search_index;

pub use api::{create_router, start_api_server, AppState};
pub use auth::{Identity, IdentityResolver, JwtIdentityResolver};
pub use classifier::{ContentClassifier, RekognitionClassifier};
pub use config::Config;
pub use error::ServiceError;
pub use ingest::{IngestionCoordinator, MediaUpload, NewPost};
pub use media_store::{MediaStore, S3MediaStore};
pub use media_types::{MediaCategory, MediaCategoryTable};
pub use query::{QueryService, CLUSTER_THRESHOLD, DEFAULT_RANGE_KM};
pub use record::{GeoPoint, NumericField, Record};
pub use search_index::{MemorySearchIndex, PgSearchIndex, SearchIndex};
