pub mod config;
pub mod matching;
pub mod normalize;
pub mod record;
pub mod schema;

pub use config::{ConfigError, EngineConfig, IndexConfig, ResolverConfig};
pub use matching::{LawInfo, MatchResult, MatchTier, NO_DESCRIPTION};
pub use normalize::normalize_reference;
pub use record::{CatalogSnapshot, IngestReport, LawEntry, LawRecord};
pub use schema::catalog;
