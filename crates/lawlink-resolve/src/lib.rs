//! Citation resolution: normalise, then try exact, fuzzy, and semantic
//! matching in order, and aggregate the resolved descriptions into a
//! context passage for generation.

pub mod context;
pub mod fuzzy;
mod lawlink;
mod resolver;

pub use context::{build_context, legal_context_section};
pub use fuzzy::{FuzzyMatch, best_match, similarity};
pub use lawlink::LawLink;
pub use resolver::{ResolvedBatch, Resolver};
