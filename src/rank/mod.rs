pub mod bucket;
pub mod engine;
pub mod guard;

pub use engine::{RankEngine, RankView, ScoreByRankOptions};
pub use guard::{ConfigurationGuard, EngineState, META_DOCUMENT_ID};
