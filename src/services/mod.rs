pub mod association;
pub mod collaborative;
pub mod content;
pub mod loader;
pub mod preprocess;
pub mod recommendations;
pub mod similarity;
pub mod stats;

pub use loader::{InMemoryTableSource, PgTableSource, TableSource};
pub use recommendations::{
    CachedRecommender, PipelineSettings, RecommendationEngine, Recommender, RecommenderError,
};
