mod recommendation;
mod snapshot;
mod tables;

pub use recommendation::{
    DisplayStats, GenrePopularity, PositiveAnime, RecommendationSet, ScoreBucket,
};
pub use snapshot::{AnimeRecord, MergedReview, ParsedRating, PreprocessedData, UserRecord};
pub use tables::{Anime, Genre, IdList, Location, Rating, RawTables, Season, User};
