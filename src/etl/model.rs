use chrono::NaiveDate;
use serde::Serialize;

pub const RELEASE_DATE: &str = "release_date";
pub const PRICE: &str = "price";
pub const POSITIVE_REVIEWS: &str = "positive_reviews";
pub const NEGATIVE_REVIEWS: &str = "negative_reviews";
pub const USER_SCORE: &str = "user_score";
pub const METACRITIC_SCORE: &str = "metacritic_score";
pub const AVERAGE_PLAYTIME_FOREVER: &str = "average_playtime_forever";
pub const AVERAGE_PLAYTIME_2WEEKS: &str = "average_playtime_2weeks";
pub const MEDIAN_PLAYTIME_FOREVER: &str = "median_playtime_forever";
pub const MEDIAN_PLAYTIME_2WEEKS: &str = "median_playtime_2weeks";
pub const GENRES: &str = "genres";
pub const CATEGORIES: &str = "categories";

/// Columns the extract must carry. Anything else is ignored.
pub const REQUIRED_COLUMNS: [&str; 12] = [
    RELEASE_DATE,
    PRICE,
    POSITIVE_REVIEWS,
    NEGATIVE_REVIEWS,
    USER_SCORE,
    METACRITIC_SCORE,
    AVERAGE_PLAYTIME_FOREVER,
    AVERAGE_PLAYTIME_2WEEKS,
    MEDIAN_PLAYTIME_FOREVER,
    MEDIAN_PLAYTIME_2WEEKS,
    GENRES,
    CATEGORIES,
];

/// The two multi-valued categorical fields, each backing one dimension table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum LabelField {
    Genres,
    Categories,
}

impl LabelField {
    pub const ALL: [Self; 2] = [Self::Genres, Self::Categories];

    pub fn column(self) -> &'static str {
        match self {
            Self::Genres => GENRES,
            Self::Categories => CATEGORIES,
        }
    }

    /// Prefix of the per-flag index names on this field's dimension table.
    pub fn index_prefix(self) -> &'static str {
        match self {
            Self::Genres => "idx_genre_",
            Self::Categories => "idx_category_",
        }
    }
}

/// One source row, every field still raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based line in the extract, header included
    pub line: usize,
    pub release_date: Option<String>,
    pub price: Option<String>,
    pub positive_reviews: Option<String>,
    pub negative_reviews: Option<String>,
    pub user_score: Option<String>,
    pub metacritic_score: Option<String>,
    pub average_playtime_forever: Option<String>,
    pub average_playtime_2weeks: Option<String>,
    pub median_playtime_forever: Option<String>,
    pub median_playtime_2weeks: Option<String>,
    pub genres: Option<String>,
    pub categories: Option<String>,
}

impl RawRecord {
    pub fn labels(&self, field: LabelField) -> Option<&str> {
        match field {
            LabelField::Genres => self.genres.as_deref(),
            LabelField::Categories => self.categories.as_deref(),
        }
    }
}

/// A record that survived cleaning. Every field is present and in domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedRecord {
    pub line: usize,
    pub release_date: NaiveDate,
    pub price: f64,
    pub positive_reviews: i64,
    pub negative_reviews: i64,
    pub user_score: f64,
    pub metacritic_score: i64,
    pub average_playtime_forever: i64,
    pub average_playtime_2weeks: i64,
    pub median_playtime_forever: i64,
    pub median_playtime_2weeks: i64,
    pub genres: String,
    pub categories: String,
}

impl CleanedRecord {
    pub fn labels(&self, field: LabelField) -> &str {
        match field {
            LabelField::Genres => &self.genres,
            LabelField::Categories => &self.categories,
        }
    }
}
