//! Fixed orderings offered by the movie list.

use serde::{Serialize, Serializer};

/// One of the six list orderings.
///
/// Callers send the ordering as an integer code. Any code outside the known
/// range falls back to [`SortOption::TitleAsc`] instead of being rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortOption {
    #[default]
    TitleAsc,
    TitleDesc,
    DateDesc,
    DateAsc,
    PriceDesc,
    PriceAsc,
}

impl SortOption {
    pub const ALL: [SortOption; 6] = [
        SortOption::TitleAsc,
        SortOption::TitleDesc,
        SortOption::DateDesc,
        SortOption::DateAsc,
        SortOption::PriceDesc,
        SortOption::PriceAsc,
    ];

    /// Map a wire code to an ordering. Unknown codes mean title ascending.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => SortOption::TitleDesc,
            2 => SortOption::DateDesc,
            3 => SortOption::DateAsc,
            4 => SortOption::PriceDesc,
            5 => SortOption::PriceAsc,
            _ => SortOption::TitleAsc,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            SortOption::TitleAsc => 0,
            SortOption::TitleDesc => 1,
            SortOption::DateDesc => 2,
            SortOption::DateAsc => 3,
            SortOption::PriceDesc => 4,
            SortOption::PriceAsc => 5,
        }
    }

    /// SQL `ORDER BY` body for this ordering. Titles order by their
    /// lowercased form; `id` keeps ties stable.
    pub fn order_by(self) -> &'static str {
        match self {
            SortOption::TitleAsc => "title_folded ASC, id ASC",
            SortOption::TitleDesc => "title_folded DESC, id ASC",
            SortOption::DateDesc => "release_date DESC, id ASC",
            SortOption::DateAsc => "release_date ASC, id ASC",
            SortOption::PriceDesc => "price_cents DESC, id ASC",
            SortOption::PriceAsc => "price_cents ASC, id ASC",
        }
    }
}

/// Serialized as its wire code so responses can be fed back into requests.
impl Serialize for SortOption {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl From<Option<i64>> for SortOption {
    fn from(code: Option<i64>) -> Self {
        code.map(SortOption::from_code).unwrap_or_default()
    }
}
