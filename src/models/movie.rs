//! Represents a movie record and the form it is created/edited from.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};
use regex::Regex;
use sqlx::FromRow;
use std::{str::FromStr, sync::LazyLock};

const TITLE_MIN_LEN: usize = 3;
const TITLE_MAX_LEN: usize = 60;
const GENRE_MAX_LEN: usize = 30;
const RATING_MAX_LEN: usize = 5;
const PRICE_MAX_SCALE: u32 = 2;

/// Uppercase start, then letters and whitespace only.
const GENRE_PATTERN: &str = r"^[A-Z]+[a-zA-Z\s]*$";

/// Uppercase start, then letters, digits, quotes, hyphens and whitespace.
const RATING_PATTERN: &str = r#"^[A-Z]+[a-zA-Z0-9"'\s-]*$"#;

static GENRE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(GENRE_PATTERN).expect("valid regex"));

static RATING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(RATING_PATTERN).expect("valid regex"));

/// A single catalog entry as exposed to callers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Movie {
    /// Database identity.
    pub id: i64,

    pub title: String,

    pub release_date: NaiveDate,

    pub genre: String,

    /// Price with two fractional digits, between 1 and 100.
    pub price: Decimal,

    pub rating: String,

    /// Public URI of the poster image in the blob store, if any.
    pub image_uri: Option<String>,

    /// Optimistic concurrency token; bumped on every update.
    pub version: i64,

    /// Timestamp of the last write.
    pub updated_at: DateTime<Utc>,
}

/// Row layout of the `movies` table. Price is stored as integer cents.
#[derive(Clone, FromRow, Debug)]
pub struct MovieRow {
    pub id: i64,
    pub title: String,
    pub release_date: NaiveDate,
    pub genre: String,
    pub price_cents: i64,
    pub rating: String,
    pub image_uri: Option<String>,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            release_date: row.release_date,
            genre: row.genre,
            price: Decimal::new(row.price_cents, PRICE_MAX_SCALE),
            rating: row.rating,
            image_uri: row.image_uri,
            version: row.version,
            updated_at: row.updated_at,
        }
    }
}

/// Validated movie fields, ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct MovieDraft {
    pub title: String,
    pub release_date: NaiveDate,
    pub genre: String,
    pub price: Decimal,
    pub rating: String,
}

impl MovieDraft {
    /// Lowercased title used for case-insensitive search and ordering.
    pub fn title_folded(&self) -> String {
        self.title.to_lowercase()
    }

    /// Price in cents, as stored in SQLite.
    pub fn price_cents(&self) -> i64 {
        (self.price * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .unwrap_or_default()
    }
}

/// Raw, unvalidated field values as they arrive from a form submission.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MovieForm {
    pub title: Option<String>,
    pub release_date: Option<String>,
    pub genre: Option<String>,
    pub price: Option<String>,
    pub rating: Option<String>,
}

/// A single field-level validation message.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl MovieForm {
    /// Validate every field and collect all failures.
    ///
    /// Rules:
    /// - title: required, 3–60 characters
    /// - release_date: required, `YYYY-MM-DD`
    /// - genre: required, ≤30 characters, uppercase letter then letters/whitespace
    /// - price: required, 1–100 inclusive, at most two fractional digits
    /// - rating: required, ≤5 characters, uppercase letter then letters, digits,
    ///   quotes, hyphens or whitespace
    pub fn validate(&self) -> Result<MovieDraft, Vec<FieldError>> {
        let mut errors = Vec::new();

        let title = required(&self.title, "title", &mut errors).and_then(|title| {
            let len = title.chars().count();
            if (TITLE_MIN_LEN..=TITLE_MAX_LEN).contains(&len) {
                Some(title.to_string())
            } else {
                errors.push(FieldError::new(
                    "title",
                    format!("must be between {TITLE_MIN_LEN} and {TITLE_MAX_LEN} characters"),
                ));
                None
            }
        });

        let release_date = required(&self.release_date, "release_date", &mut errors).and_then(
            |raw| match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                Ok(date) => Some(date),
                Err(_) => {
                    errors.push(FieldError::new(
                        "release_date",
                        "must be a calendar date formatted as YYYY-MM-DD",
                    ));
                    None
                }
            },
        );

        let genre = required(&self.genre, "genre", &mut errors).and_then(|genre| {
            if genre.chars().count() > GENRE_MAX_LEN {
                errors.push(FieldError::new(
                    "genre",
                    format!("must be at most {GENRE_MAX_LEN} characters"),
                ));
                None
            } else if !GENRE_RE.is_match(genre) {
                errors.push(FieldError::new(
                    "genre",
                    "must start with an uppercase letter and contain only letters and spaces",
                ));
                None
            } else {
                Some(genre.to_string())
            }
        });

        let price = required(&self.price, "price", &mut errors).and_then(|raw| {
            match Decimal::from_str(raw.trim()) {
                Ok(price) if price < Decimal::ONE || price > Decimal::ONE_HUNDRED => {
                    errors.push(FieldError::new("price", "must be between 1 and 100"));
                    None
                }
                Ok(price) if price.normalize().scale() > PRICE_MAX_SCALE => {
                    errors.push(FieldError::new(
                        "price",
                        "must have at most two fractional digits",
                    ));
                    None
                }
                Ok(mut price) => {
                    price.rescale(PRICE_MAX_SCALE);
                    Some(price)
                }
                Err(_) => {
                    errors.push(FieldError::new("price", "must be a decimal number"));
                    None
                }
            }
        });

        let rating = required(&self.rating, "rating", &mut errors).and_then(|rating| {
            if rating.chars().count() > RATING_MAX_LEN {
                errors.push(FieldError::new(
                    "rating",
                    format!("must be at most {RATING_MAX_LEN} characters"),
                ));
                None
            } else if !RATING_RE.is_match(rating) {
                errors.push(FieldError::new(
                    "rating",
                    "must start with an uppercase letter and contain only letters, digits, quotes, hyphens and spaces",
                ));
                None
            } else {
                Some(rating.to_string())
            }
        });

        match (title, release_date, genre, price, rating) {
            (Some(title), Some(release_date), Some(genre), Some(price), Some(rating))
                if errors.is_empty() =>
            {
                Ok(MovieDraft {
                    title,
                    release_date,
                    genre,
                    price,
                    rating,
                })
            }
            _ => Err(errors),
        }
    }
}

fn required<'a>(
    value: &'a Option<String>,
    field: &'static str,
    errors: &mut Vec<FieldError>,
) -> Option<&'a str> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            errors.push(FieldError::new(field, "is required"));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> MovieForm {
        MovieForm {
            title: Some("Ghostbusters".into()),
            release_date: Some("1984-03-13".into()),
            genre: Some("Comedy".into()),
            price: Some("8.99".into()),
            rating: Some("PG".into()),
        }
    }

    fn fields(errors: &[FieldError]) -> Vec<&'static str> {
        errors.iter().map(|e| e.field).collect()
    }

    #[test]
    fn valid_form_produces_draft() {
        let draft = form().validate().unwrap();
        assert_eq!(draft.title, "Ghostbusters");
        assert_eq!(draft.release_date, NaiveDate::from_ymd_opt(1984, 3, 13).unwrap());
        assert_eq!(draft.price_cents(), 899);
    }

    #[test]
    fn whole_number_price_is_rescaled() {
        let mut f = form();
        f.price = Some("100".into());
        let draft = f.validate().unwrap();
        assert_eq!(draft.price.to_string(), "100.00");
        assert_eq!(draft.price_cents(), 10_000);
    }

    #[test]
    fn all_missing_fields_are_reported_together() {
        let errors = MovieForm::default().validate().unwrap_err();
        assert_eq!(
            fields(&errors),
            vec!["title", "release_date", "genre", "price", "rating"]
        );
    }

    #[test]
    fn title_length_bounds() {
        let mut f = form();
        f.title = Some("It".into());
        assert_eq!(fields(&f.validate().unwrap_err()), vec!["title"]);

        f.title = Some("x".repeat(61));
        assert_eq!(fields(&f.validate().unwrap_err()), vec!["title"]);

        f.title = Some("x".repeat(60));
        assert!(f.validate().is_ok());
    }

    #[test]
    fn genre_pattern() {
        let mut f = form();
        for ok in ["Comedy", "Romantic Comedy", "SCIFI"] {
            f.genre = Some(ok.into());
            assert!(f.validate().is_ok(), "{ok} should be accepted");
        }
        for bad in ["comedy", "Sci-Fi", "Drama2", " Drama", "Ação"] {
            f.genre = Some(bad.into());
            assert_eq!(fields(&f.validate().unwrap_err()), vec!["genre"], "{bad}");
        }
    }

    #[test]
    fn rating_pattern_and_length() {
        let mut f = form();
        for ok in ["R", "PG-13", "G", "NC17", "R 'X'"] {
            f.rating = Some(ok.into());
            assert!(f.validate().is_ok(), "{ok} should be accepted");
        }
        for bad in ["pg", "PG-133", "13", "R!", "É"] {
            f.rating = Some(bad.into());
            assert_eq!(fields(&f.validate().unwrap_err()), vec!["rating"], "{bad}");
        }
    }

    #[test]
    fn price_range_and_scale() {
        let mut f = form();
        for bad in ["0.99", "100.01", "5.999", "abc"] {
            f.price = Some(bad.into());
            assert_eq!(fields(&f.validate().unwrap_err()), vec!["price"], "{bad}");
        }
        for ok in ["1", "1.00", "99.5", "5.990"] {
            f.price = Some(ok.into());
            assert!(f.validate().is_ok(), "{ok} should be accepted");
        }
    }

    #[test]
    fn bad_date_is_rejected() {
        let mut f = form();
        f.release_date = Some("13/03/1984".into());
        assert_eq!(fields(&f.validate().unwrap_err()), vec!["release_date"]);
    }

    #[test]
    fn row_converts_cents_to_decimal() {
        let row = MovieRow {
            id: 7,
            title: "Rio Bravo".into(),
            release_date: NaiveDate::from_ymd_opt(1959, 4, 15).unwrap(),
            genre: "Western".into(),
            price_cents: 399,
            rating: "G".into(),
            image_uri: None,
            version: 1,
            updated_at: Utc::now(),
        };
        let movie = Movie::from(row);
        assert_eq!(movie.price.to_string(), "3.99");
    }
}
