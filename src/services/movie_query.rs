//! Movie list query builder.
//!
//! Turns raw list parameters into a normalized [`MovieQuery`]: search/genre/
//! rating filters combined with AND, one of the fixed [`SortOption`]s and a
//! requested page. The filters render into SQL through `sqlx::QueryBuilder`;
//! [`MovieQuerySource`] exposes a query as a [`PageSource`] so the pagination
//! engine can count it before fetching one page.

use crate::{
    models::{movie::Movie, page::PageSource, sort::SortOption},
    services::movie_repository::{MovieRepository, RepositoryError},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, sqlite::Sqlite};
use std::num::IntErrorKind;

/// List parameters as they arrive on the query string.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListParams {
    pub genre: Option<String>,
    pub rating: Option<String>,
    /// Kept as text so a blank or malformed value falls back instead of
    /// failing extraction.
    pub sort: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
}

/// Conjunctive filter over the `movies` table. `None` matches everything.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct MovieFilter {
    /// Case-insensitive substring of the title.
    pub search: Option<String>,
    /// Exact, case-sensitive genre.
    pub genre: Option<String>,
    /// Exact rating.
    pub rating: Option<String>,
}

impl MovieFilter {
    /// Append ` AND ...` clauses for every active filter. The builder must
    /// already hold a `WHERE` clause.
    pub fn push_conditions(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        if let Some(search) = &self.search {
            // SQLite's lower() folds ASCII only; titles are folded on write
            // and the needle here. instr() keeps `%` and `_` literal.
            builder.push(" AND instr(title_folded, ");
            builder.push_bind(search.to_lowercase());
            builder.push(") > 0");
        }
        if let Some(genre) = &self.genre {
            builder.push(" AND genre = ");
            builder.push_bind(genre.clone());
        }
        if let Some(rating) = &self.rating {
            builder.push(" AND rating = ");
            builder.push_bind(rating.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.search.is_none() && self.genre.is_none() && self.rating.is_none()
    }
}

/// A fully normalized list request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MovieQuery {
    pub filter: MovieFilter,
    pub sort: SortOption,
    pub page: Option<i64>,
}

impl MovieQuery {
    /// Normalize raw parameters. Empty strings are treated as absent, and a
    /// search always restarts paging at page 1.
    pub fn from_params(params: ListParams) -> Self {
        let search = non_empty(params.search);
        let page = if search.is_some() {
            Some(1)
        } else {
            lenient_int(params.page.as_deref())
        };

        Self {
            filter: MovieFilter {
                search,
                genre: non_empty(params.genre),
                rating: non_empty(params.rating),
            },
            sort: SortOption::from(lenient_int(params.sort.as_deref())),
            page,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Parse an integer query value without ever rejecting it. Out-of-range
/// numbers saturate; anything else that is not a number is absent.
fn lenient_int(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim();
    match raw.parse::<i64>() {
        Ok(value) => Some(value),
        Err(err) => match err.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

/// A query bound to a repository, ready to be paged.
pub struct MovieQuerySource<'a> {
    repo: &'a dyn MovieRepository,
    query: &'a MovieQuery,
}

impl<'a> MovieQuerySource<'a> {
    pub fn new(repo: &'a dyn MovieRepository, query: &'a MovieQuery) -> Self {
        Self { repo, query }
    }
}

#[async_trait]
impl PageSource for MovieQuerySource<'_> {
    type Item = Movie;
    type Error = RepositoryError;

    async fn count(&self) -> Result<u64, RepositoryError> {
        self.repo.count_matching(&self.query.filter).await
    }

    async fn slice(&self, offset: u64, limit: u64) -> Result<Vec<Movie>, RepositoryError> {
        self.repo
            .fetch_matching(&self.query.filter, self.query.sort, offset, limit)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_strings_are_absent() {
        let query = MovieQuery::from_params(ListParams {
            genre: Some(String::new()),
            rating: Some(String::new()),
            search: Some(String::new()),
            sort: Some(String::new()),
            page: Some("3".into()),
        });
        assert!(query.filter.is_empty());
        assert_eq!(query.page, Some(3));
        assert_eq!(query.sort, SortOption::TitleAsc);
    }

    #[test]
    fn search_forces_first_page() {
        let query = MovieQuery::from_params(ListParams {
            search: Some("ghost".into()),
            page: Some("5".into()),
            sort: Some("4".into()),
            ..Default::default()
        });
        assert_eq!(query.page, Some(1));
        assert_eq!(query.sort, SortOption::PriceDesc);
        assert_eq!(query.filter.search.as_deref(), Some("ghost"));
    }

    #[test]
    fn conditions_render_in_order() {
        let filter = MovieFilter {
            search: Some("a".into()),
            genre: Some("Drama".into()),
            rating: Some("R".into()),
        };
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT id FROM movies WHERE 1 = 1");
        filter.push_conditions(&mut builder);
        assert_eq!(
            builder.sql(),
            "SELECT id FROM movies WHERE 1 = 1 AND instr(title_folded, ?) > 0 \
             AND genre = ? AND rating = ?"
        );
    }

    #[test]
    fn malformed_numbers_fall_back() {
        for (sort, page) in [("", ""), ("xyz", "abc"), (" 2x", "1.5")] {
            let query = MovieQuery::from_params(ListParams {
                sort: Some(sort.into()),
                page: Some(page.into()),
                ..Default::default()
            });
            assert_eq!(query.sort, SortOption::TitleAsc, "sort={sort:?}");
            assert_eq!(query.page, None, "page={page:?}");
        }
    }

    #[test]
    fn overflowing_numbers_saturate() {
        assert_eq!(lenient_int(Some("99999999999999999999")), Some(i64::MAX));
        assert_eq!(lenient_int(Some("-99999999999999999999")), Some(i64::MIN));
        assert_eq!(lenient_int(Some(" 7 ")), Some(7));
        assert_eq!(lenient_int(None), None);
    }
}
