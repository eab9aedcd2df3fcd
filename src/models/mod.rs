//! Core data models for the movie catalog.
//!
//! `movie` holds the persisted record and its form/validation types, `sort`
//! the fixed list orderings and `page` the pagination engine. Rows map to the
//! `movies` table via `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod movie;
pub mod page;
pub mod sort;
