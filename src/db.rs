//! Schema setup and sample data.

use crate::{models::movie::MovieForm, services::movie_repository::MovieRepository};
use anyhow::Result;
use sqlx::SqlitePool;

const INIT_SQL: &str = include_str!("../migrations/0001_init.sql");

const SAMPLE_MOVIES: [(&str, &str, &str, &str, &str); 6] = [
    ("When Harry Met Sally", "1989-02-12", "Romantic Comedy", "7.99", "R"),
    ("Ghostbusters", "1984-03-13", "Comedy", "8.99", "PG"),
    ("Ghostbusters 2", "1986-02-23", "Comedy", "9.99", "PG"),
    ("Rio Bravo", "1959-04-15", "Western", "3.99", "G"),
    ("The Ghost Writer", "2010-02-12", "Thriller", "12.50", "PG-13"),
    ("Aliens", "1986-07-18", "Horror", "11.00", "R"),
];

/// Apply the embedded schema. Every statement is idempotent.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = INIT_SQL
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

/// Insert the sample catalog when the table is empty. Returns how many rows
/// were written.
pub async fn seed_if_empty(repo: &dyn MovieRepository) -> Result<usize> {
    if repo.count_matching(&Default::default()).await? > 0 {
        tracing::info!("movies table already populated; skipping seed");
        return Ok(0);
    }

    for (title, release_date, genre, price, rating) in SAMPLE_MOVIES {
        let form = MovieForm {
            title: Some(title.into()),
            release_date: Some(release_date.into()),
            genre: Some(genre.into()),
            price: Some(price.into()),
            rating: Some(rating.into()),
        };
        let draft = form
            .validate()
            .map_err(|errors| anyhow::anyhow!("invalid sample movie {title}: {errors:?}"))?;
        repo.insert(&draft, None).await?;
    }

    tracing::info!(count = SAMPLE_MOVIES.len(), "seeded sample movies");
    Ok(SAMPLE_MOVIES.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{movie_repository::SqliteMovieRepository, test_support::memory_pool};

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn seed_runs_only_once() {
        let repo = SqliteMovieRepository::new(memory_pool().await);
        assert_eq!(seed_if_empty(&repo).await.unwrap(), SAMPLE_MOVIES.len());
        assert_eq!(seed_if_empty(&repo).await.unwrap(), 0);
        assert_eq!(
            repo.count_matching(&Default::default()).await.unwrap(),
            SAMPLE_MOVIES.len() as u64
        );
    }
}
