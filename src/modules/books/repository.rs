//! Persistence for books.
//!
//! Every statement binds its parameters. Uniqueness of `isbn` is enforced by the
//! table's `UNIQUE` constraint, and update/delete decide existence in the same
//! statement that mutates, so concurrent requests cannot race a separate
//! existence check.

use async_trait::async_trait;
use sqlx::SqlitePool;
use thiserror::Error;

use super::models::{Book, BookUpdate, NewBook};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("there is no book with isbn '{0}'")]
    NotFound(String),

    #[error("a book with isbn '{0}' already exists")]
    DuplicateKey(String),

    #[error("book storage is unavailable")]
    StorageUnavailable(#[source] sqlx::Error),
}

impl RepositoryError {
    /// Translate a storage failure for a statement keyed by `isbn`.
    fn from_storage(isbn: &str, error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &error {
            if db.is_unique_violation() {
                return RepositoryError::DuplicateKey(isbn.to_string());
            }
        }
        RepositoryError::StorageUnavailable(error)
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(error: sqlx::Error) -> Self {
        RepositoryError::StorageUnavailable(error)
    }
}

/// Storage operations for the book resource.
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn create(&self, book: NewBook) -> Result<Book, RepositoryError>;

    /// All books in insertion order.
    async fn list_all(&self) -> Result<Vec<Book>, RepositoryError>;

    async fn get_by_key(&self, isbn: &str) -> Result<Book, RepositoryError>;

    /// Overwrite every mutable field of the book stored under `isbn`.
    async fn update(&self, isbn: &str, changes: BookUpdate) -> Result<Book, RepositoryError>;

    async fn delete(&self, isbn: &str) -> Result<(), RepositoryError>;
}

/// SQLite-backed [`BookStore`].
#[derive(Debug, Clone)]
pub struct BookRepository {
    pool: SqlitePool,
}

impl BookRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookStore for BookRepository {
    #[tracing::instrument(skip(self, book), fields(isbn = %book.isbn))]
    async fn create(&self, book: NewBook) -> Result<Book, RepositoryError> {
        let created = sqlx::query_as::<_, Book>(
            "INSERT INTO books (isbn, amazon_url, author, language, pages, publisher, title, year)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING isbn, amazon_url, author, language, pages, publisher, title, year",
        )
        .bind(&book.isbn)
        .bind(&book.amazon_url)
        .bind(&book.author)
        .bind(&book.language)
        .bind(book.pages)
        .bind(&book.publisher)
        .bind(&book.title)
        .bind(book.year)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_storage(&book.isbn, e))?;

        tracing::info!("book created");
        Ok(created)
    }

    #[tracing::instrument(skip(self))]
    async fn list_all(&self) -> Result<Vec<Book>, RepositoryError> {
        let books = sqlx::query_as::<_, Book>(
            "SELECT isbn, amazon_url, author, language, pages, publisher, title, year
             FROM books
             ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    #[tracing::instrument(skip(self))]
    async fn get_by_key(&self, isbn: &str) -> Result<Book, RepositoryError> {
        sqlx::query_as::<_, Book>(
            "SELECT isbn, amazon_url, author, language, pages, publisher, title, year
             FROM books
             WHERE isbn = ?",
        )
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(isbn.to_string()))
    }

    #[tracing::instrument(skip(self, changes))]
    async fn update(&self, isbn: &str, changes: BookUpdate) -> Result<Book, RepositoryError> {
        let updated = sqlx::query_as::<_, Book>(
            "UPDATE books
             SET amazon_url = ?, author = ?, language = ?, pages = ?,
                 publisher = ?, title = ?, year = ?
             WHERE isbn = ?
             RETURNING isbn, amazon_url, author, language, pages, publisher, title, year",
        )
        .bind(&changes.amazon_url)
        .bind(&changes.author)
        .bind(&changes.language)
        .bind(changes.pages)
        .bind(&changes.publisher)
        .bind(&changes.title)
        .bind(changes.year)
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::from_storage(isbn, e))?
        .ok_or_else(|| RepositoryError::NotFound(isbn.to_string()))?;

        tracing::info!("book updated");
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, isbn: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM books WHERE isbn = ?")
            .bind(isbn)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(isbn.to_string()));
        }

        tracing::info!("book deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::MIGRATIONS;
    use shelf_db::Database;

    async fn repository() -> BookRepository {
        let db = Database::in_memory().await.unwrap();
        for migration in MIGRATIONS {
            db.apply_migration("books", migration.id, migration.up)
                .await
                .unwrap();
        }
        BookRepository::new(db.pool().clone())
    }

    fn new_book(isbn: &str) -> NewBook {
        NewBook {
            isbn: isbn.to_string(),
            amazon_url: "https://amazon.com/taco".to_string(),
            author: "Elie".to_string(),
            language: "English".to_string(),
            pages: 100,
            publisher: "Nothing publishers".to_string(),
            title: "my first book".to_string(),
            year: 2008,
        }
    }

    fn changes(title: &str) -> BookUpdate {
        BookUpdate {
            amazon_url: "https://taco.com".to_string(),
            author: "mctest".to_string(),
            language: "english".to_string(),
            pages: 1000,
            publisher: "yeah right".to_string(),
            title: title.to_string(),
            year: 2000,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = repository().await;

        let created = repo.create(new_book("12341234")).await.unwrap();
        let fetched = repo.get_by_key("12341234").await.unwrap();

        assert_eq!(created, fetched);
        assert_eq!(fetched.title, "my first book");
        assert_eq!(fetched.pages, 100);
        assert_eq!(fetched.year, 2008);
    }

    #[tokio::test]
    async fn duplicate_isbn_is_rejected_and_leaves_one_row() {
        let repo = repository().await;

        repo.create(new_book("12341234")).await.unwrap();
        let err = repo.create(new_book("12341234")).await.unwrap_err();

        assert!(matches!(err, RepositoryError::DuplicateKey(ref isbn) if isbn == "12341234"));
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_duplicate_creates_resolve_to_one_winner() {
        let repo = repository().await;

        let (first, second) = tokio::join!(
            repo.create(new_book("55555555")),
            repo.create(new_book("55555555"))
        );

        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(RepositoryError::DuplicateKey(_)))));
    }

    #[tokio::test]
    async fn list_preserves_insertion_order() {
        let repo = repository().await;

        for isbn in ["3", "1", "2"] {
            repo.create(new_book(isbn)).await.unwrap();
        }

        let isbns: Vec<String> = repo
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|book| book.isbn)
            .collect();
        assert_eq!(isbns, vec!["3", "1", "2"]);
    }

    #[tokio::test]
    async fn update_overwrites_mutable_fields() {
        let repo = repository().await;
        repo.create(new_book("12341234")).await.unwrap();

        let updated = repo
            .update("12341234", changes("UPDATED BOOK"))
            .await
            .unwrap();

        assert_eq!(updated.isbn, "12341234");
        assert_eq!(updated.title, "UPDATED BOOK");
        assert_eq!(updated.pages, 1000);
        assert_eq!(repo.get_by_key("12341234").await.unwrap(), updated);
    }

    #[tokio::test]
    async fn missing_keys_report_not_found() {
        let repo = repository().await;

        assert!(matches!(
            repo.get_by_key("999").await,
            Err(RepositoryError::NotFound(_))
        ));
        assert!(matches!(
            repo.update("999", changes("nope")).await,
            Err(RepositoryError::NotFound(_))
        ));
        assert!(matches!(
            repo.delete("999").await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_is_final() {
        let repo = repository().await;
        repo.create(new_book("12341234")).await.unwrap();

        repo.delete("12341234").await.unwrap();
        assert!(matches!(
            repo.delete("12341234").await,
            Err(RepositoryError::NotFound(_))
        ));
        assert!(repo.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_pool_reports_storage_unavailable() {
        let db = Database::in_memory().await.unwrap();
        let repo = BookRepository::new(db.pool().clone());
        db.close().await;

        assert!(matches!(
            repo.list_all().await,
            Err(RepositoryError::StorageUnavailable(_))
        ));
    }
}
