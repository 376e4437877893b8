use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::{self, Mode, PayloadError, BOOK_SCHEMA};

/// A stored book, keyed by its ISBN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    pub isbn: String,
    pub amazon_url: String,
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    pub title: String,
    pub year: i64,
}

/// Validated payload for creating a book.
///
/// Only obtainable through [`NewBook::from_payload`], so the repository never
/// sees fields outside the book schema.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewBook {
    pub isbn: String,
    pub amazon_url: String,
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    pub title: String,
    pub year: i64,
}

impl NewBook {
    pub fn from_payload(payload: &Value) -> Result<Self, PayloadError> {
        schema::parse(BOOK_SCHEMA, payload, Mode::Create)
    }
}

/// Validated replacement values for every mutable field of a book.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookUpdate {
    pub amazon_url: String,
    pub author: String,
    pub language: String,
    pub pages: i64,
    pub publisher: String,
    pub title: String,
    pub year: i64,
}

impl BookUpdate {
    pub fn from_payload(payload: &Value) -> Result<Self, PayloadError> {
        schema::parse(BOOK_SCHEMA, payload, Mode::Update)
    }
}

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub book: Book,
}

#[derive(Debug, Serialize)]
pub struct BooksResponse {
    pub books: Vec<Book>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_payload_cannot_carry_isbn() {
        let payload = json!({
            "isbn": "12341234",
            "amazon_url": "https://amazon.com/taco",
            "author": "Elie",
            "language": "English",
            "pages": 100,
            "publisher": "Nothing publishers",
            "title": "my first book",
            "year": 2008
        });

        assert!(NewBook::from_payload(&payload).is_ok());
        assert!(BookUpdate::from_payload(&payload).is_err());
    }

    #[test]
    fn book_serializes_with_column_names() {
        let book = Book {
            isbn: "1".into(),
            amazon_url: "https://a".into(),
            author: "A".into(),
            language: "en".into(),
            pages: 1,
            publisher: "P".into(),
            title: "T".into(),
            year: 2000,
        };
        let value = serde_json::to_value(&book).unwrap();
        assert_eq!(value["amazon_url"], "https://a");
        assert_eq!(value["pages"], 1);
    }
}
