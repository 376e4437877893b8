//! HTTP handlers for the books resource.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use shelf_http::AppError;

use super::{
    models::{BookResponse, BookUpdate, BooksResponse, MessageResponse, NewBook},
    repository::{BookStore, RepositoryError},
    schema::PayloadError,
};

#[derive(Clone)]
pub struct BooksState {
    pub repository: Arc<dyn BookStore>,
}

pub fn router(state: BooksState) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route(
            "/{isbn}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .with_state(state)
}

async fn create_book(
    State(state): State<BooksState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<BookResponse>), AppError> {
    let Json(payload) = payload?;
    let book = NewBook::from_payload(&payload).map_err(payload_error)?;

    let book = state
        .repository
        .create(book)
        .await
        .map_err(repository_error)?;

    Ok((StatusCode::CREATED, Json(BookResponse { book })))
}

async fn list_books(State(state): State<BooksState>) -> Result<Json<BooksResponse>, AppError> {
    let books = state
        .repository
        .list_all()
        .await
        .map_err(repository_error)?;

    Ok(Json(BooksResponse { books }))
}

async fn get_book(
    State(state): State<BooksState>,
    Path(isbn): Path<String>,
) -> Result<Json<BookResponse>, AppError> {
    let book = state
        .repository
        .get_by_key(&isbn)
        .await
        .map_err(repository_error)?;

    Ok(Json(BookResponse { book }))
}

async fn update_book(
    State(state): State<BooksState>,
    Path(isbn): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BookResponse>, AppError> {
    let Json(payload) = payload?;
    let changes = BookUpdate::from_payload(&payload).map_err(payload_error)?;

    let book = state
        .repository
        .update(&isbn, changes)
        .await
        .map_err(repository_error)?;

    Ok(Json(BookResponse { book }))
}

async fn delete_book(
    State(state): State<BooksState>,
    Path(isbn): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .repository
        .delete(&isbn)
        .await
        .map_err(repository_error)?;

    Ok(Json(MessageResponse {
        message: "Book deleted",
    }))
}

fn payload_error(error: PayloadError) -> AppError {
    match error {
        PayloadError::Invalid(errors) => {
            let details = errors
                .iter()
                .filter_map(|error| serde_json::to_value(error).ok())
                .collect();
            AppError::validation(details, "book payload is invalid")
        }
        PayloadError::Decode(e) => AppError::Internal(e.into()),
    }
}

fn repository_error(error: RepositoryError) -> AppError {
    match error {
        RepositoryError::NotFound(_) => AppError::not_found(error.to_string()),
        RepositoryError::DuplicateKey(_) => AppError::duplicate_key(error.to_string()),
        RepositoryError::StorageUnavailable(_) => AppError::Internal(error.into()),
    }
}
