//! Shelf application library
//!
//! Wires the book catalogue module into the Shelf kernel, database and HTTP
//! crates. Binaries call [`App::bootstrap`] and then [`App::serve`] or
//! [`App::migrate`].

mod app;
pub mod modules;

pub use app::App;
