//! HTTP surface: handlers and HTML pages.

pub mod handlers;
pub mod pages;

pub use handlers::AppState;
