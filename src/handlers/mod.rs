//! HTTP handlers (§6): one module per resource family, each a thin layer
//! translating axum extractors into service calls and `ApiError` into
//! `IntoResponse`.

pub mod analytics;
pub mod domains;
pub mod issues;
pub mod llm_providers;
pub mod pages;
pub mod sitemap;
pub mod suggestions;
pub mod tasks;
