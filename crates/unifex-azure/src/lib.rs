//! Azure Document Intelligence backend for unifex.
//!
//! A document is submitted once to the analyze endpoint and polled until
//! the operation settles; every page is then cut from the shared result.
//! Credentials come from [`ExtractorOptions`](unifex_core::ExtractorOptions)
//! or the `AZURE_DI_*` environment variables.

mod client;
mod error;
mod extractor;
pub mod response;

pub use client::{AzureClient, DEFAULT_MODEL, ENDPOINT_ENV, KEY_ENV, MODEL_ENV};
pub use error::AzureError;
pub use extractor::AzureDiExtractor;
