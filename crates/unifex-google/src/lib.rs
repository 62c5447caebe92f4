//! Google Document AI backend for unifex.
//!
//! A document is sent once to a processor's `:process` method and every
//! page is cut from the returned `Document`. The processor and credentials
//! come from [`ExtractorOptions`](unifex_core::ExtractorOptions) or the
//! `GOOGLE_DOCAI_*` environment variables.

mod auth;
mod client;
mod error;
mod extractor;
pub mod response;

pub use auth::Credentials;
pub use client::{
    ACCESS_TOKEN_ENV, CREDENTIALS_PATH_ENV, ENDPOINT_ENV, GoogleClient, PROCESSOR_NAME_ENV,
};
pub use error::GoogleError;
pub use extractor::GoogleDocaiExtractor;
