//! # Daedalus Core
//!
//! Core request types for the Daedalus framework.
//!
//! - [`Context`] - Per-request context threaded through middleware
//! - [`Request`] / [`Response`] / [`Body`] - Buffered request and response wrappers
//! - [`State`] / [`StatePolicy`] / [`SharedState`] - Application and request state
//! - [`Params`] - Route parameters bound during dispatch
//! - [`Error`] / [`HttpError`] - Standard error types
//! - [`AppHandle`] / [`KeyRing`] - What a request can see of its application
//! - [`MatchedRoute`] - Routes recorded on the context by a router

#![doc(html_root_url = "https://docs.rs/daedalus-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
mod context;
mod error;
mod params;
mod request;
mod response;
mod state;

pub use app::{AppHandle, KeyRing};
pub use context::{Context, MatchedRoute};
pub use error::{reason_phrase, Error, HttpError, Result};
pub use params::Params;
pub use request::Request;
pub use response::{Body, Response};
pub use state::{ParseStatePolicyError, SharedState, State, StatePolicy};
