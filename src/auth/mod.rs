//! Session authentication against the Thingbox API
//!
//! This module provides:
//! - Single sign-on handshake and session token storage
//! - Bearer authorization on every protected call
//! - Status-based classification of failed calls
//! - Typed helpers for each API endpoint

mod client;
pub mod models;

pub use client::{ApiClient, DEFAULT_TOKEN_KEY};
pub use models::{Item, SignInResponse, Template, UserProfile};
