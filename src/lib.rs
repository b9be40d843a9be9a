//! Thingbox client
//!
//! Session-authenticated access to the Thingbox API and a reactive cache
//! of the site's public content.

pub mod auth;
pub mod config;
pub mod content;
pub mod error;
pub mod items;
pub mod navigator;
pub mod serde_utils;
pub mod storage;

pub use auth::{ApiClient, UserProfile};
pub use config::ClientConfig;
pub use content::{ContentCache, ContentSnapshot, ContentSource, Subscription, CONTENT_KEYS};
pub use error::{ApiError, ApiResult};
pub use items::{ItemDraft, NewItem, SealingKey};
pub use navigator::{Navigator, NoopNavigator, SystemBrowser};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
