//! Portal session and appointments API.
//!
//! This crate owns everything that talks to the patient portal:
//!
//! - [`TokenLifecycle`] - Keeps a usable access token (cache, refresh, login)
//! - [`InteractiveLogin`] - Browser-driven login with token capture
//! - [`PortalClient`] - Authenticated calls to the filters and slots endpoints
//! - [`FilterResolver`] - Turns region/specialty/doctor names into ids
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │  TokenCache  │   │ OAuthClient  │   │ InteractiveLogin │
//! └──────┬───────┘   └──────┬───────┘   └────────┬─────────┘
//!        │                  │                    │
//!        └──────────┬───────┴────────────────────┘
//!                   ▼
//!           ┌────────────────┐
//!           │ TokenLifecycle │
//!           └───────┬────────┘
//!                   ▼
//!           ┌────────────────┐      ┌────────────────┐
//!           │  PortalClient  │◀─────│ FilterResolver │
//!           └────────────────┘      └────────────────┘
//! ```

use std::future::Future;
use std::pin::Pin;

pub mod client;
pub mod config;
pub mod error;
pub mod filters;
pub mod login;
pub mod oauth;
pub mod session;
pub mod tokens;

/// A boxed future for object-safe async traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub use client::{AppointmentApi, Endpoint, FiltersQuery, PortalClient, SlotPage, SlotQuery};
pub use config::{Credentials, LoginConfig, PortalConfig};
pub use error::{PortalError, PortalErrorCode, PortalResult};
pub use filters::{
    DoctorSelector, FilterEntry, FilterResolver, FiltersPayload, ResolvedDoctor, ResolvedFilters,
};
pub use login::{InteractiveLogin, LoginDriver, LoginStage, LoginVariant, WebDriverLauncher};
pub use oauth::OAuthClient;
pub use session::{AuthState, SessionState, TokenLifecycle};
pub use tokens::{TokenBundle, TokenCache};
