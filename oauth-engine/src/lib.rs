//! # oauth-engine
//!
//! The state machine of an OAuth 2.0 authorization server, independent of
//! any HTTP framework.
//!
//! ## Components
//!
//! - **Scopes:** [`ScopeRegistry`] catalog, filled from [`ScopeProvider`]s at
//!   startup and sealed before use.
//! - **Stores:** [`ClientStore`], [`GrantStore`] and [`TokenStore`] traits
//!   with in-memory (Moka) and Redis backends behind [`Store`].
//! - **Engine:** [`AuthorizationEngine`] for the authorization code,
//!   implicit, client credentials, password and refresh grants, plus client
//!   and personal token management.
//! - **Request boundary:** [`RequestAuthenticator`] turns request
//!   credentials into an [`AuthContext`]; [`ScopeGuard`] checks it against
//!   the scopes a resource requires.

pub mod authn;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod guard;
pub mod models;
pub mod scope;
pub mod store;

pub use authn::RequestAuthenticator;
pub use engine::{
    AuthenticationFailed, AuthorizationEngine, AuthorizationPrompt, AuthorizationRequest,
    ClientRegistration, Decision, GrantPolicy, ResponseType, StaticUserAuthenticator,
    UserAuthenticator,
};
pub use error::OAuthError;
pub use guard::{authorize, ScopeGuard};
pub use models::{AuthContext, Client, CredentialSource, Grant, GrantType, Principal, Token};
pub use scope::{
    format_scopes, parse_scopes, DefaultScopes, Scope, ScopeProvider, ScopeRegistry, ScopeSet,
};
pub use store::{
    create_store, ClientStore, GrantStore, Store, StoreError, StoreKind, StoreSettings, TokenStore,
};
