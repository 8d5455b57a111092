//! SFCC OCAPI Data API endpoints as MCP tools.
//!
//! This crate holds the engine behind the server binary:
//!
//! - [`catalog`]: endpoint descriptors loaded from JSON or YAML
//! - [`naming`] and [`schema`]: tool names and input schemas for each endpoint
//! - [`query`] and [`handlers`]: the OCAPI search DSL and the per-tool body builders
//! - [`token`], [`session`], [`persistence`] and [`authorization`]: credentials, cached bearer
//!   tokens and the authorization-code handshake
//! - [`dispatch`] and [`tools`]: authenticated upstream calls and the MCP tool surface
//!
//! It contains no HTTP server code.

pub mod authorization;
pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod naming;
pub mod persistence;
pub mod query;
pub mod safety;
pub mod schema;
pub mod session;
pub mod token;
pub mod tools;

pub use authorization::{
    AccessTokenGrant, AuthorizationFlow, CredentialSubmission, TokenExchangeRequest,
};
pub use catalog::{EndpointCatalog, EndpointDescriptor, HttpMethod, ParamKind, ParamSpec};
pub use config::{Credentials, SfccConfig};
pub use dispatch::RequestDispatcher;
pub use error::{OcapiToolsError, Result};
pub use handlers::{HandlerRegistry, SearchBuilderConfig, ToolHandler};
pub use persistence::SessionPersistence;
pub use session::{SessionStore, UserCredentials};
pub use token::TokenCache;
pub use tools::OcapiToolSource;
