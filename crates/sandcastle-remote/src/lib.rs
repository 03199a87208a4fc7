//! # sandcastle-remote
//!
//! Transport layer between Sandcastle and the remote compute services that
//! host sandbox sessions.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sandcastle_remote::{AuthScheme, CommandSpec, HttpApi, HttpApiConfig, RemoteApi, SessionRequest};
//!
//! # async fn example() -> sandcastle_remote::Result<()> {
//! let api = HttpApi::new(HttpApiConfig::new(
//!     "e2b",
//!     "https://sandboxes.internal/e2b",
//!     AuthScheme::ApiKeyHeader { header: "X-API-Key".into(), key: "e2b_...".into() },
//! ))?;
//!
//! let session = api.create_session(&SessionRequest::default()).await?;
//! let out = api
//!     .exec(&session.id, &CommandSpec::new("ls").arg("-la").cwd("/home/user"))
//!     .await?;
//! println!("{}", out.stdout);
//!
//! api.destroy_session(&session.id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Structured commands**: program + argument list, quoted only at the edge
//! - **Backend trait**: [`RemoteApi`] with an optional [`RemoteFilesystem`]
//! - **HTTP client**: [`HttpApi`] with bearer, header and token-pair auth

mod api;
mod command;
mod error;
mod http;

pub use api::{RemoteApi, RemoteFilesystem, RemoteSession, SessionRequest};
pub use command::{CommandSpec, ExecOutput};
pub use error::{RemoteError, Result};
pub use http::{AuthScheme, HttpApi, HttpApiConfig, DEFAULT_REQUEST_TIMEOUT};
