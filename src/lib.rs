//! DIRAC Authorization Server library.
//!
//! Exposes the flow/token core and the ambient stack around it (config
//! loading, HTTP surface) for the `dirac-auth-server` binary and for the
//! integration test suite.

pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod flow;
pub mod idp;
pub mod orchestrator;
pub mod registry;
pub mod scope;
pub mod server;
pub mod sqlite_persistence;

pub use context::{AuthContext, RequestsLoggingLevel};
pub use registry::Registry;
pub use server::run_server;
