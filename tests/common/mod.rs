//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests
//! of the DIRAC authorization server's HTTP surface. Tests should only
//! import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, TEST_VO};
//!
//! #[tokio::test]
//! async fn test_device_flow() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::new(server.base_url.clone());
//!     let initiated = client.initiate_device(TEST_VO).await;
//!     assert!(initiated.status().is_success());
//! }
//! ```

mod client;
mod constants;
mod fixtures;
mod server;

pub use client::TestClient;
pub use constants::*;
pub use server::TestServer;
