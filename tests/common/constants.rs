//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite. When
//! test registry data changes, update only this file.

/// The VO every fixture registers, mirroring the spec's literal scenarios.
pub const TEST_VO: &str = "lhcb";

/// A VO with no IdP client known to the test server, used to exercise the
/// "unknown VO" branch of the orchestrator.
pub const UNKNOWN_VO: &str = "unknown_vo";

/// The known client registered in the fixture registry.
pub const TEST_CLIENT_ID: &str = "myDIRACClientID";

/// The single redirect URI allowed for `TEST_CLIENT_ID`.
pub const TEST_REDIRECT_URI: &str = "http://localhost:8000/docs/oauth2-redirect";

/// A redirect URI never registered for any known client.
pub const DISALLOWED_REDIRECT_URI: &str = "http://evil.example.org/callback";

/// The upstream IdP `sub` claim the fake IdP returns, and its mapping to a
/// DIRAC username in the fixture registry.
pub const TEST_UPSTREAM_SUBJECT: &str = "b824d4dc-1111-2222-3333-444455556666";
pub const TEST_USERNAME: &str = "chaen";

/// Default group for `TEST_VO`, granting only `NormalUser`.
pub const TEST_GROUP: &str = "lhcb_user";

/// A second group in the fixture registry granting `ProductionManagement`
/// in addition to `NormalUser`, for property-guard tests.
pub const TEST_PROD_GROUP: &str = "lhcb_prod";

/// Maximum time to wait for the test server to become ready (milliseconds).
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Polling interval when waiting for the server to become ready
/// (milliseconds).
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Per-request timeout used by [`super::TestClient`].
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
