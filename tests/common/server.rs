//! Test server lifecycle management
//!
//! Spawns a real `dirac-auth-server` HTTP app bound to a random port, wired
//! against an in-memory flow store and a fake upstream IdP, so tests never
//! touch the network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use dirac_auth_server::context::{AuthContext, RequestsLoggingLevel};
use dirac_auth_server::crypto::{IdTokenIdentity, StateCodec, TokenIssuer};
use dirac_auth_server::flow::SqliteFlowStore;
use dirac_auth_server::idp::{FakeIdPClient, IdPClient};
use dirac_auth_server::server::make_app;

use super::constants::*;
use super::fixtures::test_registry;

/// A running authorization server plus everything needed to keep it alive.
///
/// When dropped, the server shuts down gracefully.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345").
    pub base_url: String,
    pub port: u16,

    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port, registered for
    /// [`TEST_VO`] with a [`FakeIdPClient`] that resolves to
    /// [`TEST_UPSTREAM_SUBJECT`] / [`TEST_USERNAME`].
    pub async fn spawn() -> Self {
        Self::spawn_with_device_ttl(600).await
    }

    /// Like [`Self::spawn`], but with a caller-supplied device-code TTL —
    /// used to exercise flow expiry without waiting out the default 600s.
    pub async fn spawn_with_device_ttl(device_ttl_secs: i64) -> Self {
        let registry = Arc::new(test_registry());

        let identity = IdTokenIdentity {
            sub: TEST_UPSTREAM_SUBJECT.to_string(),
            organisation_name: TEST_VO.to_string(),
            preferred_username: TEST_USERNAME.to_string(),
        };
        let mut idp_clients: HashMap<String, Arc<dyn IdPClient>> = HashMap::new();
        idp_clients.insert(TEST_VO.to_string(), Arc::new(FakeIdPClient::new(TEST_VO, identity)));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind to random port");
        let port = listener.local_addr().expect("failed to get local address").port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let ctx = AuthContext {
            token_issuer: Arc::new(TokenIssuer::new(&registry, 180_000).expect("token issuer")),
            state_codec: Arc::new(StateCodec::new(registry.signing_secret.clone().into_bytes())),
            flow_store: Arc::new(SqliteFlowStore::in_memory().expect("in-memory flow store")),
            idp_clients: Arc::new(idp_clients),
            registry,
            device_ttl_secs,
            auth_code_ttl_secs: 300,
            base_url: base_url.clone(),
            requests_logging_level: RequestsLoggingLevel::None,
        };

        let app = make_app(ctx);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("test server failed");
        });

        let server = Self {
            base_url,
            port,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .expect("failed to build readiness client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!("server did not become ready within {}ms", SERVER_READY_TIMEOUT_MS);
            }
            match client.get(format!("{}/healthz", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await,
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
