use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dirac_auth_server::config::{CliArgs, Settings};
use dirac_auth_server::context::AuthContext;
use dirac_auth_server::crypto::{StateCodec, TokenIssuer};
use dirac_auth_server::flow::{FlowStore, SqliteFlowStore};
use dirac_auth_server::idp::{IdPClient, OidcIdPClient};
use dirac_auth_server::registry::Registry;
use dirac_auth_server::server;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .ok();

    let settings = Settings::resolve(args)?;

    info!("Loading DIRAC configuration registry from {:?}", settings.registry);
    let registry = Arc::new(Registry::load(&settings.registry)?);
    info!(
        "Registry loaded: {} VO(s), etag {}",
        registry.vos.len(),
        registry.etag
    );

    let flow_store: Arc<dyn FlowStore> = match &settings.flow_db {
        Some(path) => {
            info!("Persisting flow rows to {:?}", path);
            Arc::new(SqliteFlowStore::new(path)?)
        }
        None => {
            warn!("No --flow-db given; flow rows are held in memory and lost on restart");
            Arc::new(SqliteFlowStore::in_memory()?)
        }
    };

    let mut idp_clients: HashMap<String, Arc<dyn IdPClient>> = HashMap::new();
    for (vo, def) in registry.vos.iter() {
        info!("Discovering upstream IdP metadata for VO {} at {}", vo, def.server_metadata_url);
        let client = OidcIdPClient::discover(vo, &def.server_metadata_url, &def.client_id)
            .await
            .with_context(|| format!("failed to discover upstream IdP for VO {}", vo))?;
        idp_clients.insert(vo.clone(), Arc::new(client));
    }

    let ctx = AuthContext {
        token_issuer: Arc::new(TokenIssuer::new(&registry, settings.access_token_ttl_secs)?),
        state_codec: Arc::new(StateCodec::new(registry.signing_secret.clone().into_bytes())),
        flow_store,
        idp_clients: Arc::new(idp_clients),
        registry,
        device_ttl_secs: settings.device_ttl_secs,
        auth_code_ttl_secs: settings.auth_code_ttl_secs,
        base_url: settings.base_url,
        requests_logging_level: settings.requests_logging_level,
    };

    server::run_server(ctx, settings.port).await
}
