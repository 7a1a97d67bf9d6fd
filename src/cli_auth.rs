//! `dirac-login`: a minimal DIRAC client that logs a user in against a
//! DIRAC authorization server using the RFC 8628 device flow, the grant a
//! CLI (as opposed to a browser-based client) is expected to use.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "dirac-login", about = "Log in to a DIRAC authorization server")]
struct CliArgs {
    /// Base URL of the DIRAC authorization server, e.g. https://auth.example.org.
    #[arg(long)]
    server: String,

    /// Virtual organisation to authenticate against.
    #[arg(long)]
    vo: String,

    /// OAuth client_id registered with the authorization server.
    #[arg(long, default_value = "dirac-cli")]
    client_id: String,

    /// Requested scope, e.g. "group:lhcb_user property:NormalUser". Empty
    /// requests the VO's default group.
    #[arg(long, default_value = "")]
    scope: String,

    #[arg(long, default_value = "dirac")]
    audience: String,

    /// Seconds to wait between polls of the token endpoint.
    #[arg(long, default_value_t = 3)]
    poll_interval_secs: u64,
}

#[derive(Debug, Deserialize)]
struct DeviceInitiateResponse {
    user_code: String,
    verification_uri_complete: String,
    device_code: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let http = reqwest::Client::new();

    let initiated: DeviceInitiateResponse = http
        .post(format!("{}/{}/device", args.server, args.vo))
        .form(&[
            ("client_id", args.client_id.as_str()),
            ("scope", args.scope.as_str()),
            ("audience", args.audience.as_str()),
        ])
        .send()
        .await
        .context("failed to contact the authorization server")?
        .error_for_status()
        .context("device initiation was rejected")?
        .json()
        .await
        .context("malformed device initiation response")?;

    println!("To finish logging in, visit:\n\n    {}\n", initiated.verification_uri_complete);
    println!("(user code: {})\n", initiated.user_code);

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg}").expect("static template is valid"));
    pb.set_message("waiting for browser authorization...");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(initiated.expires_in.max(0) as u64);
    let poll_interval = Duration::from_secs(args.poll_interval_secs.max(1));

    loop {
        pb.tick();
        if tokio::time::Instant::now() > deadline {
            pb.finish_and_clear();
            bail!("device code expired before authorization completed");
        }
        tokio::time::sleep(poll_interval).await;

        let response = http
            .post(format!("{}/{}/token", args.server, args.vo))
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("client_id", args.client_id.as_str()),
                ("device_code", initiated.device_code.as_str()),
            ])
            .send()
            .await
            .context("failed to poll the token endpoint")?;

        if response.status().is_success() {
            let token: TokenResponse = response.json().await.context("malformed token response")?;
            pb.finish_and_clear();
            println!(
                "Logged in. Access token (expires in {}s):\n\n{}",
                token.expires_in, token.access_token
            );
            return Ok(());
        }

        let body: TokenErrorBody = response
            .json()
            .await
            .unwrap_or(TokenErrorBody { error: "unknown_error".to_string() });

        match body.error.as_str() {
            "authorization_pending" => continue,
            "expired_token" => {
                pb.finish_and_clear();
                bail!("device code expired before authorization completed");
            }
            other => {
                pb.finish_and_clear();
                bail!("authorization failed: {}", other);
            }
        }
    }
}
