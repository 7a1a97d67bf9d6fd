//! Builds the fixture [`Registry`] shared by every spawned [`super::TestServer`].

use dirac_auth_server::registry::{Registry, RegistryFile};

use super::constants::*;

/// The registry content backing every test scenario: one VO (`lhcb`) with
/// two groups, one known client, and the upstream-subject mapping the fake
/// IdP's identity resolves through.
pub fn test_registry() -> Registry {
    let toml_source = format!(
        r#"
        issuer = "https://auth.example.org"
        audience = "dirac"
        signing_secret = "test-signing-secret"
        signing_alg = "HS256"

        [[known_clients]]
        client_id = "{client_id}"
        allowed_redirects = ["{redirect_uri}"]

        [vos.{vo}]
        default_group = "{group}"
        server_metadata_url = "https://idp.example.org/.well-known/openid-configuration"
        client_id = "dirac_cli"

        [vos.{vo}.subjects]
        "{subject}" = "{username}"

        [vos.{vo}.groups.{group}]
        users = ["{username}"]
        properties = ["NormalUser"]

        [vos.{vo}.groups.{prod_group}]
        users = ["{username}"]
        properties = ["NormalUser", "ProductionManagement"]
        "#,
        client_id = TEST_CLIENT_ID,
        redirect_uri = TEST_REDIRECT_URI,
        vo = TEST_VO,
        group = TEST_GROUP,
        prod_group = TEST_PROD_GROUP,
        subject = TEST_UPSTREAM_SUBJECT,
        username = TEST_USERNAME,
    );

    let file: RegistryFile = toml::from_str(&toml_source).expect("fixture registry parses");
    Registry::from_file(file).expect("fixture registry is valid")
}
