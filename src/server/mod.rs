mod auth_guard;
mod http_layers;
mod server;

pub use auth_guard::{has_properties, require_properties};
pub use http_layers::*;
pub use server::{make_app, run_server};
