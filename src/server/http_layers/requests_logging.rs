//! Request logging middleware.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::IntoResponse;
use std::time::Instant;
use tracing::info;

use crate::context::{AuthContext, RequestsLoggingLevel};

pub async fn log_requests(State(ctx): State<AuthContext>, request: Request, next: Next) -> impl IntoResponse {
    let level = ctx.requests_logging_level.clone();
    let method = request.method().to_string();
    let uri = request.uri().to_string();
    let start = Instant::now();

    if level > RequestsLoggingLevel::None {
        info!(">>> {} {}", method, uri);
    }
    if level >= RequestsLoggingLevel::Headers {
        for header in request.headers().iter() {
            info!("    {:?}: {:?}", header.0, header.1);
        }
    }

    let response = next.run(request).await;

    if level > RequestsLoggingLevel::None {
        info!(
            "<<< {} {} ({}ms)",
            method,
            response.status().as_u16(),
            start.elapsed().as_millis()
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use crate::context::RequestsLoggingLevel;

    #[test]
    fn level_ordering() {
        assert!(RequestsLoggingLevel::None < RequestsLoggingLevel::Headers);
        assert!(RequestsLoggingLevel::Headers > RequestsLoggingLevel::Path);
    }
}
