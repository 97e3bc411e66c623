use std::convert::Infallible;

use axum::{extract::DefaultBodyLimit, routing, Router};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::notifier::Notifier;
use crate::pipeline::PipelineHandler;

pub fn router(
    pipeline: PipelineHandler,
    notifier: Option<Notifier>,
    max_body_size: usize,
    concurrency_limit: usize,
) -> Router {
    let router = Router::new()
        .route("/", routing::get(handlers::index))
        .route("/_readiness", routing::get(handlers::index))
        .route("/_liveness", routing::get(handlers::index)) // No async loop, just check axum health
        .route(
            "/generate",
            routing::post(handlers::generate)
                .with_state(pipeline)
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit))
                .layer(DefaultBodyLimit::max(max_body_size)),
        );

    let router = match notifier {
        Some(notifier) => router.route(
            "/notify",
            routing::post(handlers::notify)
                .with_state(notifier)
                .layer::<_, Infallible>(ConcurrencyLimitLayer::new(concurrency_limit))
                .layer(DefaultBodyLimit::max(max_body_size)),
        ),
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}
