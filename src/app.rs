// Router construction: every endpoint goes through the pipeline with its
// static EndpointConfig; cross-cutting layers are stacked underneath.
use axum::extract::Request;
use axum::routing::get;
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::system;
use crate::middleware::no_cache_middleware;
use crate::pipeline::{dispatch, EndpointConfig, Pipeline};

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/", {
            let pipeline = pipeline.clone();
            get(move |request: Request| {
                let pipeline = pipeline.clone();
                let contract = pipeline.contract().clone();
                dispatch(
                    pipeline,
                    EndpointConfig::public(),
                    move |ctx| system::service_info(contract, ctx),
                    request,
                )
            })
        })
        .route("/api/v1/status", {
            let pipeline = pipeline.clone();
            get(move |request: Request| {
                let pipeline = pipeline.clone();
                let guard = pipeline.guard().cloned();
                dispatch(
                    pipeline,
                    EndpointConfig::public(),
                    move |ctx| system::status(guard, ctx),
                    request,
                )
            })
        })
        .route("/api/v1/session", {
            let pipeline = pipeline.clone();
            get(move |request: Request| {
                let pipeline = pipeline.clone();
                dispatch(pipeline, EndpointConfig::secured(), system::session_info, request)
            })
        })
        // Global middleware
        .layer(middleware::from_fn(no_cache_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
