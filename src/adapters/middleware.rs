//! Ready-made middleware for the router.
//!
//! Every function here returns a [`Middleware`], so the layers compose with
//! each other and with user middleware in whatever order they are added via
//! [`Router::use_middleware`](crate::adapters::router::Router::use_middleware).
//! The gating layers (CORS, rate limiter, throttle) hold their state in the
//! returned value, so every route wrapped by one middleware value shares it.
use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Instant};

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;
use governor::clock::Clock;
use http::{HeaderValue, Request, StatusCode};
use thiserror::Error;
use tracing::Instrument;

use crate::{
    config::models::{CorsConfig, DispatcherConfig},
    core::{
        cors::{self, CorsDecision, CorsNegotiator},
        rate_limiter::{RateGate, RateGateError, client_identity},
        throttle::{ConcurrencyGate, GateError},
    },
    ports::handler::{Middleware, SharedHandler, handler_fn, middleware_fn},
    tracing_setup::create_request_span,
};

/// Failure to build a configured middleware stack.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("throttle: {0}")]
    Throttle(#[from] GateError),
    #[error("rate limiter: {0}")]
    RateLimit(#[from] RateGateError),
}

/// CORS layer enforcing `config`.
pub fn cors(config: &CorsConfig) -> Middleware {
    cors_with(Arc::new(CorsNegotiator::new(config)))
}

/// CORS layer sharing an existing negotiator.
pub fn cors_with(negotiator: Arc<CorsNegotiator>) -> Middleware {
    middleware_fn(move |next: SharedHandler| {
        let negotiator = negotiator.clone();
        handler_fn(move |req: Request<Body>| {
            let next = next.clone();
            let decision = negotiator.negotiate(req.method(), req.headers());
            async move {
                match decision {
                    CorsDecision::Forbidden { headers } => {
                        (StatusCode::FORBIDDEN, headers).into_response()
                    }
                    CorsDecision::Preflight { headers } => {
                        (StatusCode::NO_CONTENT, headers).into_response()
                    }
                    CorsDecision::Forward { headers } => {
                        let mut response = next.call(req).await;
                        cors::merge_headers(response.headers_mut(), headers);
                        response
                    }
                }
            }
        })
    })
}

/// Permissive CORS: every origin, the common methods, any request header.
pub fn simple_cors() -> Middleware {
    cors(&CorsConfig::permissive())
}

/// CORS restricted to `origins`, with credentials allowed.
pub fn strict_cors<I, S>(origins: I) -> Middleware
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    cors(&CorsConfig::strict(origins))
}

/// Bound the number of concurrently running inner handlers to `limit`.
/// Requests over the limit wait for a slot.
pub fn throttle(limit: usize) -> Result<Middleware, GateError> {
    Ok(throttle_with(ConcurrencyGate::new(limit)?))
}

/// Throttle through an existing gate, e.g. one shared with other routers.
pub fn throttle_with(gate: ConcurrencyGate) -> Middleware {
    middleware_fn(move |next: SharedHandler| {
        let gate = gate.clone();
        handler_fn(move |req: Request<Body>| {
            let next = next.clone();
            let gate = gate.clone();
            async move {
                let _permit = gate.acquire().await;
                next.call(req).await
            }
        })
    })
}

/// One accepted request per client address per second.
pub fn rate_limiter() -> Middleware {
    rate_limiter_with(Arc::new(RateGate::per_second()))
}

/// Rate limit through an existing gate.
pub fn rate_limiter_with<C>(gate: Arc<RateGate<C>>) -> Middleware
where
    C: Clock + Send + Sync + 'static,
{
    middleware_fn(move |next: SharedHandler| {
        let gate = gate.clone();
        handler_fn(move |req: Request<Body>| {
            let next = next.clone();
            let verdict = gate.check(&req);
            async move {
                match verdict {
                    Ok(()) => next.call(req).await,
                    Err(rejection) => *rejection,
                }
            }
        })
    })
}

/// Error text carried on responses produced by [`env_var_checker`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEnvVars(pub String);

/// Per-request log line with method, path, remote address, status and
/// latency, inside a span tagged with a fresh request id. The id is also
/// returned in `X-Request-ID`.
pub fn logger() -> Middleware {
    middleware_fn(|next: SharedHandler| {
        handler_fn(move |req: Request<Body>| {
            let next = next.clone();
            async move {
                let request_id = uuid::Uuid::new_v4().to_string();
                let method = req.method().clone();
                let path = req.uri().path().to_string();
                let remote = client_identity(&req).unwrap_or_else(|| "-".to_string());
                let span = create_request_span(method.as_str(), &path, &request_id);

                let start = Instant::now();
                let mut response = next.call(req).instrument(span.clone()).await;
                let elapsed = start.elapsed();
                let status = response.status();

                span.record("http.status_code", status.as_u16());
                span.record("duration_ms", elapsed.as_millis() as u64);
                span.in_scope(|| {
                    if let Some(MissingEnvVars(message)) =
                        response.extensions().get::<MissingEnvVars>()
                    {
                        tracing::error!(error = %message, "Environment check failed");
                    }
                    if status.is_server_error() {
                        tracing::error!(%method, %path, %remote, status = status.as_u16(), ?elapsed, "Request failed");
                    } else if status.is_client_error() {
                        tracing::warn!(%method, %path, %remote, status = status.as_u16(), ?elapsed, "Request rejected");
                    } else {
                        tracing::info!(%method, %path, %remote, status = status.as_u16(), ?elapsed, "Request completed");
                    }
                });

                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    response.headers_mut().insert("x-request-id", value);
                }
                response
            }
        })
    })
}

/// Turn a panic in any inner layer into `500 Internal Server Error`. Belongs
/// outermost so it also covers the other middleware.
pub fn recoverer() -> Middleware {
    middleware_fn(|next: SharedHandler| {
        handler_fn(move |req: Request<Body>| {
            let next = next.clone();
            async move {
                let method = req.method().clone();
                let path = req.uri().path().to_string();

                let call = std::panic::catch_unwind(AssertUnwindSafe(|| next.call(req)));
                let outcome = match call {
                    Ok(fut) => AssertUnwindSafe(fut).catch_unwind().await,
                    Err(panic) => Err(panic),
                };
                match outcome {
                    Ok(response) => response,
                    Err(panic) => {
                        tracing::error!(
                            %method,
                            %path,
                            panic = %panic_message(panic.as_ref()),
                            "Handler panicked"
                        );
                        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
                    }
                }
            }
        })
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Refuse every request with 500 while any of `vars` is unset or empty. The
/// check runs per request, so setting the variable later takes effect
/// without a restart.
pub fn env_var_checker<I, S>(vars: I) -> Middleware
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let vars: Arc<[String]> = vars.into_iter().map(Into::into).collect();
    middleware_fn(move |next: SharedHandler| {
        let vars = vars.clone();
        handler_fn(move |req: Request<Body>| {
            let next = next.clone();
            let missing: Vec<&str> = vars
                .iter()
                .filter(|name| std::env::var(name.as_str()).map_or(true, |value| value.is_empty()))
                .map(String::as_str)
                .collect();
            let failure = (!missing.is_empty()).then(|| {
                format!(
                    "Missing required environment variables: [{}]",
                    missing.join(", ")
                )
            });
            async move {
                match failure {
                    None => next.call(req).await,
                    Some(message) => {
                        tracing::error!(error = %message, "Refusing request");
                        let mut response =
                            (StatusCode::INTERNAL_SERVER_ERROR, message.clone()).into_response();
                        response.extensions_mut().insert(MissingEnvVars(message));
                        response
                    }
                }
            }
        })
    })
}

/// Middleware described by `config`, outermost first: recoverer, logger,
/// environment check, CORS, rate limiter, throttle.
pub fn build_stack(config: &DispatcherConfig) -> Result<Vec<Middleware>, StackError> {
    let mut stack = Vec::new();
    if config.recover_panics {
        stack.push(recoverer());
    }
    if config.logging.request_log {
        stack.push(logger());
    }
    if !config.required_env.is_empty() {
        stack.push(env_var_checker(config.required_env.iter().cloned()));
    }
    if let Some(cors_config) = &config.cors {
        stack.push(cors(cors_config));
    }
    if let Some(rate_limit) = &config.rate_limit {
        stack.push(rate_limiter_with(Arc::new(RateGate::from_config(rate_limit)?)));
    }
    if let Some(throttle_config) = &config.throttle {
        stack.push(throttle(throttle_config.limit)?);
    }
    tracing::debug!(layers = stack.len(), "Built middleware stack");
    Ok(stack)
}
