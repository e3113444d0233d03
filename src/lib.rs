//! waymark - an HTTP request dispatcher.
//!
//! waymark maps an incoming `(method, path)` pair to a registered handler,
//! binds `{name}` path parameters, and runs the handler inside a chain of
//! middleware fixed at registration time. It ships the gating middleware
//! most services need (CORS negotiation, a global concurrency throttle and a
//! per-client rate gate) plus request logging, panic recovery and an
//! environment check.
//!
//! # Quick Example
//! ```
//! use waymark::{Router, get_param, handler_fn, recoverer, simple_cors};
//!
//! # fn main() -> Result<(), waymark::RouteError> {
//! let mut router = Router::new();
//! router.use_middleware(recoverer());
//! router.use_middleware(simple_cors());
//! router.get(
//!     "/users/{id}",
//!     handler_fn(|req| async move { format!("user {}", get_param(&req, "id")) }),
//! )?;
//! router.route("/api", |api| {
//!     api.get("/files/*", handler_fn(|_req| async { "file" }))?;
//!     Ok(())
//! })?;
//!
//! // `Dispatcher` is a `tower::Service`; mount it in axum with
//! // `axum::Router::new().fallback_service(dispatcher)`.
//! let dispatcher = router.into_dispatcher();
//! assert!(dispatcher.resolve(&http::Method::GET, "/users/42").is_some());
//! # Ok(()) }
//! ```
//!
//! # Routing
//! Templates are matched against the whole path. `{name}` matches one or more
//! characters other than `/`; a trailing `*` matches any remainder. When
//! several templates accept a path, static templates win over parameterized
//! ones, which win over catch-alls; ties go to the longer literal text and
//! then to the earlier registration. The method is part of the route key, so
//! a path registered only for GET answers 404 to POST.
//!
//! # Middleware order
//! The first middleware added is the outermost. Middleware wraps a handler
//! when the handler is registered, so middleware added later does not reach
//! routes registered earlier. Sub-routers start from a copy of the parent's
//! chain.
//!
//! # Architecture
//! The crate separates **ports** (the handler capability) from **adapters**
//! (router facade and concrete middleware) while keeping the matching and
//! gating logic inside `core`.
pub mod adapters;
pub mod config;
pub mod core;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub use crate::{
    adapters::{
        Dispatcher, MissingEnvVars, Router, StackError, build_stack, cors, cors_with,
        env_var_checker, logger, rate_limiter, rate_limiter_with, recoverer, simple_cors,
        strict_cors, throttle, throttle_with,
    },
    config::models::{CorsConfig, DispatcherConfig, RateLimitConfig},
    core::{
        ConcurrencyGate, CorsNegotiator, GateError, PathParams, RateGate, RouteError, get_param,
        get_query,
    },
    ports::{Handler, Middleware, SharedHandler, handler_fn, middleware_fn},
};
