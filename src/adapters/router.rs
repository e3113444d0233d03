//! Router facade and the request dispatcher it freezes into.
//!
//! A [`Router`] is a configuration-time builder: it owns a middleware chain and
//! a route registry, wraps every handler with the chain as it stands when the
//! handler is registered, and composes sub-routers under a path prefix. Once
//! configured it is consumed by [`Router::into_dispatcher`], producing an
//! immutable [`Dispatcher`] that serves requests without locking.
use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use http::{Method, Request, StatusCode};
use tower::Service;

use crate::{
    core::{
        chain::MiddlewareChain,
        registry::{Resolved, RouteRegistry},
        template::{RouteError, RouteTemplate},
    },
    ports::handler::{BoxFuture, Middleware, SharedHandler},
};

/// Route and middleware builder.
#[derive(Debug, Default)]
pub struct Router {
    registry: RouteRegistry,
    chain: MiddlewareChain,
}

macro_rules! method_shortcuts {
    ($($(#[$doc:meta])* $name:ident => $method:expr),+ $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(
                &mut self,
                path: &str,
                handler: SharedHandler,
            ) -> Result<&mut Self, RouteError> {
                self.handle($method, path, handler)
            }
        )+
    };
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware. It wraps only routes registered after this call.
    pub fn use_middleware(&mut self, middleware: Middleware) -> &mut Self {
        self.chain.push(middleware);
        self
    }

    /// Register `handler` for `method` + `path`, wrapped by the current chain.
    pub fn handle(
        &mut self,
        method: Method,
        path: &str,
        handler: SharedHandler,
    ) -> Result<&mut Self, RouteError> {
        let wrapped = self.chain.wrap(handler);
        self.registry.register(method, path, wrapped)?;
        Ok(self)
    }

    method_shortcuts! {
        get => Method::GET,
        post => Method::POST,
        put => Method::PUT,
        patch => Method::PATCH,
        delete => Method::DELETE,
        head => Method::HEAD,
        options => Method::OPTIONS,
        connect => Method::CONNECT,
        trace => Method::TRACE,
    }

    /// A fresh router that starts with a copy of this router's middleware.
    /// Middleware added to either side afterwards stays on that side.
    pub fn sub_router(&self) -> Router {
        Router {
            registry: RouteRegistry::new(),
            chain: self.chain.clone(),
        }
    }

    /// Merge the routes of `sub` under `prefix`. The full template is the raw
    /// concatenation `prefix + path`; no slash is inserted or removed.
    ///
    /// Either every route is merged or, on error, none is.
    pub fn mount(&mut self, prefix: &str, sub: Router) -> Result<&mut Self, RouteError> {
        let staged = sub
            .registry
            .into_routes()
            .map(|(path, route)| {
                let template = RouteTemplate::parse(&format!("{prefix}{path}"))?;
                Ok::<_, RouteError>((route, template))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let count = staged.len();
        for (route, template) in staged {
            self.registry
                .insert(route.method().clone(), template, route.handler().clone());
        }
        tracing::debug!(prefix = %prefix, routes = count, "Mounted sub-router");
        Ok(self)
    }

    /// Declare routes on a sub-router inside `build`, then mount them under
    /// `prefix`.
    ///
    /// ```
    /// use waymark::{Router, handler_fn};
    ///
    /// let mut router = Router::new();
    /// router
    ///     .route("/api", |api| {
    ///         api.get("/status", handler_fn(|_req| async { "ok" }))?;
    ///         Ok(())
    ///     })
    ///     .unwrap();
    /// assert_eq!(router.len(), 1);
    /// ```
    pub fn route<F>(&mut self, prefix: &str, build: F) -> Result<&mut Self, RouteError>
    where
        F: FnOnce(&mut Router) -> Result<(), RouteError>,
    {
        let mut sub = self.sub_router();
        build(&mut sub)?;
        self.mount(prefix, sub)
    }

    /// Number of registered (method, template) routes.
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn registry(&self) -> &RouteRegistry {
        &self.registry
    }

    /// Freeze the routes into a servable [`Dispatcher`].
    pub fn into_dispatcher(self) -> Dispatcher {
        tracing::info!(routes = self.registry.len(), "Router frozen into dispatcher");
        Dispatcher {
            registry: Arc::new(self.registry),
        }
    }
}

/// Immutable, cheaply cloneable request dispatcher.
///
/// Implements [`tower::Service`] so it can be mounted directly in an axum or
/// hyper server. Unmatched requests get `404` with an empty body.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<RouteRegistry>,
}

impl Dispatcher {
    /// Look up the route for `method` + `path` without serving it.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<Resolved<'_>> {
        self.registry.resolve(method, path)
    }

    pub async fn dispatch(&self, mut req: Request<Body>) -> Response {
        let Some(resolved) = self.registry.resolve(req.method(), req.uri().path()) else {
            tracing::debug!(
                method = %req.method(),
                path = %req.uri().path(),
                "No route matched"
            );
            return StatusCode::NOT_FOUND.into_response();
        };

        let handler = resolved.handler;
        req.extensions_mut().insert(resolved.params);
        handler.call(req).await
    }
}

impl Service<Request<Body>> for Dispatcher {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { Ok(dispatcher.dispatch(req).await) })
    }
}
