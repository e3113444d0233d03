//! The single capability shared by business handlers and middleware.
//!
//! A [`Handler`] turns a request into a response, possibly by delegating to an
//! inner handler it wraps. A [`Middleware`] is a plain function from one shared
//! handler to another, which keeps the chain builder free of any knowledge
//! about what a particular layer does.
use std::{future::Future, pin::Pin, sync::Arc};

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use http::Request;

/// Boxed, sendable future returned by every handler.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Handler port. Implementations must be cheap to call concurrently; any
/// state they need inside the returned future is cloned out of `self`.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request<Body>) -> BoxFuture<Response>;
}

/// Reference-counted handler, the unit the chain builder wraps and stores.
pub type SharedHandler = Arc<dyn Handler>;

/// Handler-wrapping function. The returned handler usually calls the one it
/// was given.
pub type Middleware = Arc<dyn Fn(SharedHandler) -> SharedHandler + Send + Sync>;

/// Adapter turning an async closure into a [`Handler`].
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Fut, R> Handler for HandlerFn<F>
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, req: Request<Body>) -> BoxFuture<Response> {
        let fut = (self.f)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Wrap an async function or closure as a shared handler.
///
/// ```
/// use waymark::{get_param, handler_fn};
///
/// let hello = handler_fn(|req| async move {
///     format!("hello {}", get_param(&req, "name"))
/// });
/// # let _ = hello;
/// ```
pub fn handler_fn<F, Fut, R>(f: F) -> SharedHandler
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    Arc::new(HandlerFn { f })
}

/// Wrap a handler-to-handler function as a [`Middleware`].
pub fn middleware_fn<F>(f: F) -> Middleware
where
    F: Fn(SharedHandler) -> SharedHandler + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    #[tokio::test]
    async fn test_handler_fn_converts_into_response() {
        let handler = handler_fn(|_req| async { (StatusCode::CREATED, "made") });
        let response = handler
            .call(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_middleware_fn_wraps_inner_handler() {
        let tag = middleware_fn(|next: SharedHandler| {
            handler_fn(move |req| {
                let next = next.clone();
                async move {
                    let mut response = next.call(req).await;
                    response
                        .headers_mut()
                        .insert("x-wrapped", http::HeaderValue::from_static("yes"));
                    response
                }
            })
        });

        let inner = handler_fn(|_req| async { StatusCode::OK });
        let wrapped = tag(inner);
        let response = wrapped
            .call(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.headers().get("x-wrapped").unwrap(), "yes");
    }
}
