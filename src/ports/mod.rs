pub mod handler;

pub use handler::{BoxFuture, Handler, HandlerFn, Middleware, SharedHandler, handler_fn, middleware_fn};
