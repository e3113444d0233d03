//! Middleware chain builder.
//!
//! The chain is an ordered list of [`Middleware`]. Wrapping applies the list
//! last-to-first, so the first middleware pushed ends up outermost: it sees
//! the request first and the response last.
use crate::ports::handler::{Middleware, SharedHandler};

/// Ordered list of handler-wrapping functions.
///
/// Cloning produces an independent snapshot: pushing onto the clone never
/// affects the original, and the other way round.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    layers: Vec<Middleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Middleware) {
        self.layers.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap `handler` with every middleware currently in the chain.
    pub fn wrap(&self, handler: SharedHandler) -> SharedHandler {
        self.layers
            .iter()
            .rev()
            .fold(handler, |inner, middleware| middleware(inner))
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("layers", &self.layers.len())
            .finish()
    }
}
