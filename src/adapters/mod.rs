pub mod middleware;
pub mod router;

/// Re-export commonly used types from adapters
pub use middleware::{
    MissingEnvVars, StackError, build_stack, cors, cors_with, env_var_checker, logger,
    rate_limiter, rate_limiter_with, recoverer, simple_cors, strict_cors, throttle, throttle_with,
};
pub use router::{Dispatcher, Router};
