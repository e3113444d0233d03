pub mod chain;
pub mod cors;
pub mod params;
pub mod rate_limiter;
pub mod registry;
pub mod template;
pub mod throttle;

pub use chain::MiddlewareChain;
pub use cors::{CorsDecision, CorsNegotiator};
pub use params::{PathParams, get_param, get_query};
pub use rate_limiter::{RateGate, RateGateError};
pub use registry::{Resolved, Route, RouteRegistry};
pub use template::{RouteError, RouteKind, RouteTemplate};
pub use throttle::{ConcurrencyGate, GateError};
