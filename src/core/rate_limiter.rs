//! Per-client minimum-interval gate built atop `governor`.
//!
//! Each client identity (the remote socket address, `ip:port`) may have one
//! request accepted per `interval`. The limiter is a keyed GCRA with a burst of
//! one, so a request arriving before the interval has elapsed is rejected
//! without touching the identity's state, and a request at exactly the
//! interval is accepted.
use std::{net::SocketAddr, num::NonZeroU32, time::Duration};

use axum::{
    extract::ConnectInfo,
    response::{IntoResponse, Response},
};
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
};
use http::{Request, StatusCode};
use thiserror::Error;

use crate::config::models::{MissingKeyPolicy, RateLimitConfig};

pub type KeyedLimiter<C> =
    RateLimiter<String, DefaultKeyedStateStore<String>, C, NoOpMiddleware<<C as Clock>::Instant>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateGateError {
    #[error("invalid interval '{value}': {reason}")]
    InvalidInterval { value: String, reason: String },
    #[error("interval must be greater than zero")]
    ZeroInterval,
    #[error("invalid status code: {0}")]
    InvalidStatusCode(u16),
    #[error("capacity must be greater than 0")]
    ZeroCapacity,
}

/// Identity-keyed rate gate. Cheap to share behind an `Arc`; all state lives
/// in the governor store.
pub struct RateGate<C: Clock = DefaultClock> {
    limiter: KeyedLimiter<C>,
    interval: Duration,
    capacity: usize,
    status_code: StatusCode,
    message: String,
    on_missing_key: MissingKeyPolicy,
}

impl RateGate<DefaultClock> {
    /// One request per client per second, answering 429 `Too many requests`.
    pub fn per_second() -> Self {
        // The default config is always valid.
        match Self::from_config(&RateLimitConfig::default()) {
            Ok(gate) => gate,
            Err(e) => unreachable!("default rate limit config rejected: {e}"),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateGateError> {
        Self::with_clock(config, DefaultClock::default())
    }
}

impl<C: Clock> RateGate<C> {
    /// Build a gate that reads time from `clock`.
    pub fn with_clock(config: &RateLimitConfig, clock: C) -> Result<Self, RateGateError> {
        let interval = humantime::parse_duration(&config.interval).map_err(|e| {
            RateGateError::InvalidInterval {
                value: config.interval.clone(),
                reason: e.to_string(),
            }
        })?;
        let quota = Quota::with_period(interval)
            .ok_or(RateGateError::ZeroInterval)?
            .allow_burst(NonZeroU32::MIN);

        let status_code = StatusCode::from_u16(config.status_code)
            .map_err(|_| RateGateError::InvalidStatusCode(config.status_code))?;
        if config.capacity == 0 {
            return Err(RateGateError::ZeroCapacity);
        }

        tracing::info!(
            interval = %config.interval,
            capacity = config.capacity,
            status_code = config.status_code,
            on_missing_key = ?config.on_missing_key,
            "Creating rate gate"
        );

        Ok(Self {
            limiter: RateLimiter::new(quota, DefaultKeyedStateStore::default(), clock),
            interval,
            capacity: config.capacity,
            status_code,
            message: config.message.clone(),
            on_missing_key: config.on_missing_key,
        })
    }

    /// Record a request from `identity`. Returns `false` when it arrived
    /// within the interval of the last accepted one.
    pub fn check_key(&self, identity: &str) -> bool {
        let key = identity.to_string();
        let accepted = self.limiter.check_key(&key).is_ok();
        if accepted && self.limiter.len() > self.capacity {
            self.limiter.retain_recent();
            tracing::debug!(
                capacity = self.capacity,
                tracked = self.limiter.len(),
                "Swept idle rate gate identities"
            );
        }
        accepted
    }

    /// Enforce the gate against an HTTP request. `Err` carries the rejection
    /// response.
    pub fn check<B>(&self, req: &Request<B>) -> Result<(), Box<Response>> {
        match client_identity(req) {
            Some(identity) => {
                if self.check_key(&identity) {
                    Ok(())
                } else {
                    tracing::debug!(client = %identity, "Request rate limited");
                    Err(Box::new(self.rejection(self.message.clone())))
                }
            }
            None => match self.on_missing_key {
                MissingKeyPolicy::Allow => Ok(()),
                MissingKeyPolicy::Deny => {
                    tracing::debug!("Request without client address denied by rate gate");
                    Err(Box::new(self.rejection("No client address available".to_string())))
                }
            },
        }
    }

    fn rejection(&self, message: String) -> Response {
        (self.status_code, message).into_response()
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }
}

impl<C: Clock> std::fmt::Debug for RateGate<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate")
            .field("interval", &self.interval)
            .field("capacity", &self.capacity)
            .field("status_code", &self.status_code)
            .field("on_missing_key", &self.on_missing_key)
            .finish()
    }
}

/// Remote socket address as recorded by the server's connect-info layer.
pub fn client_identity<B>(req: &Request<B>) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
}
