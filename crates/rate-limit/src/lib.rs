//! Abuse control for authentication endpoints.
//!
//! This crate decides, per request, whether a login / registration /
//! token-refresh / password-reset attempt may proceed. The pieces are:
//!
//! - [`PolicyRegistry`] -- immutable endpoint -> (window, limit) table.
//! - [`IdentityResolver`] -- address + hashed user-agent client key.
//! - [`AttemptStore`] -- shared, expiring (identity, endpoint) -> timestamps map.
//! - [`SlidingWindowEvaluator`] -- atomic admit-or-deny over the store.
//! - [`EscalationDetector`] -- advisory brute-force logging.
//! - [`Rejection`] -- the standard 429 response.
//!
//! [`AuthRateLimiter`] ties them together behind a single
//! [`check`](AuthRateLimiter::check) call.

pub mod escalation;
pub mod identity;
pub mod policy;
pub mod response;
pub mod sliding_window;
pub mod store;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use authguard_common::{AuthGuardError, AuthGuardResult, AuthLimitConfig};
use chrono::{DateTime, Duration, Utc};
use http::HeaderMap;

pub use escalation::{EscalationDetector, EscalationEvent};
pub use identity::IdentityResolver;
pub use policy::{Policy, PolicyRegistry};
pub use response::{Rejection, RejectionBody};
pub use sliding_window::{Decision, SlidingWindowEvaluator};
pub use store::{AttemptKey, AttemptStore};

/// Result of running a request through the limiter.
#[derive(Debug, Clone)]
pub enum GuardOutcome {
    /// No policy applies; forward untouched.
    Bypass,
    /// Attempt recorded; forward untouched.
    Admitted {
        endpoint: String,
        identity: String,
        remaining: u32,
    },
    /// Over the limit; answer with `rejection` and do not forward.
    Rejected {
        endpoint: String,
        identity: String,
        attempts: usize,
        rejection: Rejection,
        escalation: Option<EscalationEvent>,
    },
}

impl GuardOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, GuardOutcome::Rejected { .. })
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            GuardOutcome::Bypass => None,
            GuardOutcome::Admitted { endpoint, .. } | GuardOutcome::Rejected { endpoint, .. } => {
                Some(endpoint)
            }
        }
    }
}

/// The authentication endpoint limiter.
///
/// Cheaply cloneable (backed by `Arc`) and safe to share across tasks and
/// threads; all clones see the same attempt store.
#[derive(Clone)]
pub struct AuthRateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    registry: PolicyRegistry,
    resolver: IdentityResolver,
    evaluator: SlidingWindowEvaluator,
    escalation: EscalationDetector,
    cleanup_interval: StdDuration,
}

impl AuthRateLimiter {
    /// Build a limiter with a fresh attempt store.
    pub fn new(config: &AuthLimitConfig) -> AuthGuardResult<Self> {
        Self::with_store(config, Arc::new(AttemptStore::new()))
    }

    /// Build a limiter over an existing attempt store.
    pub fn with_store(config: &AuthLimitConfig, store: Arc<AttemptStore>) -> AuthGuardResult<Self> {
        config.validate()?;

        let registry = PolicyRegistry::from_configs(&config.policies)?;
        let grace = i64::try_from(config.grace_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                AuthGuardError::Config(format!(
                    "auth_limit.grace_secs {} is out of range",
                    config.grace_secs
                ))
            })?;

        tracing::info!(
            policies = registry.len(),
            grace_secs = config.grace_secs,
            escalation_factor = config.escalation_factor,
            record_denied = config.record_denied_attempts,
            "creating auth endpoint rate limiter"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                resolver: IdentityResolver::new(config.trust_forwarded_headers),
                evaluator: SlidingWindowEvaluator::new(
                    store,
                    grace,
                    config.record_denied_attempts,
                    config.escalation_factor,
                ),
                escalation: EscalationDetector::new(config.escalation_factor),
                cleanup_interval: StdDuration::from_secs(config.cleanup_interval_secs.max(1)),
            }),
        })
    }

    /// Check a request against the limiter using the current time.
    pub fn check(
        &self,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
    ) -> GuardOutcome {
        let Some(policy) = self.inner.registry.lookup(method, path) else {
            return GuardOutcome::Bypass;
        };

        let identity = self.inner.resolver.resolve(headers, peer);
        let (decision, now) = self.inner.evaluator.evaluate_now(&identity, policy);
        self.outcome(&identity, policy, decision, now)
    }

    /// Check a request as if it arrived at `now`.
    pub fn check_at(
        &self,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
        now: DateTime<Utc>,
    ) -> GuardOutcome {
        let Some(policy) = self.inner.registry.lookup(method, path) else {
            return GuardOutcome::Bypass;
        };

        let identity = self.inner.resolver.resolve(headers, peer);
        self.evaluate_identity(&identity, policy, now)
    }

    /// Evaluate an already-resolved identity against `policy`.
    pub fn evaluate_identity(
        &self,
        identity: &str,
        policy: &Policy,
        now: DateTime<Utc>,
    ) -> GuardOutcome {
        let decision = self.inner.evaluator.evaluate(identity, policy, now);
        self.outcome(identity, policy, decision, now)
    }

    fn outcome(
        &self,
        identity: &str,
        policy: &Policy,
        decision: Decision,
        now: DateTime<Utc>,
    ) -> GuardOutcome {
        match decision {
            Decision::Admit { remaining, .. } => GuardOutcome::Admitted {
                endpoint: policy.endpoint.clone(),
                identity: identity.to_string(),
                remaining,
            },
            Decision::Deny { attempts } => {
                let escalation =
                    self.inner
                        .escalation
                        .check(identity, &policy.endpoint, attempts, policy.limit);

                tracing::info!(
                    identity = %escalation::truncate_identity(identity),
                    endpoint = %policy.endpoint,
                    attempts,
                    limit = policy.limit,
                    "auth endpoint rate limit exceeded"
                );

                GuardOutcome::Rejected {
                    endpoint: policy.endpoint.clone(),
                    identity: identity.to_string(),
                    attempts,
                    rejection: Rejection::compose(policy, now),
                    escalation,
                }
            }
        }
    }

    pub fn registry(&self) -> &PolicyRegistry {
        &self.inner.registry
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.inner.resolver
    }

    pub fn store(&self) -> &Arc<AttemptStore> {
        self.inner.evaluator.store()
    }

    /// Number of (identity, endpoint) keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.store().len()
    }

    /// Spawn a background thread that periodically evicts expired records.
    ///
    /// The thread holds an `Arc` to the limiter state and runs for the life
    /// of the process.
    pub fn start_cleanup_task(&self) -> std::io::Result<()> {
        let inner = Arc::clone(&self.inner);

        std::thread::Builder::new()
            .name("auth-limit-cleanup".into())
            .spawn(move || loop {
                std::thread::sleep(inner.cleanup_interval);
                inner.evaluator.store().remove_expired(Utc::now());
                tracing::trace!("auth limiter cleanup tick completed");
            })?;

        Ok(())
    }
}
