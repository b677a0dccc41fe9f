use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::policy::Policy;
use crate::store::{AttemptKey, AttemptStore};

/// Outcome of evaluating one attempt against its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Attempt recorded; `attempts` now in the window, `remaining` before saturation.
    Admit { attempts: usize, remaining: u32 },
    /// Over the limit. `attempts` is the in-window count seen at denial time.
    Deny { attempts: usize },
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit { .. })
    }
}

/// A true sliding window log limiter over the shared [`AttemptStore`].
///
/// Each key keeps the timestamps of its admitted attempts. On every request
/// entries older than `now - window` are pruned and the remainder is compared
/// against the limit. Prune, compare and append run under the key's lock, so
/// concurrent requests for one key can never admit more than `limit` attempts
/// per window between them.
pub struct SlidingWindowEvaluator {
    store: Arc<AttemptStore>,
    grace: Duration,
    record_denied: bool,
    /// Upper bound on stored timestamps, as a multiple of the limit.
    retention_factor: u32,
}

impl SlidingWindowEvaluator {
    /// * `grace`            - retention added beyond the window on every write
    /// * `record_denied`    - store denied attempts too, extending the block
    /// * `retention_factor` - keep at most `limit * retention_factor` timestamps
    pub fn new(
        store: Arc<AttemptStore>,
        grace: Duration,
        record_denied: bool,
        retention_factor: u32,
    ) -> Self {
        Self {
            store,
            grace,
            record_denied,
            retention_factor: retention_factor.max(1),
        }
    }

    pub fn store(&self) -> &Arc<AttemptStore> {
        &self.store
    }

    pub fn records_denied(&self) -> bool {
        self.record_denied
    }

    /// Admit or deny one attempt by `identity` against `policy` at `now`.
    pub fn evaluate(&self, identity: &str, policy: &Policy, now: DateTime<Utc>) -> Decision {
        self.evaluate_with(identity, policy, now, || now).0
    }

    /// Admit or deny one attempt stamped with the wall clock.
    ///
    /// The clock is read after the key is locked, so attempts on one key are
    /// stored in the order they were decided. Returns the instant used.
    pub fn evaluate_now(&self, identity: &str, policy: &Policy) -> (Decision, DateTime<Utc>) {
        self.evaluate_with(identity, policy, Utc::now(), Utc::now)
    }

    fn evaluate_with(
        &self,
        identity: &str,
        policy: &Policy,
        observed: DateTime<Utc>,
        clock: impl FnOnce() -> DateTime<Utc>,
    ) -> (Decision, DateTime<Utc>) {
        let key = AttemptKey::new(identity, &policy.endpoint);
        let ttl = policy
            .window
            .checked_add(&self.grace)
            .unwrap_or(policy.window);
        let limit = policy.limit as usize;
        let cap = limit.saturating_mul(self.retention_factor as usize).max(limit);

        self.store.update(&key, observed, |record| {
            let now = clock();
            record.prune(window_start(now, policy), now);
            let attempts = record.len();

            if attempts >= limit {
                if self.record_denied {
                    record.push(now, cap);
                    record.touch(now, ttl);
                }
                return (Decision::Deny { attempts }, now);
            }

            record.push(now, cap);
            record.touch(now, ttl);
            let attempts = record.len();
            let decision = Decision::Admit {
                attempts,
                remaining: policy.limit.saturating_sub(attempts as u32),
            };
            (decision, now)
        })
    }

    /// In-window attempt count for `identity` on `policy`, without recording.
    pub fn current_attempts(&self, identity: &str, policy: &Policy, now: DateTime<Utc>) -> usize {
        let key = AttemptKey::new(identity, &policy.endpoint);
        let cutoff = window_start(now, policy);

        self.store
            .get(&key, now)
            .iter()
            .filter(|t| **t >= cutoff && **t <= now)
            .count()
    }
}

fn window_start(now: DateTime<Utc>, policy: &Policy) -> DateTime<Utc> {
    now.checked_sub_signed(policy.window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn evaluator(record_denied: bool) -> SlidingWindowEvaluator {
        SlidingWindowEvaluator::new(
            Arc::new(AttemptStore::new()),
            Duration::minutes(5),
            record_denied,
            2,
        )
    }

    fn login() -> Policy {
        Policy::new("/api/auth/login", Duration::minutes(15), 5)
    }

    #[test]
    fn admits_up_to_limit() {
        let evaluator = evaluator(false);
        let policy = login();

        for i in 0..5 {
            let decision = evaluator.evaluate("client", &policy, t0() + Duration::seconds(i));
            assert_eq!(
                decision,
                Decision::Admit {
                    attempts: i as usize + 1,
                    remaining: 4 - i as u32
                }
            );
        }

        assert_eq!(
            evaluator.evaluate("client", &policy, t0() + Duration::seconds(10)),
            Decision::Deny { attempts: 5 }
        );
    }

    #[test]
    fn independent_keys() {
        let evaluator = evaluator(false);
        let policy = login();

        for _ in 0..5 {
            evaluator.evaluate("a", &policy, t0());
        }
        assert!(!evaluator.evaluate("a", &policy, t0()).is_admitted());
        assert!(evaluator.evaluate("b", &policy, t0()).is_admitted());
    }

    #[test]
    fn endpoints_are_tracked_separately() {
        let evaluator = evaluator(false);
        let login = login();
        let register = Policy::new("/api/auth/register", Duration::hours(1), 3);

        for _ in 0..5 {
            evaluator.evaluate("a", &login, t0());
        }
        assert!(!evaluator.evaluate("a", &login, t0()).is_admitted());
        assert!(evaluator.evaluate("a", &register, t0()).is_admitted());
    }

    #[test]
    fn window_slides_from_oldest_attempt() {
        let evaluator = evaluator(false);
        let policy = Policy::new("/api/auth/register", Duration::minutes(60), 3);

        evaluator.evaluate("c", &policy, t0());
        evaluator.evaluate("c", &policy, t0() + Duration::minutes(20));
        evaluator.evaluate("c", &policy, t0() + Duration::minutes(40));
        assert!(!evaluator
            .evaluate("c", &policy, t0() + Duration::minutes(59))
            .is_admitted());

        // Oldest attempt has aged out; one slot opens.
        assert!(evaluator
            .evaluate("c", &policy, t0() + Duration::minutes(61))
            .is_admitted());
        assert!(!evaluator
            .evaluate("c", &policy, t0() + Duration::minutes(62))
            .is_admitted());
    }

    #[test]
    fn attempt_exactly_window_old_still_counts() {
        let evaluator = evaluator(false);
        let policy = Policy::new("/e", Duration::minutes(1), 1);

        evaluator.evaluate("c", &policy, t0());
        assert!(!evaluator
            .evaluate("c", &policy, t0() + Duration::minutes(1))
            .is_admitted());
        assert!(evaluator
            .evaluate("c", &policy, t0() + Duration::minutes(1) + Duration::milliseconds(1))
            .is_admitted());
    }

    #[test]
    fn attempts_stamped_after_now_are_discarded() {
        let evaluator = evaluator(false);
        let policy = Policy::new("/e", Duration::minutes(1), 1);

        assert!(evaluator
            .evaluate("c", &policy, t0() + Duration::minutes(30))
            .is_admitted());
        assert_eq!(evaluator.current_attempts("c", &policy, t0()), 0);
        assert_eq!(
            evaluator.evaluate("c", &policy, t0()),
            Decision::Admit { attempts: 1, remaining: 0 }
        );
        assert_eq!(
            evaluator.store().get(&AttemptKey::new("c", "/e"), t0()),
            vec![t0()]
        );
    }

    #[test]
    fn admitted_attempt_refreshes_expiry() {
        let evaluator = evaluator(false);
        let policy = login();
        let key = AttemptKey::new("d", &policy.endpoint);

        evaluator.evaluate("d", &policy, t0());
        evaluator.evaluate("d", &policy, t0() + Duration::minutes(10));

        // expiry = last write + 15m window + 5m grace
        assert!(!evaluator.store().get(&key, t0() + Duration::minutes(29)).is_empty());
        assert!(evaluator.store().get(&key, t0() + Duration::minutes(30)).is_empty());
    }

    #[test]
    fn denied_attempts_do_not_refresh_expiry() {
        let evaluator = evaluator(false);
        let policy = login();
        let key = AttemptKey::new("e", &policy.endpoint);

        for _ in 0..5 {
            evaluator.evaluate("e", &policy, t0());
        }
        for m in 1..15 {
            evaluator.evaluate("e", &policy, t0() + Duration::minutes(m));
        }

        assert_eq!(evaluator.store().get(&key, t0() + Duration::minutes(14)).len(), 5);
        assert!(evaluator.store().get(&key, t0() + Duration::minutes(20)).is_empty());
    }

    #[test]
    fn recorded_denials_keep_block_alive() {
        let evaluator = evaluator(true);
        let policy = Policy::new("/e", Duration::minutes(10), 2);

        evaluator.evaluate("f", &policy, t0());
        evaluator.evaluate("f", &policy, t0());
        // Keep hammering every 5 minutes.
        for m in [5, 10, 15, 20] {
            assert!(!evaluator
                .evaluate("f", &policy, t0() + Duration::minutes(m))
                .is_admitted());
        }
        assert_eq!(evaluator.current_attempts("f", &policy, t0() + Duration::minutes(20)), 3);
    }

    #[test]
    fn recorded_denials_are_capped() {
        let evaluator = evaluator(true);
        let policy = Policy::new("/e", Duration::minutes(10), 3);

        let mut last = Decision::Deny { attempts: 0 };
        for _ in 0..50 {
            last = evaluator.evaluate("g", &policy, t0());
        }

        assert_eq!(last, Decision::Deny { attempts: 6 });
        assert_eq!(evaluator.current_attempts("g", &policy, t0()), 6);
    }

    #[test]
    fn concurrent_burst_never_over_admits() {
        let evaluator = evaluator(false);
        let policy = Policy::new("/api/auth/refresh-token", Duration::minutes(5), 10);

        let admitted: usize = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..32)
                .map(|_| scope.spawn(|| evaluator.evaluate("burst", &policy, t0()).is_admitted()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });

        assert_eq!(admitted, 10);
    }

    #[test]
    fn wall_clock_burst_never_over_admits() {
        let evaluator = evaluator(false);
        let policy = Policy::new("/api/auth/refresh-token", Duration::minutes(5), 10);

        let decisions: Vec<(Decision, DateTime<Utc>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..32)
                .map(|_| scope.spawn(|| evaluator.evaluate_now("burst", &policy)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let admitted = decisions.iter().filter(|(d, _)| d.is_admitted()).count();
        assert_eq!(admitted, 10);

        let latest = decisions.iter().map(|(_, at)| *at).max().unwrap();
        let stored = evaluator
            .store()
            .get(&AttemptKey::new("burst", &policy.endpoint), latest);
        assert_eq!(stored.len(), 10);
        assert!(stored.windows(2).all(|pair| pair[0] <= pair[1]));
    }
}
