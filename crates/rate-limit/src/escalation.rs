/// Identities are cut to this many characters before they reach the logs.
const LOGGED_IDENTITY_LEN: usize = 24;

/// A denial severe enough to be reported as a likely brute-force attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct EscalationEvent {
    pub identity: String,
    pub endpoint: String,
    pub attempts: usize,
    pub limit: u32,
    pub ratio: f64,
}

/// Flags identities whose denial-time attempt count reaches
/// `factor * limit`. Purely observational.
#[derive(Debug, Clone, Copy)]
pub struct EscalationDetector {
    factor: u32,
}

impl EscalationDetector {
    pub fn new(factor: u32) -> Self {
        Self {
            factor: factor.max(1),
        }
    }

    pub fn factor(&self) -> u32 {
        self.factor
    }

    pub fn threshold(&self, limit: u32) -> usize {
        (limit as usize).saturating_mul(self.factor as usize)
    }

    pub fn check(
        &self,
        identity: &str,
        endpoint: &str,
        attempts: usize,
        limit: u32,
    ) -> Option<EscalationEvent> {
        if attempts < self.threshold(limit) {
            return None;
        }

        let event = EscalationEvent {
            identity: truncate_identity(identity),
            endpoint: endpoint.to_string(),
            attempts,
            limit,
            ratio: attempts as f64 / f64::from(limit.max(1)),
        };

        tracing::warn!(
            target: "security",
            identity = %event.identity,
            endpoint = %event.endpoint,
            attempts = event.attempts,
            limit = event.limit,
            ratio = event.ratio,
            "possible brute-force attack on auth endpoint"
        );

        Some(event)
    }
}

impl Default for EscalationDetector {
    fn default() -> Self {
        Self::new(2)
    }
}

pub fn truncate_identity(identity: &str) -> String {
    identity.chars().take(LOGGED_IDENTITY_LEN).collect()
}
