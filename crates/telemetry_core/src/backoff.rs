//! Política de reconexão com backoff exponencial.

use std::time::Duration;

/// Parâmetros de reconexão.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Atraso antes da tentativa `attempt` (1-based): `min(initial * 2^(k-1), max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exp)
            .map_or(self.max, |d| d.min(self.max))
    }
}

/// Contador de tentativas de reconexão; zera quando a conexão abre.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempts: 0 }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    /// Consome uma tentativa e retorna o atraso, ou `None` se esgotou.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        Some(self.policy.delay_for_attempt(self.attempts))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
