use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::{Config, StateMachine};
use std::time::Duration;

/// Breaker guarding the outbound email provider.
pub type EmailCircuitBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates a circuit breaker for email provider calls so a provider outage
/// fails fast instead of tying up request handlers.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// While OPEN, sends are rejected without touching the network and surface as
/// an external API error, which leaves any claimed cadence stage to be released.
pub fn create_email_circuit_breaker() -> EmailCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use failsafe::futures::CircuitBreaker;
    use failsafe::Error;

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = create_email_circuit_breaker();

        // Simulate 5 consecutive provider failures
        for _ in 0..5 {
            let result = cb.call(async { Err::<(), &str>("provider returned 500") }).await;
            assert!(result.is_err());
        }

        // Next call should be rejected (circuit is open)
        let result = cb.call(async { Ok::<(), &str>(()) }).await;

        match result {
            Err(Error::Rejected) => {}
            _ => panic!("Expected circuit to be open and reject requests"),
        }
    }

    #[tokio::test]
    async fn test_circuit_breaker_allows_success() {
        let cb = create_email_circuit_breaker();

        let result = cb.call(async { Ok::<i32, &str>(42) }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_success_resets_failure_streak() {
        let cb = create_email_circuit_breaker();

        for _ in 0..4 {
            let _ = cb.call(async { Err::<(), &str>("timeout") }).await;
        }
        assert!(cb.call(async { Ok::<(), &str>(()) }).await.is_ok());
        for _ in 0..4 {
            let _ = cb.call(async { Err::<(), &str>("timeout") }).await;
        }

        // Never five in a row, so the breaker is still closed
        assert!(cb.is_call_permitted());
    }
}
