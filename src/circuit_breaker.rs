use crate::errors::AppError;
use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::futures::CircuitBreaker;
use failsafe::{Config, StateMachine};
use std::future::Future;
use std::time::Duration;

/// Breaker type held by each external lookup service.
pub type LookupCircuitBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates a circuit breaker for an external lookup service.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// Only calls that got no usable answer count as failures: network errors,
/// 5xx statuses and unreadable bodies. "Not found" and 4xx refusals are
/// answers, so users mistyping a document cannot open the breaker.
pub fn create_lookup_circuit_breaker() -> LookupCircuitBreaker {
    let backoff_strategy = backoff::exponential(Duration::from_secs(10), Duration::from_secs(60));

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

/// Reply from a collaborator that answered. `Err` is the collaborator
/// refusing this particular request (a 4xx) and passes through the breaker
/// without counting against it.
pub type Answered<T> = Result<T, AppError>;

/// Runs `call` through the breaker. The outer `Err` of `call` is a failure to
/// get an answer and counts toward opening the breaker. A rejected call
/// (breaker open) becomes a transport error so callers surface the generic
/// failure message.
pub async fn guarded<T, F>(
    breaker: &LookupCircuitBreaker,
    service: &str,
    call: F,
) -> Result<T, AppError>
where
    F: Future<Output = Result<Answered<T>, AppError>>,
{
    match breaker.call(Box::pin(call)).await {
        Ok(answered) => answered,
        Err(failsafe::Error::Inner(e)) => Err(e),
        Err(failsafe::Error::Rejected) => {
            tracing::warn!("{} circuit open, rejecting lookup", service);
            Err(AppError::Transport(None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let cb = create_lookup_circuit_breaker();

        for _ in 0..5 {
            let result: Result<(), AppError> = guarded(&cb, "test", async {
                Err(AppError::Transport(Some("simulated error".to_string())))
            })
            .await;
            assert!(matches!(result, Err(AppError::Transport(Some(_)))));
        }

        let result: Result<(), AppError> = guarded(&cb, "test", async { Ok(Ok(())) }).await;
        assert!(matches!(result, Err(AppError::Transport(None))));
    }

    #[tokio::test]
    async fn test_refusals_do_not_open_circuit() {
        let cb = create_lookup_circuit_breaker();

        for _ in 0..10 {
            let result: Result<(), AppError> = guarded(&cb, "test", async {
                Ok(Err(AppError::Transport(Some("CNPJ inválido".to_string()))))
            })
            .await;
            assert_eq!(result.unwrap_err().user_message(), "CNPJ inválido");
        }

        let result = guarded(&cb, "test", async { Ok(Ok::<i32, AppError>(42)) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_circuit_breaker_allows_success() {
        let cb = create_lookup_circuit_breaker();

        let result = guarded(&cb, "test", async { Ok(Ok::<i32, AppError>(42)) }).await;

        assert_eq!(result.unwrap(), 42);
    }
}
