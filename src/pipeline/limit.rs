use super::{Answer, Answers, EvalRequest, Evaluate};
use crate::error::CallError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Admits at most as many in-flight calls as the shared semaphore has permits.
///
/// The permit is held across every retry of the call and released when the call
/// finishes, whatever the outcome.
pub struct Limited<E> {
    inner: E,
    limiter: Arc<Semaphore>,
}

impl<E> Limited<E> {
    pub fn new(inner: E, limiter: Arc<Semaphore>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl<A, E> Evaluate<A> for Limited<E>
where
    A: Answer,
    E: Evaluate<A>,
{
    async fn evaluate(&self, request: &EvalRequest) -> Result<Answers<A>, CallError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| CallError::LimiterClosed)?;
        self.inner.evaluate(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::checklist;
    use crate::pipeline::ItemAnswer;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Tracks the highest number of concurrent evaluations
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Evaluate<bool> for Arc<Gauge> {
        async fn evaluate(&self, request: &EvalRequest) -> Result<Answers<bool>, CallError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(request
                .checklist
                .keys()
                .map(|k| {
                    (
                        k.clone(),
                        ItemAnswer {
                            reasoning: String::new(),
                            answer: true,
                        },
                    )
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_limiter_bounds_concurrency() {
        let gauge = Arc::new(Gauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let limited = Arc::new(Limited::new(gauge.clone(), Arc::new(Semaphore::new(2))));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let limited = limited.clone();
                tokio::spawn(async move {
                    let request = EvalRequest::new(checklist(&["a"]), Arc::from("cv"), Some(i));
                    Evaluate::<bool>::evaluate(&*limited, &request).await
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(gauge.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permit_released_after_failure() {
        struct Failing;

        #[async_trait]
        impl Evaluate<bool> for Failing {
            async fn evaluate(&self, _: &EvalRequest) -> Result<Answers<bool>, CallError> {
                Err(CallError::LimiterClosed)
            }
        }

        let semaphore = Arc::new(Semaphore::new(1));
        let limited = Limited::new(Failing, semaphore.clone());
        let request = EvalRequest::new(checklist(&["a"]), Arc::from("cv"), None);

        assert!(Evaluate::<bool>::evaluate(&limited, &request).await.is_err());
        assert_eq!(semaphore.available_permits(), 1);
    }
}
