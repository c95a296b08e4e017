//! 일시적 실패 재시도.
//!
//! exponential backoff: `base`에서 시작해 시도마다 2배, `max`에서 멈춘다.
//! `CoreError::is_transient()`가 참인 에러만 재시도한다.

use std::future::Future;
use std::time::Duration;

use pocket_core::config::StorageConfig;
use pocket_core::error::CoreError;
use tracing::warn;

/// 재시도 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최초 시도 이후 추가 시도 횟수
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &StorageConfig) -> Self {
        Self {
            max_retries: config.write_retries,
            base_delay: config.retry_base_delay(),
            max_delay: config.retry_max_delay(),
        }
    }

    /// 재시도 없음 (테스트용)
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// `attempt`번째 재시도 전 대기 시간 (0부터)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.base_delay;
        for _ in 0..attempt {
            delay = (delay * 2).min(self.max_delay);
        }
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

/// 일시적 실패를 정책에 따라 재시도
pub async fn retry<T, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                attempt += 1;
                warn!(
                    "{what} 실패 (시도 {attempt}/{}), {}ms 후 재시도: {e}",
                    policy.max_retries,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(300),
        }
    }

    #[test]
    fn delay_doubles_until_cap() {
        let p = policy(5);
        assert_eq!(p.delay_for(0), Duration::from_millis(50));
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(300));
        assert_eq!(p.delay_for(10), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry(policy(3), "쓰기", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CoreError::StorageWrite("busy".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry(policy(2), "쓰기", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::StorageWrite("busy".to_string()))
        })
        .await;

        assert!(matches!(result, Err(CoreError::StorageWrite(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry(policy(3), "쓰기", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::QuotaExceeded { size: 2, limit: 1 })
        })
        .await;

        assert!(matches!(result, Err(CoreError::QuotaExceeded { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
