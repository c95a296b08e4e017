//! 레코드/블롭 식별자 생성기.
//!
//! 기본 생성기는 밀리초 벽시계 값을 10진 문자열로 발급한다
//! (예: `"1700000000000"`). 한 인스턴스 안에서는 엄격히 증가하지만
//! 서로 다른 인스턴스가 같은 밀리초에 발급한 ID는 겹칠 수 있다.
//! 그 충돌은 저장소가 삽입 시점에 감지하고 ID를 다시 발급한다.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use uuid::Uuid;

/// 식별자 생성 포트
pub trait IdGenerator: Send + Sync {
    /// 새 식별자 발급
    fn new_id(&self) -> String;
}

/// 밀리초 시계 함수
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// 시스템 시계 (유닉스 밀리초)
pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

/// 밀리초 기반 단조 증가 생성기
///
/// 시계가 앞으로 가지 않았으면 직전 값 + 1을 발급한다.
pub struct MonotonicIdGenerator {
    last: AtomicI64,
    clock: Clock,
}

impl MonotonicIdGenerator {
    /// 시스템 시계 사용
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// 시계 주입 (테스트용)
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            last: AtomicI64::new(i64::MIN),
            clock,
        }
    }

    fn next_millis(&self) -> i64 {
        let now = (self.clock)();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = if now > prev { now } else { prev + 1 };
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

impl Default for MonotonicIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for MonotonicIdGenerator {
    fn new_id(&self) -> String {
        self.next_millis().to_string()
    }
}

/// UUID v4 생성기 (인스턴스 간 충돌 없음)
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
