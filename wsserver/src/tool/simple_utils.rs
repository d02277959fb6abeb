//! 간단한 공통 유틸리티

use rand::distributions::Alphanumeric;
use rand::Rng;

/// 방 ID 길이 (영숫자 12자리면 충돌 확률이 무시 가능한 수준)
const ROOM_ID_LEN: usize = 12;

/// 간단한 데이터 유틸리티
pub struct SimpleUtils;

impl SimpleUtils {
    /// 현재 타임스탬프 (초)
    ///
    /// 현재 시간을 Unix 타임스탬프(초 단위)로 반환합니다.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use wsserver::tool::SimpleUtils;
    /// let timestamp = SimpleUtils::current_timestamp();
    /// assert!(timestamp > 0);
    /// ```
    pub fn current_timestamp() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// 현재 타임스탬프 (밀리초)
    pub fn current_timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// 무작위 방 ID 생성
    ///
    /// 영숫자 12자리 무작위 문자열을 생성합니다. 암호학적 보장은 없으며
    /// 방 식별 용도로만 사용합니다.
    pub fn random_room_id() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ROOM_ID_LEN)
            .map(char::from)
            .collect()
    }
}
