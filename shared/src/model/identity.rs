//! 사용자 신원 모델
//!
//! 외부 세션 레이어가 인증 시점에 공급하는 사용자 정보입니다.
//! 방은 신원을 소유하지 않고 값으로 복사하여 참조합니다.

use serde::{Deserialize, Serialize};

/// 사용자 ID 타입 정의
pub type UserId = u32;

/// 인증된 사용자 신원
///
/// 외부 인증 레이어에서 검증된 사용자 정보입니다.
/// 실시간 코어는 이 값을 신뢰하며 자체 검증을 수행하지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// 외부 시스템의 사용자 고유 ID
    pub user_id: UserId,
    /// 표시용 닉네임
    pub nickname: String,
    /// 관리자 권한 여부
    pub is_admin: bool,
}

impl Identity {
    /// 새로운 신원 생성
    pub fn new(user_id: UserId, nickname: impl Into<String>, is_admin: bool) -> Self {
        Self {
            user_id,
            nickname: nickname.into(),
            is_admin,
        }
    }
}
