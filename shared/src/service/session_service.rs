//! 단일 활성 세션 관리 서비스
//!
//! 사용자당 하나의 활성 연결만 허용합니다. 같은 사용자가 새 연결에서
//! 인증하면 이전 연결이 무효화 대상으로 반환되며, 서버는 해당 연결을
//! 종료합니다.

use dashmap::DashMap;
use tracing::{debug, info};

use crate::model::UserId;

/// 연결 ID 타입 정의 (서버 프로세스 내 단조 증가 값)
pub type ConnId = u64;

/// 세션 서비스
///
/// user_id -> 활성 연결 매핑을 관리합니다. 토큰 인코딩이나 서명 검증은
/// 수행하지 않습니다. 신원 검증은 외부 인증 레이어의 책임입니다.
#[derive(Default)]
pub struct SessionService {
    /// 사용자별 활성 연결: user_id -> conn_id
    active_sessions: DashMap<UserId, ConnId>,
}

impl SessionService {
    pub fn new() -> Self {
        Self {
            active_sessions: DashMap::new(),
        }
    }

    /// 세션 등록
    ///
    /// 사용자를 새 연결에 바인딩하고, 기존 활성 연결이 있으면 그 연결
    /// ID를 반환합니다. 호출자는 반환된 연결을 종료해야 합니다.
    pub fn register(&self, user_id: UserId, conn_id: ConnId) -> Option<ConnId> {
        let previous = self.active_sessions.insert(user_id, conn_id);

        match previous {
            Some(old_conn) if old_conn != conn_id => {
                info!(
                    "사용자 {} 세션 교체: 연결 {} -> {}",
                    user_id, old_conn, conn_id
                );
                Some(old_conn)
            }
            _ => {
                debug!("사용자 {} 세션 등록: 연결 {}", user_id, conn_id);
                None
            }
        }
    }

    /// 세션 종료
    ///
    /// 해당 연결이 현재 활성 세션일 때만 제거합니다. 새 연결로 교체된
    /// 뒤에 도착한 이전 연결의 정리 경로가 새 세션을 지우지 않도록
    /// 연결 ID를 함께 검사합니다.
    pub fn end_session(&self, user_id: UserId, conn_id: ConnId) {
        self.active_sessions
            .remove_if(&user_id, |_, active| *active == conn_id);
    }

    /// 사용자의 현재 활성 연결 조회
    pub fn active_connection(&self, user_id: UserId) -> Option<ConnId> {
        self.active_sessions.get(&user_id).map(|entry| *entry)
    }

    /// 활성 세션 수
    pub fn session_count(&self) -> usize {
        self.active_sessions.len()
    }
}
