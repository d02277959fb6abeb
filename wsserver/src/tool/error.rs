//! 공통 에러 처리 시스템
//!
//! 서버에서 발생하는 에러를 스펙 분류 체계대로 관리합니다.
//! - 입장 에러: 요청자에게만 typed error 이벤트로 반환
//! - 권한 에러: 피드백 없이 무시 (클라이언트 오동작으로 간주)
//! - 협력자 에러: 로그만 남기고 인메모리 상태는 유지
//! - 잘못된 입력: 로그만 남기고 연결 유지

use thiserror::Error;

/// WebSocket 서버 에러 타입
#[derive(Debug, Clone, Error)]
pub enum WsServerError {
    /// 입장 에러: 방을 찾을 수 없음
    #[error("방을 찾을 수 없습니다: {room_id}")]
    RoomNotFound { room_id: String },

    /// 입장 에러: 방 정원 초과
    #[error("방이 가득 참: {current}/{max}")]
    RoomFull { room_id: String, current: u32, max: u32 },

    /// 입장 에러: 이미 게임이 진행 중
    #[error("게임이 이미 진행 중입니다: {room_id}")]
    GameInProgress { room_id: String },

    /// 입장 에러: 비밀번호 불일치
    #[error("방 비밀번호가 일치하지 않습니다: {room_id}")]
    WrongPassword { room_id: String },

    /// 권한 에러: 호스트/관리자 전용 작업
    #[error("권한이 없는 요청입니다: {operation}")]
    Unauthorized { operation: String },

    /// 인증되지 않은 연결의 요청
    #[error("인증되지 않은 연결입니다: 연결 {conn_id}")]
    NotAuthenticated { conn_id: u64 },

    /// 협력자 에러: 영속화 실패 (로그 전용)
    #[error("점수 영속화 실패: 사용자 {user_id}: {message}")]
    Persistence { user_id: u32, message: String },

    /// 프로토콜 에러: 잘못된 입력
    #[error("잘못된 메시지: {message}")]
    Protocol { message: String },

    /// 내부 시스템 에러
    #[error("내부 에러 [{component}]: {message}")]
    Internal { component: String, message: String },
}

impl WsServerError {
    /// 와이어로 전송되는 에러 코드
    ///
    /// 입장 에러만 클라이언트에 전달되며, HTTP 상태 코드와 유사한
    /// 체계를 사용합니다.
    pub fn code(&self) -> u16 {
        match self {
            WsServerError::RoomNotFound { .. } => 404,
            WsServerError::RoomFull { .. } => 409,
            WsServerError::GameInProgress { .. } => 409,
            WsServerError::WrongPassword { .. } => 403,
            WsServerError::Unauthorized { .. } => 403,
            WsServerError::NotAuthenticated { .. } => 401,
            WsServerError::Protocol { .. } => 400,
            WsServerError::Persistence { .. } | WsServerError::Internal { .. } => 500,
        }
    }

    /// 요청자에게 에러 이벤트를 보내야 하는 분류인지 여부
    ///
    /// 입장 에러만 true입니다. 권한 에러는 무시하고, 협력자/프로토콜
    /// 에러는 로그로만 처리합니다.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            WsServerError::RoomNotFound { .. }
                | WsServerError::RoomFull { .. }
                | WsServerError::GameInProgress { .. }
                | WsServerError::WrongPassword { .. }
        )
    }
}
