//! WebSocket 게임/음성 프로토콜 정의
//!
//! 클라이언트와 서버 간 통신을 위한 JSON 메시지 프로토콜을 정의합니다.
//! 하나의 지속 연결 위에서 게임 트래픽과 음성 트래픽을 다중화합니다.
//!
//! # 봉투 구조
//!
//! ```json
//! {"type": "...", "roomId": "...", "playerId": 1, "data": {...}, "timestamp": 1700000000}
//! ```
//!
//! `type` 필드 값으로 디스패치하며, 알 수 없는 타입은 로그만 남기고
//! 무시합니다. 연결을 종료하지 않습니다.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::Point2D;

/// 메시지 봉투
///
/// 모든 송수신 메시지의 공통 구조입니다. `data`에 타입별 페이로드가
/// 들어가며, 핸들러가 필요한 구조체로 역직렬화합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// 메시지 타입 (디스패치 키)
    #[serde(rename = "type")]
    pub kind: String,

    /// 대상 방 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,

    /// 게임 도메인 발신자/대상 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<u32>,

    /// 음성 도메인 발신자/대상 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<u32>,

    /// 타입별 페이로드
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Unix 타임스탬프 (초)
    pub timestamp: i64,
}

impl Envelope {
    /// 서버 발신 이벤트 생성
    pub fn event(kind: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            room_id: None,
            player_id: None,
            user_id: None,
            data: Some(data),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// 방 ID가 붙은 서버 발신 이벤트 생성
    pub fn room_event(kind: &str, room_id: &str, data: Value) -> Self {
        let mut envelope = Self::event(kind, data);
        envelope.room_id = Some(room_id.to_string());
        envelope
    }

    /// 에러 이벤트 생성
    ///
    /// 입장 에러를 요청한 연결에만 전달할 때 사용합니다.
    pub fn error(code: u16, message: &str) -> Self {
        Self::event(
            "error",
            serde_json::json!({ "code": code, "message": message }),
        )
    }

    /// JSON 텍스트로 직렬화
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| anyhow!("메시지 직렬화 실패: {}", e))
    }

    /// JSON 텍스트에서 역직렬화
    pub fn from_text(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| anyhow!("메시지 역직렬화 실패: {}", e))
    }

    /// 페이로드를 타입별 구조체로 역직렬화
    pub fn parse_data<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| anyhow!("{} 메시지에 data 필드가 없습니다", self.kind))?;
        serde_json::from_value(data)
            .map_err(|e| anyhow!("{} 페이로드 역직렬화 실패: {}", self.kind, e))
    }
}

// === 공통 / 연결 페이로드 ===

/// 인증 페이로드 (connect)
///
/// 외부 세션 레이어에서 검증된 신원 정보입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectData {
    pub user_id: u32,
    pub nickname: String,
    #[serde(default)]
    pub is_admin: bool,
}

// === 게임 도메인 페이로드 ===

/// 게임 방 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRoomSettings {
    /// 최대 인원
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    /// 비공개 방 여부
    #[serde(default)]
    pub is_private: bool,
    /// 입장 비밀번호
    #[serde(default)]
    pub password: Option<String>,
    /// 게임 모드
    #[serde(default = "default_mode")]
    pub mode: String,
    /// 난이도
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

fn default_max_players() -> u32 {
    4
}

fn default_mode() -> String {
    "classic".to_string()
}

fn default_difficulty() -> String {
    "normal".to_string()
}

impl Default for GameRoomSettings {
    fn default() -> Self {
        Self {
            max_players: default_max_players(),
            is_private: false,
            password: None,
            mode: default_mode(),
            difficulty: default_difficulty(),
        }
    }
}

/// 방 생성 페이로드 (room_create)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomData {
    pub name: String,
    pub game_type: String,
    #[serde(default)]
    pub settings: GameRoomSettings,
}

/// 방 입장 페이로드 (room_join)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomData {
    #[serde(default)]
    pub password: Option<String>,
}

/// 준비 상태 페이로드 (player_ready)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyData {
    pub is_ready: bool,
}

/// 이동 페이로드 (player_move)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveData {
    pub x: f64,
    pub y: f64,
}

impl MoveData {
    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }
}

/// 득점 페이로드 (player_score)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreData {
    pub points: u32,
    pub item_type: String,
}

/// 폭발 페이로드 (bomb_explosion)
///
/// 반경/피해량이 생략되면 서버 설정 기본값을 사용합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplosionData {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub damage: Option<u32>,
}

/// 게임 종료 페이로드 (game_end)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndGameData {
    #[serde(default)]
    pub reason: Option<String>,
}

// === 음성 도메인 페이로드 ===

/// 음성 품질 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    /// 비트레이트 (bps)
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,
    /// 샘플레이트 (Hz)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// 노이즈 감소 활성화
    #[serde(default = "default_true")]
    pub noise_reduction: bool,
    /// 에코 제거 활성화
    #[serde(default = "default_true")]
    pub echo_cancellation: bool,
}

fn default_bitrate() -> u32 {
    64_000
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_true() -> bool {
    true
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            bitrate: default_bitrate(),
            sample_rate: default_sample_rate(),
            noise_reduction: true,
            echo_cancellation: true,
        }
    }
}

/// 음성 방 생성 페이로드 (voice_room_create)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCreateData {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_max_users")]
    pub max_users: u32,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub audio: AudioSettings,
}

fn default_max_users() -> u32 {
    10
}

/// 음성 방 입장 페이로드 (voice_room_join)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceJoinData {
    #[serde(default)]
    pub password: Option<String>,
}

/// 음질/볼륨 변경 페이로드 (voice_quality_change)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceQualityData {
    #[serde(default)]
    pub quality: Option<String>,
    /// 볼륨 (0-100)
    #[serde(default)]
    pub volume: Option<u8>,
}

/// 노이즈 감소 토글 페이로드 (voice_noise_reduction)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceNoiseReductionData {
    pub enabled: bool,
}

/// 음성 방 설정 변경 페이로드 (voice_room_settings)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceRoomSettingsData {
    #[serde(default)]
    pub max_users: Option<u32>,
    #[serde(default)]
    pub is_private: Option<bool>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub bitrate: Option<u32>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub echo_cancellation: Option<bool>,
}

/// 사용자 상태 변경 페이로드 (voice_user_status)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceUserStatusData {
    #[serde(default)]
    pub mic_enabled: Option<bool>,
    #[serde(default)]
    pub speaker_enabled: Option<bool>,
    #[serde(default)]
    pub is_deafened: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 봉투 직렬화/역직렬화 테스트
    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope::room_event(
            "player_score",
            "abc123",
            serde_json::json!({ "points": 10, "itemType": "apple" }),
        );

        let text = envelope.to_text().unwrap();
        let decoded = Envelope::from_text(&text).unwrap();

        assert_eq!(decoded.kind, "player_score");
        assert_eq!(decoded.room_id.as_deref(), Some("abc123"));
        let data: ScoreData = decoded.parse_data().unwrap();
        assert_eq!(data.points, 10);
        assert_eq!(data.item_type, "apple");
    }

    /// 클라이언트 봉투 형식 호환성 테스트
    #[test]
    fn test_client_envelope_format() {
        let text = r#"{"type":"room_join","roomId":"r1","playerId":3,"data":{"password":"pw"},"timestamp":1700000000}"#;
        let envelope = Envelope::from_text(text).unwrap();

        assert_eq!(envelope.kind, "room_join");
        assert_eq!(envelope.player_id, Some(3));
        let data: JoinRoomData = envelope.parse_data().unwrap();
        assert_eq!(data.password.as_deref(), Some("pw"));
    }

    /// 기본값 채움 테스트
    #[test]
    fn test_settings_defaults() {
        let data: CreateRoomData = serde_json::from_str(
            r#"{"name":"과일방","gameType":"fruit_catch"}"#,
        )
        .unwrap();

        assert_eq!(data.settings.max_players, 4);
        assert_eq!(data.settings.mode, "classic");
        assert!(!data.settings.is_private);

        let audio = AudioSettings::default();
        assert_eq!(audio.bitrate, 64_000);
        assert!(audio.noise_reduction);
    }

    /// data 필드 누락 시 에러 테스트
    #[test]
    fn test_missing_data_field() {
        let envelope = Envelope {
            kind: "player_move".to_string(),
            room_id: None,
            player_id: None,
            user_id: None,
            data: None,
            timestamp: 0,
        };
        assert!(envelope.parse_data::<MoveData>().is_err());
    }

    /// 에러 이벤트 형식 테스트
    #[test]
    fn test_error_event() {
        let envelope = Envelope::error(404, "방을 찾을 수 없습니다");
        assert_eq!(envelope.kind, "error");
        let data = envelope.data.unwrap();
        assert_eq!(data["code"], 404);
    }
}
