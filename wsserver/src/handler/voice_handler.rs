//! 음성 채팅 매니저
//!
//! 음성 방의 생명주기와 발화/오디오 상태 중계를 담당합니다. 게임
//! 매니저와 구조적으로 평행하며, 진행 중(playing) 개념이 없다는 점과
//! 영구 방("general", "gaming")이 서버 시작 시부터 존재한다는 점이
//! 다릅니다. 오디오 페이로드는 불투명 데이터로 그대로 중계하며 디코딩,
//! 믹싱은 수행하지 않습니다.

use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use shared::model::{Identity, UserId};
use shared::service::ConnId;

use crate::protocol::{
    AudioSettings, Envelope, VoiceCreateData, VoiceJoinData, VoiceNoiseReductionData,
    VoiceQualityData, VoiceRoomSettingsData, VoiceUserStatusData,
};
use crate::service::{BroadcastService, ConnectionService, Recipient};
use crate::tool::error::WsServerError;
use crate::tool::SimpleUtils;

/// 에코 테스트 고정 지연 (진단용 합성 지연이며 실제 에코 제거가 아님)
const ECHO_TEST_DELAY_MS: u64 = 500;

/// 음성 방 내 사용자 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceUser {
    pub user_id: UserId,
    pub nickname: String,
    pub is_admin: bool,
    pub is_muted: bool,
    pub is_deafened: bool,
    pub is_speaking: bool,
    /// 볼륨 (0-100)
    pub volume: u8,
    pub quality: String,
    pub mic_enabled: bool,
    pub speaker_enabled: bool,
    pub last_activity: i64,
    #[serde(skip)]
    pub conn_id: ConnId,
    /// 방 입장 순번 (소유권 승계 기준)
    pub join_seq: u64,
}

impl VoiceUser {
    fn new(identity: &Identity, conn_id: ConnId, join_seq: u64) -> Self {
        Self {
            user_id: identity.user_id,
            nickname: identity.nickname.clone(),
            is_admin: identity.is_admin,
            is_muted: false,
            is_deafened: false,
            is_speaking: false,
            volume: 100,
            quality: "auto".to_string(),
            mic_enabled: true,
            speaker_enabled: true,
            last_activity: SimpleUtils::current_timestamp(),
            conn_id,
            join_seq,
        }
    }

    fn summary(&self) -> Value {
        json!({
            "userId": self.user_id,
            "nickname": &self.nickname,
            "isAdmin": self.is_admin,
            "isMuted": self.is_muted,
            "isDeafened": self.is_deafened,
            "isSpeaking": self.is_speaking,
            "volume": self.volume,
            "quality": &self.quality,
            "micEnabled": self.mic_enabled,
            "speakerEnabled": self.speaker_enabled,
        })
    }
}

/// 음성 방
#[derive(Debug, Clone)]
pub struct VoiceRoom {
    pub room_id: String,
    pub name: String,
    pub description: String,
    pub max_users: u32,
    pub is_private: bool,
    pub password: Option<String>,
    pub audio: AudioSettings,
    pub is_temporary: bool,
    pub owner_id: UserId,
    pub created_at: i64,
    pub users: HashMap<UserId, VoiceUser>,
    join_counter: u64,
}

impl VoiceRoom {
    /// 영구 방 생성 (서버 시작 시)
    fn permanent(room_id: &str, description: &str) -> Self {
        Self {
            room_id: room_id.to_string(),
            name: room_id.to_string(),
            description: description.to_string(),
            max_users: 50,
            is_private: false,
            password: None,
            audio: AudioSettings::default(),
            is_temporary: false,
            owner_id: 0,
            created_at: SimpleUtils::current_timestamp(),
            users: HashMap::new(),
            join_counter: 0,
        }
    }

    fn temporary(room_id: String, owner_id: UserId, data: VoiceCreateData) -> Self {
        Self {
            room_id,
            name: data.name,
            description: data.description,
            max_users: data.max_users,
            is_private: data.is_private,
            password: data.password,
            audio: data.audio,
            is_temporary: true,
            owner_id,
            created_at: SimpleUtils::current_timestamp(),
            users: HashMap::new(),
            join_counter: 0,
        }
    }

    fn add_user(&mut self, identity: &Identity, conn_id: ConnId) {
        let seq = self.join_counter;
        self.join_counter += 1;
        self.users
            .insert(identity.user_id, VoiceUser::new(identity, conn_id, seq));
    }

    /// 소유권 승계 대상: 입장 순번이 가장 빠른 남은 멤버
    fn next_owner(&self) -> Option<UserId> {
        self.users
            .values()
            .min_by_key(|u| (u.join_seq, u.user_id))
            .map(|u| u.user_id)
    }

    fn recipients(&self) -> Vec<Recipient> {
        self.users
            .values()
            .map(|u| Recipient {
                user_id: u.user_id,
                conn_id: u.conn_id,
            })
            .collect()
    }

    fn snapshot(&self) -> Value {
        let mut users: Vec<&VoiceUser> = self.users.values().collect();
        users.sort_by_key(|u| u.join_seq);
        json!({
            "roomId": &self.room_id,
            "name": &self.name,
            "description": &self.description,
            "maxUsers": self.max_users,
            "isPrivate": self.is_private,
            "isTemporary": self.is_temporary,
            "ownerId": self.owner_id,
            "createdAt": self.created_at,
            "audio": &self.audio,
            "users": users.iter().map(|u| u.summary()).collect::<Vec<_>>(),
        })
    }
}

/// 음성 방 정보 (목록용)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceRoomInfo {
    pub room_id: String,
    pub name: String,
    pub current_users: usize,
    pub max_users: u32,
    pub is_private: bool,
    pub is_temporary: bool,
}

/// 음성 통계
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceStats {
    pub total_rooms: usize,
    pub total_users: usize,
    pub speaking_users: usize,
}

/// 음성 채팅 매니저
pub struct VoiceChatHandler {
    connection_service: Arc<ConnectionService>,
    broadcast_service: Arc<BroadcastService>,
    /// 방 저장소: room_id -> VoiceRoom
    rooms: Arc<Mutex<HashMap<String, VoiceRoom>>>,
    /// 멤버십 인덱스: user_id -> room_id (도메인당 최대 1개 방)
    user_room_map: Arc<DashMap<UserId, String>>,
}

impl VoiceChatHandler {
    /// 새로운 음성 매니저 생성
    ///
    /// 영구 방 "general"과 "gaming"을 함께 생성합니다. 영구 방은 비어
    /// 있어도 삭제되지 않습니다.
    pub fn new(
        connection_service: Arc<ConnectionService>,
        broadcast_service: Arc<BroadcastService>,
    ) -> Self {
        let mut rooms = HashMap::new();
        rooms.insert(
            "general".to_string(),
            VoiceRoom::permanent("general", "모두를 위한 기본 음성 채널"),
        );
        rooms.insert(
            "gaming".to_string(),
            VoiceRoom::permanent("gaming", "게임 중 음성 채널"),
        );

        Self {
            connection_service,
            broadcast_service,
            rooms: Arc::new(Mutex::new(rooms)),
            user_room_map: Arc::new(DashMap::new()),
        }
    }

    /// 임시 음성 방 생성
    ///
    /// 생성자를 소유자로 등록하고 바로 입장시킵니다.
    pub async fn create_room(
        &self,
        identity: &Identity,
        conn_id: ConnId,
        data: VoiceCreateData,
    ) -> Result<String> {
        // 기존 음성 방 멤버십 축출
        // (인덱스 가드를 먼저 떨어뜨린 뒤 leave_room이 같은 샤드를 만진다)
        let prior = self.user_room_map.get(&identity.user_id).map(|r| r.clone());
        if let Some(prior) = prior {
            self.leave_room(identity.user_id, &prior).await?;
        }

        let room_id = SimpleUtils::random_room_id();
        let mut room = VoiceRoom::temporary(room_id.clone(), identity.user_id, data);
        room.add_user(identity, conn_id);

        let snapshot = room.snapshot();
        self.rooms.lock().await.insert(room_id.clone(), room);
        self.user_room_map.insert(identity.user_id, room_id.clone());

        self.broadcast_service.send_to(
            conn_id,
            &Envelope::room_event("voice_room_created", &room_id, snapshot),
        );

        info!("✅ 음성 방 생성: {} (소유자: {})", room_id, identity.user_id);
        Ok(room_id)
    }

    /// 음성 방 입장
    ///
    /// 게임 방과 같은 입장 검사를 수행하되 진행 중 개념은 없습니다.
    /// 성공 시 입장자에게 전체 방 스냅샷을 응답하고, 기존 멤버들에게는
    /// 입장 알림을 보냅니다(입장자 제외).
    pub async fn join_room(
        &self,
        identity: &Identity,
        conn_id: ConnId,
        room_id: &str,
        data: VoiceJoinData,
    ) -> Result<()> {
        // 입장 검사 (실패 시 상태 변경 없음)
        {
            let rooms = self.rooms.lock().await;
            let room = match rooms.get(room_id) {
                Some(room) => room,
                None => {
                    let err = WsServerError::RoomNotFound { room_id: room_id.to_string() };
                    self.send_admission_error(conn_id, &err);
                    return Ok(());
                }
            };

            if room.users.contains_key(&identity.user_id) {
                debug!("사용자 {}는 이미 음성 방 {}에 있습니다", identity.user_id, room_id);
                return Ok(());
            }

            if room.users.len() >= room.max_users as usize {
                let err = WsServerError::RoomFull {
                    room_id: room_id.to_string(),
                    current: room.users.len() as u32,
                    max: room.max_users,
                };
                self.send_admission_error(conn_id, &err);
                return Ok(());
            }

            if let Some(expected) = &room.password {
                if data.password.as_deref() != Some(expected.as_str()) {
                    let err = WsServerError::WrongPassword { room_id: room_id.to_string() };
                    self.send_admission_error(conn_id, &err);
                    return Ok(());
                }
            }
        }

        // 기존 음성 방 멤버십을 먼저 축출
        let prior = self.user_room_map.get(&identity.user_id).map(|r| r.clone());
        if let Some(prior) = prior {
            if prior != room_id {
                self.leave_room(identity.user_id, &prior).await?;
            }
        }

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(room_id) {
            Some(room) => room,
            None => {
                let err = WsServerError::RoomNotFound { room_id: room_id.to_string() };
                self.send_admission_error(conn_id, &err);
                return Ok(());
            }
        };

        room.add_user(identity, conn_id);
        self.user_room_map.insert(identity.user_id, room_id.to_string());

        let joined = Envelope::room_event(
            "voice_user_joined",
            room_id,
            json!({
                "userId": identity.user_id,
                "nickname": &identity.nickname,
                "userCount": room.users.len(),
            }),
        );
        self.broadcast_service
            .fan_out(&room.recipients(), &joined, Some(identity.user_id));

        let snapshot = room.snapshot();
        drop(rooms);
        self.broadcast_service.send_to(
            conn_id,
            &Envelope::room_event("voice_room_joined", room_id, snapshot),
        );

        info!("사용자 {}({})가 음성 방 {}에 입장", identity.nickname, identity.user_id, room_id);
        Ok(())
    }

    /// 음성 방 퇴장 (명시적 퇴장과 연결 해제 공용 경로)
    ///
    /// 임시 방은 비면 삭제되고, 영구 방은 비어도 유지됩니다. 임시 방의
    /// 소유자가 떠나면 입장 순번이 가장 빠른 남은 멤버가 소유권을
    /// 승계합니다.
    pub async fn leave_room(&self, user_id: UserId, room_id: &str) -> Result<()> {
        let mut rooms = self.rooms.lock().await;

        let room = match rooms.get_mut(room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        let departed = match room.users.remove(&user_id) {
            Some(user) => user,
            None => return Ok(()),
        };

        self.user_room_map
            .remove_if(&user_id, |_, mapped| mapped == room_id);

        if room.users.is_empty() {
            if room.is_temporary {
                rooms.remove(room_id);
                info!("🗑️ 빈 임시 음성 방 삭제: {}", room_id);
            }
            return Ok(());
        }

        // 임시 방 소유권 승계
        let mut new_owner = None;
        if room.is_temporary && room.owner_id == user_id {
            if let Some(owner_id) = room.next_owner() {
                room.owner_id = owner_id;
                new_owner = Some(owner_id);
            }
        }

        let left = Envelope::room_event(
            "voice_user_left",
            room_id,
            json!({
                "userId": user_id,
                "nickname": &departed.nickname,
                "userCount": room.users.len(),
            }),
        );
        self.broadcast_service.fan_out(&room.recipients(), &left, None);

        if let Some(owner_id) = new_owner {
            let changed = Envelope::room_event(
                "voice_owner_changed",
                room_id,
                json!({ "userId": owner_id }),
            );
            self.broadcast_service.fan_out(&room.recipients(), &changed, None);
            info!("음성 방 {} 소유권 승계: {} -> {}", room_id, user_id, owner_id);
        }

        info!("사용자 {}가 음성 방 {}에서 퇴장", user_id, room_id);
        Ok(())
    }

    /// 연결 해제 정리
    ///
    /// 방 멤버가 아직 이 연결에 묶여 있는 경우에만 제거합니다 (세션
    /// 교체 후 새 연결로 재입장한 멤버 보호).
    pub async fn handle_disconnect(&self, user_id: UserId, conn_id: ConnId) -> Result<()> {
        let room_id = match self.user_room_map.get(&user_id).map(|r| r.clone()) {
            Some(room_id) => room_id,
            None => return Ok(()),
        };

        let same_conn = {
            let rooms = self.rooms.lock().await;
            rooms
                .get(&room_id)
                .and_then(|room| room.users.get(&user_id))
                .map(|u| u.conn_id == conn_id)
                .unwrap_or(false)
        };

        if same_conn {
            debug!("연결 해제 정리: 사용자 {} 음성 방 {}", user_id, room_id);
            self.leave_room(user_id, &room_id).await?;
        }
        Ok(())
    }

    /// 발화 시작/종료
    ///
    /// 음소거 상태에서는 무시됩니다. 발화 플래그는 UI 표시용으로만
    /// 중계되며 오디오를 포함하지 않습니다. 발화자 본인은 제외합니다.
    pub async fn set_speaking(&self, user_id: UserId, speaking: bool) -> Result<()> {
        let room_id = match self.user_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        let user = match room.users.get_mut(&user_id) {
            Some(user) => user,
            None => return Ok(()),
        };

        // 음소거 중 발화 전환은 무시
        if user.is_muted {
            debug!("음소거 상태의 사용자 {} 발화 전환 무시", user_id);
            return Ok(());
        }

        user.is_speaking = speaking;
        user.last_activity = SimpleUtils::current_timestamp();

        let kind = if speaking { "voice_start_speaking" } else { "voice_stop_speaking" };
        let envelope = Envelope::room_event(kind, &room_id, json!({ "userId": user_id }));
        self.broadcast_service.fan_out(&room.recipients(), &envelope, Some(user_id));
        Ok(())
    }

    /// 오디오 중계
    ///
    /// 불투명 페이로드를 청취 가능한 멤버(귀 막힘 아님, 스피커 활성)에게
    /// 전달합니다. 각 수신 사본에는 수신자 본인의 볼륨 배율이 붙습니다.
    /// 디코딩이나 믹싱은 수행하지 않습니다.
    pub async fn relay_audio(&self, user_id: UserId, payload: Value) -> Result<()> {
        let room_id = match self.user_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let rooms = self.rooms.lock().await;
        let room = match rooms.get(&room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        let sender = match room.users.get(&user_id) {
            Some(user) => user,
            None => return Ok(()),
        };

        // 음소거/마이크 비활성 상태의 오디오는 버린다
        if sender.is_muted || !sender.mic_enabled {
            return Ok(());
        }

        // 볼륨 배율이 수신자마다 다르므로 사본별로 직렬화한다
        for user in room.users.values() {
            if user.user_id == user_id {
                continue;
            }
            if user.is_deafened || !user.speaker_enabled {
                continue;
            }
            let envelope = Envelope::room_event(
                "voice_audio_data",
                &room_id,
                json!({
                    "userId": user_id,
                    "audio": &payload,
                    "volumeFactor": f64::from(user.volume) / 100.0,
                }),
            );
            self.connection_service.send_to_conn(user.conn_id, &envelope);
        }
        Ok(())
    }

    /// 음소거/해제
    ///
    /// 음소거는 발화 플래그도 같은 브로드캐스트 안에서 강제 해제합니다.
    /// 대상 사용자를 포함한 방 전체에 전송합니다.
    pub async fn set_muted(&self, user_id: UserId, muted: bool) -> Result<()> {
        let room_id = match self.user_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        let user = match room.users.get_mut(&user_id) {
            Some(user) => user,
            None => return Ok(()),
        };

        user.is_muted = muted;
        if muted {
            user.is_speaking = false;
        }
        user.last_activity = SimpleUtils::current_timestamp();

        let kind = if muted { "voice_mute" } else { "voice_unmute" };
        let envelope = Envelope::room_event(
            kind,
            &room_id,
            json!({
                "userId": user_id,
                "isMuted": muted,
                "isSpeaking": user.is_speaking,
            }),
        );
        self.broadcast_service.fan_out(&room.recipients(), &envelope, None);
        Ok(())
    }

    /// 음질/볼륨 자가 설정
    pub async fn quality_change(&self, user_id: UserId, data: VoiceQualityData) -> Result<()> {
        let room_id = match self.user_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        let conn_id = match room.users.get_mut(&user_id) {
            Some(user) => {
                if let Some(quality) = data.quality {
                    user.quality = quality;
                }
                if let Some(volume) = data.volume {
                    user.volume = volume.min(100);
                }
                user.last_activity = SimpleUtils::current_timestamp();
                user.conn_id
            }
            None => return Ok(()),
        };

        // 자가 설정이므로 요청자에게만 확인 응답
        let ack = Envelope::room_event(
            "voice_quality_change",
            &room_id,
            json!({
                "userId": user_id,
                "quality": &room.users[&user_id].quality,
                "volume": room.users[&user_id].volume,
            }),
        );
        self.broadcast_service.send_to(conn_id, &ack);
        Ok(())
    }

    /// 방 전체 노이즈 감소 토글 (관리자 전용)
    ///
    /// 요청자의 관리자 플래그가 없으면 피드백 없이 무시합니다.
    pub async fn noise_reduction(
        &self,
        user_id: UserId,
        data: VoiceNoiseReductionData,
    ) -> Result<()> {
        let room_id = match self.user_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        let is_admin = room.users.get(&user_id).map(|u| u.is_admin).unwrap_or(false);
        if !is_admin {
            debug!("관리자가 아닌 사용자 {}의 noise_reduction 무시", user_id);
            return Ok(());
        }

        room.audio.noise_reduction = data.enabled;

        let envelope = Envelope::room_event(
            "voice_noise_reduction",
            &room_id,
            json!({ "userId": user_id, "enabled": data.enabled }),
        );
        self.broadcast_service.fan_out(&room.recipients(), &envelope, None);
        info!("음성 방 {} 노이즈 감소 {}", room_id, if data.enabled { "활성화" } else { "비활성화" });
        Ok(())
    }

    /// 방 설정 변경 (소유자/관리자 전용)
    pub async fn room_settings(&self, user_id: UserId, data: VoiceRoomSettingsData) -> Result<()> {
        let room_id = match self.user_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        let is_admin = room.users.get(&user_id).map(|u| u.is_admin).unwrap_or(false);
        if room.owner_id != user_id && !is_admin {
            debug!("권한이 없는 사용자 {}의 voice_room_settings 무시", user_id);
            return Ok(());
        }

        if let Some(max_users) = data.max_users {
            room.max_users = max_users;
        }
        if let Some(is_private) = data.is_private {
            room.is_private = is_private;
        }
        if data.password.is_some() {
            room.password = data.password;
        }
        if let Some(bitrate) = data.bitrate {
            room.audio.bitrate = bitrate;
        }
        if let Some(sample_rate) = data.sample_rate {
            room.audio.sample_rate = sample_rate;
        }
        if let Some(echo_cancellation) = data.echo_cancellation {
            room.audio.echo_cancellation = echo_cancellation;
        }

        let envelope = Envelope::room_event(
            "voice_room_settings",
            &room_id,
            json!({
                "userId": user_id,
                "maxUsers": room.max_users,
                "isPrivate": room.is_private,
                "audio": &room.audio,
            }),
        );
        self.broadcast_service.fan_out(&room.recipients(), &envelope, None);
        Ok(())
    }

    /// 마이크/스피커/귀 막힘 자가 상태 변경
    pub async fn user_status(&self, user_id: UserId, data: VoiceUserStatusData) -> Result<()> {
        let room_id = match self.user_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        let summary = match room.users.get_mut(&user_id) {
            Some(user) => {
                if let Some(mic_enabled) = data.mic_enabled {
                    user.mic_enabled = mic_enabled;
                }
                if let Some(speaker_enabled) = data.speaker_enabled {
                    user.speaker_enabled = speaker_enabled;
                }
                if let Some(is_deafened) = data.is_deafened {
                    user.is_deafened = is_deafened;
                }
                user.last_activity = SimpleUtils::current_timestamp();
                user.summary()
            }
            None => return Ok(()),
        };

        let envelope = Envelope::room_event("voice_user_status", &room_id, summary);
        self.broadcast_service.fan_out(&room.recipients(), &envelope, None);
        Ok(())
    }

    /// 에코 테스트
    ///
    /// 호출자의 페이로드를 고정 합성 지연(500ms) 후 본인에게 되돌려
    /// 보냅니다. 진단 전용이며 실제 에코 제거가 아닙니다.
    pub async fn echo_test(&self, user_id: UserId, conn_id: ConnId, payload: Value) -> Result<()> {
        let connection_service = self.connection_service.clone();

        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(ECHO_TEST_DELAY_MS)).await;
            let envelope = Envelope::event(
                "voice_echo_test",
                json!({
                    "userId": user_id,
                    "audio": payload,
                    "delayMs": ECHO_TEST_DELAY_MS,
                }),
            );
            connection_service.send_to_conn(conn_id, &envelope);
        });

        Ok(())
    }

    // === 외부 HTTP 핸들러용 조회 전용 표면 ===

    /// 방 목록 조회
    pub async fn get_room_list(&self) -> Vec<VoiceRoomInfo> {
        let rooms = self.rooms.lock().await;
        rooms
            .values()
            .map(|room| VoiceRoomInfo {
                room_id: room.room_id.clone(),
                name: room.name.clone(),
                current_users: room.users.len(),
                max_users: room.max_users,
                is_private: room.is_private,
                is_temporary: room.is_temporary,
            })
            .collect()
    }

    /// 방 상세 스냅샷 조회
    pub async fn get_room_details(&self, room_id: &str) -> Option<Value> {
        let rooms = self.rooms.lock().await;
        rooms.get(room_id).map(|room| room.snapshot())
    }

    /// 사용자의 현재 방 조회
    pub fn get_user_room(&self, user_id: UserId) -> Option<String> {
        self.user_room_map.get(&user_id).map(|r| r.clone())
    }

    /// 음성 통계 조회
    pub async fn get_voice_stats(&self) -> VoiceStats {
        let rooms = self.rooms.lock().await;
        VoiceStats {
            total_rooms: rooms.len(),
            total_users: rooms.values().map(|r| r.users.len()).sum(),
            speaking_users: rooms
                .values()
                .flat_map(|r| r.users.values())
                .filter(|u| u.is_speaking)
                .count(),
        }
    }

    /// 입장 에러를 요청자에게만 전달
    fn send_admission_error(&self, conn_id: ConnId, err: &WsServerError) {
        debug!("음성 방 입장 거절: {}", err);
        self.broadcast_service
            .send_to(conn_id, &Envelope::error(err.code(), &err.to_string()));
    }
}
