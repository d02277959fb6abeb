//! 게임 동기화 매니저
//!
//! 게임 방의 생명주기 상태 기계와 게임플레이 이벤트 중계를 담당합니다.
//! 방 상태는 waiting → playing → {paused ⇄ playing} → finished로
//! 전이하며, finished는 종단 상태입니다. 방 데이터는 이 매니저가
//! 단독으로 소유하고, 모든 변경은 rooms 락 임계 구역 안에서 완결됩니다.

use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use shared::model::{Identity, UserId};
use shared::service::{ConnId, ScoreRepository};

use crate::protocol::{
    CreateRoomData, Envelope, ExplosionData, GameRoomSettings, JoinRoomData, MoveData, ScoreData,
};
use crate::service::{BroadcastService, ConnectionService, Recipient};
use crate::tool::error::WsServerError;
use crate::tool::{Point2D, SimpleUtils};

/// 게임 방 상태
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameRoomStatus {
    Waiting,  // 플레이어 대기 중
    Playing,  // 게임 진행 중
    Paused,   // 일시 정지
    Finished, // 게임 완료 (종단)
}

/// 게임 방 내 플레이어 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamePlayer {
    pub user_id: UserId,
    pub nickname: String,
    pub is_host: bool,
    pub is_admin: bool,
    pub score: u32,
    pub lives: u32,
    pub level: u32,
    pub position: Point2D,
    pub powerups: HashSet<String>,
    pub is_ready: bool,
    #[serde(skip)]
    pub conn_id: ConnId,
    /// 방 입장 순번 (호스트 승계와 랭킹 동점 처리 기준)
    pub join_seq: u64,
    pub joined_at: i64,
}

impl GamePlayer {
    fn new(identity: &Identity, conn_id: ConnId, is_host: bool, join_seq: u64) -> Self {
        Self {
            user_id: identity.user_id,
            nickname: identity.nickname.clone(),
            is_host,
            is_admin: identity.is_admin,
            score: 0,
            lives: 3,
            level: 1,
            position: Point2D::origin(),
            powerups: HashSet::new(),
            is_ready: false,
            conn_id,
            join_seq,
            joined_at: SimpleUtils::current_timestamp(),
        }
    }

    fn summary(&self) -> Value {
        json!({
            "userId": self.user_id,
            "nickname": &self.nickname,
            "isHost": self.is_host,
            "score": self.score,
            "lives": self.lives,
            "level": self.level,
            "isReady": self.is_ready,
            "position": { "x": self.position.x, "y": self.position.y },
            "powerups": &self.powerups,
        })
    }
}

/// 게임 방
#[derive(Debug, Clone)]
pub struct GameRoom {
    pub room_id: String,
    pub name: String,
    pub game_type: String,
    pub status: GameRoomStatus,
    pub players: HashMap<UserId, GamePlayer>,
    /// 게임 타입별 스키마를 갖는 가변 상태 블롭
    pub game_state: Value,
    pub settings: GameRoomSettings,
    pub host_id: UserId,
    pub created_at: i64,
    pub is_temporary: bool,
    /// 입장 순번 발급기
    join_counter: u64,
}

impl GameRoom {
    /// 게임 타입별 초기 상태 템플릿
    ///
    /// 게임 시작 시에도 이 템플릿으로 재초기화되어 이전 라운드의 상태가
    /// 새 라운드로 새어 나가지 않습니다.
    pub fn initial_state(game_type: &str) -> Value {
        match game_type {
            "fruit_catch" => json!({
                "fruits": [],
                "bombs": [],
                "combo": 0,
                "elapsedSecs": 0,
            }),
            "bomb_survival" => json!({
                "bombs": [],
                "safeZone": { "x": 0.0, "y": 0.0, "radius": 400.0 },
                "round": 1,
            }),
            _ => json!({
                "phase": "idle",
                "objects": [],
            }),
        }
    }

    fn new(
        room_id: String,
        name: String,
        game_type: String,
        settings: GameRoomSettings,
    ) -> Self {
        let game_state = Self::initial_state(&game_type);
        Self {
            room_id,
            name,
            game_type,
            status: GameRoomStatus::Waiting,
            players: HashMap::new(),
            game_state,
            settings,
            host_id: 0,
            created_at: SimpleUtils::current_timestamp(),
            is_temporary: true,
            join_counter: 0,
        }
    }

    fn add_player(&mut self, identity: &Identity, conn_id: ConnId, is_host: bool) {
        let seq = self.join_counter;
        self.join_counter += 1;
        self.players
            .insert(identity.user_id, GamePlayer::new(identity, conn_id, is_host, seq));
        if is_host {
            self.host_id = identity.user_id;
        }
    }

    /// 호스트 승계 대상: 입장 순번이 가장 빠른 남은 멤버
    /// (순번이 같을 일은 없지만 방어적으로 user_id 오름차순으로 보조 정렬)
    fn next_host(&self) -> Option<UserId> {
        self.players
            .values()
            .min_by_key(|p| (p.join_seq, p.user_id))
            .map(|p| p.user_id)
    }

    fn recipients(&self) -> Vec<Recipient> {
        self.players
            .values()
            .map(|p| Recipient {
                user_id: p.user_id,
                conn_id: p.conn_id,
            })
            .collect()
    }

    fn snapshot(&self) -> Value {
        let mut players: Vec<&GamePlayer> = self.players.values().collect();
        players.sort_by_key(|p| p.join_seq);
        json!({
            "roomId": &self.room_id,
            "name": &self.name,
            "gameType": &self.game_type,
            "status": self.status,
            "hostId": self.host_id,
            "createdAt": self.created_at,
            // 비밀번호 원문은 스냅샷에 싣지 않는다
            "settings": {
                "maxPlayers": self.settings.max_players,
                "isPrivate": self.settings.is_private,
                "hasPassword": self.settings.password.is_some(),
                "mode": &self.settings.mode,
                "difficulty": &self.settings.difficulty,
            },
            "gameState": &self.game_state,
            "players": players.iter().map(|p| p.summary()).collect::<Vec<_>>(),
        })
    }
}

/// 게임 설정
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub max_rooms: u32,
    pub game_duration_secs: u64,
    pub explosion_radius: f64,
    pub explosion_damage: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_rooms: 100,
            game_duration_secs: 300, // 5분
            explosion_radius: 60.0,
            explosion_damage: 1,
        }
    }
}

/// 방 정보 (목록용)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameRoomInfo {
    pub room_id: String,
    pub name: String,
    pub game_type: String,
    pub status: GameRoomStatus,
    pub current_players: usize,
    pub max_players: u32,
    pub is_private: bool,
    pub created_at: i64,
}

/// 게임 통계
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub total_rooms: usize,
    pub total_players: usize,
    pub active_games: usize,
}

/// 게임 동기화 매니저
pub struct GameSyncHandler {
    connection_service: Arc<ConnectionService>,
    broadcast_service: Arc<BroadcastService>,
    score_repository: Arc<dyn ScoreRepository>,
    /// 방 저장소: room_id -> GameRoom
    rooms: Arc<Mutex<HashMap<String, GameRoom>>>,
    /// 멤버십 인덱스: user_id -> room_id (도메인당 최대 1개 방)
    player_room_map: Arc<DashMap<UserId, String>>,
    /// 게임 타이머 테이블: room_id -> 타이머 태스크 핸들
    game_timers: Arc<Mutex<HashMap<String, tokio::task::JoinHandle<()>>>>,
    config: GameConfig,
}

impl GameSyncHandler {
    /// 새로운 게임 매니저 생성
    pub fn new(
        connection_service: Arc<ConnectionService>,
        broadcast_service: Arc<BroadcastService>,
        score_repository: Arc<dyn ScoreRepository>,
        config: GameConfig,
    ) -> Self {
        Self {
            connection_service,
            broadcast_service,
            score_repository,
            rooms: Arc::new(Mutex::new(HashMap::new())),
            player_room_map: Arc::new(DashMap::new()),
            game_timers: Arc::new(Mutex::new(HashMap::new())),
            config,
        }
    }

    /// 새로운 게임 방 생성
    ///
    /// 무작위 방 ID를 할당하고 생성자를 호스트 겸 유일한 플레이어로
    /// 등록합니다. 응답은 생성자에게만 전송합니다.
    pub async fn create_room(
        &self,
        identity: &Identity,
        conn_id: ConnId,
        data: CreateRoomData,
    ) -> Result<String> {
        // 기존 게임 방 멤버십 축출
        // (인덱스 가드를 먼저 떨어뜨린 뒤 leave_room이 같은 샤드를 만진다)
        let prior = self.player_room_map.get(&identity.user_id).map(|r| r.clone());
        if let Some(prior) = prior {
            self.leave_room(identity.user_id, &prior).await?;
        }

        let mut rooms = self.rooms.lock().await;

        if rooms.len() >= self.config.max_rooms as usize {
            warn!("최대 방 수 초과: {}/{}", rooms.len(), self.config.max_rooms);
            let err = WsServerError::Internal {
                component: "game".to_string(),
                message: "방 생성 한도 초과".to_string(),
            };
            self.broadcast_service
                .send_to(conn_id, &Envelope::error(err.code(), "방 생성 한도를 초과했습니다"));
            return Ok(String::new());
        }

        let room_id = SimpleUtils::random_room_id();
        let mut room = GameRoom::new(
            room_id.clone(),
            data.name.clone(),
            data.game_type.clone(),
            data.settings,
        );
        room.add_player(identity, conn_id, true);

        let snapshot = room.snapshot();
        rooms.insert(room_id.clone(), room);
        drop(rooms);

        self.player_room_map.insert(identity.user_id, room_id.clone());

        // 생성자에게만 응답
        self.broadcast_service
            .send_to(conn_id, &Envelope::room_event("room_created", &room_id, snapshot));

        info!(
            "✅ 게임 방 생성: {} (ID: {}, 생성자: {})",
            data.name, room_id, identity.user_id
        );
        Ok(room_id)
    }

    /// 방 입장
    ///
    /// 입장 검사(방 존재, 정원, 진행 여부, 비밀번호)에 실패하면 요청한
    /// 연결에만 에러 이벤트를 보내고 상태를 바꾸지 않습니다. 성공 시
    /// 같은 도메인의 기존 멤버십을 먼저 축출합니다.
    pub async fn join_room(
        &self,
        identity: &Identity,
        conn_id: ConnId,
        room_id: &str,
        data: JoinRoomData,
    ) -> Result<()> {
        // 입장 검사는 상태 변경 전에 수행한다 (실패 시 no-op 보장)
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

            if room.players.contains_key(&identity.user_id) {
                debug!("사용자 {}는 이미 방 {}에 있습니다", identity.user_id, room_id);
                return Ok(());
            }

            if room.players.len() >= room.settings.max_players as usize {
                let err = WsServerError::RoomFull {
                    room_id: room_id.to_string(),
                    current: room.players.len() as u32,
                    max: room.settings.max_players,
                };
                self.send_admission_error(conn_id, &err);
                return Ok(());
            }

            if room.status != GameRoomStatus::Waiting {
                let err = WsServerError::GameInProgress { room_id: room_id.to_string() };
                self.send_admission_error(conn_id, &err);
                return Ok(());
            }

            if let Some(expected) = &room.settings.password {
                if data.password.as_deref() != Some(expected.as_str()) {
                    let err = WsServerError::WrongPassword { room_id: room_id.to_string() };
                    self.send_admission_error(conn_id, &err);
                    return Ok(());
                }
            }
        }

        // 기존 게임 방 멤버십 축출 (한 도메인당 방 하나)
        let prior = self.player_room_map.get(&identity.user_id).map(|r| r.clone());
        if let Some(prior) = prior {
            if prior != room_id {
                self.leave_room(identity.user_id, &prior).await?;
            }
        }

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(room_id) {
            Some(room) => room,
            // 축출 처리 중 방이 사라진 드문 경로
            None => {
                let err = WsServerError::RoomNotFound { room_id: room_id.to_string() };
                self.send_admission_error(conn_id, &err);
                return Ok(());
            }
        };

        room.add_player(identity, conn_id, false);
        self.player_room_map.insert(identity.user_id, room_id.to_string());

        // 기존 멤버들에게 입장 알림 (입장자 제외)
        let joined = Envelope::room_event(
            "player_joined",
            room_id,
            json!({
                "userId": identity.user_id,
                "nickname": &identity.nickname,
                "playerCount": room.players.len(),
            }),
        );
        self.broadcast_service
            .fan_out(&room.recipients(), &joined, Some(identity.user_id));

        // 입장자에게는 전체 방 스냅샷 응답
        let snapshot = room.snapshot();
        drop(rooms);
        self.broadcast_service
            .send_to(conn_id, &Envelope::room_event("room_joined", room_id, snapshot));

        info!("사용자 {}({})가 방 {}에 입장", identity.nickname, identity.user_id, room_id);
        Ok(())
    }

    /// 방 퇴장 (명시적 퇴장과 연결 해제 공용 경로)
    ///
    /// 호스트가 떠나고 방이 비어있지 않으면 입장 순번이 가장 빠른 남은
    /// 멤버에게 호스트를 승계합니다. 멤버가 없어진 방은 타이머와 함께
    /// 즉시 파기됩니다.
    pub async fn leave_room(&self, user_id: UserId, room_id: &str) -> Result<()> {
        let mut rooms = self.rooms.lock().await;

        let room = match rooms.get_mut(room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        let departed = match room.players.remove(&user_id) {
            Some(player) => player,
            None => return Ok(()),
        };

        self.player_room_map
            .remove_if(&user_id, |_, mapped| mapped == room_id);

        if room.players.is_empty() {
            if room.is_temporary {
                rooms.remove(room_id);
                drop(rooms);
                self.cancel_timer(room_id).await;
                info!("🗑️ 빈 게임 방 파기: {}", room_id);
            }
            return Ok(());
        }

        // 호스트 승계
        let mut new_host = None;
        if departed.is_host {
            if let Some(host_id) = room.next_host() {
                room.host_id = host_id;
                if let Some(player) = room.players.get_mut(&host_id) {
                    player.is_host = true;
                }
                new_host = Some(host_id);
            }
        }

        let left = Envelope::room_event(
            "player_left",
            room_id,
            json!({
                "userId": user_id,
                "nickname": &departed.nickname,
                "playerCount": room.players.len(),
            }),
        );
        self.broadcast_service.fan_out(&room.recipients(), &left, None);

        if let Some(host_id) = new_host {
            let changed =
                Envelope::room_event("host_changed", room_id, json!({ "userId": host_id }));
            self.broadcast_service.fan_out(&room.recipients(), &changed, None);
            info!("방 {} 호스트 승계: {} -> {}", room_id, user_id, host_id);
        }

        info!("사용자 {}가 방 {}에서 퇴장", user_id, room_id);
        Ok(())
    }

    /// 연결 해제 정리
    ///
    /// 멤버십 인덱스로 현재 방을 찾아 퇴장 처리합니다. 세션 교체로 이미
    /// 새 연결에서 재입장한 멤버를 건드리지 않도록, 방 멤버가 아직 이
    /// 연결에 묶여 있는 경우에만 제거합니다.
    pub async fn handle_disconnect(&self, user_id: UserId, conn_id: ConnId) -> Result<()> {
        let room_id = match self.player_room_map.get(&user_id).map(|r| r.clone()) {
            Some(room_id) => room_id,
            None => return Ok(()),
        };

        let same_conn = {
            let rooms = self.rooms.lock().await;
            rooms
                .get(&room_id)
                .and_then(|room| room.players.get(&user_id))
                .map(|p| p.conn_id == conn_id)
                .unwrap_or(false)
        };

        if same_conn {
            debug!("연결 해제 정리: 사용자 {} 방 {}", user_id, room_id);
            self.leave_room(user_id, &room_id).await?;
        }
        Ok(())
    }

    /// 준비 상태 토글
    pub async fn set_ready(&self, user_id: UserId, is_ready: bool) -> Result<()> {
        let room_id = match self.player_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get_mut(&room_id) {
            if let Some(player) = room.players.get_mut(&user_id) {
                player.is_ready = is_ready;
            }
            let ready = Envelope::room_event(
                "player_ready",
                &room_id,
                json!({ "userId": user_id, "isReady": is_ready }),
            );
            self.broadcast_service.fan_out(&room.recipients(), &ready, None);
        }
        Ok(())
    }

    /// 게임 시작
    ///
    /// 호스트가 아니면 무시합니다. 모든 멤버가 준비 상태가 아니면 상태
    /// 변경 없이 거절 피드백만 방 전체에 브로드캐스트합니다. 성공하면
    /// 게임 상태를 템플릿에서 재초기화하고 제한 시간 타이머를 무장합니다.
    pub async fn start_game(self: &Arc<Self>, user_id: UserId) -> Result<()> {
        let room_id = match self.player_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        // 권한 에러: 피드백 없이 무시
        if room.host_id != user_id {
            debug!("호스트가 아닌 사용자 {}의 game_start 무시", user_id);
            return Ok(());
        }

        if room.status != GameRoomStatus::Waiting {
            debug!("대기 상태가 아닌 방 {}의 game_start 무시", room_id);
            return Ok(());
        }

        // 전원 준비 게이트: 실패 시 상태 변경 없이 피드백 브로드캐스트
        if !room.players.values().all(|p| p.is_ready) {
            let not_ready: Vec<UserId> = room
                .players
                .values()
                .filter(|p| !p.is_ready)
                .map(|p| p.user_id)
                .collect();
            let rejected = Envelope::room_event(
                "game_start_rejected",
                &room_id,
                json!({ "reason": "not_all_ready", "notReady": not_ready }),
            );
            self.broadcast_service.fan_out(&room.recipients(), &rejected, None);
            info!("방 {} 게임 시작 거절: 전원 준비 아님", room_id);
            return Ok(());
        }

        // 이전 라운드 상태가 새어 나가지 않도록 템플릿에서 재초기화
        room.game_state = GameRoom::initial_state(&room.game_type);
        room.status = GameRoomStatus::Playing;

        let started = Envelope::room_event(
            "game_started",
            &room_id,
            json!({
                "gameType": &room.game_type,
                "gameState": &room.game_state,
                "durationSecs": self.config.game_duration_secs,
            }),
        );
        self.broadcast_service.fan_out(&room.recipients(), &started, None);
        drop(rooms);

        self.arm_timer(&room_id).await;

        info!("🎮 게임 시작: 방 {}", room_id);
        Ok(())
    }

    /// 제한 시간 타이머 무장
    ///
    /// 제한 시간이 지나면 "timeout" 사유로 게임을 강제 종료합니다.
    /// 게임이 다른 경로로 먼저 끝나면 타이머는 취소됩니다.
    async fn arm_timer(self: &Arc<Self>, room_id: &str) {
        let handler = self.clone();
        let timer_room = room_id.to_string();
        let duration = tokio::time::Duration::from_secs(self.config.game_duration_secs);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if let Err(e) = handler
                .end_game_internal(&timer_room, "timeout", None, false)
                .await
            {
                error!("타임아웃 종료 처리 실패: 방 {}: {}", timer_room, e);
            }
        });

        let mut timers = self.game_timers.lock().await;
        // 같은 방의 이전 타이머가 남아있으면 제거
        if let Some(old) = timers.insert(room_id.to_string(), handle) {
            old.abort();
        }
    }

    /// 타이머 취소
    async fn cancel_timer(&self, room_id: &str) {
        let mut timers = self.game_timers.lock().await;
        if let Some(handle) = timers.remove(room_id) {
            handle.abort();
            debug!("방 {} 타이머 취소", room_id);
        }
    }

    /// 일시 정지 (호스트 전용)
    pub async fn pause_game(&self, user_id: UserId) -> Result<()> {
        self.toggle_pause(user_id, GameRoomStatus::Playing, GameRoomStatus::Paused, "game_paused")
            .await
    }

    /// 재개 (호스트 전용)
    pub async fn resume_game(&self, user_id: UserId) -> Result<()> {
        self.toggle_pause(user_id, GameRoomStatus::Paused, GameRoomStatus::Playing, "game_resumed")
            .await
    }

    async fn toggle_pause(
        &self,
        user_id: UserId,
        from: GameRoomStatus,
        to: GameRoomStatus,
        event: &str,
    ) -> Result<()> {
        let room_id = match self.player_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get_mut(&room_id) {
            if room.host_id != user_id || room.status != from {
                return Ok(());
            }
            room.status = to;
            let envelope =
                Envelope::room_event(event, &room_id, json!({ "userId": user_id }));
            self.broadcast_service.fan_out(&room.recipients(), &envelope, None);
            info!("방 {} 상태 전이: {:?} -> {:?}", room_id, from, to);
        }
        Ok(())
    }

    /// 플레이어 이동
    ///
    /// 진행 중이 아니면 무시합니다. 위치를 갱신하고 다른 멤버들에게
    /// 중계합니다. 순서 보장과 재전송, 보정은 수행하지 않습니다.
    pub async fn player_move(&self, user_id: UserId, data: MoveData) -> Result<()> {
        let room_id = match self.player_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        if room.status != GameRoomStatus::Playing {
            return Ok(());
        }

        let position = data.position();
        match room.players.get_mut(&user_id) {
            Some(player) => player.position = position,
            None => return Ok(()),
        }

        let moved = Envelope::room_event(
            "player_move",
            &room_id,
            json!({ "userId": user_id, "x": position.x, "y": position.y }),
        );
        self.broadcast_service.fan_out(&room.recipients(), &moved, Some(user_id));
        Ok(())
    }

    /// 득점 처리
    ///
    /// 점수를 누적하고, 영속화는 비동기 fire-and-forget으로 요청합니다.
    /// 영속화 실패는 로그만 남기며 방에 노출되지 않습니다. 갱신된 점수는
    /// 득점자를 포함한 방 전체에 브로드캐스트합니다.
    pub async fn player_score(&self, user_id: UserId, data: ScoreData) -> Result<()> {
        let room_id = match self.player_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        if room.status != GameRoomStatus::Playing {
            return Ok(());
        }

        let (score, level) = match room.players.get_mut(&user_id) {
            Some(player) => {
                player.score += data.points;
                (player.score, player.level)
            }
            None => return Ok(()),
        };

        // 영속화 fire-and-forget: 실패해도 인메모리 상태는 유지된다
        let repository = self.score_repository.clone();
        let game_name = room.game_type.clone();
        tokio::spawn(async move {
            if let Err(e) = repository.persist_score(user_id, &game_name, score, level).await {
                let err = WsServerError::Persistence { user_id, message: e.to_string() };
                error!("{}", err);
            }
        });

        let scored = Envelope::room_event(
            "player_score",
            &room_id,
            json!({
                "userId": user_id,
                "points": data.points,
                "itemType": &data.item_type,
                "score": score,
                "level": level,
            }),
        );
        // 득점자 포함 방 전체에 전송
        self.broadcast_service.fan_out(&room.recipients(), &scored, None);
        Ok(())
    }

    /// 게임 상태 블롭 교체 (호스트 전용)
    pub async fn game_state_update(&self, user_id: UserId, data: Value) -> Result<()> {
        let room_id = match self.player_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get_mut(&room_id) {
            if room.host_id != user_id {
                debug!("호스트가 아닌 사용자 {}의 game_state_update 무시", user_id);
                return Ok(());
            }
            if room.status != GameRoomStatus::Playing {
                return Ok(());
            }
            room.game_state = data.clone();
            let update = Envelope::room_event("game_state_update", &room_id, data);
            self.broadcast_service.fan_out(&room.recipients(), &update, Some(user_id));
        }
        Ok(())
    }

    /// 과일 스폰 중계
    ///
    /// 페이로드는 불투명하게 다른 멤버들에게 그대로 중계합니다.
    pub async fn fruit_spawn(&self, user_id: UserId, data: Value) -> Result<()> {
        let room_id = match self.player_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let rooms = self.rooms.lock().await;
        if let Some(room) = rooms.get(&room_id) {
            if room.status != GameRoomStatus::Playing {
                return Ok(());
            }
            let spawn = Envelope::room_event("fruit_spawn", &room_id, data);
            self.broadcast_service.fan_out(&room.recipients(), &spawn, Some(user_id));
        }
        Ok(())
    }

    /// 폭탄 폭발 처리
    ///
    /// 불투명 페이로드 중계에 더해 근접 규칙을 적용합니다. 폭발 지점에서
    /// 유클리드 거리 radius 이내의 모든 멤버는 damage만큼 목숨을 잃습니다
    /// (0 미만으로 내려가지 않음). 브로드캐스트에는 피해를 입은 멤버
    /// 목록과 남은 목숨이 포함됩니다.
    pub async fn bomb_explosion(&self, user_id: UserId, data: ExplosionData) -> Result<()> {
        let room_id = match self.player_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };

        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(&room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        if room.status != GameRoomStatus::Playing {
            return Ok(());
        }

        let center = Point2D::new(data.x, data.y);
        let radius = data.radius.unwrap_or(self.config.explosion_radius);
        let damage = data.damage.unwrap_or(self.config.explosion_damage);

        let mut affected = Vec::new();
        for player in room.players.values_mut() {
            if player.position.distance_to(&center) <= radius {
                player.lives = player.lives.saturating_sub(damage);
                affected.push(json!({
                    "userId": player.user_id,
                    "lives": player.lives,
                }));
            }
        }

        let explosion = Envelope::room_event(
            "bomb_explosion",
            &room_id,
            json!({
                "userId": user_id,
                "x": data.x,
                "y": data.y,
                "radius": radius,
                "damage": damage,
                "affected": affected,
            }),
        );
        // 피해 결과는 전원이 알아야 하므로 발신자 포함 전체 전송
        self.broadcast_service.fan_out(&room.recipients(), &explosion, None);
        Ok(())
    }

    /// 게임 종료 (명시적 요청 경로, 호스트 전용)
    pub async fn end_game(self: &Arc<Self>, user_id: UserId, reason: Option<String>) -> Result<()> {
        let room_id = match self.player_room_map.get(&user_id) {
            Some(room_id) => room_id.clone(),
            None => return Ok(()),
        };
        let reason = reason.unwrap_or_else(|| "host_ended".to_string());
        self.end_game_internal(&room_id, &reason, Some(user_id), true)
            .await
    }

    /// 게임 종료 공용 경로
    ///
    /// finished로 전이하고 타이머를 취소한 뒤, 점수 내림차순(동점은 입장
    /// 순번 순) 랭킹을 계산해 전 멤버의 최종 점수를 영속화하고 랭킹을
    /// 브로드캐스트합니다. 0순위가 승자입니다.
    ///
    /// `cancel_timer`는 타이머 자신이 호출하는 타임아웃 경로에서만
    /// false입니다 (자기 자신을 abort하면 종료 처리가 중단됨).
    async fn end_game_internal(
        &self,
        room_id: &str,
        reason: &str,
        requester: Option<UserId>,
        cancel_timer: bool,
    ) -> Result<()> {
        let mut rooms = self.rooms.lock().await;
        let room = match rooms.get_mut(room_id) {
            Some(room) => room,
            None => return Ok(()),
        };

        // 권한 에러: 피드백 없이 무시
        if let Some(user_id) = requester {
            if room.host_id != user_id {
                debug!("호스트가 아닌 사용자 {}의 game_end 무시", user_id);
                return Ok(());
            }
        }

        if !matches!(room.status, GameRoomStatus::Playing | GameRoomStatus::Paused) {
            return Ok(());
        }

        room.status = GameRoomStatus::Finished;

        // 랭킹: 점수 내림차순, 동점은 원래 입장 순서
        let mut ranked: Vec<&GamePlayer> = room.players.values().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score).then(a.join_seq.cmp(&b.join_seq)));

        let ranking: Vec<Value> = ranked
            .iter()
            .enumerate()
            .map(|(rank, p)| {
                json!({
                    "rank": rank,
                    "userId": p.user_id,
                    "nickname": &p.nickname,
                    "score": p.score,
                    "level": p.level,
                })
            })
            .collect();

        // 전 멤버의 최종 점수 영속화 (fire-and-forget)
        for player in ranked.iter() {
            let repository = self.score_repository.clone();
            let game_name = room.game_type.clone();
            let (user_id, score, level) = (player.user_id, player.score, player.level);
            tokio::spawn(async move {
                if let Err(e) = repository.persist_score(user_id, &game_name, score, level).await {
                    error!("최종 점수 영속화 실패: 사용자 {}: {}", user_id, e);
                }
            });
        }

        let winner = ranking.first().cloned().unwrap_or(Value::Null);
        let ended = Envelope::room_event(
            "game_ended",
            room_id,
            json!({
                "reason": reason,
                "winner": winner,
                "ranking": ranking,
            }),
        );
        self.broadcast_service.fan_out(&room.recipients(), &ended, None);
        drop(rooms);

        if cancel_timer {
            self.cancel_timer(room_id).await;
        } else {
            // 타임아웃 경로: 핸들 테이블 정리만 수행
            self.game_timers.lock().await.remove(room_id);
        }

        info!("🏁 게임 종료: 방 {} ({})", room_id, reason);
        Ok(())
    }

    // === 외부 HTTP 핸들러용 조회 전용 표면 ===

    /// 방 목록 조회
    pub async fn get_room_list(&self) -> Vec<GameRoomInfo> {
        let rooms = self.rooms.lock().await;
        rooms
            .values()
            .map(|room| GameRoomInfo {
                room_id: room.room_id.clone(),
                name: room.name.clone(),
                game_type: room.game_type.clone(),
                status: room.status,
                current_players: room.players.len(),
                max_players: room.settings.max_players,
                is_private: room.settings.is_private,
                created_at: room.created_at,
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
        self.player_room_map.get(&user_id).map(|r| r.clone())
    }

    /// 게임 통계 조회
    pub async fn get_game_stats(&self) -> GameStats {
        let rooms = self.rooms.lock().await;
        GameStats {
            total_rooms: rooms.len(),
            total_players: rooms.values().map(|r| r.players.len()).sum(),
            active_games: rooms
                .values()
                .filter(|r| matches!(r.status, GameRoomStatus::Playing | GameRoomStatus::Paused))
                .count(),
        }
    }

    /// 입장 에러를 요청자에게만 전달
    fn send_admission_error(&self, conn_id: ConnId, err: &WsServerError) {
        debug!("입장 거절: {}", err);
        self.broadcast_service
            .send_to(conn_id, &Envelope::error(err.code(), &err.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::service::InMemoryScoreRepository;
    use std::sync::Arc;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::Notify;
    use tokio_tungstenite::tungstenite::Message;

    struct TestHarness {
        handler: Arc<GameSyncHandler>,
        connection_service: Arc<ConnectionService>,
        repository: Arc<InMemoryScoreRepository>,
    }

    fn harness() -> TestHarness {
        let connection_service = Arc::new(ConnectionService::new(100));
        let broadcast_service = Arc::new(BroadcastService::new(connection_service.clone()));
        let repository = Arc::new(InMemoryScoreRepository::new());
        let handler = Arc::new(GameSyncHandler::new(
            connection_service.clone(),
            broadcast_service,
            repository.clone(),
            GameConfig::default(),
        ));
        TestHarness {
            handler,
            connection_service,
            repository,
        }
    }

    async fn connect(
        harness: &TestHarness,
        user_id: UserId,
        nickname: &str,
    ) -> (Identity, ConnId, UnboundedReceiver<Message>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let conn_id = harness
            .connection_service
            .admit(format!("127.0.0.1:{}", user_id), tx, Arc::new(Notify::new()))
            .await
            .unwrap();
        (Identity::new(user_id, nickname, false), conn_id, rx)
    }

    fn create_data(max_players: u32, password: Option<&str>) -> CreateRoomData {
        CreateRoomData {
            name: "테스트 방".to_string(),
            game_type: "fruit_catch".to_string(),
            settings: GameRoomSettings {
                max_players,
                is_private: password.is_some(),
                password: password.map(str::to_string),
                ..GameRoomSettings::default()
            },
        }
    }

    /// 수신된 메시지 중 해당 타입의 봉투를 찾는다
    fn drain_find(rx: &mut UnboundedReceiver<Message>, kind: &str) -> Option<Envelope> {
        let mut found = None;
        while let Ok(msg) = rx.try_recv() {
            if let Message::Text(text) = msg {
                let envelope = Envelope::from_text(&text).unwrap();
                if envelope.kind == kind {
                    found = Some(envelope);
                }
            }
        }
        found
    }

    async fn ready_all(handler: &Arc<GameSyncHandler>, users: &[UserId]) {
        for user in users {
            handler.set_ready(*user, true).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_create_and_join() {
        let h = harness();
        let (host, host_conn, mut host_rx) = connect(&h, 1, "Host").await;
        let (guest, guest_conn, mut guest_rx) = connect(&h, 2, "Guest").await;

        let room_id = h
            .handler
            .create_room(&host, host_conn, create_data(4, None))
            .await
            .unwrap();
        assert!(!room_id.is_empty());
        assert!(drain_find(&mut host_rx, "room_created").is_some());

        h.handler
            .join_room(&guest, guest_conn, &room_id, JoinRoomData::default())
            .await
            .unwrap();

        // 입장자는 스냅샷, 기존 멤버는 입장 알림을 받는다
        let joined = drain_find(&mut guest_rx, "room_joined").unwrap();
        let snapshot = joined.data.unwrap();
        assert_eq!(snapshot["players"].as_array().unwrap().len(), 2);
        assert_eq!(snapshot["hostId"], 1);
        assert!(drain_find(&mut host_rx, "player_joined").is_some());

        // 호스트는 정확히 한 명
        let details = h.handler.get_room_details(&room_id).await.unwrap();
        let hosts = details["players"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|p| p["isHost"] == true)
            .count();
        assert_eq!(hosts, 1);
    }

    #[tokio::test]
    async fn test_capacity_rejects_third_join() {
        let h = harness();
        let (host, host_conn, _rx1) = connect(&h, 1, "Host").await;
        let (second, second_conn, _rx2) = connect(&h, 2, "Second").await;
        let (third, third_conn, mut third_rx) = connect(&h, 3, "Third").await;

        let room_id = h
            .handler
            .create_room(&host, host_conn, create_data(2, None))
            .await
            .unwrap();
        h.handler
            .join_room(&second, second_conn, &room_id, JoinRoomData::default())
            .await
            .unwrap();

        // 정원 2명인 방의 세 번째 입장은 에러 이벤트를 받고 멤버십은 2로 유지
        h.handler
            .join_room(&third, third_conn, &room_id, JoinRoomData::default())
            .await
            .unwrap();

        let error = drain_find(&mut third_rx, "error").unwrap();
        assert_eq!(error.data.unwrap()["code"], 409);

        let details = h.handler.get_room_details(&room_id).await.unwrap();
        assert_eq!(details["players"].as_array().unwrap().len(), 2);
        assert_eq!(h.handler.get_user_room(3), None);
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let h = harness();
        let (host, host_conn, _rx1) = connect(&h, 1, "Host").await;
        let (guest, guest_conn, mut guest_rx) = connect(&h, 2, "Guest").await;

        let room_id = h
            .handler
            .create_room(&host, host_conn, create_data(4, Some("비밀")))
            .await
            .unwrap();

        h.handler
            .join_room(
                &guest,
                guest_conn,
                &room_id,
                JoinRoomData { password: Some("틀림".to_string()) },
            )
            .await
            .unwrap();
        let error = drain_find(&mut guest_rx, "error").unwrap();
        assert_eq!(error.data.unwrap()["code"], 403);

        h.handler
            .join_room(
                &guest,
                guest_conn,
                &room_id,
                JoinRoomData { password: Some("비밀".to_string()) },
            )
            .await
            .unwrap();
        assert!(drain_find(&mut guest_rx, "room_joined").is_some());
    }

    #[tokio::test]
    async fn test_join_moves_membership_atomically() {
        let h = harness();
        let (host_a, conn_a, _rx_a) = connect(&h, 1, "HostA").await;
        let (host_b, conn_b, _rx_b) = connect(&h, 2, "HostB").await;
        let (guest, guest_conn, _rx_g) = connect(&h, 3, "Guest").await;

        let room_a = h
            .handler
            .create_room(&host_a, conn_a, create_data(4, None))
            .await
            .unwrap();
        let room_b = h
            .handler
            .create_room(&host_b, conn_b, create_data(4, None))
            .await
            .unwrap();

        h.handler
            .join_room(&guest, guest_conn, &room_a, JoinRoomData::default())
            .await
            .unwrap();
        assert_eq!(h.handler.get_user_room(3).as_deref(), Some(room_a.as_str()));

        // B 입장이 A 멤버십을 원자적으로 제거한다
        h.handler
            .join_room(&guest, guest_conn, &room_b, JoinRoomData::default())
            .await
            .unwrap();
        assert_eq!(h.handler.get_user_room(3).as_deref(), Some(room_b.as_str()));

        let details_a = h.handler.get_room_details(&room_a).await.unwrap();
        assert_eq!(details_a["players"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_requires_host_and_all_ready() {
        let h = harness();
        let (host, host_conn, mut host_rx) = connect(&h, 1, "Host").await;
        let (guest, guest_conn, _rx_g) = connect(&h, 2, "Guest").await;

        let room_id = h
            .handler
            .create_room(&host, host_conn, create_data(4, None))
            .await
            .unwrap();
        h.handler
            .join_room(&guest, guest_conn, &room_id, JoinRoomData::default())
            .await
            .unwrap();

        // 호스트가 아니면 무시 (피드백 없음)
        h.handler.start_game(2).await.unwrap();
        let details = h.handler.get_room_details(&room_id).await.unwrap();
        assert_eq!(details["status"], "waiting");

        // 전원 준비가 아니면 거절 피드백만 브로드캐스트
        h.handler.start_game(1).await.unwrap();
        assert!(drain_find(&mut host_rx, "game_start_rejected").is_some());
        let details = h.handler.get_room_details(&room_id).await.unwrap();
        assert_eq!(details["status"], "waiting");

        // 전원 준비 후 시작
        ready_all(&h.handler, &[1, 2]).await;
        h.handler.start_game(1).await.unwrap();
        assert!(drain_find(&mut host_rx, "game_started").is_some());
        let details = h.handler.get_room_details(&room_id).await.unwrap();
        assert_eq!(details["status"], "playing");

        h.handler.end_game(1, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_start_resets_game_state_from_template() {
        let h = harness();
        let (host, host_conn, _rx) = connect(&h, 1, "Host").await;

        let room_id = h
            .handler
            .create_room(&host, host_conn, create_data(4, None))
            .await
            .unwrap();
        ready_all(&h.handler, &[1]).await;
        h.handler.start_game(1).await.unwrap();

        // 호스트가 진행 중 상태를 오염시킨다
        h.handler
            .game_state_update(1, json!({ "fruits": [1, 2, 3], "combo": 9 }))
            .await
            .unwrap();
        h.handler.end_game(1, None).await.unwrap();

        // 재시작하면 템플릿으로 복원되어야 한다 — finished는 종단이므로
        // 같은 방은 재시작할 수 없고, 새 방에서 확인한다
        let details = h.handler.get_room_details(&room_id).await.unwrap();
        assert_eq!(details["status"], "finished");
        assert_eq!(details["gameState"]["combo"], 9);

        h.handler.leave_room(1, &room_id).await.unwrap();
        let (host, host_conn, _rx2) = connect(&h, 1, "Host").await;
        let room2 = h
            .handler
            .create_room(&host, host_conn, create_data(4, None))
            .await
            .unwrap();
        ready_all(&h.handler, &[1]).await;
        h.handler.start_game(1).await.unwrap();

        let details = h.handler.get_room_details(&room2).await.unwrap();
        assert_eq!(details["gameState"]["combo"], 0);
        assert_eq!(details["gameState"]["fruits"], json!([]));

        h.handler.end_game(1, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_host_leave_transfers_to_earliest_joined() {
        let h = harness();
        let (host, host_conn, _rx1) = connect(&h, 1, "Host").await;
        let (second, second_conn, mut second_rx) = connect(&h, 2, "Second").await;
        let (third, third_conn, _rx3) = connect(&h, 3, "Third").await;

        let room_id = h
            .handler
            .create_room(&host, host_conn, create_data(4, None))
            .await
            .unwrap();
        h.handler
            .join_room(&second, second_conn, &room_id, JoinRoomData::default())
            .await
            .unwrap();
        h.handler
            .join_room(&third, third_conn, &room_id, JoinRoomData::default())
            .await
            .unwrap();

        h.handler.leave_room(1, &room_id).await.unwrap();

        // 방은 파기되지 않고, 먼저 입장한 멤버가 호스트가 된다
        let changed = drain_find(&mut second_rx, "host_changed").unwrap();
        assert_eq!(changed.data.unwrap()["userId"], 2);

        let details = h.handler.get_room_details(&room_id).await.unwrap();
        assert_eq!(details["hostId"], 2);
        let hosts = details["players"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|p| p["isHost"] == true)
            .count();
        assert_eq!(hosts, 1);
    }

    #[tokio::test]
    async fn test_empty_room_destroyed() {
        let h = harness();
        let (host, host_conn, _rx) = connect(&h, 1, "Host").await;

        let room_id = h
            .handler
            .create_room(&host, host_conn, create_data(4, None))
            .await
            .unwrap();
        h.handler.leave_room(1, &room_id).await.unwrap();

        assert!(h.handler.get_room_details(&room_id).await.is_none());
        assert_eq!(h.handler.get_user_room(1), None);
        assert_eq!(h.handler.get_game_stats().await.total_rooms, 0);
    }

    #[tokio::test]
    async fn test_move_ignored_unless_playing() {
        let h = harness();
        let (host, host_conn, _rx) = connect(&h, 1, "Host").await;

        let room_id = h
            .handler
            .create_room(&host, host_conn, create_data(4, None))
            .await
            .unwrap();

        h.handler
            .player_move(1, MoveData { x: 10.0, y: 20.0 })
            .await
            .unwrap();
        let details = h.handler.get_room_details(&room_id).await.unwrap();
        assert_eq!(details["players"][0]["position"]["x"], 0.0);

        ready_all(&h.handler, &[1]).await;
        h.handler.start_game(1).await.unwrap();
        h.handler
            .player_move(1, MoveData { x: 10.0, y: 20.0 })
            .await
            .unwrap();
        let details = h.handler.get_room_details(&room_id).await.unwrap();
        assert_eq!(details["players"][0]["position"]["x"], 10.0);

        h.handler.end_game(1, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_score_broadcast_and_persistence() {
        let h = harness();
        let (host, host_conn, mut host_rx) = connect(&h, 1, "Host").await;

        h.handler
            .create_room(&host, host_conn, create_data(4, None))
            .await
            .unwrap();
        ready_all(&h.handler, &[1]).await;
        h.handler.start_game(1).await.unwrap();

        h.handler
            .player_score(
                1,
                ScoreData { points: 50, item_type: "apple".to_string() },
            )
            .await
            .unwrap();

        // 득점자 본인도 갱신된 점수를 받는다
        let scored = drain_find(&mut host_rx, "player_score").unwrap();
        let data = scored.data.unwrap();
        assert_eq!(data["score"], 50);
        assert_eq!(data["itemType"], "apple");

        // fire-and-forget 영속화가 완료될 시간을 준다
        tokio::task::yield_now().await;
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        let records = h.repository.get_scores(1).await.unwrap();
        assert!(!records.is_empty());
        assert_eq!(records[0].score, 50);

        h.handler.end_game(1, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_explosion_applies_proximity_damage() {
        let h = harness();
        let (host, host_conn, mut host_rx) = connect(&h, 1, "Host").await;
        let (near, near_conn, _rx2) = connect(&h, 2, "Near").await;
        let (far, far_conn, _rx3) = connect(&h, 3, "Far").await;

        let room_id = h
            .handler
            .create_room(&host, host_conn, create_data(4, None))
            .await
            .unwrap();
        h.handler
            .join_room(&near, near_conn, &room_id, JoinRoomData::default())
            .await
            .unwrap();
        h.handler
            .join_room(&far, far_conn, &room_id, JoinRoomData::default())
            .await
            .unwrap();
        ready_all(&h.handler, &[1, 2, 3]).await;
        h.handler.start_game(1).await.unwrap();

        // 폭발 반경 안/경계/밖 배치
        h.handler.player_move(1, MoveData { x: 0.0, y: 0.0 }).await.unwrap();
        h.handler.player_move(2, MoveData { x: 30.0, y: 40.0 }).await.unwrap(); // 거리 50 = 경계
        h.handler.player_move(3, MoveData { x: 500.0, y: 500.0 }).await.unwrap();

        h.handler
            .bomb_explosion(
                1,
                ExplosionData { x: 0.0, y: 0.0, radius: Some(50.0), damage: Some(2) },
            )
            .await
            .unwrap();

        let explosion = drain_find(&mut host_rx, "bomb_explosion").unwrap();
        let affected = explosion.data.unwrap()["affected"].clone();
        let affected = affected.as_array().unwrap();
        assert_eq!(affected.len(), 2);

        let details = h.handler.get_room_details(&room_id).await.unwrap();
        let lives: HashMap<u64, u64> = details["players"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| (p["userId"].as_u64().unwrap(), p["lives"].as_u64().unwrap()))
            .collect();
        assert_eq!(lives[&1], 1); // 3 - 2
        assert_eq!(lives[&2], 1); // 경계 거리도 포함
        assert_eq!(lives[&3], 3); // 반경 밖은 영향 없음

        // 피해가 목숨을 0 아래로 내리지 않는다
        h.handler
            .bomb_explosion(
                1,
                ExplosionData { x: 0.0, y: 0.0, radius: Some(50.0), damage: Some(99) },
            )
            .await
            .unwrap();
        let details = h.handler.get_room_details(&room_id).await.unwrap();
        let zero_lives = details["players"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["userId"] == 1)
            .unwrap();
        assert_eq!(zero_lives["lives"], 0);

        h.handler.end_game(1, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_end_game_ranking_descending_with_join_order_ties() {
        let h = harness();
        let (host, host_conn, mut host_rx) = connect(&h, 1, "Host").await;
        let (second, second_conn, _rx2) = connect(&h, 2, "Second").await;
        let (third, third_conn, _rx3) = connect(&h, 3, "Third").await;

        let room_id = h
            .handler
            .create_room(&host, host_conn, create_data(4, None))
            .await
            .unwrap();
        h.handler
            .join_room(&second, second_conn, &room_id, JoinRoomData::default())
            .await
            .unwrap();
        h.handler
            .join_room(&third, third_conn, &room_id, JoinRoomData::default())
            .await
            .unwrap();
        ready_all(&h.handler, &[1, 2, 3]).await;
        h.handler.start_game(1).await.unwrap();

        // 2번이 최고점, 1번과 3번은 동점 (입장 순서상 1번이 앞)
        h.handler
            .player_score(2, ScoreData { points: 90, item_type: "melon".to_string() })
            .await
            .unwrap();
        h.handler
            .player_score(1, ScoreData { points: 40, item_type: "apple".to_string() })
            .await
            .unwrap();
        h.handler
            .player_score(3, ScoreData { points: 40, item_type: "apple".to_string() })
            .await
            .unwrap();

        h.handler.end_game(1, Some("host_ended".to_string())).await.unwrap();

        let ended = drain_find(&mut host_rx, "game_ended").unwrap();
        let data = ended.data.unwrap();
        let ranking = data["ranking"].as_array().unwrap();
        assert_eq!(ranking[0]["userId"], 2);
        assert_eq!(ranking[0]["rank"], 0);
        assert_eq!(ranking[1]["userId"], 1); // 동점은 입장 순서
        assert_eq!(ranking[2]["userId"], 3);
        assert_eq!(data["winner"]["userId"], 2);

        // 전 멤버의 최종 점수가 영속화된다
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        assert!(!h.repository.get_scores(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_cleanup() {
        let h = harness();
        let (host, host_conn, _rx1) = connect(&h, 1, "Host").await;
        let (guest, guest_conn, _rx2) = connect(&h, 2, "Guest").await;

        let room_id = h
            .handler
            .create_room(&host, host_conn, create_data(4, None))
            .await
            .unwrap();
        h.handler
            .join_room(&guest, guest_conn, &room_id, JoinRoomData::default())
            .await
            .unwrap();

        h.handler.handle_disconnect(2, guest_conn).await.unwrap();
        assert_eq!(h.handler.get_user_room(2), None);
        let details = h.handler.get_room_details(&room_id).await.unwrap();
        assert_eq!(details["players"].as_array().unwrap().len(), 1);
    }
}
