//! 점수 영속화 서비스
//!
//! 게임 점수를 내구성 저장소에 기록하는 협력자 인터페이스입니다.
//! 실시간 코어는 fire-and-forget 방식으로 호출하며, 실패는 로그로만
//! 남기고 절대 인메모리 상태 변경을 되돌리지 않습니다.

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::UserId;

/// 점수 기록 엔트리
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub user_id: UserId,
    pub game_name: String,
    pub score: u32,
    pub level: u32,
    pub recorded_at: i64,
}

/// 점수 영속화 트레이트
///
/// 의존성 주입과 모의 구현 테스트를 위해 트레이트로 정의합니다.
/// 구현체는 외부 저장소(DB 등)에 기록하며, 호출자는 결과를 기다리지
/// 않는 비동기 태스크에서 실행합니다.
#[async_trait]
pub trait ScoreRepository: Send + Sync {
    /// 사용자의 점수를 기록합니다.
    async fn persist_score(
        &self,
        user_id: UserId,
        game_name: &str,
        score: u32,
        level: u32,
    ) -> Result<()>;

    /// 사용자의 누적 기록 조회 (조회 전용 보조 기능)
    async fn get_scores(&self, user_id: UserId) -> Result<Vec<ScoreRecord>>;
}

/// 인메모리 점수 저장소
///
/// 기본 구성 및 테스트용 구현체입니다. 프로세스 수명 동안만 유지되며,
/// 실제 배포에서는 외부 저장소 구현체로 대체됩니다.
#[derive(Default)]
pub struct InMemoryScoreRepository {
    /// user_id -> 기록 목록
    records: DashMap<UserId, Vec<ScoreRecord>>,
}

impl InMemoryScoreRepository {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// 저장된 총 기록 수
    pub fn record_count(&self) -> usize {
        self.records.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl ScoreRepository for InMemoryScoreRepository {
    async fn persist_score(
        &self,
        user_id: UserId,
        game_name: &str,
        score: u32,
        level: u32,
    ) -> Result<()> {
        let record = ScoreRecord {
            user_id,
            game_name: game_name.to_string(),
            score,
            level,
            recorded_at: chrono::Utc::now().timestamp(),
        };

        self.records.entry(user_id).or_default().push(record);

        debug!(
            "점수 기록 완료: 사용자 {} 게임 {} 점수 {} 레벨 {}",
            user_id, game_name, score, level
        );
        Ok(())
    }

    async fn get_scores(&self, user_id: UserId) -> Result<Vec<ScoreRecord>> {
        Ok(self
            .records
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}
