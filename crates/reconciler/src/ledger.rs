//! 중복 스캔 방지 원장
//!
//! 이미지 식별자(네임스페이스, 저장소)마다 최대 하나의 스캔만 진행되도록
//! 보장합니다. 모든 접근은 하나의 뮤텍스로 직렬화됩니다.
//!
//! # 상태 전이
//!
//! ```text
//!            try_claim            complete(true)
//! (없음) ──────────────> InFlight ───────────────> Registered
//!   ^                     │    │                        │
//!   │                     │    │ complete(false)        │
//!   │             release │    v                        │
//!   │                     │  Failed                     │
//!   │                     v    │                        │
//!   │                Releasing │                        │
//!   │                     │    │                        │
//!   └──── complete ───────┘    │                        │
//!   └──── release_failed ──────┘                        │
//!   └──────────────────── release ──────────────────────┘
//! ```
//!
//! 진행 중인 점유는 `release`로 바로 사라지지 않습니다. `Releasing`으로 바뀐 뒤
//! 해당 스캔이 끝나는 시점에 제거되므로 같은 식별자의 스캔이 겹치지 않습니다.
//!
//! `Failed` 상태는 다음 전체 조정 패스가 시작될 때 풀리므로 실패한 스캔은
//! 즉시 재시도되지 않습니다.

use std::collections::HashMap;
use std::sync::Mutex;

use sbomsync_core::metrics as m;
use sbomsync_core::types::ImageIdentity;

/// 식별자 하나의 점유 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    /// 스캔 또는 업로드 진행 중
    InFlight,
    /// 모든 대상에 업로드됨
    Registered,
    /// 스캔 또는 업로드 실패, 다음 패스에서 재시도
    Failed,
    /// 진행 중에 해제 요청됨, 완료 시 제거
    Releasing,
}

impl ClaimState {
    /// 상태 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InFlight => "in_flight",
            Self::Registered => "registered",
            Self::Failed => "failed",
            Self::Releasing => "releasing",
        }
    }
}

/// 프로세스 전역 중복 방지 원장
#[derive(Debug, Default)]
pub struct DedupLedger {
    claims: Mutex<HashMap<ImageIdentity, ClaimState>>,
}

impl DedupLedger {
    /// 빈 원장을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ImageIdentity, ClaimState>> {
        self.claims.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish_size(size: usize) {
        metrics::gauge!(m::RECONCILER_LEDGER_SIZE).set(size as f64);
    }

    /// 식별자를 점유합니다.
    ///
    /// 아무도 점유하지 않았을 때만 `true`를 반환하고 `InFlight`로 기록합니다.
    pub fn try_claim(&self, identity: &ImageIdentity) -> bool {
        let mut claims = self.lock();
        if claims.contains_key(identity) {
            return false;
        }
        claims.insert(identity.clone(), ClaimState::InFlight);
        Self::publish_size(claims.len());
        true
    }

    /// 진행 중인 점유의 결과를 기록합니다.
    ///
    /// 그 사이 `release`된 식별자는 다시 만들지 않고 제거합니다.
    pub fn complete(&self, identity: &ImageIdentity, success: bool) {
        let mut claims = self.lock();
        match claims.get(identity).copied() {
            Some(ClaimState::Releasing) => {
                claims.remove(identity);
                Self::publish_size(claims.len());
            }
            Some(_) => {
                let state = if success {
                    ClaimState::Registered
                } else {
                    ClaimState::Failed
                };
                claims.insert(identity.clone(), state);
            }
            None => {}
        }
    }

    /// 점유를 해제합니다. 바로 해제했으면 `true`.
    ///
    /// `InFlight` 점유는 `Releasing`으로 바꾸고 `complete`에서 제거합니다.
    pub fn release(&self, identity: &ImageIdentity) -> bool {
        let mut claims = self.lock();
        match claims.get(identity).copied() {
            None | Some(ClaimState::Releasing) => false,
            Some(ClaimState::InFlight) => {
                claims.insert(identity.clone(), ClaimState::Releasing);
                false
            }
            Some(ClaimState::Registered | ClaimState::Failed) => {
                claims.remove(identity);
                Self::publish_size(claims.len());
                true
            }
        }
    }

    /// `Registered` 상태인 경우에만 해제합니다.
    ///
    /// 원격 인벤토리에서 사라진 식별자를 다시 업로드할 때 사용합니다.
    pub fn release_registered(&self, identity: &ImageIdentity) -> bool {
        let mut claims = self.lock();
        if claims.get(identity) != Some(&ClaimState::Registered) {
            return false;
        }
        claims.remove(identity);
        Self::publish_size(claims.len());
        true
    }

    /// `Failed` 상태인 점유를 모두 해제하고 해제한 수를 반환합니다.
    pub fn release_failed(&self) -> usize {
        let mut claims = self.lock();
        let before = claims.len();
        claims.retain(|_, state| *state != ClaimState::Failed);
        Self::publish_size(claims.len());
        before - claims.len()
    }

    /// 식별자의 현재 상태
    pub fn state(&self, identity: &ImageIdentity) -> Option<ClaimState> {
        self.lock().get(identity).copied()
    }

    /// 점유된 식별자 수
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
