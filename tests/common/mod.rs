#![allow(dead_code)]

use async_trait::async_trait;
use referral_server::{
    config::ProcessorConfig,
    domain::{
        errors::{DatabaseError, PlatformError},
        events::{EventOutcome, MembershipEvent},
        fields::{InviteToken, UserId},
        model::{CounterDrift, LeaderboardEntry, User},
    },
    platform::PlatformClient,
    processor::EventProcessor,
    repository::{MemoryUserStore, UserStore, UserTx},
};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc, Mutex,
};

pub fn id(raw: i64) -> UserId {
    UserId::from(raw)
}

pub fn link_of(owner: i64) -> Option<InviteToken> {
    Some(InviteToken::new(id(owner)))
}

pub fn processor(store: &MemoryUserStore) -> EventProcessor {
    processor_over(Arc::new(store.clone()))
}

pub fn processor_over(store: Arc<dyn UserStore>) -> EventProcessor {
    EventProcessor::new(
        store,
        ProcessorConfig {
            max_retries: 10,
            retry_backoff_ms: 1,
            ..ProcessorConfig::default()
        },
    )
}

pub async fn join(p: &EventProcessor, user: i64, inviter: Option<i64>) -> EventOutcome {
    p.apply(&MembershipEvent::join(id(user), inviter.and_then(link_of)))
        .await
        .unwrap()
}

pub async fn chat(p: &EventProcessor, user: i64) -> EventOutcome {
    p.apply(&MembershipEvent::first_interaction(id(user)))
        .await
        .unwrap()
}

pub async fn leave(p: &EventProcessor, user: i64) -> EventOutcome {
    p.apply(&MembershipEvent::leave(id(user))).await.unwrap()
}

/// Materialized counters agree with the live aggregate for every user.
pub async fn assert_counters_consistent(store: &MemoryUserStore) {
    let drift = store.counter_drift().await.unwrap();
    assert!(drift.is_empty(), "counters drifted: {:?}", drift);
}

#[derive(Default)]
pub struct RecordingPlatform {
    pub sent: Mutex<Vec<(i64, String)>>,
    pub fail_sends: bool,
}

impl RecordingPlatform {
    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }

    pub fn messages_to(&self, chat_id: i64) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl PlatformClient for RecordingPlatform {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), PlatformError> {
        if self.fail_sends {
            return Err(PlatformError::Request("connection reset".to_string()));
        }
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }

    async fn create_invite_link(&self, owner: UserId) -> Result<String, PlatformError> {
        Ok(format!("https://t.me/+{}", InviteToken::new(owner)))
    }

    async fn lookup_user(&self, id: UserId) -> Result<String, PlatformError> {
        Err(PlatformError::Api(format!("chat {} not found", id)))
    }
}

/// Fails the first `failures` transactions with `error`.
pub struct FlakyStore {
    pub inner: MemoryUserStore,
    pub failures: AtomicU32,
    pub error: DatabaseError,
}

impl FlakyStore {
    pub fn new(inner: MemoryUserStore, failures: u32, error: DatabaseError) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
            error,
        }
    }
}

#[async_trait]
impl UserStore for FlakyStore {
    async fn begin(&self) -> Result<Box<dyn UserTx>, DatabaseError> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(self.error);
        }
        self.inner.begin().await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, DatabaseError> {
        self.inner.get_user(id).await
    }

    async fn total_referrals(&self, id: UserId) -> Result<i64, DatabaseError> {
        self.inner.total_referrals(id).await
    }

    async fn active_referrals(&self, id: UserId) -> Result<i64, DatabaseError> {
        self.inner.active_referrals(id).await
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, DatabaseError> {
        self.inner.leaderboard(limit).await
    }

    async fn counter_drift(&self) -> Result<Vec<CounterDrift>, DatabaseError> {
        self.inner.counter_drift().await
    }
}
