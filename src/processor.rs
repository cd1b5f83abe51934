//! Applies membership events one atomic unit at a time.
//!
//! Within one store transaction the processor locks the inviter row, then the
//! invitee row, asks the state machine for the transition and writes the
//! invitee's flags together with the inviter's counter. Nothing outside the
//! transaction observes a state without its matching counter.

use crate::{
    config::ProcessorConfig,
    domain::{
        errors::{DatabaseError, ProcessError},
        events::{EventOutcome, MembershipEvent},
        fields::{MembershipState, UserId},
        machine::{self, CounterDelta, EventKind, Transition},
        model::{CounterDrift, User},
    },
    repository::UserStore,
    resolver,
};
use rand::Rng;
use std::{future::Future, sync::Arc, time::Duration};
use time::OffsetDateTime;

pub struct EventProcessor {
    store: Arc<dyn UserStore>,
    config: ProcessorConfig,
}

impl EventProcessor {
    pub fn new(store: Arc<dyn UserStore>, config: ProcessorConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> Arc<dyn UserStore> {
        self.store.clone()
    }

    /// Applies `event`, retrying failures that are safe to retry.
    #[tracing::instrument(skip(self, event), fields(user_id = %event.user_id, kind = ?event.kind))]
    pub async fn apply(&self, event: &MembershipEvent) -> Result<EventOutcome, ProcessError> {
        self.with_retries(|| self.apply_once(event)).await
    }

    /// Makes sure `id` has a record without touching its membership.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_user(&self, id: UserId) -> Result<bool, ProcessError> {
        self.with_retries(|| self.ensure_user_once(id)).await
    }

    /// Compares every materialized counter with the live aggregate.
    pub async fn audit_counters(&self) -> Result<Vec<CounterDrift>, DatabaseError> {
        let drift = self.store.counter_drift().await?;
        for d in &drift {
            tracing::warn!(
                user_id = %d.user_id,
                materialized = d.materialized,
                actual = d.actual,
                "referral counter drifted from live count"
            );
        }
        Ok(drift)
    }

    /// Runs `attempt` under the event timeout until it succeeds, fails for
    /// good or runs out of retries. A dropped attempt rolls its transaction back.
    async fn with_retries<T, F, Fut>(&self, mut attempt: F) -> Result<T, ProcessError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DatabaseError>>,
    {
        let mut retries = 0;
        loop {
            let result = match tokio::time::timeout(self.config.event_timeout(), attempt()).await {
                Ok(result) => result.map_err(ProcessError::from),
                Err(_) => Err(ProcessError::TimedOut),
            };

            match result {
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    retries += 1;
                    let backoff = self.backoff(retries);
                    tracing::warn!(attempt = retries, error = ?e, "store call failed, retrying in {:?}", backoff);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    tracing::error!(error = ?e, "store call failed after {} attempts", retries + 1);
                    return Err(e);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    async fn ensure_user_once(&self, id: UserId) -> Result<bool, DatabaseError> {
        let mut tx = self.store.begin().await?;
        let created = resolver::materialize(tx.as_mut(), id).await?;
        tx.commit().await?;
        Ok(created)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.retry_backoff();
        let jitter = rand::thread_rng().gen_range(0..=self.config.retry_backoff_ms);
        base * attempt + Duration::from_millis(jitter)
    }

    async fn apply_once(&self, event: &MembershipEvent) -> Result<EventOutcome, DatabaseError> {
        let user_id = event.user_id;
        let mut tx = self.store.begin().await?;

        // Attribution never changes once written, so it is safe to read it
        // before any lock is taken.
        let known = tx.peek_user(user_id).await?;
        let inviter_id = match &known {
            Some(user) => {
                if event.kind == EventKind::Join {
                    let claimed = resolver::decode(event.inviter_token.as_ref(), user_id);
                    if claimed.is_some() && claimed != user.inviter_id {
                        tracing::info!(
                            "user {} rejoined with another invite link, keeping attribution {:?}",
                            user_id,
                            user.inviter_id
                        );
                    }
                }
                user.inviter_id
            }
            None if event.kind == EventKind::Join => {
                resolver::resolve(tx.as_mut(), event.inviter_token.as_ref(), user_id).await?
            }
            None => None,
        };

        // Inviter first. An inviter row always predates its invitees, so this
        // order cannot cycle.
        let inviter = match inviter_id {
            Some(id) => tx.lock_user(id).await?,
            None => None,
        };
        let current = tx.lock_user(user_id).await?;
        if known.is_none() && current.is_some() {
            tracing::debug!("user {} was created by a concurrent event", user_id);
            return Err(DatabaseError::Conflict);
        }

        let previous = current.as_ref().map(User::state);
        let transition = machine::next(previous, event.kind);
        let mut inviter_active = None;
        let mut applied = None;

        match (transition, current) {
            (Transition::Enter, _) => {
                let mut user = User::placeholder(user_id, OffsetDateTime::now_utc());
                user.inviter_id = inviter_id;
                user.enter_state(MembershipState::InsideSilent);
                if !tx.insert_user(&user).await? {
                    return Err(DatabaseError::Conflict);
                }
            }
            (Transition::Move { to, delta }, Some(mut user)) => {
                user.enter_state(to);
                tx.update_membership(&user).await?;

                if let (Some(delta), Some(inviter)) = (delta, inviter.as_ref()) {
                    if delta == CounterDelta::Decrement && inviter.referral_count == 0 {
                        tracing::warn!(
                            inviter_id = %inviter.id,
                            "referral counter already at zero, clamping decrement"
                        );
                    }
                    let count = tx.adjust_referrals(inviter.id, delta).await?;
                    if count != inviter.referral_count {
                        applied = Some(delta);
                    }
                    inviter_active = Some(count);
                }
            }
            (Transition::Skipped, _) => {
                tracing::info!("skipping {:?} for unknown user {}", event.kind, user_id);
            }
            _ => {
                tracing::debug!("{:?} for user {} is already applied", event.kind, user_id);
            }
        }

        tx.commit().await?;

        let outcome = EventOutcome {
            user_id,
            kind: event.kind,
            previous,
            current: transition.target(previous),
            inviter_id,
            delta: applied,
            inviter_active,
        };
        if outcome.previous != outcome.current {
            tracing::info!(
                "user {} moved {:?} -> {:?}, inviter {:?} now at {:?}",
                user_id,
                outcome.previous,
                outcome.current,
                outcome.inviter_id,
                outcome.inviter_active
            );
        }
        Ok(outcome)
    }
}
