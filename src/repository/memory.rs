use super::{UserStore, UserTx};
use crate::domain::{
    errors::DatabaseError,
    fields::UserId,
    machine::CounterDelta,
    model::{CounterDrift, LeaderboardEntry, User},
};
use async_trait::async_trait;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone)]
struct Row {
    user: User,
    /// Insertion order, breaks `join_date` ties.
    seq: u64,
}

#[derive(Default)]
struct Table {
    rows: HashMap<UserId, Row>,
    next_seq: u64,
}

impl Table {
    fn active_counts(&self) -> HashMap<UserId, i64> {
        let mut counts = HashMap::new();
        for row in self.rows.values() {
            if let Some(inviter) = row.user.inviter_id {
                if row.user.state().is_active() {
                    *counts.entry(inviter).or_insert(0) += 1;
                }
            }
        }
        counts
    }
}

/// User store kept in process memory.
///
/// A transaction owns the whole table until it commits or is dropped, so
/// transactions are fully serialized.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    table: Arc<Mutex<Table>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every row, in insertion order.
    pub async fn users(&self) -> Vec<User> {
        let table = self.table.lock().await;
        let mut rows: Vec<&Row> = table.rows.values().collect();
        rows.sort_by_key(|r| r.seq);
        rows.into_iter().map(|r| r.user.clone()).collect()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn begin(&self) -> Result<Box<dyn UserTx>, DatabaseError> {
        let table = self.table.clone().lock_owned().await;
        let next_seq = table.next_seq;
        Ok(Box::new(MemoryTx {
            table,
            staged: HashMap::new(),
            next_seq,
        }))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, DatabaseError> {
        let table = self.table.lock().await;
        Ok(table.rows.get(&id).map(|r| r.user.clone()))
    }

    async fn total_referrals(&self, id: UserId) -> Result<i64, DatabaseError> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .filter(|r| r.user.inviter_id == Some(id))
            .count() as i64)
    }

    async fn active_referrals(&self, id: UserId) -> Result<i64, DatabaseError> {
        let table = self.table.lock().await;
        Ok(table.active_counts().get(&id).copied().unwrap_or(0))
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, DatabaseError> {
        let table = self.table.lock().await;
        let mut ranked: Vec<(&Row, i64)> = table
            .active_counts()
            .into_iter()
            .filter_map(|(id, count)| table.rows.get(&id).map(|row| (row, count)))
            .collect();
        ranked.sort_by(|(a, a_count), (b, b_count)| {
            b_count
                .cmp(a_count)
                .then(a.user.join_date.cmp(&b.user.join_date))
                .then(a.seq.cmp(&b.seq))
        });

        Ok(ranked
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(row, active_count)| LeaderboardEntry {
                user_id: row.user.id,
                active_count,
            })
            .collect())
    }

    async fn counter_drift(&self) -> Result<Vec<CounterDrift>, DatabaseError> {
        let table = self.table.lock().await;
        let counts = table.active_counts();
        let mut drift: Vec<CounterDrift> = table
            .rows
            .values()
            .filter_map(|row| {
                let actual = counts.get(&row.user.id).copied().unwrap_or(0);
                (row.user.referral_count != actual).then(|| CounterDrift {
                    user_id: row.user.id,
                    materialized: row.user.referral_count,
                    actual,
                })
            })
            .collect();
        drift.sort_by_key(|d| d.user_id);
        Ok(drift)
    }
}

pub struct MemoryTx {
    table: OwnedMutexGuard<Table>,
    staged: HashMap<UserId, Row>,
    next_seq: u64,
}

impl MemoryTx {
    fn read(&self, id: UserId) -> Option<&Row> {
        self.staged.get(&id).or_else(|| self.table.rows.get(&id))
    }

    fn write(&mut self, id: UserId) -> Result<&mut Row, DatabaseError> {
        if !self.staged.contains_key(&id) {
            let row = self.table.rows.get(&id).cloned().ok_or_else(|| {
                tracing::error!("write to missing user {} >>>", id);
                DatabaseError::ServerError
            })?;
            self.staged.insert(id, row);
        }
        self.staged.get_mut(&id).ok_or(DatabaseError::ServerError)
    }
}

#[async_trait]
impl UserTx for MemoryTx {
    async fn peek_user(&mut self, id: UserId) -> Result<Option<User>, DatabaseError> {
        Ok(self.read(id).map(|r| r.user.clone()))
    }

    async fn lock_user(&mut self, id: UserId) -> Result<Option<User>, DatabaseError> {
        Ok(self.read(id).map(|r| r.user.clone()))
    }

    async fn insert_user(&mut self, user: &User) -> Result<bool, DatabaseError> {
        if self.read(user.id).is_some() {
            return Ok(false);
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.staged.insert(
            user.id,
            Row {
                user: user.clone(),
                seq,
            },
        );
        Ok(true)
    }

    async fn update_membership(&mut self, user: &User) -> Result<(), DatabaseError> {
        let row = self.write(user.id)?;
        row.user.is_member = user.is_member;
        row.user.has_chatted = user.has_chatted;
        Ok(())
    }

    async fn adjust_referrals(
        &mut self,
        id: UserId,
        delta: CounterDelta,
    ) -> Result<i64, DatabaseError> {
        let row = self.write(id)?;
        row.user.referral_count = (row.user.referral_count + delta.value()).max(0);
        Ok(row.user.referral_count)
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let MemoryTx {
            mut table,
            staged,
            next_seq,
        } = *self;
        table.rows.extend(staged);
        table.next_seq = next_seq;
        Ok(())
    }
}
