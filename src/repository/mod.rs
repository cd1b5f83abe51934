//! Durable user table. The only shared mutable state of the service.
//!
//! Mutations go through a [`UserTx`] obtained from [`UserStore::begin`]; the
//! transaction is the atomic unit of event application. Dropping a
//! transaction without committing it discards every write made through it.
//! The read methods on [`UserStore`] do not lock and are meant for display.

pub mod memory;
pub mod postgres;

use crate::domain::{
    errors::DatabaseError,
    fields::UserId,
    machine::CounterDelta,
    model::{CounterDrift, LeaderboardEntry, User},
};
use async_trait::async_trait;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UserTx>, DatabaseError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, DatabaseError>;

    /// Every user ever attributed to `id`, whatever their state.
    async fn total_referrals(&self, id: UserId) -> Result<i64, DatabaseError>;

    /// Live count of attributed users that are members and have chatted.
    async fn active_referrals(&self, id: UserId) -> Result<i64, DatabaseError>;

    /// Inviters by live active count, descending, ties to the earliest
    /// `join_date`. Inviters without active referrals are left out.
    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, DatabaseError>;

    /// Users whose materialized `referral_count` disagrees with the live count.
    async fn counter_drift(&self) -> Result<Vec<CounterDrift>, DatabaseError>;
}

#[async_trait]
pub trait UserTx: Send {
    /// Reads a row without locking it.
    async fn peek_user(&mut self, id: UserId) -> Result<Option<User>, DatabaseError>;

    /// Reads a row and holds it until commit or rollback.
    async fn lock_user(&mut self, id: UserId) -> Result<Option<User>, DatabaseError>;

    /// Inserts `user` unless the id already exists. Returns whether it was inserted.
    async fn insert_user(&mut self, user: &User) -> Result<bool, DatabaseError>;

    /// Writes `is_member` and `has_chatted` of `user`.
    async fn update_membership(&mut self, user: &User) -> Result<(), DatabaseError>;

    /// Applies `delta` to the counter of `id`, never going below zero.
    /// Returns the new value.
    async fn adjust_referrals(
        &mut self,
        id: UserId,
        delta: CounterDelta,
    ) -> Result<i64, DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;
}
