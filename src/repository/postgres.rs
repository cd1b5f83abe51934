use super::{UserStore, UserTx};
use crate::domain::{
    errors::{from_sqlx, DatabaseError},
    fields::UserId,
    machine::CounterDelta,
    model::{CounterDrift, DbUser, LeaderboardEntry, User},
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

const USER_COLUMNS: &str =
    "id, inviter_id, is_member, has_chatted, referral_count, join_date";

#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn begin(&self) -> Result<Box<dyn UserTx>, DatabaseError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(from_sqlx("begin transaction"))?;
        Ok(Box::new(PgUserTx { tx }))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            "select {} from users where id = $1",
            USER_COLUMNS
        ))
        .bind(id.inner())
        .fetch_optional(&self.pool)
        .await
        .map_err(from_sqlx("get user"))?;

        Ok(user.map(|u| u.into()))
    }

    async fn total_referrals(&self, id: UserId) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as("select count(*) from users where inviter_id = $1")
            .bind(id.inner())
            .fetch_one(&self.pool)
            .await
            .map_err(from_sqlx("count total referrals"))?;

        tracing::debug!("user {} has {} total referrals", id, count);
        Ok(count)
    }

    async fn active_referrals(&self, id: UserId) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as(
            "select count(*) from users where inviter_id = $1 and is_member and has_chatted",
        )
        .bind(id.inner())
        .fetch_one(&self.pool)
        .await
        .map_err(from_sqlx("count active referrals"))?;

        tracing::debug!("user {} has {} active referrals", id, count);
        Ok(count)
    }

    async fn leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, DatabaseError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "select a.id, count(b.id) as active from users as a \
             join users as b on b.inviter_id = a.id and b.is_member and b.has_chatted \
             group by a.id, a.join_date \
             order by active desc, a.join_date asc, a.id asc \
             limit $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx("fetch leaderboard"))?;

        tracing::debug!("retrieved leaderboard with {} entries", rows.len());
        Ok(rows
            .into_iter()
            .map(|(id, active_count)| LeaderboardEntry {
                user_id: id.into(),
                active_count,
            })
            .collect())
    }

    async fn counter_drift(&self) -> Result<Vec<CounterDrift>, DatabaseError> {
        let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
            "select a.id, a.referral_count, count(b.id) from users as a \
             left join users as b on b.inviter_id = a.id and b.is_member and b.has_chatted \
             group by a.id, a.referral_count \
             having a.referral_count <> count(b.id) \
             order by a.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(from_sqlx("audit referral counters"))?;

        Ok(rows
            .into_iter()
            .map(|(id, materialized, actual)| CounterDrift {
                user_id: id.into(),
                materialized,
                actual,
            })
            .collect())
    }
}

pub struct PgUserTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UserTx for PgUserTx {
    async fn peek_user(&mut self, id: UserId) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            "select {} from users where id = $1",
            USER_COLUMNS
        ))
        .bind(id.inner())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(from_sqlx("peek user"))?;

        Ok(user.map(|u| u.into()))
    }

    async fn lock_user(&mut self, id: UserId) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, DbUser>(&format!(
            "select {} from users where id = $1 for update",
            USER_COLUMNS
        ))
        .bind(id.inner())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(from_sqlx("lock user"))?;

        Ok(user.map(|u| u.into()))
    }

    async fn insert_user(&mut self, user: &User) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "insert into users (id, inviter_id, is_member, has_chatted, referral_count, join_date) \
             values ($1, $2, $3, $4, $5, $6) on conflict (id) do nothing",
        )
        .bind(user.id.inner())
        .bind(user.inviter_id.map(|i| i.inner()))
        .bind(user.is_member)
        .bind(user.has_chatted)
        .bind(user.referral_count)
        .bind(user.join_date)
        .execute(&mut *self.tx)
        .await
        .map_err(from_sqlx("insert user"))?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_membership(&mut self, user: &User) -> Result<(), DatabaseError> {
        sqlx::query("update users set is_member = $2, has_chatted = $3 where id = $1")
            .bind(user.id.inner())
            .bind(user.is_member)
            .bind(user.has_chatted)
            .execute(&mut *self.tx)
            .await
            .map_err(from_sqlx("update membership"))?;

        Ok(())
    }

    async fn adjust_referrals(
        &mut self,
        id: UserId,
        delta: CounterDelta,
    ) -> Result<i64, DatabaseError> {
        let (count,): (i64,) = sqlx::query_as(
            "update users set referral_count = greatest(referral_count + $2, 0) \
             where id = $1 returning referral_count",
        )
        .bind(id.inner())
        .bind(delta.value())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(from_sqlx("adjust referral count"))?;

        Ok(count)
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        self.tx
            .commit()
            .await
            .map_err(from_sqlx("commit transaction"))
    }
}
