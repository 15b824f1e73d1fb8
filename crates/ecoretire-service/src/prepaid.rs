//! Optional relational prepaid-balance collaborator: `users` + `transactions`.

use async_trait::async_trait;
use chrono::Utc;
use ecoretire_core::error::CoreError;
use ecoretire_core::retirement::PrepaidLedger;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

pub struct PostgresPrepaidLedger {
    pool: PgPool,
}

impl PostgresPrepaidLedger {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                api_key TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                balance_cents BIGINT NOT NULL DEFAULT 0,
                stripe_customer_id TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|err| CoreError::Storage(err.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                kind TEXT NOT NULL,
                amount_cents BIGINT NOT NULL,
                description TEXT NOT NULL,
                stripe_session_id TEXT,
                retirement_tx_hash TEXT,
                credit_class TEXT,
                credits_retired TEXT,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|err| CoreError::Storage(err.to_string()))?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS transactions_stripe_session_id_key
                ON transactions (stripe_session_id)
                WHERE stripe_session_id IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|err| CoreError::Storage(err.to_string()))?;

        Ok(())
    }

    /// Credits `amount_cents` to the user with `email`, creating the user row
    /// if it does not yet exist. Used by the checkout-completed webhook. A
    /// replay of the same `stripe_session_id` is a no-op: the transactions
    /// table has a unique index on that column, so the second insert is
    /// skipped and the balance is left untouched.
    pub async fn credit_topup(
        &self,
        email: &str,
        amount_cents: i64,
        stripe_session_id: &str,
        stripe_customer_id: Option<&str>,
    ) -> Result<String, CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))?;

        let now = Utc::now();
        let user_id: String = sqlx::query_scalar(
            r#"
            INSERT INTO users (id, api_key, email, balance_cents, stripe_customer_id, created_at, updated_at)
            VALUES ($1, $2, $3, 0, $4, $5, $5)
            ON CONFLICT (email) DO UPDATE SET updated_at = $5
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(Uuid::new_v4().to_string())
        .bind(email)
        .bind(stripe_customer_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| CoreError::Storage(err.to_string()))?;

        let inserted: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO transactions (id, user_id, kind, amount_cents, description, stripe_session_id, created_at)
            VALUES ($1, $2, 'topup', $3, 'checkout session credit', $4, $5)
            ON CONFLICT (stripe_session_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user_id)
        .bind(amount_cents)
        .bind(stripe_session_id)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|err| CoreError::Storage(err.to_string()))?;

        if inserted.is_some() {
            sqlx::query("UPDATE users SET balance_cents = balance_cents + $1, updated_at = $2 WHERE id = $3")
                .bind(amount_cents)
                .bind(now)
                .bind(&user_id)
                .execute(&mut *tx)
                .await
                .map_err(|err| CoreError::Storage(err.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))?;

        Ok(user_id)
    }
}

#[async_trait]
impl PrepaidLedger for PostgresPrepaidLedger {
    async fn balance_cents(&self, user_id: &str) -> Result<i64, CoreError> {
        sqlx::query_scalar("SELECT balance_cents FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))?
            .ok_or_else(|| CoreError::NotFound(format!("user {user_id}")))
    }

    async fn debit(&self, user_id: &str, amount_cents: i64, tx_hash: &str) -> Result<(), CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))?;

        let now = Utc::now();
        // Single transactional update that only succeeds when the pre-image
        // balance covers the debit; the WHERE clause enforces that atomically.
        let updated = sqlx::query(
            "UPDATE users SET balance_cents = balance_cents - $1, updated_at = $2 WHERE id = $3 AND balance_cents >= $1",
        )
        .bind(amount_cents)
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| CoreError::Storage(err.to_string()))?;

        if updated.rows_affected() == 0 {
            return Err(CoreError::InvalidRequest(
                "insufficient prepaid balance for debit".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, kind, amount_cents, description, retirement_tx_hash, created_at)
            VALUES ($1, $2, 'retirement', $3, 'on-chain retirement debit', $4, $5)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(amount_cents)
        .bind(tx_hash)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|err| CoreError::Storage(err.to_string()))?;

        tx.commit()
            .await
            .map_err(|err| CoreError::Storage(err.to_string()))?;
        Ok(())
    }
}
