//! Postgres implementation of TransactionStore.

use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use crate::domain::{LocalTransaction, TransactionKind, TransactionStatus};
use crate::ports::{RefundReservation, StoreError, StoreResult, TransactionStore, TransitionOutcome};

const COLUMNS: &str = "id, parent_id, order_id, kind, amount, currency, hash, reference, status, \
                       message, response, created_at";

/// Postgres-backed transaction store.
#[derive(Clone)]
pub struct PostgresTransactionStore {
    pool: PgPool,
}

impl PostgresTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_row<'c, E>(executor: E, tx: &LocalTransaction) -> StoreResult<LocalTransaction>
where
    E: PgExecutor<'c>,
{
    let row = sqlx::query_as::<_, TransactionRow>(&format!(
        r#"
        INSERT INTO transactions ({COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(tx.id)
    .bind(tx.parent_id)
    .bind(&tx.order_id)
    .bind(tx.kind.as_str())
    .bind(&tx.amount)
    .bind(&tx.currency)
    .bind(&tx.hash)
    .bind(&tx.reference)
    .bind(tx.status.map(|s| s.as_str()))
    .bind(&tx.message)
    .bind(&tx.response)
    .bind(tx.created_at)
    .fetch_one(executor)
    .await?;

    row.into_domain()
}

#[async_trait]
impl TransactionStore for PostgresTransactionStore {
    async fn insert(&self, tx: &LocalTransaction) -> StoreResult<LocalTransaction> {
        insert_row(&self.pool, tx).await
    }

    async fn get(&self, id: Uuid) -> StoreResult<LocalTransaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain())
            .unwrap_or_else(|| Err(StoreError::NotFound(id.to_string())))
    }

    async fn update_reference(&self, id: Uuid, reference: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE transactions SET reference = $2 WHERE id = $1")
            .bind(id)
            .bind(reference)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn find_processing_by_reference(
        &self,
        kind: TransactionKind,
        reference: &str,
    ) -> StoreResult<Option<LocalTransaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM transactions t
            WHERE t.kind = $1
              AND t.reference = $2
              AND t.status = 'processing'
              AND NOT EXISTS (
                  SELECT 1 FROM transactions c
                  WHERE c.parent_id = t.id
                    AND c.kind = t.kind
                    AND c.status IN ('success', 'failed')
              )
            ORDER BY t.created_at ASC
            LIMIT 1
            "#
        ))
        .bind(kind.as_str())
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_domain()).transpose()
    }

    async fn children(&self, parent_id: Uuid) -> StoreResult<Vec<LocalTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM transactions WHERE parent_id = $1 ORDER BY created_at ASC"
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_domain()).collect()
    }

    async fn record_transition(
        &self,
        parent: &LocalTransaction,
        child: &LocalTransaction,
    ) -> StoreResult<TransitionOutcome> {
        // transactions_one_terminal_child turns a second terminal child into a no-op.
        let inserted = sqlx::query_scalar::<_, Uuid>(&format!(
            r#"
            INSERT INTO transactions ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (parent_id) WHERE status IN ('success', 'failed') DO NOTHING
            RETURNING id
            "#
        ))
        .bind(child.id)
        .bind(parent.id)
        .bind(&child.order_id)
        .bind(child.kind.as_str())
        .bind(&child.amount)
        .bind(&child.currency)
        .bind(&child.hash)
        .bind(&child.reference)
        .bind(child.status.map(|s| s.as_str()))
        .bind(&child.message)
        .bind(&child.response)
        .bind(child.created_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match inserted {
            Some(_) => TransitionOutcome::Applied,
            None => TransitionOutcome::AlreadyReconciled,
        })
    }

    async fn reserve_refund(
        &self,
        purchase: &LocalTransaction,
        refund: &LocalTransaction,
    ) -> StoreResult<RefundReservation> {
        let mut db_tx = self.pool.begin().await?;

        // Row lock on the purchase serializes reservations against it.
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM transactions WHERE id = $1 FOR UPDATE")
            .bind(purchase.id)
            .fetch_optional(&mut *db_tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(purchase.id.to_string()))?;

        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {COLUMNS} FROM transactions
            WHERE parent_id = $1
               OR parent_id IN (
                   SELECT id FROM transactions WHERE parent_id = $1 AND kind = 'refund'
               )
            "#
        ))
        .bind(purchase.id)
        .fetch_all(&mut *db_tx)
        .await?
        .into_iter()
        .map(|r| r.into_domain())
        .collect::<StoreResult<Vec<_>>>()?;

        let refundable = purchase.refundable_amount(&rows);
        if refund.amount > refundable {
            db_tx.rollback().await?;
            return Ok(RefundReservation::Exceeds { refundable });
        }

        let reserved = insert_row(&mut *db_tx, refund).await?;
        db_tx.commit().await?;
        Ok(RefundReservation::Reserved(reserved))
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    parent_id: Option<Uuid>,
    order_id: String,
    kind: String,
    amount: bigdecimal::BigDecimal,
    currency: String,
    hash: String,
    reference: Option<String>,
    status: Option<String>,
    message: Option<String>,
    response: Option<serde_json::Value>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> StoreResult<LocalTransaction> {
        let kind = self.kind.parse::<TransactionKind>().map_err(StoreError::Corrupt)?;
        let status = self
            .status
            .map(|s| s.parse::<TransactionStatus>())
            .transpose()
            .map_err(StoreError::Corrupt)?;

        Ok(LocalTransaction {
            id: self.id,
            parent_id: self.parent_id,
            order_id: self.order_id,
            kind,
            amount: self.amount,
            currency: self.currency,
            hash: self.hash,
            reference: self.reference,
            status,
            message: self.message,
            response: self.response,
            created_at: self.created_at,
        })
    }
}
