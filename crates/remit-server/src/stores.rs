//! Postgres-backed payment collaborators.
//!
//! Tenant tables are reached through the data-source router, so every query
//! runs with the tenant's own `search_path`. The expected tenant tables are:
//!
//! - `payments (id, status, amount, asset_id, receiver_wallet_id,
//!   status_message, external_id, updated_at)`
//! - `assets (id, code, issuer)`
//! - `receiver_wallets (id, stellar_address)`
//!
//! The submission queue is a single shared `submitter_transactions` table
//! keyed by `(tenant_id, external_id)`.
//!
//! A claim is a `FOR UPDATE SKIP LOCKED` select inside a transaction that
//! also carries the status writes, so overlapping executions for one tenant
//! split the ready rows between them.

use std::sync::Arc;

use async_trait::async_trait;
use remit_core::JobContext;
use remit_db::{DbError, TenantPoolRouter};
use remit_dispatch::{
    DispatchError, PaymentClaim, PaymentStatus, PaymentStore, ReadyPayment, StatusUpdate,
    SubmissionQueue, SubmissionRequest,
};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

#[derive(Debug, sqlx::FromRow)]
struct ReadyPaymentRow {
    id: String,
    amount: Decimal,
    asset_code: String,
    asset_issuer: String,
    destination: String,
}

impl From<ReadyPaymentRow> for ReadyPayment {
    fn from(row: ReadyPaymentRow) -> Self {
        Self {
            id: row.id,
            // Rows are selected by status.
            status: PaymentStatus::Ready,
            amount: row.amount,
            asset_code: row.asset_code,
            asset_issuer: row.asset_issuer,
            destination: row.destination,
        }
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

const CLAIM_READY_SQL: &str = "SELECT p.id, p.amount, a.code AS asset_code, \
            COALESCE(a.issuer, '') AS asset_issuer, \
            COALESCE(rw.stellar_address, '') AS destination \
     FROM payments p \
     JOIN assets a ON a.id = p.asset_id \
     JOIN receiver_wallets rw ON rw.id = p.receiver_wallet_id \
     WHERE p.status = $1 \
     ORDER BY p.updated_at, p.id \
     LIMIT $2 \
     FOR UPDATE OF p SKIP LOCKED";

const UPDATE_STATUSES_SQL: &str = "UPDATE payments AS p SET \
         status         = u.status, \
         status_message = u.message, \
         external_id    = COALESCE(u.external_id, p.external_id), \
         updated_at     = NOW() \
     FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[]) \
         AS u(id, status, message, external_id) \
     WHERE p.id = u.id";

/// Payment store over the tenant's own pool.
pub struct PgPaymentStore {
    router: Arc<TenantPoolRouter>,
}

impl PgPaymentStore {
    #[must_use]
    pub fn new(router: Arc<TenantPoolRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn claim_ready(
        &self,
        ctx: &JobContext,
        limit: usize,
    ) -> Result<Box<dyn PaymentClaim>, DispatchError> {
        let pool = self.router.get_for_context(ctx).await?;
        let mut tx = pool.begin().await.map_err(DbError::from)?;
        let rows = sqlx::query_as::<_, ReadyPaymentRow>(CLAIM_READY_SQL)
            .bind(PaymentStatus::Ready.as_str())
            .bind(sql_limit(limit))
            .fetch_all(&mut *tx)
            .await
            .map_err(DbError::from)?;

        Ok(Box::new(PgPaymentClaim {
            tx,
            payments: rows.into_iter().map(ReadyPayment::from).collect(),
        }))
    }
}

/// Row locks on the claimed payments, held by an open transaction.
/// Dropping the claim rolls the transaction back.
struct PgPaymentClaim {
    tx: Transaction<'static, Postgres>,
    payments: Vec<ReadyPayment>,
}

#[async_trait]
impl PaymentClaim for PgPaymentClaim {
    fn payments(&self) -> &[ReadyPayment] {
        &self.payments
    }

    async fn update_statuses(&mut self, updates: &[StatusUpdate]) -> Result<(), DispatchError> {
        if updates.is_empty() {
            return Ok(());
        }

        let mut ids: Vec<String> = Vec::with_capacity(updates.len());
        let mut statuses: Vec<String> = Vec::with_capacity(updates.len());
        let mut messages: Vec<Option<String>> = Vec::with_capacity(updates.len());
        let mut external_ids: Vec<Option<String>> = Vec::with_capacity(updates.len());
        for update in updates {
            ids.push(update.payment_id.clone());
            statuses.push(update.status.as_str().to_string());
            messages.push(update.message.clone());
            external_ids.push(update.external_id.clone());
        }

        sqlx::query(UPDATE_STATUSES_SQL)
            .bind(&ids)
            .bind(&statuses)
            .bind(&messages)
            .bind(&external_ids)
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DispatchError> {
        self.tx.commit().await.map_err(DbError::from)?;
        Ok(())
    }
}

/// Transaction-submission queue in the submitter database.
///
/// Re-enqueueing a payment that is already queued for the same tenant is a
/// no-op.
pub struct PgSubmissionQueue {
    pool: PgPool,
}

impl PgSubmissionQueue {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionQueue for PgSubmissionQueue {
    async fn enqueue(&self, batch: &[SubmissionRequest]) -> Result<(), DispatchError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tenant_ids: Vec<Uuid> = Vec::with_capacity(batch.len());
        let mut external_ids: Vec<String> = Vec::with_capacity(batch.len());
        let mut sources: Vec<String> = Vec::with_capacity(batch.len());
        let mut destinations: Vec<String> = Vec::with_capacity(batch.len());
        let mut codes: Vec<String> = Vec::with_capacity(batch.len());
        let mut issuers: Vec<String> = Vec::with_capacity(batch.len());
        let mut amounts: Vec<Decimal> = Vec::with_capacity(batch.len());
        for req in batch {
            tenant_ids.push(*req.tenant_id.as_uuid());
            external_ids.push(req.payment_id.clone());
            sources.push(req.source_account.clone());
            destinations.push(req.destination.clone());
            codes.push(req.asset_code.clone());
            issuers.push(req.asset_issuer.clone());
            amounts.push(req.amount);
        }

        // One statement, so the batch lands whole or not at all.
        sqlx::query(
            "INSERT INTO submitter_transactions \
                 (tenant_id, external_id, source_account, destination_address, \
                  asset_code, asset_issuer, amount) \
             SELECT * FROM UNNEST(\
                 $1::uuid[], $2::text[], $3::text[], $4::text[], \
                 $5::text[], $6::text[], $7::numeric[]) \
             ON CONFLICT (tenant_id, external_id) DO NOTHING",
        )
        .bind(&tenant_ids)
        .bind(&external_ids)
        .bind(&sources)
        .bind(&destinations)
        .bind(&codes)
        .bind(&issuers)
        .bind(&amounts)
        .execute(&self.pool)
        .await
        .map_err(|e| DispatchError::Enqueue {
            count: batch.len(),
            source: DbError::from(e),
        })?;
        Ok(())
    }
}
