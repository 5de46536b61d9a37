use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use super::change_set::{ChangeSet, RowWrite};
use super::outbox::{EventEnvelope, OutboxMessage};
use super::store::{
    AuditLog, LedgerStore, OrderFilter, OrderRepository, OutboxRepository, PaymentFilter,
    PaymentRepository, StoreError, StoreResult,
};
use crate::domain::annotation::Annotation;
use crate::domain::audit::{AuditEntry, EntityType};
use crate::domain::order::Order;
use crate::domain::payment::Payment;

// ============================================================================
// PostgreSQL Ledger Store
// ============================================================================
//
// One commit = one database transaction:
// 1. Insert/update orders (updates guarded by `version`)
// 2. Insert/update payments (same guard)
// 3. Append audit entries
// 4. Append outbox messages
//
// Any failure drops the transaction, which rolls everything back.
//
// ============================================================================

const ORDER_COLUMNS: &str = "id, code, order_type, reference_id, status, currency, subtotal, tax, total, \
     annotations, metadata, is_active, version, created_at, updated_at";

const PAYMENT_COLUMNS: &str = "id, order_id, date, status, payment_type, amount, description, payment_method, \
     voucher_number, original_payment_id, verified_by, verified_at, annotations, is_active, version, \
     created_at, updated_at";

pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections, "Connected to PostgreSQL ledger store");
        Ok(Self::new(pool))
    }

    /// Apply the embedded migrations in `migrations/`.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

fn parse_column<T>(row: &PgRow, column: &str) -> StoreResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(StoreError::Corrupt)
}

fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    Ok(Order {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        order_type: parse_column(row, "order_type")?,
        reference_id: row.try_get("reference_id")?,
        status: parse_column(row, "status")?,
        currency: row.try_get("currency")?,
        subtotal: row.try_get("subtotal")?,
        tax: row.try_get("tax")?,
        total: row.try_get("total")?,
        annotations: row.try_get::<Json<Vec<Annotation>>, _>("annotations")?.0,
        metadata: row.try_get::<Json<serde_json::Value>, _>("metadata")?.0,
        is_active: row.try_get("is_active")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> StoreResult<Payment> {
    let payment_method: Option<String> = row.try_get("payment_method")?;
    Ok(Payment {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        date: row.try_get("date")?,
        status: parse_column(row, "status")?,
        payment_type: parse_column(row, "payment_type")?,
        amount: row.try_get("amount")?,
        description: row.try_get("description")?,
        payment_method: payment_method
            .map(|m| m.parse())
            .transpose()
            .map_err(StoreError::Corrupt)?,
        voucher_number: row.try_get("voucher_number")?,
        original_payment_id: row.try_get("original_payment_id")?,
        verified_by: row.try_get("verified_by")?,
        verified_at: row.try_get("verified_at")?,
        annotations: row.try_get::<Json<Vec<Annotation>>, _>("annotations")?.0,
        is_active: row.try_get("is_active")?,
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn audit_from_row(row: &PgRow) -> StoreResult<AuditEntry> {
    Ok(AuditEntry {
        id: row.try_get("id")?,
        entity_id: row.try_get("entity_id")?,
        entity_type: parse_column(row, "entity_type")?,
        action: parse_column(row, "action")?,
        performed_by: row.try_get("performed_by")?,
        created_at: row.try_get("created_at")?,
    })
}

fn outbox_from_row(row: &PgRow) -> StoreResult<OutboxMessage> {
    Ok(OutboxMessage {
        envelope: row.try_get::<Json<EventEnvelope>, _>("payload")?.0,
        status: parse_column(row, "status")?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Translate constraint violations into the store's own error variants.
fn map_write_error(err: sqlx::Error, order: Option<&Order>, payment: Option<&Payment>) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            if let Some(order) = order {
                return StoreError::DuplicateCode(order.code.clone());
            }
        }
        if db.is_foreign_key_violation() {
            if let Some(payment) = payment {
                return StoreError::MissingOrder(payment.order_id);
            }
        }
    }
    StoreError::Database(err)
}

// ============================================================================
// Transactional Writes
// ============================================================================

async fn write_order(conn: &mut PgConnection, write: &RowWrite<Order>) -> StoreResult<()> {
    match write {
        RowWrite::Insert(order) => {
            sqlx::query(
                "INSERT INTO orders (id, code, order_type, reference_id, status, currency, subtotal, tax, total,
                                     annotations, metadata, is_active, version, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
            )
            .bind(order.id)
            .bind(&order.code)
            .bind(order.order_type.as_str())
            .bind(order.reference_id)
            .bind(order.status.as_str())
            .bind(&order.currency)
            .bind(order.subtotal)
            .bind(order.tax)
            .bind(order.total)
            .bind(Json(&order.annotations))
            .bind(Json(&order.metadata))
            .bind(order.is_active)
            .bind(order.version)
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_write_error(e, Some(order), None))?;
        }
        RowWrite::Update { row: order, expected_version } => {
            let result = sqlx::query(
                "UPDATE orders
                 SET reference_id = $3, status = $4, currency = $5, subtotal = $6, tax = $7, total = $8,
                     annotations = $9, metadata = $10, is_active = $11, version = $12, updated_at = $13
                 WHERE id = $1 AND version = $2",
            )
            .bind(order.id)
            .bind(*expected_version)
            .bind(order.reference_id)
            .bind(order.status.as_str())
            .bind(&order.currency)
            .bind(order.subtotal)
            .bind(order.tax)
            .bind(order.total)
            .bind(Json(&order.annotations))
            .bind(Json(&order.metadata))
            .bind(order.is_active)
            .bind(order.version)
            .bind(order.updated_at)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() != 1 {
                return Err(StoreError::Conflict {
                    entity: EntityType::Order,
                    id: order.id,
                });
            }
        }
    }
    Ok(())
}

async fn write_payment(conn: &mut PgConnection, write: &RowWrite<Payment>) -> StoreResult<()> {
    match write {
        RowWrite::Insert(payment) => {
            sqlx::query(
                "INSERT INTO payments (id, order_id, date, status, payment_type, amount, description, payment_method,
                                       voucher_number, original_payment_id, verified_by, verified_at, annotations,
                                       is_active, version, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            )
            .bind(payment.id)
            .bind(payment.order_id)
            .bind(payment.date)
            .bind(payment.status.as_str())
            .bind(payment.payment_type.as_str())
            .bind(payment.amount)
            .bind(&payment.description)
            .bind(payment.payment_method.map(|m| m.as_str()))
            .bind(&payment.voucher_number)
            .bind(payment.original_payment_id)
            .bind(payment.verified_by)
            .bind(payment.verified_at)
            .bind(Json(&payment.annotations))
            .bind(payment.is_active)
            .bind(payment.version)
            .bind(payment.created_at)
            .bind(payment.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_write_error(e, None, Some(payment)))?;
        }
        RowWrite::Update { row: payment, expected_version } => {
            let result = sqlx::query(
                "UPDATE payments
                 SET date = $3, status = $4, amount = $5, description = $6, payment_method = $7,
                     voucher_number = $8, verified_by = $9, verified_at = $10, annotations = $11,
                     is_active = $12, version = $13, updated_at = $14
                 WHERE id = $1 AND version = $2",
            )
            .bind(payment.id)
            .bind(*expected_version)
            .bind(payment.date)
            .bind(payment.status.as_str())
            .bind(payment.amount)
            .bind(&payment.description)
            .bind(payment.payment_method.map(|m| m.as_str()))
            .bind(&payment.voucher_number)
            .bind(payment.verified_by)
            .bind(payment.verified_at)
            .bind(Json(&payment.annotations))
            .bind(payment.is_active)
            .bind(payment.version)
            .bind(payment.updated_at)
            .execute(&mut *conn)
            .await?;

            if result.rows_affected() != 1 {
                return Err(StoreError::Conflict {
                    entity: EntityType::Payment,
                    id: payment.id,
                });
            }
        }
    }
    Ok(())
}

async fn write_audit(conn: &mut PgConnection, entry: &AuditEntry) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO audit_entries (id, entity_id, entity_type, action, performed_by, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(entry.id)
    .bind(entry.entity_id)
    .bind(entry.entity_type.as_str())
    .bind(entry.action.as_str())
    .bind(entry.performed_by)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn write_outbox(conn: &mut PgConnection, message: &OutboxMessage) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO outbox_messages (id, aggregate_id, channel, payload, status, attempts, last_error, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(message.id())
    .bind(message.envelope.aggregate_id)
    .bind(&message.envelope.channel)
    .bind(Json(&message.envelope))
    .bind(message.status.as_str())
    .bind(message.attempts)
    .bind(&message.last_error)
    .bind(message.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ============================================================================
// Repository Implementations
// ============================================================================

#[async_trait]
impl OrderRepository for PgLedgerStore {
    async fn load_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        let query = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn list_orders(&self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let query = format!(
            "SELECT {} FROM orders
             WHERE ($1::text IS NULL OR order_type = $1)
               AND ($2::text IS NULL OR status = $2)
               AND ($3 OR is_active)
             ORDER BY created_at DESC",
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(filter.order_type.map(|t| t.as_str()))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.include_inactive)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(order_from_row).collect()
    }
}

#[async_trait]
impl PaymentRepository for PgLedgerStore {
    async fn load_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        let query = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn payments_for_order(&self, order_id: Uuid) -> StoreResult<Vec<Payment>> {
        let query = format!(
            "SELECT {} FROM payments WHERE order_id = $1 ORDER BY created_at ASC",
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query(&query).bind(order_id).fetch_all(&self.pool).await?;
        rows.iter().map(payment_from_row).collect()
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> StoreResult<Vec<Payment>> {
        let query = format!(
            "SELECT {} FROM payments
             WHERE ($1::uuid IS NULL OR order_id = $1)
               AND ($2 OR is_active)
             ORDER BY created_at DESC",
            PAYMENT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(filter.order_id)
            .bind(filter.include_inactive)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(payment_from_row).collect()
    }
}

#[async_trait]
impl AuditLog for PgLedgerStore {
    async fn audit_trail(&self, entity_id: Uuid) -> StoreResult<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, entity_id, entity_type, action, performed_by, created_at
             FROM audit_entries
             WHERE entity_id = $1
             ORDER BY created_at ASC",
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(audit_from_row).collect()
    }
}

#[async_trait]
impl OutboxRepository for PgLedgerStore {
    async fn pending_outbox(&self, limit: usize) -> StoreResult<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            "SELECT payload, status, attempts, last_error, created_at
             FROM outbox_messages
             WHERE status = 'PENDING'
             ORDER BY created_at ASC
             LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(outbox_from_row).collect()
    }

    async fn mark_published(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE outbox_messages
             SET status = 'PUBLISHED', attempts = attempts + 1, last_error = NULL
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_delivery_failure(&self, id: Uuid, error: &str, dead_letter: bool) -> StoreResult<()> {
        sqlx::query(
            "UPDATE outbox_messages
             SET attempts = attempts + 1,
                 last_error = $2,
                 status = CASE WHEN $3 THEN 'DEAD_LETTERED' ELSE status END
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(dead_letter)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn commit(&self, changes: ChangeSet) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for write in &changes.orders {
            write_order(&mut tx, write).await?;
        }
        for write in &changes.payments {
            write_payment(&mut tx, write).await?;
        }
        for entry in &changes.audit {
            write_audit(&mut tx, entry).await?;
        }
        for message in &changes.outbox {
            write_outbox(&mut tx, message).await?;
        }

        tx.commit().await?;

        tracing::debug!(
            rows = changes.row_count(),
            audit_entries = changes.audit.len(),
            outbox_messages = changes.outbox.len(),
            "Committed ledger change set"
        );
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
