//! PostgreSQL-backed store for cashflow-service.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::metrics::DB_QUERY_DURATION;
use super::store::{
    ChargeStore, LedgerFilter, LedgerStore, PayableStore, Store, StoreError, UnitOfWork,
};
use crate::models::{
    Cadence, Charge, ChargeOwner, ChargeStatus, Direction, EntryStatus, LedgerEntry, LineItem,
    Money, Payable, PayableStatus, PaymentMethod,
};

macro_rules! charge_columns {
    () => {
        "charge_id, client_id, occasional_client_id, subtotal_minor, discount_minor, total_minor, \
         due_date, status, paid_on, payment_method, cancel_reason, metadata, line_items, \
         created_utc, updated_utc"
    };
}

macro_rules! entry_columns {
    () => {
        "entry_id, direction, amount_minor, description, status, effective_date, charge_id, \
         schedule_id, payable_id, category, metadata, created_utc, updated_utc"
    };
}

macro_rules! payable_columns {
    () => {
        "payable_id, description, amount_minor, category, due_date, cadence, status, paid_on, \
         active, series_id, sequence, created_utc, updated_utc"
    };
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "cashflow-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl Store for Database {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork {
            tx,
            read_only: false,
        }))
    }

    async fn begin_snapshot(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgUnitOfWork {
            tx,
            read_only: true,
        }))
    }
}

/// One PostgreSQL transaction. Dropping it without commit rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    read_only: bool,
}

fn money(minor: i64) -> Result<Money, StoreError> {
    Money::from_minor(minor).map_err(|e| StoreError::InvalidRecord(e.to_string()))
}

fn write_error(operation: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(format!("{}: {}", operation, db_err))
        }
        other => StoreError::Database(other),
    }
}

// -------------------------------------------------------------------------
// Row Mapping
// -------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct ChargeRow {
    charge_id: Uuid,
    client_id: Option<Uuid>,
    occasional_client_id: Option<Uuid>,
    subtotal_minor: i64,
    discount_minor: i64,
    total_minor: i64,
    due_date: NaiveDate,
    status: String,
    paid_on: Option<NaiveDate>,
    payment_method: Option<String>,
    cancel_reason: Option<String>,
    metadata: Option<serde_json::Value>,
    line_items: serde_json::Value,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<ChargeRow> for Charge {
    type Error = StoreError;

    fn try_from(row: ChargeRow) -> Result<Self, Self::Error> {
        let owner = ChargeOwner::from_columns(row.client_id, row.occasional_client_id)
            .ok_or_else(|| {
                StoreError::InvalidRecord(format!("charge {} must have exactly one owner", row.charge_id))
            })?;

        let status = match (row.status.as_str(), row.paid_on, row.payment_method.as_deref()) {
            ("pending", _, _) => ChargeStatus::Pending,
            ("overdue", _, _) => ChargeStatus::Overdue,
            ("paid", Some(paid_on), Some(method)) => ChargeStatus::Paid {
                paid_on,
                method: PaymentMethod::from_str(method).ok_or_else(|| {
                    StoreError::InvalidRecord(format!("unknown payment method '{}'", method))
                })?,
            },
            ("canceled", _, _) => ChargeStatus::Canceled {
                reason: row.cancel_reason.unwrap_or_default(),
            },
            (other, _, _) => {
                return Err(StoreError::InvalidRecord(format!(
                    "charge {} has invalid status '{}'",
                    row.charge_id, other
                )))
            }
        };

        let line_items: Vec<LineItem> = serde_json::from_value(row.line_items)
            .map_err(|e| StoreError::InvalidRecord(format!("line items: {}", e)))?;

        Ok(Charge {
            charge_id: row.charge_id,
            owner,
            subtotal: money(row.subtotal_minor)?,
            discount: money(row.discount_minor)?,
            total: money(row.total_minor)?,
            due_date: row.due_date,
            status,
            metadata: row.metadata,
            line_items,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct EntryRow {
    entry_id: Uuid,
    direction: String,
    amount_minor: i64,
    description: String,
    status: String,
    effective_date: NaiveDate,
    charge_id: Option<Uuid>,
    schedule_id: Option<Uuid>,
    payable_id: Option<Uuid>,
    category: Option<String>,
    metadata: Option<serde_json::Value>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<EntryRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            entry_id: row.entry_id,
            direction: Direction::from_str(&row.direction).ok_or_else(|| {
                StoreError::InvalidRecord(format!("unknown direction '{}'", row.direction))
            })?,
            amount: money(row.amount_minor)?,
            description: row.description,
            status: EntryStatus::from_str(&row.status).ok_or_else(|| {
                StoreError::InvalidRecord(format!("unknown entry status '{}'", row.status))
            })?,
            effective_date: row.effective_date,
            charge_id: row.charge_id,
            schedule_id: row.schedule_id,
            payable_id: row.payable_id,
            category: row.category,
            metadata: row.metadata,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

#[derive(Debug, FromRow)]
struct PayableRow {
    payable_id: Uuid,
    description: String,
    amount_minor: i64,
    category: String,
    due_date: NaiveDate,
    cadence: String,
    status: String,
    paid_on: Option<NaiveDate>,
    active: bool,
    series_id: Option<Uuid>,
    sequence: i32,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl TryFrom<PayableRow> for Payable {
    type Error = StoreError;

    fn try_from(row: PayableRow) -> Result<Self, Self::Error> {
        let status = match (row.status.as_str(), row.paid_on) {
            ("pending", _) => PayableStatus::Pending,
            ("overdue", _) => PayableStatus::Overdue,
            ("paid", Some(paid_on)) => PayableStatus::Paid { paid_on },
            (other, _) => {
                return Err(StoreError::InvalidRecord(format!(
                    "payable {} has invalid status '{}'",
                    row.payable_id, other
                )))
            }
        };

        Ok(Payable {
            payable_id: row.payable_id,
            description: row.description,
            amount: money(row.amount_minor)?,
            category: row.category,
            due_date: row.due_date,
            cadence: Cadence::from_str(&row.cadence).ok_or_else(|| {
                StoreError::InvalidRecord(format!("unknown cadence '{}'", row.cadence))
            })?,
            status,
            active: row.active,
            series_id: row.series_id,
            sequence: u32::try_from(row.sequence)
                .map_err(|_| StoreError::InvalidRecord(format!("negative sequence {}", row.sequence)))?,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        })
    }
}

fn cancel_reason(status: &ChargeStatus) -> Option<&str> {
    match status {
        ChargeStatus::Canceled { reason } => Some(reason.as_str()),
        _ => None,
    }
}

fn line_items_json(charge: &Charge) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(&charge.line_items)
        .map_err(|e| StoreError::InvalidRecord(format!("line items: {}", e)))
}

// -------------------------------------------------------------------------
// Charge Operations
// -------------------------------------------------------------------------

#[async_trait]
impl ChargeStore for PgUnitOfWork {
    #[instrument(skip(self, charge), fields(charge_id = %charge.charge_id))]
    async fn create_charge(&mut self, charge: &Charge) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_charge"])
            .start_timer();

        sqlx::query(concat!(
            "INSERT INTO charges (",
            charge_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(charge.charge_id)
        .bind(charge.owner.client_id())
        .bind(charge.owner.occasional_client_id())
        .bind(charge.subtotal.minor())
        .bind(charge.discount.minor())
        .bind(charge.total.minor())
        .bind(charge.due_date)
        .bind(charge.status.as_str())
        .bind(charge.payment_date())
        .bind(charge.payment_method().map(|m| m.as_str()))
        .bind(cancel_reason(&charge.status))
        .bind(&charge.metadata)
        .bind(line_items_json(charge)?)
        .bind(charge.created_utc)
        .bind(charge.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error("create_charge"))?;

        timer.observe_duration();
        debug!(status = charge.status.as_str(), "Charge created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_charge(&mut self, charge_id: Uuid) -> Result<Option<Charge>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_charge"])
            .start_timer();

        let query = if self.read_only {
            concat!("SELECT ", charge_columns!(), " FROM charges WHERE charge_id = $1")
        } else {
            concat!(
                "SELECT ",
                charge_columns!(),
                " FROM charges WHERE charge_id = $1 FOR UPDATE"
            )
        };

        let row = sqlx::query_as::<_, ChargeRow>(query)
            .bind(charge_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        timer.observe_duration();
        row.map(Charge::try_from).transpose()
    }

    #[instrument(skip(self, charge), fields(charge_id = %charge.charge_id))]
    async fn update_charge(&mut self, charge: &Charge) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_charge"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE charges
            SET subtotal_minor = $2, discount_minor = $3, total_minor = $4, due_date = $5,
                status = $6, paid_on = $7, payment_method = $8, cancel_reason = $9,
                metadata = $10, line_items = $11, updated_utc = $12
            WHERE charge_id = $1
            "#,
        )
        .bind(charge.charge_id)
        .bind(charge.subtotal.minor())
        .bind(charge.discount.minor())
        .bind(charge.total.minor())
        .bind(charge.due_date)
        .bind(charge.status.as_str())
        .bind(charge.payment_date())
        .bind(charge.payment_method().map(|m| m.as_str()))
        .bind(cancel_reason(&charge.status))
        .bind(&charge.metadata)
        .bind(line_items_json(charge)?)
        .bind(charge.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error("update_charge"))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(charge.charge_id));
        }
        Ok(())
    }
}

// -------------------------------------------------------------------------
// Ledger Operations
// -------------------------------------------------------------------------

#[async_trait]
impl LedgerStore for PgUnitOfWork {
    #[instrument(skip(self, entry), fields(entry_id = %entry.entry_id))]
    async fn create_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_entry"])
            .start_timer();

        sqlx::query(concat!(
            "INSERT INTO ledger_entries (",
            entry_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(entry.entry_id)
        .bind(entry.direction.as_str())
        .bind(entry.amount.minor())
        .bind(&entry.description)
        .bind(entry.status.as_str())
        .bind(entry.effective_date)
        .bind(entry.charge_id)
        .bind(entry.schedule_id)
        .bind(entry.payable_id)
        .bind(&entry.category)
        .bind(&entry.metadata)
        .bind(entry.created_utc)
        .bind(entry.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error("create_entry"))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_entry(&mut self, entry_id: Uuid) -> Result<Option<LedgerEntry>, StoreError> {
        let row = sqlx::query_as::<_, EntryRow>(concat!(
            "SELECT ",
            entry_columns!(),
            " FROM ledger_entries WHERE entry_id = $1"
        ))
        .bind(entry_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(LedgerEntry::try_from).transpose()
    }

    #[instrument(skip(self))]
    async fn find_for_charge(
        &mut self,
        charge_id: Uuid,
        status: EntryStatus,
        direction: Direction,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_for_charge"])
            .start_timer();

        let rows = sqlx::query_as::<_, EntryRow>(concat!(
            "SELECT ",
            entry_columns!(),
            " FROM ledger_entries WHERE charge_id = $1 AND status = $2 AND direction = $3 ORDER BY seq"
        ))
        .bind(charge_id)
        .bind(status.as_str())
        .bind(direction.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        timer.observe_duration();
        rows.into_iter().map(LedgerEntry::try_from).collect()
    }

    #[instrument(skip(self, entry), fields(entry_id = %entry.entry_id))]
    async fn update_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_entry"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE ledger_entries
            SET amount_minor = $2, description = $3, status = $4, effective_date = $5,
                category = $6, metadata = $7, updated_utc = $8
            WHERE entry_id = $1
            "#,
        )
        .bind(entry.entry_id)
        .bind(entry.amount.minor())
        .bind(&entry.description)
        .bind(entry.status.as_str())
        .bind(entry.effective_date)
        .bind(&entry.category)
        .bind(&entry.metadata)
        .bind(entry.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error("update_entry"))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(entry.entry_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn sum_entries(&mut self, filter: &LedgerFilter) -> Result<Money, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["sum_entries"])
            .start_timer();

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount_minor), 0)::BIGINT
            FROM ledger_entries
            WHERE ($1::varchar IS NULL OR direction = $1)
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::date IS NULL OR effective_date >= $3)
              AND ($4::date IS NULL OR effective_date <= $4)
            "#,
        )
        .bind(filter.direction.map(|d| d.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&mut *self.tx)
        .await?;

        timer.observe_duration();
        money(total)
    }
}

// -------------------------------------------------------------------------
// Payable Operations
// -------------------------------------------------------------------------

#[async_trait]
impl PayableStore for PgUnitOfWork {
    #[instrument(skip(self, payable), fields(payable_id = %payable.payable_id))]
    async fn create_payable(&mut self, payable: &Payable) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payable"])
            .start_timer();

        sqlx::query(concat!(
            "INSERT INTO payables (",
            payable_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(payable.payable_id)
        .bind(&payable.description)
        .bind(payable.amount.minor())
        .bind(&payable.category)
        .bind(payable.due_date)
        .bind(payable.cadence.as_str())
        .bind(payable.status.as_str())
        .bind(payable.payment_date())
        .bind(payable.active)
        .bind(payable.series_id)
        .bind(payable.sequence as i32)
        .bind(payable.created_utc)
        .bind(payable.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error("create_payable"))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_payable(&mut self, payable_id: Uuid) -> Result<Option<Payable>, StoreError> {
        let query = if self.read_only {
            concat!("SELECT ", payable_columns!(), " FROM payables WHERE payable_id = $1")
        } else {
            concat!(
                "SELECT ",
                payable_columns!(),
                " FROM payables WHERE payable_id = $1 FOR UPDATE"
            )
        };

        let row = sqlx::query_as::<_, PayableRow>(query)
            .bind(payable_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(Payable::try_from).transpose()
    }

    #[instrument(skip(self, payable), fields(payable_id = %payable.payable_id))]
    async fn update_payable(&mut self, payable: &Payable) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_payable"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE payables
            SET description = $2, amount_minor = $3, category = $4, due_date = $5,
                status = $6, paid_on = $7, active = $8, updated_utc = $9
            WHERE payable_id = $1
            "#,
        )
        .bind(payable.payable_id)
        .bind(&payable.description)
        .bind(payable.amount.minor())
        .bind(&payable.category)
        .bind(payable.due_date)
        .bind(payable.status.as_str())
        .bind(payable.payment_date())
        .bind(payable.active)
        .bind(payable.updated_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(write_error("update_payable"))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(payable.payable_id));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_overdue_candidates(&mut self, today: NaiveDate) -> Result<Vec<Payable>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_overdue_candidates"])
            .start_timer();

        let query = if self.read_only {
            concat!(
                "SELECT ",
                payable_columns!(),
                " FROM payables WHERE active AND status = 'pending' AND due_date < $1 ORDER BY due_date"
            )
        } else {
            concat!(
                "SELECT ",
                payable_columns!(),
                " FROM payables WHERE active AND status = 'pending' AND due_date < $1 ORDER BY due_date FOR UPDATE SKIP LOCKED"
            )
        };

        let rows = sqlx::query_as::<_, PayableRow>(query)
            .bind(today)
            .fetch_all(&mut *self.tx)
            .await?;

        timer.observe_duration();
        rows.into_iter().map(Payable::try_from).collect()
    }

    #[instrument(skip(self))]
    async fn find_by_date_range(
        &mut self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Payable>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_by_date_range"])
            .start_timer();

        let rows = sqlx::query_as::<_, PayableRow>(concat!(
            "SELECT ",
            payable_columns!(),
            " FROM payables WHERE active AND due_date BETWEEN $1 AND $2 ORDER BY due_date, sequence"
        ))
        .bind(from)
        .bind(to)
        .fetch_all(&mut *self.tx)
        .await?;

        timer.observe_duration();
        rows.into_iter().map(Payable::try_from).collect()
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
