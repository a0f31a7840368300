//! SQLite-backed purchase store.
//!
//! The store is the only shared mutable resource of the service. Every write that has to be
//! atomic (idempotent checkout upsert, access counters) runs inside a single `IMMEDIATE`
//! transaction or a single `UPDATE` statement, so concurrent webhook redeliveries serialise on
//! the database write lock instead of racing in process.

use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::model::{CompletedCheckout, NewPurchase, Purchase};
use crate::schema::purchases;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
type SqlitePooledConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// What a checkout-completed event did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutOutcome {
    /// First purchase for this email.
    Created(Purchase),
    /// Existing buyer paid again; token rotated and access re-enabled.
    Renewed(Purchase),
    /// The provider session was already processed; nothing changed.
    Duplicate(Purchase),
}

impl CheckoutOutcome {
    pub fn purchase(&self) -> &Purchase {
        match self {
            CheckoutOutcome::Created(p)
            | CheckoutOutcome::Renewed(p)
            | CheckoutOutcome::Duplicate(p) => p,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, CheckoutOutcome::Duplicate(_))
    }
}

#[derive(Debug)]
struct SqlitePragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA busy_timeout = 5000; PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

#[derive(Clone)]
pub struct PurchaseStore {
    pool: SqlitePool,
}

impl PurchaseStore {
    /// Build the connection pool. Called once at process start.
    pub fn connect(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(max_connections.max(1))
            .connection_timeout(Duration::from_secs(10))
            .connection_customizer(Box::new(SqlitePragmas))
            .build(manager)
            .map_err(|e| AppError::Database(format!("failed to build pool: {e}")))?;
        Ok(Self { pool })
    }

    pub fn run_migrations(&self) -> AppResult<()> {
        let mut pooled = self.conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| AppError::Database(format!("migration error: {e}")))?;
        info!(count = applied.len(), "database migrations completed");
        Ok(())
    }

    fn conn(&self) -> AppResult<SqlitePooledConnection> {
        Ok(self.pool.get()?)
    }

    pub fn find_by_token(&self, token: &str) -> AppResult<Option<Purchase>> {
        let mut conn = self.conn()?;
        let purchase = purchases::table
            .filter(purchases::access_token.eq(token))
            .select(Purchase::as_select())
            .first(&mut *conn)
            .optional()?;
        Ok(purchase)
    }

    /// `email` must already be normalized.
    pub fn find_by_email(&self, email: &str) -> AppResult<Option<Purchase>> {
        let mut conn = self.conn()?;
        find_by_email(&mut conn, email)
    }

    pub fn find_by_session_id(&self, session_id: &str) -> AppResult<Option<Purchase>> {
        let mut conn = self.conn()?;
        find_by_session_id(&mut conn, session_id)
    }

    /// Applies a confirmed payment.
    ///
    /// The duplicate-session check and the upsert keyed on email share one `IMMEDIATE`
    /// transaction: two deliveries of the same session can never both see "not processed",
    /// and a failure leaves nothing half written.
    pub fn record_checkout(
        &self,
        checkout: &CompletedCheckout,
        new_token: &str,
    ) -> AppResult<CheckoutOutcome> {
        let mut conn = self.conn()?;
        conn.immediate_transaction::<_, AppError, _>(|conn| {
            if let Some(existing) = find_by_session_id(conn, &checkout.stripe_session_id)? {
                return Ok(CheckoutOutcome::Duplicate(existing));
            }

            match find_by_email(conn, &checkout.email)? {
                Some(existing) => {
                    diesel::update(purchases::table.find(&existing.id))
                        .set((
                            purchases::access_token.eq(new_token),
                            purchases::stripe_session_id.eq(&checkout.stripe_session_id),
                            purchases::stripe_customer_id.eq(checkout.stripe_customer_id.as_deref()),
                            purchases::is_active.eq(true),
                            purchases::updated_at.eq(chrono::Utc::now().naive_utc()),
                        ))
                        .execute(conn)?;
                    let renewed = load(conn, &existing.id)?;
                    Ok(CheckoutOutcome::Renewed(renewed))
                }
                None => {
                    let new_purchase = NewPurchase::new(
                        &checkout.email,
                        new_token,
                        &checkout.stripe_session_id,
                        checkout.stripe_customer_id.as_deref(),
                    );
                    diesel::insert_into(purchases::table)
                        .values(&new_purchase)
                        .execute(conn)?;
                    let created = load(conn, &new_purchase.id)?;
                    Ok(CheckoutOutcome::Created(created))
                }
            }
        })
    }

    /// Bumps `access_count` by one and stamps `last_access_at`, in a single statement.
    pub fn record_access(&self, purchase_id: &str) -> AppResult<Purchase> {
        let mut conn = self.conn()?;
        conn.immediate_transaction::<_, AppError, _>(|conn| {
            diesel::update(purchases::table.find(purchase_id))
                .set((
                    purchases::access_count.eq(purchases::access_count + 1),
                    purchases::last_access_at.eq(Some(chrono::Utc::now().naive_utc())),
                ))
                .execute(conn)?;
            load(conn, purchase_id)
        })
    }

    /// Administrative revocation or re-enable. Returns `false` when no purchase matches.
    pub fn set_active(&self, email: &str, active: bool) -> AppResult<bool> {
        let mut conn = self.conn()?;
        let updated = diesel::update(purchases::table.filter(purchases::email.eq(email)))
            .set((
                purchases::is_active.eq(active),
                purchases::updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .execute(&mut *conn)?;
        Ok(updated > 0)
    }
}

fn load(conn: &mut SqliteConnection, purchase_id: &str) -> AppResult<Purchase> {
    Ok(purchases::table
        .find(purchase_id)
        .select(Purchase::as_select())
        .first(conn)?)
}

fn find_by_email(conn: &mut SqliteConnection, email: &str) -> AppResult<Option<Purchase>> {
    Ok(purchases::table
        .filter(purchases::email.eq(email))
        .select(Purchase::as_select())
        .first(conn)
        .optional()?)
}

fn find_by_session_id(conn: &mut SqliteConnection, session_id: &str) -> AppResult<Option<Purchase>> {
    Ok(purchases::table
        .filter(purchases::stripe_session_id.eq(session_id))
        .select(Purchase::as_select())
        .first(conn)
        .optional()?)
}
