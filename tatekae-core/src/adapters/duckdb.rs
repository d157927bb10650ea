//! DuckDB ledger store implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Beneficiary, ExpenseRecord, ExpenseUpdate, Project, User};
use crate::ports::LedgerStore;
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const EXPENSE_COLUMNS: &str = "expense_id, payer_id, beneficiaries, amount::VARCHAR, memo,
     expense_date::VARCHAR, settled, COALESCE(pending, FALSE), created_at, updated_at";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB-backed ledger store; one file holds every project
pub struct DuckDbLedgerStore {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbLedgerStore {
    /// Open (or create) a ledger database file
    ///
    /// Retries with exponential backoff on file locking errors, which occur
    /// when another process holds the database.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            delay_ms = delay.as_millis() as u64,
                            "database busy, retrying: {}",
                            err_msg
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// Open a throwaway in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    // === Project operations ===

    pub fn insert_project(&self, project: &Project) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_projects (project_id, name, created_at) VALUES (?, ?, ?)",
            params![
                project.id.to_string(),
                project.name,
                project.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn get_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT project_id, name, created_at FROM sys_projects ORDER BY created_at",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, name, created_at)| {
                Ok(Project {
                    id: parse_uuid(&id)?,
                    name,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    pub fn get_project_by_id(&self, project_id: Uuid) -> Result<Option<Project>> {
        Ok(self
            .get_projects()?
            .into_iter()
            .find(|p| p.id == project_id))
    }

    // === User operations ===

    pub fn insert_user(&self, project_id: Uuid, user: &User) -> Result<()> {
        let conn = self.conn()?;
        require_project(&conn, project_id)?;
        conn.execute(
            "INSERT INTO sys_users (user_id, project_id, name, created_at) VALUES (?, ?, ?, ?)",
            params![
                user.id.to_string(),
                project_id.to_string(),
                user.name,
                user.created_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn get_users(&self, project_id: Uuid) -> Result<Vec<User>> {
        let conn = self.conn()?;
        require_project(&conn, project_id)?;
        let mut stmt = conn.prepare(
            "SELECT user_id, name, created_at FROM sys_users
             WHERE project_id = ?
             ORDER BY position",
        )?;
        let rows = stmt
            .query_map([project_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, name, created_at)| {
                Ok(User {
                    id: parse_uuid(&id)?,
                    name,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    pub fn remove_user(&self, project_id: Uuid, user_id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sys_users WHERE project_id = ? AND user_id = ?",
            params![project_id.to_string(), user_id.to_string()],
        )?;
        if deleted == 0 {
            return Err(Error::not_found(format!("User {}", user_id)));
        }
        Ok(())
    }

    // === Expense operations ===

    pub fn get_expenses(&self, project_id: Uuid) -> Result<Vec<ExpenseRecord>> {
        let conn = self.conn()?;
        require_project(&conn, project_id)?;
        let sql = format!(
            "SELECT {} FROM sys_expenses WHERE project_id = ? ORDER BY expense_date, created_at",
            EXPENSE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([project_id.to_string()], ExpenseRow::from_row)?
            .collect::<duckdb::Result<Vec<_>>>()?;

        rows.into_iter().map(ExpenseRow::into_record).collect()
    }

    pub fn get_expense_by_id(
        &self,
        project_id: Uuid,
        expense_id: Uuid,
    ) -> Result<Option<ExpenseRecord>> {
        let conn = self.conn()?;
        require_project(&conn, project_id)?;
        fetch_expense(&conn, project_id, expense_id)
    }

    pub fn insert_expense(&self, project_id: Uuid, expense: &ExpenseRecord) -> Result<()> {
        let conn = self.conn()?;
        require_project(&conn, project_id)?;
        expense.validate()?;
        let beneficiaries = serde_json::to_string(&expense.beneficiaries)?;
        conn.execute(
            "INSERT INTO sys_expenses (expense_id, project_id, payer_id, beneficiaries, amount,
                                       memo, expense_date, settled, pending, created_at, updated_at)
             VALUES (?, ?, ?, ?, CAST(? AS DECIMAL(38, 10)), ?, ?, ?, ?, ?, ?)",
            params![
                expense.id.to_string(),
                project_id.to_string(),
                expense.payer_id.to_string(),
                beneficiaries,
                expense.amount.to_string(),
                expense.memo,
                expense.date.to_string(),
                expense.settled,
                expense.pending,
                expense.created_at.to_rfc3339(),
                expense.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Read-modify-write under a single lock so the partial update and the
    /// validation see the same row
    pub fn modify_expense(
        &self,
        project_id: Uuid,
        expense_id: Uuid,
        update: &ExpenseUpdate,
    ) -> Result<ExpenseRecord> {
        let conn = self.conn()?;
        let mut record = fetch_expense(&conn, project_id, expense_id)?
            .ok_or_else(|| Error::not_found(format!("Expense {}", expense_id)))?;
        update.apply_to(&mut record)?;

        let beneficiaries = serde_json::to_string(&record.beneficiaries)?;
        conn.execute(
            "UPDATE sys_expenses
             SET payer_id = ?, beneficiaries = ?, amount = CAST(? AS DECIMAL(38, 10)),
                 memo = ?, expense_date = ?, settled = ?, pending = ?, updated_at = ?
             WHERE project_id = ? AND expense_id = ?",
            params![
                record.payer_id.to_string(),
                beneficiaries,
                record.amount.to_string(),
                record.memo,
                record.date.to_string(),
                record.settled,
                record.pending,
                record.updated_at.to_rfc3339(),
                project_id.to_string(),
                expense_id.to_string(),
            ],
        )?;
        Ok(record)
    }

    pub fn remove_expense(&self, project_id: Uuid, expense_id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sys_expenses WHERE project_id = ? AND expense_id = ?",
            params![project_id.to_string(), expense_id.to_string()],
        )?;
        if deleted == 0 {
            return Err(Error::not_found(format!("Expense {}", expense_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for DuckDbLedgerStore {
    async fn create_project(&self, project: &Project) -> Result<Uuid> {
        self.insert_project(project)?;
        Ok(project.id)
    }

    async fn get_project(&self, project_id: Uuid) -> Result<Option<Project>> {
        self.get_project_by_id(project_id)
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.get_projects()
    }

    async fn create_user(&self, project_id: Uuid, user: &User) -> Result<Uuid> {
        self.insert_user(project_id, user)?;
        Ok(user.id)
    }

    async fn list_users(&self, project_id: Uuid) -> Result<Vec<User>> {
        self.get_users(project_id)
    }

    async fn delete_user(&self, project_id: Uuid, user_id: Uuid) -> Result<()> {
        self.remove_user(project_id, user_id)
    }

    async fn list_expenses(&self, project_id: Uuid) -> Result<Vec<ExpenseRecord>> {
        self.get_expenses(project_id)
    }

    async fn get_expense(
        &self,
        project_id: Uuid,
        expense_id: Uuid,
    ) -> Result<Option<ExpenseRecord>> {
        self.get_expense_by_id(project_id, expense_id)
    }

    async fn create_expense(&self, project_id: Uuid, expense: &ExpenseRecord) -> Result<Uuid> {
        self.insert_expense(project_id, expense)?;
        Ok(expense.id)
    }

    async fn update_expense(
        &self,
        project_id: Uuid,
        expense_id: Uuid,
        update: &ExpenseUpdate,
    ) -> Result<ExpenseRecord> {
        self.modify_expense(project_id, expense_id, update)
    }

    async fn delete_expense(&self, project_id: Uuid, expense_id: Uuid) -> Result<()> {
        self.remove_expense(project_id, expense_id)
    }
}

/// Raw column values of one sys_expenses row
struct ExpenseRow {
    id: String,
    payer_id: String,
    beneficiaries: String,
    amount: String,
    memo: Option<String>,
    date: String,
    settled: bool,
    pending: bool,
    created_at: String,
    updated_at: String,
}

impl ExpenseRow {
    fn from_row(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            payer_id: row.get(1)?,
            beneficiaries: row.get(2)?,
            amount: row.get(3)?,
            memo: row.get(4)?,
            date: row.get(5)?,
            settled: row.get(6)?,
            pending: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_record(self) -> Result<ExpenseRecord> {
        let beneficiaries: Vec<Beneficiary> = serde_json::from_str(&self.beneficiaries)?;
        Ok(ExpenseRecord {
            id: parse_uuid(&self.id)?,
            payer_id: parse_uuid(&self.payer_id)?,
            beneficiaries,
            amount: parse_decimal(&self.amount)?,
            memo: self.memo,
            date: parse_date(&self.date)?,
            settled: self.settled,
            pending: self.pending,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Project-scoped operations on an unknown project fail with NotFound
fn require_project(conn: &Connection, project_id: Uuid) -> Result<()> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sys_projects WHERE project_id = ?",
        [project_id.to_string()],
        |row| row.get(0),
    )?;
    if count == 0 {
        return Err(Error::not_found(format!("Project {}", project_id)));
    }
    Ok(())
}

fn fetch_expense(
    conn: &Connection,
    project_id: Uuid,
    expense_id: Uuid,
) -> Result<Option<ExpenseRecord>> {
    let sql = format!(
        "SELECT {} FROM sys_expenses WHERE project_id = ? AND expense_id = ?",
        EXPENSE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt
        .query_map(
            params![project_id.to_string(), expense_id.to_string()],
            ExpenseRow::from_row,
        )?
        .collect::<duckdb::Result<Vec<_>>>()?;

    rows.pop().map(ExpenseRow::into_record).transpose()
}

// Helper functions

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::database(format!("Invalid id '{}': {}", s, e)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("Invalid timestamp '{}': {}", s, e)))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::database(format!("Invalid date '{}': {}", s, e)))
}

/// DECIMAL columns come back as e.g. "3000.0000000000"
fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str_exact(s)
        .map(|d| d.normalize())
        .map_err(|e| Error::database(format!("Invalid amount '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DuckDbLedgerStore {
        let store = DuckDbLedgerStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store
    }

    #[test]
    fn test_parse_decimal_normalizes_scale() {
        let amount = parse_decimal("3000.0000000000").unwrap();
        assert_eq!(amount, Decimal::new(3000, 0));
        assert_eq!(amount.to_string(), "3000");
    }

    #[test]
    fn test_parse_helpers_reject_garbage() {
        assert!(parse_uuid("not-a-uuid").is_err());
        assert!(parse_date("03/01/2026").is_err());
        assert!(parse_timestamp("yesterday").is_err());
        assert!(parse_decimal("lots").is_err());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(is_retryable_error("IO Error: database is locked"));
        assert!(is_retryable_error("The process cannot access the file"));
        assert!(!is_retryable_error("Catalog Error: table does not exist"));
    }

    #[test]
    fn test_expense_round_trip_keeps_exact_amount() {
        let store = store();
        let project = Project::new("Trip");
        store.insert_project(&project).unwrap();

        let payer = User::new("Tanaka");
        let expense = ExpenseRecord::new(
            payer.id,
            vec![Beneficiary::new(Uuid::new_v4(), "Sato")],
            Decimal::new(123456, 2),
            NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(),
        )
        .with_memo("Lunch");
        store.insert_expense(project.id, &expense).unwrap();

        let loaded = store
            .get_expense_by_id(project.id, expense.id)
            .unwrap()
            .unwrap();
        assert_eq!(loaded.amount, Decimal::new(123456, 2));
        assert_eq!(loaded.beneficiaries, expense.beneficiaries);
        assert_eq!(loaded.memo.as_deref(), Some("Lunch"));
        assert_eq!(loaded.date, expense.date);
        assert!(!loaded.settled);
        assert!(!loaded.pending);
    }

    #[test]
    fn test_pending_flag_round_trips() {
        let store = store();
        let project = Project::new("Trip");
        store.insert_project(&project).unwrap();

        let record = ExpenseRecord::settlement(
            Uuid::new_v4(),
            Beneficiary::new(Uuid::new_v4(), "Sato"),
            Decimal::new(1500, 0),
            "bulk settlement",
        );
        store.insert_expense(project.id, &record).unwrap();

        let loaded = store.get_expense_by_id(project.id, record.id).unwrap().unwrap();
        assert!(loaded.settled && loaded.pending);
        assert_eq!(loaded.updated_at, record.updated_at);

        let closed = store
            .modify_expense(project.id, record.id, &ExpenseUpdate::closed())
            .unwrap();
        assert!(!closed.pending);
        let loaded = store.get_expense_by_id(project.id, record.id).unwrap().unwrap();
        assert!(loaded.settled && !loaded.pending);
    }

    #[test]
    fn test_unknown_project_is_not_found() {
        let store = store();
        let unknown = Uuid::new_v4();

        assert!(matches!(store.get_users(unknown), Err(Error::NotFound(_))));
        assert!(matches!(store.get_expenses(unknown), Err(Error::NotFound(_))));
        assert!(matches!(
            store.insert_user(unknown, &User::new("Sato")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_users_keep_creation_order() {
        let store = store();
        let project = Project::new("Trip");
        store.insert_project(&project).unwrap();

        for name in ["Tanaka", "Sato", "Suzuki"] {
            store.insert_user(project.id, &User::new(name)).unwrap();
        }

        let names: Vec<String> = store
            .get_users(project.id)
            .unwrap()
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["Tanaka", "Sato", "Suzuki"]);
    }

    #[test]
    fn test_missing_rows_are_not_found() {
        let store = store();
        let project = Project::new("Trip");
        store.insert_project(&project).unwrap();

        assert!(matches!(
            store.remove_expense(project.id, Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.remove_user(project.id, Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            store.modify_expense(project.id, Uuid::new_v4(), &ExpenseUpdate::settled(true)),
            Err(Error::NotFound(_))
        ));
    }
}
