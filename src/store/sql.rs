use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database as LibsqlDatabase};
use tokio::sync::Mutex;

use super::LendingStore;
use crate::config::Config;
use crate::model::{Book, Loan, format_timestamp, parse_timestamp};

const IN_MEMORY: &str = ":memory:";

const SYSTEM_MIGRATIONS: &[(&str, &str)] =
    &[("system/000_migrations_table.sql", include_str!("migrations/system/000_migrations_table.sql"))];

const MIGRATIONS: &[(&str, &str)] = &[("001_schema.sql", include_str!("migrations/001_schema.sql"))];

const BOOK_COLUMNS: &str = "book_id, title, author, genre, available_copies, total_copies";
const LOAN_COLUMNS: &str = "book_id, student_id, borrow_date, returned, return_date";

pub struct Database {
    _db: LibsqlDatabase,
    conn: Connection,
    tx_lock: Mutex<()>,
}

impl Database {
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn is_migration_applied(conn: &Connection, name: &str) -> Result<bool> {
        let query = "SELECT 1 FROM _migrations WHERE name = ?";
        match conn.query(query, libsql::params![name]).await {
            Ok(mut rows) => Ok(rows.next().await?.is_some()),
            Err(e) => {
                if e.to_string().contains("no such table") {
                    Ok(false)
                } else {
                    Err(e.into())
                }
            }
        }
    }

    async fn record_migration(conn: &Connection, name: &str) -> Result<()> {
        let query = r#"
            INSERT INTO _migrations (name, applied_at)
            VALUES (?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        "#;
        conn.execute(query, libsql::params![name]).await?;
        Ok(())
    }

    async fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
        if Self::is_migration_applied(conn, name).await? {
            tracing::debug!("migration {} already applied, skipping", name);
            return Ok(());
        }

        tracing::info!("applying migration: {}", name);
        conn.execute_batch(sql)
            .await
            .map_err(|e| anyhow::anyhow!("failed to execute migration {name}: {e}"))?;

        Self::record_migration(conn, name).await?;
        Ok(())
    }

    /// Opens the database named by `app.database`. Relative paths resolve
    /// against `data_dir`; `:memory:` keeps the tables in process.
    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        let name = cfg.app.get_db();
        if name == IN_MEMORY {
            return Self::open(IN_MEMORY).await;
        }

        let path = data_dir.join(name);
        let path = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("database path {:?} is not valid utf-8", path))?;
        Self::open(path).await
    }

    pub async fn open(path: &str) -> Result<Self> {
        tracing::info!("[db] opening sql store at {}", path);
        let db = Builder::new_local(path).build().await?;

        let conn = db.connect()?;
        conn.query("SELECT 1", ()).await?;

        for (filename, sql) in SYSTEM_MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        for (filename, sql) in MIGRATIONS {
            Self::run_migration(&conn, filename, sql).await?;
        }

        Ok(Database {
            _db: db,
            conn,
            tx_lock: Mutex::new(()),
        })
    }

    /// Commits on success, rolls back on any error.
    async fn finish<T>(&self, result: Result<T>) -> Result<T> {
        let result = match result {
            Ok(value) => self.conn.execute("COMMIT", ()).await.map(|_| value).map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        if result.is_err() {
            let _ = self.conn.execute("ROLLBACK", ()).await;
        }
        result
    }

    async fn record_borrow_internal(&self, loan: &Loan) -> Result<()> {
        self.adjust_available(&loan.book_id, -1).await?;
        self.insert_loan(loan).await
    }

    async fn record_return_internal(
        &self,
        student_id: &str,
        book_id: &str,
        at: DateTime<Utc>,
        flag: bool,
    ) -> Result<Option<Loan>> {
        let Some(loan) = self.close_loan(student_id, book_id, at).await? else {
            return Ok(None);
        };

        self.adjust_available(book_id, 1).await?;
        if flag {
            self.flag_student(student_id).await?;
        }
        Ok(Some(loan))
    }

    async fn query_books(&self, query: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Book>> {
        let mut rows = self.conn.query(query, params).await?;
        let mut books = Vec::new();

        while let Some(row) = rows.next().await? {
            books.push(row_to_book(&row)?);
        }

        Ok(books)
    }

    async fn query_loans(&self, query: &str, params: impl libsql::params::IntoParams) -> Result<Vec<Loan>> {
        let mut rows = self.conn.query(query, params).await?;
        let mut loans = Vec::new();

        while let Some(row) = rows.next().await? {
            loans.push(row_to_loan(&row, 0)?);
        }

        Ok(loans)
    }
}

fn row_to_book(row: &libsql::Row) -> Result<Book> {
    let available: i64 = row.get(4)?;
    let total: i64 = row.get(5)?;

    Ok(Book {
        book_id: row.get(0)?,
        title: row.get(1)?,
        author: row.get(2)?,
        genre: row.get(3)?,
        available_copies: u32::try_from(available)?,
        total_copies: u32::try_from(total)?,
    })
}

/// Reads the loan columns starting at index `at`.
fn row_to_loan(row: &libsql::Row, at: i32) -> Result<Loan> {
    let borrow_date: String = row.get(at + 2)?;
    let borrow_date =
        parse_timestamp(&borrow_date).ok_or_else(|| anyhow::anyhow!("invalid borrow_date: {}", borrow_date))?;

    let return_date = match row.get::<Option<String>>(at + 4)? {
        Some(s) => Some(parse_timestamp(&s).ok_or_else(|| anyhow::anyhow!("invalid return_date: {}", s))?),
        None => None,
    };

    let returned: i64 = row.get(at + 3)?;

    Ok(Loan {
        book_id: row.get(at)?,
        student_id: row.get(at + 1)?,
        borrow_date,
        returned: returned != 0,
        return_date,
    })
}

impl LendingStore for Database {
    async fn insert_book(&self, book: &Book) -> Result<()> {
        let query = r#"
            INSERT INTO books (book_id, title, author, genre, available_copies, total_copies)
            VALUES (?, ?, ?, ?, ?, ?)
        "#;

        self.conn
            .execute(
                query,
                libsql::params![
                    book.book_id.as_str(),
                    book.title.as_str(),
                    book.author.as_str(),
                    book.genre.as_str(),
                    i64::from(book.available_copies),
                    i64::from(book.total_copies)
                ],
            )
            .await?;
        Ok(())
    }

    async fn books(&self) -> Result<Vec<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books ORDER BY rowid");
        self.query_books(&query, ()).await
    }

    async fn find_books(&self, book_id: &str) -> Result<Vec<Book>> {
        let query = format!("SELECT {BOOK_COLUMNS} FROM books WHERE book_id = ? ORDER BY rowid");
        self.query_books(&query, libsql::params![book_id]).await
    }

    async fn available_by_genre(&self, genre: &str) -> Result<Vec<Book>> {
        let query = format!(
            "SELECT {BOOK_COLUMNS} FROM books WHERE genre = ? AND available_copies > 0 ORDER BY rowid"
        );
        self.query_books(&query, libsql::params![genre]).await
    }

    async fn adjust_available(&self, book_id: &str, delta: i64) -> Result<()> {
        let query = r#"
            UPDATE books
            SET available_copies = MAX(0, MIN(total_copies, available_copies + ?))
            WHERE book_id = ?
        "#;
        self.conn.execute(query, libsql::params![delta, book_id]).await?;
        Ok(())
    }

    async fn insert_loan(&self, loan: &Loan) -> Result<()> {
        let query = r#"
            INSERT INTO borrowed_books (book_id, student_id, borrow_date, returned, return_date)
            VALUES (?, ?, ?, ?, ?)
        "#;

        self.conn
            .execute(
                query,
                libsql::params![
                    loan.book_id.as_str(),
                    loan.student_id.as_str(),
                    format_timestamp(&loan.borrow_date),
                    i64::from(loan.returned),
                    loan.return_date.as_ref().map(format_timestamp)
                ],
            )
            .await?;
        Ok(())
    }

    async fn open_loans(&self) -> Result<Vec<Loan>> {
        let query = format!("SELECT {LOAN_COLUMNS} FROM borrowed_books WHERE returned = 0 ORDER BY rowid");
        self.query_loans(&query, ()).await
    }

    async fn open_loans_for(&self, student_id: &str) -> Result<Vec<Loan>> {
        let query = format!(
            "SELECT {LOAN_COLUMNS} FROM borrowed_books WHERE student_id = ? AND returned = 0 ORDER BY rowid"
        );
        self.query_loans(&query, libsql::params![student_id]).await
    }

    async fn close_loan(&self, student_id: &str, book_id: &str, at: DateTime<Utc>) -> Result<Option<Loan>> {
        let query = format!(
            r#"
            SELECT rowid, {LOAN_COLUMNS} FROM borrowed_books
            WHERE student_id = ? AND book_id = ? AND returned = 0
            ORDER BY rowid
            LIMIT 1
            "#
        );

        let mut rows = self.conn.query(&query, libsql::params![student_id, book_id]).await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        let rowid: i64 = row.get(0)?;
        let mut loan = row_to_loan(&row, 1)?;

        self.conn
            .execute(
                "UPDATE borrowed_books SET returned = 1, return_date = ? WHERE rowid = ?",
                libsql::params![format_timestamp(&at), rowid],
            )
            .await?;

        loan.returned = true;
        loan.return_date = Some(at);
        Ok(Some(loan))
    }

    async fn is_flagged(&self, student_id: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM flagged_students WHERE student_id = ?", libsql::params![student_id])
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn flag_student(&self, student_id: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO flagged_students (student_id) VALUES (?)",
                libsql::params![student_id],
            )
            .await?;
        Ok(())
    }

    async fn unflag_student(&self, student_id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM flagged_students WHERE student_id = ?", libsql::params![student_id])
            .await?;
        Ok(affected > 0)
    }

    async fn flagged_students(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query("SELECT student_id FROM flagged_students ORDER BY student_id", ())
            .await?;
        let mut students = Vec::new();

        while let Some(row) = rows.next().await? {
            students.push(row.get::<String>(0)?);
        }

        Ok(students)
    }

    async fn record_borrow(&self, loan: &Loan) -> Result<()> {
        let _guard = self.tx_lock.lock().await;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        let result = self.record_borrow_internal(loan).await;
        self.finish(result).await
    }

    async fn record_return(
        &self,
        student_id: &str,
        book_id: &str,
        at: DateTime<Utc>,
        flag: bool,
    ) -> Result<Option<Loan>> {
        let _guard = self.tx_lock.lock().await;

        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        let result = self.record_return_internal(student_id, book_id, at, flag).await;
        self.finish(result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn memory_db() -> Database {
        Database::open(IN_MEMORY).await.unwrap()
    }

    #[tokio::test]
    async fn test_migrations_are_recorded_once() {
        let db = memory_db().await;
        for (name, sql) in MIGRATIONS {
            Database::run_migration(db.connection(), name, sql).await.unwrap();
        }

        let mut rows = db.connection().query("SELECT COUNT(*) FROM _migrations", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        assert_eq!(count as usize, SYSTEM_MIGRATIONS.len() + MIGRATIONS.len());
    }

    #[tokio::test]
    async fn test_duplicate_book_ids_are_kept() {
        let db = memory_db().await;
        let book = Book::new("B003", "JavaScript Essentials", "Jane Roe", "Web Development", 5);
        db.insert_book(&book).await.unwrap();
        db.insert_book(&book).await.unwrap();

        let books = db.books().await.unwrap();
        assert_eq!(books.len(), 2);
        assert_eq!(books[0], book);
    }

    #[tokio::test]
    async fn test_available_by_genre_skips_exhausted_books() {
        let db = memory_db().await;
        db.insert_book(&Book::new("B1", "Dune", "Herbert", "Scientific", 1)).await.unwrap();
        db.insert_book(&Book::new("B2", "Emma", "Austen", "Romantic", 1)).await.unwrap();
        db.insert_book(&Book::new("B3", "Cosmos", "Sagan", "Scientific", 2)).await.unwrap();
        db.adjust_available("B1", -1).await.unwrap();

        let ids: Vec<String> = db
            .available_by_genre("Scientific")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.book_id)
            .collect();
        assert_eq!(ids, vec!["B3"]);
    }

    #[tokio::test]
    async fn test_loan_timestamps_round_trip_through_table() {
        let db = memory_db().await;
        let borrowed = Utc.with_ymd_and_hms(2024, 10, 1, 8, 30, 0).unwrap();
        let returned = Utc.with_ymd_and_hms(2024, 10, 15, 0, 0, 0).unwrap();

        db.insert_loan(&Loan::open("B001", "S001", borrowed)).await.unwrap();
        assert_eq!(db.open_loans_for("S001").await.unwrap()[0].borrow_date, borrowed);

        let closed = db.close_loan("S001", "B001", returned).await.unwrap().unwrap();
        assert_eq!(closed.borrow_date, borrowed);
        assert_eq!(closed.return_date, Some(returned));

        let mut rows = db
            .connection()
            .query("SELECT returned, return_date FROM borrowed_books", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
        assert_eq!(row.get::<String>(1).unwrap(), "2024-10-15 00:00:00");
    }

    async fn fail_inserts_into(db: &Database, table: &str) {
        let trigger = format!(
            "CREATE TRIGGER fail_{table} BEFORE INSERT ON {table} BEGIN SELECT RAISE(ABORT, 'table unavailable'); END;"
        );
        db.connection().execute_batch(&trigger).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_borrow_rolls_back_stock() {
        let db = memory_db().await;
        let t0 = Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap();
        db.insert_book(&Book::new("B1", "Dune", "Herbert", "Scientific", 2)).await.unwrap();
        fail_inserts_into(&db, "borrowed_books").await;

        assert!(db.record_borrow(&Loan::open("B1", "S1", t0)).await.is_err());
        assert_eq!(db.find_books("B1").await.unwrap()[0].available_copies, 2);
        assert!(db.open_loans().await.unwrap().is_empty());

        // the connection is usable again after the rollback
        db.insert_book(&Book::new("B2", "Emma", "Austen", "Romantic", 1)).await.unwrap();
        assert_eq!(db.books().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_return_leaves_loan_open() {
        let db = memory_db().await;
        let t0 = Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap();
        db.insert_book(&Book::new("B1", "Dune", "Herbert", "Scientific", 2)).await.unwrap();
        db.record_borrow(&Loan::open("B1", "S1", t0)).await.unwrap();
        fail_inserts_into(&db, "flagged_students").await;

        assert!(db.record_return("S1", "B1", t0, true).await.is_err());
        assert_eq!(db.find_books("B1").await.unwrap()[0].available_copies, 1);
        assert_eq!(db.open_loans_for("S1").await.unwrap().len(), 1);
        assert!(!db.is_flagged("S1").await.unwrap());

        let loan = db.record_return("S1", "B1", t0, false).await.unwrap().unwrap();
        assert!(loan.returned);
        assert_eq!(db.find_books("B1").await.unwrap()[0].available_copies, 2);
    }

    #[tokio::test]
    async fn test_flagged_students_persist_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desk.db");
        let path = path.to_str().unwrap();

        {
            let db = Database::open(path).await.unwrap();
            db.flag_student("S001").await.unwrap();
        }

        let db = Database::open(path).await.unwrap();
        assert!(db.is_flagged("S001").await.unwrap());
        assert_eq!(db.flagged_students().await.unwrap(), vec!["S001"]);
    }
}
