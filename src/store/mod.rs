//! Data-access layer for the catalog, the loan ledger and the flagged set.
//!
//! [`LendingStore`] is the table-level interface the lending rules are written
//! against. It has two backends:
//!
//! - [`MemoryStore`]: plain in-process tables, lost on restart
//! - [`Database`]: libsql/SQLite tables with migrations
//!
//! [`Store`] picks one of them from the `app.backend` config key.

mod memory;
mod sql;

use std::future::Future;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::{Backend, Config};
use crate::model::{Book, Loan};

pub use memory::MemoryStore;
pub use sql::Database;

pub trait LendingStore: Send + Sync {
    fn insert_book(&self, book: &Book) -> impl Future<Output = Result<()>> + Send;

    /// Every catalog row in insertion order.
    fn books(&self) -> impl Future<Output = Result<Vec<Book>>> + Send;

    /// Every catalog row carrying `book_id`, in insertion order.
    fn find_books(&self, book_id: &str) -> impl Future<Output = Result<Vec<Book>>> + Send;

    fn available_by_genre(&self, genre: &str) -> impl Future<Output = Result<Vec<Book>>> + Send;

    /// Moves the available count of every row with `book_id` by `delta`,
    /// clamped to `0..=total_copies`.
    fn adjust_available(&self, book_id: &str, delta: i64) -> impl Future<Output = Result<()>> + Send;

    fn insert_loan(&self, loan: &Loan) -> impl Future<Output = Result<()>> + Send;

    fn open_loans(&self) -> impl Future<Output = Result<Vec<Loan>>> + Send;

    fn open_loans_for(&self, student_id: &str) -> impl Future<Output = Result<Vec<Loan>>> + Send;

    /// Marks the open loan of `book_id` held by `student_id` as returned at
    /// `at` and hands back the updated row. `None` when there is no open loan.
    fn close_loan(
        &self,
        student_id: &str,
        book_id: &str,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<Loan>>> + Send;

    fn is_flagged(&self, student_id: &str) -> impl Future<Output = Result<bool>> + Send;

    fn flag_student(&self, student_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Returns false when the student was not flagged.
    fn unflag_student(&self, student_id: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Flagged students, sorted.
    fn flagged_students(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Takes one copy of `loan.book_id` off the shelf and records the loan.
    /// Both writes land or neither does.
    fn record_borrow(&self, loan: &Loan) -> impl Future<Output = Result<()>> + Send;

    /// Closes the open loan, puts the copy back and, when `flag` is set, flags
    /// the student. All or nothing; `None` when there is no open loan.
    fn record_return(
        &self,
        student_id: &str,
        book_id: &str,
        at: DateTime<Utc>,
        flag: bool,
    ) -> impl Future<Output = Result<Option<Loan>>> + Send;
}

pub enum Store {
    Memory(MemoryStore),
    Sql(Database),
}

impl Store {
    pub async fn new(cfg: &Config, data_dir: &Path) -> Result<Self> {
        match cfg.app.backend {
            Backend::Memory => {
                tracing::info!("[store] using in-memory tables");
                Ok(Store::Memory(MemoryStore::new()))
            }
            Backend::Sql => Ok(Store::Sql(Database::new(cfg, data_dir).await?)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sql(_) => "sql",
        }
    }
}

impl LendingStore for Store {
    async fn insert_book(&self, book: &Book) -> Result<()> {
        match self {
            Store::Memory(s) => s.insert_book(book).await,
            Store::Sql(s) => s.insert_book(book).await,
        }
    }

    async fn books(&self) -> Result<Vec<Book>> {
        match self {
            Store::Memory(s) => s.books().await,
            Store::Sql(s) => s.books().await,
        }
    }

    async fn find_books(&self, book_id: &str) -> Result<Vec<Book>> {
        match self {
            Store::Memory(s) => s.find_books(book_id).await,
            Store::Sql(s) => s.find_books(book_id).await,
        }
    }

    async fn available_by_genre(&self, genre: &str) -> Result<Vec<Book>> {
        match self {
            Store::Memory(s) => s.available_by_genre(genre).await,
            Store::Sql(s) => s.available_by_genre(genre).await,
        }
    }

    async fn adjust_available(&self, book_id: &str, delta: i64) -> Result<()> {
        match self {
            Store::Memory(s) => s.adjust_available(book_id, delta).await,
            Store::Sql(s) => s.adjust_available(book_id, delta).await,
        }
    }

    async fn insert_loan(&self, loan: &Loan) -> Result<()> {
        match self {
            Store::Memory(s) => s.insert_loan(loan).await,
            Store::Sql(s) => s.insert_loan(loan).await,
        }
    }

    async fn open_loans(&self) -> Result<Vec<Loan>> {
        match self {
            Store::Memory(s) => s.open_loans().await,
            Store::Sql(s) => s.open_loans().await,
        }
    }

    async fn open_loans_for(&self, student_id: &str) -> Result<Vec<Loan>> {
        match self {
            Store::Memory(s) => s.open_loans_for(student_id).await,
            Store::Sql(s) => s.open_loans_for(student_id).await,
        }
    }

    async fn close_loan(&self, student_id: &str, book_id: &str, at: DateTime<Utc>) -> Result<Option<Loan>> {
        match self {
            Store::Memory(s) => s.close_loan(student_id, book_id, at).await,
            Store::Sql(s) => s.close_loan(student_id, book_id, at).await,
        }
    }

    async fn is_flagged(&self, student_id: &str) -> Result<bool> {
        match self {
            Store::Memory(s) => s.is_flagged(student_id).await,
            Store::Sql(s) => s.is_flagged(student_id).await,
        }
    }

    async fn flag_student(&self, student_id: &str) -> Result<()> {
        match self {
            Store::Memory(s) => s.flag_student(student_id).await,
            Store::Sql(s) => s.flag_student(student_id).await,
        }
    }

    async fn unflag_student(&self, student_id: &str) -> Result<bool> {
        match self {
            Store::Memory(s) => s.unflag_student(student_id).await,
            Store::Sql(s) => s.unflag_student(student_id).await,
        }
    }

    async fn flagged_students(&self) -> Result<Vec<String>> {
        match self {
            Store::Memory(s) => s.flagged_students().await,
            Store::Sql(s) => s.flagged_students().await,
        }
    }

    async fn record_borrow(&self, loan: &Loan) -> Result<()> {
        match self {
            Store::Memory(s) => s.record_borrow(loan).await,
            Store::Sql(s) => s.record_borrow(loan).await,
        }
    }

    async fn record_return(
        &self,
        student_id: &str,
        book_id: &str,
        at: DateTime<Utc>,
        flag: bool,
    ) -> Result<Option<Loan>> {
        match self {
            Store::Memory(s) => s.record_return(student_id, book_id, at, flag).await,
            Store::Sql(s) => s.record_return(student_id, book_id, at, flag).await,
        }
    }
}
