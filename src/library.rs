//! Lending rules on top of a [`LendingStore`].
//!
//! The store only knows about rows; everything a librarian would call policy
//! (loan limit, one copy per title, late returns, flagging) lives here so the
//! in-memory and SQL backends behave the same.

use chrono::{DateTime, Timelike, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::Lending;
use crate::error::LendingError;
use crate::model::{Book, Loan};
use crate::store::LendingStore;

pub type LendingResult<T> = std::result::Result<T, LendingError>;

#[derive(Debug, Clone)]
pub struct NewBook {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub total_copies: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Borrowed {
    pub loan: Loan,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Returned {
    pub loan: Loan,
    pub title: String,
    pub days_out: i64,
    /// The return came too late and the student is now flagged.
    pub late: bool,
}

pub struct Library<S> {
    store: S,
    policy: Lending,
    // borrow/return are check-then-write sequences
    op_lock: Mutex<()>,
}

impl<S: LendingStore> Library<S> {
    pub fn new(store: S, policy: Lending) -> Self {
        Library {
            store,
            policy,
            op_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &Lending {
        &self.policy
    }

    pub fn genres(&self) -> &[String] {
        &self.policy.genres
    }

    pub async fn add_book(&self, input: NewBook) -> LendingResult<Book> {
        let book_id = input.book_id.trim();
        let title = input.title.trim();

        if book_id.is_empty() {
            return Err(LendingError::Validation("Book ID is required.".to_string()));
        }
        if title.is_empty() {
            return Err(LendingError::Validation("Title is required.".to_string()));
        }
        if input.total_copies == 0 {
            return Err(LendingError::Validation("Total copies must be at least 1.".to_string()));
        }

        let book = Book::new(book_id, title, input.author.trim(), input.genre.trim(), input.total_copies);
        self.store.insert_book(&book).await?;

        tracing::info!(book_id = %book.book_id, copies = book.total_copies, "book added");
        Ok(book)
    }

    pub async fn list_books(&self) -> LendingResult<Vec<Book>> {
        Ok(self.store.books().await?)
    }

    pub async fn list_available_by_genre(&self, genre: &str) -> LendingResult<Vec<Book>> {
        Ok(self.store.available_by_genre(genre).await?)
    }

    pub async fn borrow(&self, student_id: &str, book_id: &str, at: DateTime<Utc>) -> LendingResult<Borrowed> {
        let student_id = student_id.trim();
        let book_id = book_id.trim();
        if student_id.is_empty() {
            return Err(LendingError::Validation("Enter your name first.".to_string()));
        }

        let _guard = self.op_lock.lock().await;

        if self.store.is_flagged(student_id).await? {
            tracing::info!(student = %student_id, "borrow refused, student flagged");
            return Err(LendingError::StudentFlagged(student_id.to_string()));
        }

        let open = self.store.open_loans_for(student_id).await?;
        if open.len() >= self.policy.max_loans {
            tracing::info!(student = %student_id, open = open.len(), "borrow refused, limit reached");
            return Err(LendingError::LoanLimitReached(self.policy.max_loans));
        }
        if open.iter().any(|l| l.book_id == book_id) {
            return Err(LendingError::AlreadyBorrowed(book_id.to_string()));
        }

        // rows sharing an id count as one title; any row with a copy will do
        let rows = self.store.find_books(book_id).await?;
        let Some(first) = rows.first() else {
            return Err(LendingError::BookNotFound(book_id.to_string()));
        };
        let Some(book) = rows.iter().find(|b| b.is_available()) else {
            return Err(LendingError::NoCopiesAvailable(first.title.clone()));
        };

        let loan = Loan::open(book_id, student_id, whole_seconds(at));
        self.store.record_borrow(&loan).await?;

        tracing::info!(student = %student_id, book_id = %book_id, "book borrowed");
        Ok(Borrowed {
            loan,
            title: book.title.clone(),
        })
    }

    pub async fn return_book(&self, student_id: &str, book_id: &str, at: DateTime<Utc>) -> LendingResult<Returned> {
        let student_id = student_id.trim();
        let book_id = book_id.trim();
        let at = whole_seconds(at);
        let _guard = self.op_lock.lock().await;

        let days_out = self
            .store
            .open_loans_for(student_id)
            .await?
            .iter()
            .find(|l| l.book_id == book_id)
            .ok_or_else(|| LendingError::NoOpenLoan(book_id.to_string()))?
            .days_out(at);
        let late = days_out > self.policy.late_after_days;

        let loan = self
            .store
            .record_return(student_id, book_id, at, late)
            .await?
            .ok_or_else(|| LendingError::NoOpenLoan(book_id.to_string()))?;

        let title = self
            .store
            .find_books(book_id)
            .await?
            .into_iter()
            .next()
            .map(|b| b.title)
            .unwrap_or_else(|| book_id.to_string());

        if late {
            tracing::warn!(student = %student_id, book_id = %book_id, days_out, "late return, student flagged");
        } else {
            tracing::info!(student = %student_id, book_id = %book_id, days_out, "book returned");
        }

        Ok(Returned {
            loan,
            title,
            days_out,
            late,
        })
    }

    pub async fn open_loans(&self) -> LendingResult<Vec<Loan>> {
        Ok(self.store.open_loans().await?)
    }

    pub async fn open_loans_for(&self, student_id: &str) -> LendingResult<Vec<Loan>> {
        Ok(self.store.open_loans_for(student_id.trim()).await?)
    }

    pub async fn is_flagged(&self, student_id: &str) -> LendingResult<bool> {
        Ok(self.store.is_flagged(student_id.trim()).await?)
    }

    pub async fn flagged_students(&self) -> LendingResult<Vec<String>> {
        Ok(self.store.flagged_students().await?)
    }

    /// Removes a flag. Only allowed when `lending.allow_flag_clearing` is set;
    /// otherwise flags are permanent. Returns false if the student was not
    /// flagged.
    pub async fn clear_flag(&self, student_id: &str) -> LendingResult<bool> {
        if !self.policy.allow_flag_clearing {
            return Err(LendingError::FlagClearingDisabled);
        }

        let cleared = self.store.unflag_student(student_id.trim()).await?;
        if cleared {
            tracing::info!(student = %student_id, "flag cleared");
        }
        Ok(cleared)
    }
}

fn whole_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_nanosecond(0).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 10, 1, 9, 0, 0).unwrap()
    }

    fn new_book(id: &str, genre: &str, copies: u32) -> NewBook {
        NewBook {
            book_id: id.to_string(),
            title: format!("Title {id}"),
            author: "Someone".to_string(),
            genre: genre.to_string(),
            total_copies: copies,
        }
    }

    async fn library_with_books(ids: &[&str]) -> Library<MemoryStore> {
        let lib = Library::new(MemoryStore::new(), Lending::default());
        for id in ids {
            lib.add_book(new_book(id, "Scientific", 2)).await.unwrap();
        }
        lib
    }

    #[tokio::test]
    async fn test_add_book_sets_available_to_total() {
        let lib = Library::new(MemoryStore::new(), Lending::default());
        let book = lib.add_book(new_book("B001", "Scientific", 3)).await.unwrap();
        assert_eq!(book.available_copies, 3);
        assert_eq!(book.total_copies, 3);
    }

    #[tokio::test]
    async fn test_add_book_rejects_missing_fields() {
        let lib = Library::new(MemoryStore::new(), Lending::default());
        let err = lib.add_book(new_book("  ", "Comedy", 3)).await.unwrap_err();
        assert!(matches!(err, LendingError::Validation(_)));

        let err = lib.add_book(new_book("B1", "Comedy", 0)).await.unwrap_err();
        assert!(matches!(err, LendingError::Validation(_)));
        assert!(lib.list_books().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_borrow_then_late_return() {
        let lib = library_with_books(&["B1"]).await;

        let borrowed = lib.borrow("S1", "B1", t0()).await.unwrap();
        assert!(!borrowed.loan.returned);
        assert_eq!(borrowed.loan.borrow_date, t0());
        assert_eq!(lib.list_books().await.unwrap()[0].available_copies, 1);

        let returned = lib.return_book("S1", "B1", t0() + Duration::days(10)).await.unwrap();
        assert!(returned.late);
        assert_eq!(returned.days_out, 10);
        assert!(returned.loan.returned);
        assert_eq!(lib.list_books().await.unwrap()[0].available_copies, 2);
        assert_eq!(lib.flagged_students().await.unwrap(), vec!["S1"]);
    }

    #[tokio::test]
    async fn test_seven_days_is_not_late() {
        let lib = library_with_books(&["B1"]).await;
        lib.borrow("S1", "B1", t0()).await.unwrap();

        let returned = lib
            .return_book("S1", "B1", t0() + Duration::days(7) + Duration::hours(23))
            .await
            .unwrap();
        assert!(!returned.late);
        assert!(!lib.is_flagged("S1").await.unwrap());
    }

    #[tokio::test]
    async fn test_loan_limit() {
        let lib = library_with_books(&["B1", "B2", "B3", "B4"]).await;
        for id in ["B1", "B2", "B3"] {
            lib.borrow("S1", id, t0()).await.unwrap();
        }

        let err = lib.borrow("S1", "B4", t0()).await.unwrap_err();
        assert!(matches!(err, LendingError::LoanLimitReached(3)));
        assert_eq!(lib.open_loans_for("S1").await.unwrap().len(), 3);

        lib.return_book("S1", "B2", t0() + Duration::days(1)).await.unwrap();
        lib.borrow("S1", "B4", t0() + Duration::days(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_book_twice_is_refused() {
        let lib = library_with_books(&["B1"]).await;
        lib.borrow("S1", "B1", t0()).await.unwrap();

        let err = lib.borrow("S1", "B1", t0()).await.unwrap_err();
        assert!(matches!(err, LendingError::AlreadyBorrowed(_)));
        assert_eq!(lib.list_books().await.unwrap()[0].available_copies, 1);

        // another student can still take the second copy
        lib.borrow("S2", "B1", t0()).await.unwrap();
        let err = lib.borrow("S3", "B1", t0()).await.unwrap_err();
        assert!(matches!(err, LendingError::NoCopiesAvailable(_)));
    }

    #[tokio::test]
    async fn test_flagged_student_cannot_borrow_but_can_return() {
        let lib = library_with_books(&["B1", "B2"]).await;
        lib.borrow("S1", "B1", t0()).await.unwrap();
        lib.borrow("S1", "B2", t0()).await.unwrap();
        lib.return_book("S1", "B1", t0() + Duration::days(9)).await.unwrap();

        let err = lib.borrow("S1", "B1", t0() + Duration::days(9)).await.unwrap_err();
        assert!(matches!(err, LendingError::StudentFlagged(_)));

        lib.return_book("S1", "B2", t0() + Duration::days(9)).await.unwrap();
        assert!(lib.open_loans().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_return_without_loan() {
        let lib = library_with_books(&["B1"]).await;
        let err = lib.return_book("S1", "B1", t0()).await.unwrap_err();
        assert!(matches!(err, LendingError::NoOpenLoan(_)));
        assert_eq!(lib.list_books().await.unwrap()[0].available_copies, 2);
    }

    #[tokio::test]
    async fn test_unknown_book() {
        let lib = library_with_books(&[]).await;
        let err = lib.borrow("S1", "nope", t0()).await.unwrap_err();
        assert!(matches!(err, LendingError::BookNotFound(_)));
    }

    #[tokio::test]
    async fn test_flags_are_permanent_by_default() {
        let lib = library_with_books(&["B1"]).await;
        lib.borrow("S1", "B1", t0()).await.unwrap();
        lib.return_book("S1", "B1", t0() + Duration::days(30)).await.unwrap();

        let err = lib.clear_flag("S1").await.unwrap_err();
        assert!(matches!(err, LendingError::FlagClearingDisabled));
        assert!(lib.is_flagged("S1").await.unwrap());
    }

    #[tokio::test]
    async fn test_flags_can_be_cleared_when_allowed() {
        let policy = Lending {
            allow_flag_clearing: true,
            ..Lending::default()
        };
        let lib = Library::new(MemoryStore::new(), policy);
        lib.add_book(new_book("B1", "Comedy", 1)).await.unwrap();
        lib.borrow("S1", "B1", t0()).await.unwrap();
        lib.return_book("S1", "B1", t0() + Duration::days(8)).await.unwrap();

        assert!(lib.clear_flag("S1").await.unwrap());
        assert!(!lib.clear_flag("S1").await.unwrap());
        lib.borrow("S1", "B1", t0() + Duration::days(8)).await.unwrap();
    }

    #[tokio::test]
    async fn test_ids_are_trimmed() {
        let lib = library_with_books(&["B1"]).await;
        let borrowed = lib.borrow(" S1 ", " B1 ", t0()).await.unwrap();
        assert_eq!(borrowed.loan.book_id, "B1");
        assert_eq!(borrowed.loan.student_id, "S1");

        let returned = lib.return_book("S1", "B1\t", t0()).await.unwrap();
        assert!(returned.loan.returned);
    }

    #[tokio::test]
    async fn test_available_by_genre() {
        let lib = Library::new(MemoryStore::new(), Lending::default());
        lib.add_book(new_book("B1", "Comedy", 1)).await.unwrap();
        lib.add_book(new_book("B2", "Romantic", 1)).await.unwrap();
        lib.add_book(new_book("B3", "Comedy", 1)).await.unwrap();
        lib.borrow("S1", "B3", t0()).await.unwrap();

        let comedy = lib.list_available_by_genre("Comedy").await.unwrap();
        assert_eq!(comedy.len(), 1);
        assert_eq!(comedy[0].book_id, "B1");
        assert!(lib.list_available_by_genre("Scientific").await.unwrap().is_empty());
    }
}
