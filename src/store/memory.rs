use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::LendingStore;
use crate::model::{Book, Loan};

#[derive(Debug, Default)]
struct Tables {
    books: Vec<Book>,
    borrowed_books: Vec<Loan>,
    flagged_students: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn clamp_available(book: &Book, delta: i64) -> u32 {
    let next = i64::from(book.available_copies) + delta;
    next.clamp(0, i64::from(book.total_copies)) as u32
}

impl Tables {
    fn adjust_available(&mut self, book_id: &str, delta: i64) {
        for book in self.books.iter_mut().filter(|b| b.book_id == book_id) {
            book.available_copies = clamp_available(book, delta);
        }
    }

    fn close_loan(&mut self, student_id: &str, book_id: &str, at: DateTime<Utc>) -> Option<Loan> {
        let loan = self
            .borrowed_books
            .iter_mut()
            .find(|l| !l.returned && l.student_id == student_id && l.book_id == book_id)?;
        loan.returned = true;
        loan.return_date = Some(at);
        Some(loan.clone())
    }
}

impl LendingStore for MemoryStore {
    async fn insert_book(&self, book: &Book) -> Result<()> {
        self.tables.lock().await.books.push(book.clone());
        Ok(())
    }

    async fn books(&self) -> Result<Vec<Book>> {
        Ok(self.tables.lock().await.books.clone())
    }

    async fn find_books(&self, book_id: &str) -> Result<Vec<Book>> {
        let tables = self.tables.lock().await;
        Ok(tables.books.iter().filter(|b| b.book_id == book_id).cloned().collect())
    }

    async fn available_by_genre(&self, genre: &str) -> Result<Vec<Book>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .books
            .iter()
            .filter(|b| b.genre == genre && b.is_available())
            .cloned()
            .collect())
    }

    async fn adjust_available(&self, book_id: &str, delta: i64) -> Result<()> {
        self.tables.lock().await.adjust_available(book_id, delta);
        Ok(())
    }

    async fn insert_loan(&self, loan: &Loan) -> Result<()> {
        self.tables.lock().await.borrowed_books.push(loan.clone());
        Ok(())
    }

    async fn open_loans(&self) -> Result<Vec<Loan>> {
        let tables = self.tables.lock().await;
        Ok(tables.borrowed_books.iter().filter(|l| !l.returned).cloned().collect())
    }

    async fn open_loans_for(&self, student_id: &str) -> Result<Vec<Loan>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .borrowed_books
            .iter()
            .filter(|l| !l.returned && l.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn close_loan(&self, student_id: &str, book_id: &str, at: DateTime<Utc>) -> Result<Option<Loan>> {
        Ok(self.tables.lock().await.close_loan(student_id, book_id, at))
    }

    async fn is_flagged(&self, student_id: &str) -> Result<bool> {
        Ok(self.tables.lock().await.flagged_students.contains(student_id))
    }

    async fn flag_student(&self, student_id: &str) -> Result<()> {
        self.tables.lock().await.flagged_students.insert(student_id.to_owned());
        Ok(())
    }

    async fn unflag_student(&self, student_id: &str) -> Result<bool> {
        Ok(self.tables.lock().await.flagged_students.remove(student_id))
    }

    async fn flagged_students(&self) -> Result<Vec<String>> {
        Ok(self.tables.lock().await.flagged_students.iter().cloned().collect())
    }

    async fn record_borrow(&self, loan: &Loan) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.adjust_available(&loan.book_id, -1);
        tables.borrowed_books.push(loan.clone());
        Ok(())
    }

    async fn record_return(
        &self,
        student_id: &str,
        book_id: &str,
        at: DateTime<Utc>,
        flag: bool,
    ) -> Result<Option<Loan>> {
        let mut tables = self.tables.lock().await;
        let Some(loan) = tables.close_loan(student_id, book_id, at) else {
            return Ok(None);
        };

        tables.adjust_available(book_id, 1);
        if flag {
            tables.flagged_students.insert(student_id.to_owned());
        }
        Ok(Some(loan))
    }
}
