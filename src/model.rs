use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout used by the `borrowed_books` table.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub book_id: String,
    pub title: String,
    pub author: String,
    pub genre: String,
    pub available_copies: u32,
    pub total_copies: u32,
}

impl Book {
    pub fn new(book_id: &str, title: &str, author: &str, genre: &str, total_copies: u32) -> Self {
        Book {
            book_id: book_id.to_owned(),
            title: title.to_owned(),
            author: author.to_owned(),
            genre: genre.to_owned(),
            available_copies: total_copies,
            total_copies,
        }
    }

    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub book_id: String,
    pub student_id: String,
    pub borrow_date: DateTime<Utc>,
    pub returned: bool,
    pub return_date: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn open(book_id: &str, student_id: &str, borrow_date: DateTime<Utc>) -> Self {
        Loan {
            book_id: book_id.to_owned(),
            student_id: student_id.to_owned(),
            borrow_date,
            returned: false,
            return_date: None,
        }
    }

    /// Whole days elapsed between borrowing and `at`.
    pub fn days_out(&self, at: DateTime<Utc>) -> i64 {
        (at - self.borrow_date).num_days()
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_new_book_starts_fully_available() {
        let book = Book::new("B001", "Python Programming", "John Doe", "Scientific", 3);
        assert_eq!(book.available_copies, 3);
        assert_eq!(book.total_copies, 3);
        assert!(book.is_available());
    }

    #[test]
    fn test_days_out_truncates_partial_days() {
        let borrowed = Utc.with_ymd_and_hms(2024, 10, 1, 12, 0, 0).unwrap();
        let loan = Loan::open("B001", "S001", borrowed);

        assert_eq!(loan.days_out(borrowed + Duration::hours(23)), 0);
        assert_eq!(loan.days_out(borrowed + Duration::days(7) + Duration::hours(23)), 7);
        assert_eq!(loan.days_out(borrowed + Duration::days(8)), 8);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(
            parse_timestamp("2024-10-15 00:00:00"),
            Some(Utc.with_ymd_and_hms(2024, 10, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("2024-10-15"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn test_format_timestamp_matches_table_layout() {
        let ts = Utc.with_ymd_and_hms(2024, 10, 15, 9, 5, 3).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-10-15 09:05:03");
    }
}
