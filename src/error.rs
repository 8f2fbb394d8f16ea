use thiserror::Error;

/// Everything a catalog or loan operation can refuse with.
///
/// All variants except `Store` are rule violations that the UI shows as an
/// inline warning.
#[derive(Debug, Error)]
pub enum LendingError {
    #[error("You are flagged and cannot borrow books until your fine is cleared.")]
    StudentFlagged(String),

    #[error("You have already borrowed the maximum number of books ({0}).")]
    LoanLimitReached(usize),

    #[error("You already borrowed a copy of this book.")]
    AlreadyBorrowed(String),

    #[error("Book {0} not found.")]
    BookNotFound(String),

    #[error("No copies of {0} are currently available.")]
    NoCopiesAvailable(String),

    #[error("You have no borrowed copy of {0} to return.")]
    NoOpenLoan(String),

    #[error("Flags are permanent and cannot be cleared.")]
    FlagClearingDisabled,

    #[error("{0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl LendingError {
    /// True for the variants that are user-facing warnings rather than failures.
    pub fn is_warning(&self) -> bool {
        !matches!(self, LendingError::Store(_))
    }
}

pub fn unpack_error(err: &(dyn std::error::Error)) -> String {
    let mut parts = Vec::new();
    parts.push(err.to_string());
    let mut current = err.source();
    while let Some(source) = current {
        parts.push(source.to_string());
        current = source.source();
    }
    parts.join(": ")
}
