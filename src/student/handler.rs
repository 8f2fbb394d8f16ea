use axum::{
    Form,
    extract::{Query, State},
    response::Html,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::LendingError;
use crate::handler::{AppState, notice_for};
use crate::library::LendingResult;
use crate::page::{self, Notice, Role};

#[derive(Debug, Deserialize)]
pub struct StudentQuery {
    #[serde(default)]
    pub name: String,
    pub genre: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoanForm {
    pub name: String,
    pub book_id: String,
    pub genre: Option<String>,
}

fn render(title: &str, name: &str, notice: Option<Notice>, body: &str) -> Html<String> {
    page::layout(title, Some(Role::Student), Some(name), notice, body)
}

fn warning(msg: &str) -> String {
    Notice::Warning(msg.to_string()).render()
}

fn name_form(action: &str, name: &str) -> String {
    format!(
        r#"
        <form action="{action}" method="get">
            <label>Enter Your Name <input type="text" name="name" value="{name}"></label>
            <input type="submit" value="Continue">
        </form>
        "#,
        name = page::escape(name),
    )
}

pub async fn home(State(state): State<AppState>, Query(q): Query<StudentQuery>) -> Html<String> {
    let title = "Student - Library Management System";
    let name = q.name.trim();
    let mut body = name_form("/student", name);

    if !name.is_empty() {
        match state.library.is_flagged(name).await {
            Ok(true) => body.push_str(&warning(&LendingError::StudentFlagged(name.to_string()).to_string())),
            Ok(false) => body.push_str("<p>Choose an option from the menu.</p>"),
            Err(e) => return render(title, name, Some(notice_for(&e, "look up student")), &body),
        }
    }

    render(title, name, None, &body)
}

/// The checks that hide the borrow form entirely.
async fn may_borrow(state: &AppState, name: &str) -> LendingResult<()> {
    let lib = &state.library;
    if lib.is_flagged(name).await? {
        return Err(LendingError::StudentFlagged(name.to_string()));
    }
    if lib.open_loans_for(name).await?.len() >= lib.policy().max_loans {
        return Err(LendingError::LoanLimitReached(lib.policy().max_loans));
    }
    Ok(())
}

async fn borrow_screen(state: &AppState, name: &str, genre: Option<&str>, notice: Option<Notice>) -> Html<String> {
    let title = "Borrow Book";
    let lib = &state.library;
    let mut body = name_form("/student/borrow", name);

    if name.is_empty() {
        return render(title, name, notice, &body);
    }

    if let Err(e) = may_borrow(state, name).await {
        if e.is_warning() {
            body.push_str(&warning(&e.to_string()));
            return render(title, name, notice, &body);
        }
        return render(title, name, Some(notice_for(&e, "load borrow screen")), &body);
    }

    let genres = lib.genres();
    let genre = genre
        .filter(|g| !g.is_empty())
        .or_else(|| genres.first().map(String::as_str))
        .unwrap_or_default();

    body.push_str(&format!(
        r#"
        <form action="/student/borrow" method="get">
            {hidden_name}
            <label>Choose Genre {genres}</label>
            <input type="submit" value="Show Books">
        </form>
        "#,
        hidden_name = page::hidden("name", name),
        genres = page::select("genre", genres, Some(genre)),
    ));

    let available = match lib.list_available_by_genre(genre).await {
        Ok(books) => books,
        Err(e) => return render(title, name, Some(notice_for(&e, "list available books")), &body),
    };

    if available.is_empty() {
        body.push_str(&warning("No books available in this genre."));
        return render(title, name, notice, &body);
    }

    let ids: Vec<String> = available.iter().map(|b| b.book_id.clone()).collect();
    body.push_str(&format!(
        r#"
        <form action="/student/borrow" method="post">
            {hidden_name}{hidden_genre}
            <label>Select Book {books}</label>
            <input type="submit" value="Borrow Book">
        </form>
        {table}
        "#,
        hidden_name = page::hidden("name", name),
        hidden_genre = page::hidden("genre", genre),
        books = page::select("book_id", &ids, None),
        table = page::books_table(&available),
    ));

    render(title, name, notice, &body)
}

pub async fn borrow_form(State(state): State<AppState>, Query(q): Query<StudentQuery>) -> Html<String> {
    borrow_screen(&state, q.name.trim(), q.genre.as_deref(), None).await
}

pub async fn borrow(State(state): State<AppState>, Form(form): Form<LoanForm>) -> Html<String> {
    let name = form.name.trim();
    let notice = match state.library.borrow(name, &form.book_id, Utc::now()).await {
        Ok(borrowed) => Notice::Success(format!("{} borrowed successfully!", borrowed.title)),
        Err(e) => notice_for(&e, "borrow book"),
    };

    borrow_screen(&state, name, form.genre.as_deref(), Some(notice)).await
}

async fn return_screen(state: &AppState, name: &str, notice: Option<Notice>) -> Html<String> {
    let title = "Return Book";
    let mut body = name_form("/student/return", name);

    if name.is_empty() {
        return render(title, name, notice, &body);
    }

    let loans = match state.library.open_loans_for(name).await {
        Ok(loans) => loans,
        Err(e) => return render(title, name, Some(notice_for(&e, "list borrowed books")), &body),
    };

    if loans.is_empty() {
        body.push_str(&warning("You have no borrowed books to return."));
        return render(title, name, notice, &body);
    }

    let ids: Vec<String> = loans.iter().map(|l| l.book_id.clone()).collect();
    body.push_str(&format!(
        r#"
        <form action="/student/return" method="post">
            {hidden_name}
            <label>Select Book {books}</label>
            <input type="submit" value="Return Book">
        </form>
        "#,
        hidden_name = page::hidden("name", name),
        books = page::select("book_id", &ids, None),
    ));

    render(title, name, notice, &body)
}

pub async fn return_form(State(state): State<AppState>, Query(q): Query<StudentQuery>) -> Html<String> {
    return_screen(&state, q.name.trim(), None).await
}

pub async fn return_book(State(state): State<AppState>, Form(form): Form<LoanForm>) -> Html<String> {
    let name = form.name.trim();
    let notice = match state.library.return_book(name, &form.book_id, Utc::now()).await {
        Ok(returned) if returned.late => Notice::Warning("You are flagged due to late return.".to_string()),
        Ok(returned) => Notice::Success(format!("{} returned successfully!", returned.title)),
        Err(e) => notice_for(&e, "return book"),
    };

    return_screen(&state, name, Some(notice)).await
}

pub async fn all_books(State(state): State<AppState>, Query(q): Query<StudentQuery>) -> Html<String> {
    let title = "All Books in the Library";
    match state.library.list_books().await {
        Ok(books) => render(title, q.name.trim(), None, &page::books_table(&books)),
        Err(e) => render(title, q.name.trim(), Some(notice_for(&e, "list books")), ""),
    }
}
