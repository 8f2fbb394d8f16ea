use axum::{
    Form,
    extract::State,
    response::Html,
};
use serde::Deserialize;

use crate::handler::{AppState, notice_for};
use crate::library::NewBook;
use crate::page::{self, Notice, Role, escape};

#[derive(Debug, Deserialize)]
pub struct AddBookForm {
    pub book_id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub genre: String,
    #[serde(default)]
    pub total_copies: String,
}

#[derive(Debug, Deserialize)]
pub struct ClearFlagForm {
    pub student: String,
}

fn render(title: &str, notice: Option<Notice>, body: &str) -> Html<String> {
    page::layout(title, Some(Role::Admin), None, notice, body)
}

pub async fn menu() -> Html<String> {
    render(
        "Admin - Library Management System",
        None,
        "<p>Choose an option from the menu.</p>",
    )
}

fn add_book_body(state: &AppState) -> String {
    let lib = &state.library;
    format!(
        r#"
        <form action="/admin/books" method="post">
            <label>Book ID <input type="text" name="book_id"></label>
            <label>Title <input type="text" name="title"></label>
            <label>Author <input type="text" name="author"></label>
            <label>Genre {genres}</label>
            <label>Total Copies <input type="number" name="total_copies" min="1" value="{copies}"></label>
            <input type="submit" value="Add Book">
        </form>
        "#,
        genres = page::select("genre", lib.genres(), None),
        copies = lib.policy().default_copies,
    )
}

pub async fn add_book_form(State(state): State<AppState>) -> Html<String> {
    render("Add Book", None, &add_book_body(&state))
}

pub async fn add_book(State(state): State<AppState>, Form(form): Form<AddBookForm>) -> Html<String> {
    let copies = form.total_copies.trim();
    let total_copies = if copies.is_empty() {
        Ok(state.library.policy().default_copies)
    } else {
        copies.parse::<u32>()
    };

    let notice = match total_copies {
        Err(_) => Notice::Warning("Total copies must be a whole number.".to_string()),
        Ok(total_copies) => {
            let input = NewBook {
                book_id: form.book_id,
                title: form.title,
                author: form.author,
                genre: form.genre,
                total_copies,
            };
            match state.library.add_book(input).await {
                Ok(_) => Notice::Success("Book added successfully!".to_string()),
                Err(e) => notice_for(&e, "add book"),
            }
        }
    };

    render("Add Book", Some(notice), &add_book_body(&state))
}

pub async fn all_books(State(state): State<AppState>) -> Html<String> {
    match state.library.list_books().await {
        Ok(books) => render("All Books in the Library", None, &page::books_table(&books)),
        Err(e) => render("All Books in the Library", Some(notice_for(&e, "list books")), ""),
    }
}

pub async fn borrowed_books(State(state): State<AppState>) -> Html<String> {
    let lib = &state.library;
    let result = match lib.open_loans().await {
        Ok(loans) => lib.list_books().await.map(|books| (loans, books)),
        Err(e) => Err(e),
    };

    match result {
        Ok((loans, books)) => render("List of Borrowed Books", None, &page::loans_table(&loans, &books)),
        Err(e) => render("List of Borrowed Books", Some(notice_for(&e, "list borrowed books")), ""),
    }
}

async fn flagged_page(state: &AppState, notice: Option<Notice>) -> Html<String> {
    let students = match state.library.flagged_students().await {
        Ok(students) => students,
        Err(e) => return render("Flagged Students", Some(notice_for(&e, "list flagged students")), ""),
    };

    if students.is_empty() {
        return render("Flagged Students", notice, "<p>No flagged students currently.</p>");
    }

    let clearing = state.library.policy().allow_flag_clearing;
    let mut body = String::from("<ul>");
    for student in &students {
        body.push_str(&format!("<li>{}", escape(student)));
        if clearing {
            body.push_str(&format!(
                r#" <form class="inline" action="/admin/flagged/clear" method="post">{}<input type="submit" value="Clear"></form>"#,
                page::hidden("student", student)
            ));
        }
        body.push_str("</li>");
    }
    body.push_str("</ul>");

    render("Flagged Students", notice, &body)
}

pub async fn flagged_students(State(state): State<AppState>) -> Html<String> {
    flagged_page(&state, None).await
}

pub async fn clear_flag(State(state): State<AppState>, Form(form): Form<ClearFlagForm>) -> Html<String> {
    let notice = match state.library.clear_flag(&form.student).await {
        Ok(true) => Notice::Success(format!("{} is no longer flagged.", form.student)),
        Ok(false) => Notice::Warning(format!("{} was not flagged.", form.student)),
        Err(e) => notice_for(&e, "clear flag"),
    };
    flagged_page(&state, Some(notice)).await
}
