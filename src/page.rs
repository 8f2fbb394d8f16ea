//! Server-rendered HTML for the form screens.

use std::collections::HashMap;
use std::fmt::Write;

use axum::response::Html;

use crate::model::{Book, Loan};

pub enum Notice {
    Success(String),
    Warning(String),
}

impl Notice {
    pub fn render(&self) -> String {
        match self {
            Notice::Success(msg) => format!(r#"<p class="notice success">{}</p>"#, escape(msg)),
            Notice::Warning(msg) => format!(r#"<p class="notice warning">{}</p>"#, escape(msg)),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Student,
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn sidebar(role: Option<Role>, student: Option<&str>) -> String {
    let student_link = |path: &str| match student {
        Some(name) if !name.is_empty() => format!("{}?name={}", path, urlencoding::encode(name)),
        _ => path.to_string(),
    };

    let links: Vec<(String, &str)> = match role {
        Some(Role::Admin) => vec![
            ("/admin/books/new".to_string(), "Add Book"),
            ("/admin/loans".to_string(), "View Borrowed Books"),
            ("/admin/books".to_string(), "Show All Books"),
            ("/admin/flagged".to_string(), "Flagged Students"),
        ],
        Some(Role::Student) => vec![
            (student_link("/student/borrow"), "Borrow Book"),
            (student_link("/student/return"), "Return Book"),
            (student_link("/student/books"), "Show All Books"),
        ],
        None => vec![],
    };

    let mut nav = String::from(
        r#"<nav><h2>Library Management System</h2><p><a href="/admin">Admin</a> | <a href="/student">Student</a></p><ul>"#,
    );
    for (href, label) in links {
        let _ = write!(nav, r#"<li><a href="{}">{}</a></li>"#, escape(&href), label);
    }
    nav.push_str("</ul></nav>");
    nav
}

pub fn layout(title: &str, role: Option<Role>, student: Option<&str>, notice: Option<Notice>, body: &str) -> Html<String> {
    let notice = notice.map(|n| n.render()).unwrap_or_default();
    Html(format!(
        r#"<!doctype html>
<html>
    <head>
        <meta charset="utf-8">
        <title>{title}</title>
        <link rel="stylesheet" href="/style.css">
    </head>
    <body>
        {nav}
        <main>
            <h1>{title}</h1>
            {notice}
            {body}
        </main>
    </body>
</html>"#,
        title = escape(title),
        nav = sidebar(role, student),
    ))
}

pub fn select(name: &str, options: &[String], selected: Option<&str>) -> String {
    let mut html = format!(r#"<select name="{}" id="{}">"#, escape(name), escape(name));
    for opt in options {
        let marker = if selected == Some(opt.as_str()) { " selected" } else { "" };
        let _ = write!(html, r#"<option value="{0}"{1}>{0}</option>"#, escape(opt), marker);
    }
    html.push_str("</select>");
    html
}

pub fn hidden(name: &str, value: &str) -> String {
    format!(r#"<input type="hidden" name="{}" value="{}">"#, escape(name), escape(value))
}

pub fn books_table(books: &[Book]) -> String {
    if books.is_empty() {
        return "<p>No books in the library yet.</p>".to_string();
    }

    let mut html = String::from(
        "<table><tr><th>Book ID</th><th>Title</th><th>Author</th><th>Genre</th>\
         <th>Available Copies</th><th>Total Copies</th></tr>",
    );
    for b in books {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&b.book_id),
            escape(&b.title),
            escape(&b.author),
            escape(&b.genre),
            b.available_copies,
            b.total_copies
        );
    }
    html.push_str("</table>");
    html
}

/// Open loans with titles looked up from `books`.
pub fn loans_table(loans: &[Loan], books: &[Book]) -> String {
    if loans.is_empty() {
        return "<p>No books are currently borrowed.</p>".to_string();
    }

    let titles: HashMap<&str, &str> = books
        .iter()
        .rev()
        .map(|b| (b.book_id.as_str(), b.title.as_str()))
        .collect();

    let mut html = String::from(
        "<table><tr><th>Book ID</th><th>Title</th><th>Student Name</th><th>Borrow Date</th><th>Returned</th></tr>",
    );
    for l in loans {
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(&l.book_id),
            escape(titles.get(l.book_id.as_str()).copied().unwrap_or("")),
            escape(&l.student_id),
            crate::model::format_timestamp(&l.borrow_date),
            l.returned
        );
    }
    html.push_str("</table>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"<b>"Tom" & 'Jerry'</b>"#), "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;");
    }

    #[test]
    fn test_select_marks_choice() {
        let opts = vec!["Comedy".to_string(), "Romantic".to_string()];
        let html = select("genre", &opts, Some("Romantic"));
        assert!(html.contains(r#"<option value="Romantic" selected>"#));
        assert!(html.contains(r#"<option value="Comedy">"#));
    }

    #[test]
    fn test_loans_table_uses_first_title_for_duplicate_ids() {
        let books = vec![
            Book::new("B1", "First", "A", "Comedy", 1),
            Book::new("B1", "Second", "A", "Comedy", 1),
        ];
        let loan = Loan::open("B1", "S1", chrono::Utc::now());
        let html = loans_table(&[loan], &books);
        assert!(html.contains("<td>First</td>"));
    }
}
