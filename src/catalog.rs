use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{from_millis, to_millis, Database};
use crate::error::Result;
use crate::models::{Book, BookDetails, NewBook, UNKNOWN};

/// Storage for purchased books.
pub trait CatalogRepository: Send + Sync {
    /// Inserts a book and returns its store-assigned id.
    fn insert(&self, book: &NewBook) -> Result<i64>;

    fn get(&self, id: i64) -> Result<Option<Book>>;

    /// Every book, most recently purchased first.
    fn list_all(&self) -> Result<Vec<Book>>;

    fn list_titles(&self) -> Result<Vec<String>>;

    /// Stored ISBNs, blanks excluded.
    fn list_isbns(&self) -> Result<Vec<String>>;

    /// Books still carrying the unknown authors sentinel, oldest first.
    fn list_unenriched(&self) -> Result<Vec<Book>>;

    /// Overwrites the metadata fields of one book. Returns `false` when the id is unknown.
    fn update_details(&self, id: i64, details: &BookDetails) -> Result<bool>;

    /// Deletes a book, returning its title if it existed.
    fn delete(&self, id: i64) -> Result<Option<String>>;
}

const BOOK_COLUMNS: &str = "id, title, authors, publisher, published_date, isbn, description, \
     thumbnail_url, retailer_link, purchase_date, price, notes, created_at";

fn book_from_row(row: &Row<'_>) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        authors: row.get(2)?,
        publisher: row.get(3)?,
        published_date: row.get(4)?,
        isbn: row.get(5)?,
        description: row.get(6)?,
        thumbnail_url: row.get(7)?,
        retailer_link: row.get(8)?,
        purchase_date: from_millis(row.get(9)?),
        price: row.get(10)?,
        notes: row.get(11)?,
        created_at: from_millis(row.get(12)?),
    })
}

impl Database {
    fn query_books(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<Book>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let books = stmt
            .query_map(args, book_from_row)?
            .collect::<rusqlite::Result<Vec<Book>>>()?;
        Ok(books)
    }
}

impl CatalogRepository for Database {
    fn insert(&self, book: &NewBook) -> Result<i64> {
        let conn = self.connection()?;
        let now = Utc::now();
        let purchase_date = book.purchase_date.unwrap_or(now);
        conn.execute(
            "INSERT INTO books (title, authors, publisher, published_date, isbn, description, \
             thumbnail_url, retailer_link, purchase_date, price, notes, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                book.title,
                book.details.authors,
                book.details.publisher,
                book.details.published_date,
                book.details.isbn,
                book.details.description,
                book.details.thumbnail_url,
                book.details.retailer_link,
                to_millis(purchase_date),
                book.price,
                book.notes,
                to_millis(now),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn get(&self, id: i64) -> Result<Option<Book>> {
        let conn = self.connection()?;
        let book = conn
            .query_row(
                &format!("SELECT {} FROM books WHERE id = ?1", BOOK_COLUMNS),
                params![id],
                book_from_row,
            )
            .optional()?;
        Ok(book)
    }

    fn list_all(&self) -> Result<Vec<Book>> {
        self.query_books(
            &format!(
                "SELECT {} FROM books ORDER BY purchase_date DESC, id DESC",
                BOOK_COLUMNS
            ),
            params![],
        )
    }

    fn list_titles(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT title FROM books")?;
        let titles = stmt
            .query_map(params![], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(titles)
    }

    fn list_isbns(&self) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT isbn FROM books WHERE trim(isbn) != ''")?;
        let isbns = stmt
            .query_map(params![], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(isbns)
    }

    fn list_unenriched(&self) -> Result<Vec<Book>> {
        self.query_books(
            &format!(
                "SELECT {} FROM books WHERE authors = ?1 ORDER BY id ASC",
                BOOK_COLUMNS
            ),
            params![UNKNOWN],
        )
    }

    fn update_details(&self, id: i64, details: &BookDetails) -> Result<bool> {
        let conn = self.connection()?;
        let changed = conn.execute(
            "UPDATE books SET authors = ?1, publisher = ?2, published_date = ?3, isbn = ?4, \
             description = ?5, thumbnail_url = ?6, retailer_link = ?7 WHERE id = ?8",
            params![
                details.authors,
                details.publisher,
                details.published_date,
                details.isbn,
                details.description,
                details.thumbnail_url,
                details.retailer_link,
                id,
            ],
        )?;
        Ok(changed > 0)
    }

    fn delete(&self, id: i64) -> Result<Option<String>> {
        let conn = self.connection()?;
        let title: Option<String> = conn
            .query_row("SELECT title FROM books WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        if title.is_none() {
            return Ok(None);
        }
        conn.execute("DELETE FROM books WHERE id = ?1", params![id])?;
        Ok(title)
    }
}
