//! Append-only collection of collected books

use std::sync::Mutex;

use crate::model::CollectedBook;

/// Results shared by all download workers. Books are only ever appended.
#[derive(Debug, Default)]
pub struct ResultSet {
    books: Mutex<Vec<CollectedBook>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from books restored from a previous run
    pub fn from_books(books: Vec<CollectedBook>) -> Self {
        Self {
            books: Mutex::new(books),
        }
    }

    /// Append a book, returning the new total
    pub fn append(&self, book: CollectedBook) -> usize {
        let mut books = self.books.lock().expect("results lock poisoned");
        books.push(book);
        books.len()
    }

    pub fn len(&self) -> usize {
        self.books.lock().expect("results lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all books, for snapshots and reports
    pub fn snapshot(&self) -> Vec<CollectedBook> {
        self.books.lock().expect("results lock poisoned").clone()
    }
}
