use std::str::FromStr;

use async_trait::async_trait;
use livros_db::{Database, DbError, RecordId};
use livros_kernel::Migration;
use rust_decimal::Decimal;
use sqlx::{Connection as _, SqliteConnection};

use super::error::StoreError;
use super::models::{Book, Genre, NewBook};

pub type CatalogDb = Database;

/// Catalog schema. Prices are stored as decimal text so no precision is lost.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        id: "0001_create_genero",
        up: "CREATE TABLE genero (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nome TEXT NOT NULL
        )",
    },
    Migration {
        id: "0002_create_livro",
        up: "CREATE TABLE livro (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            titulo TEXT NOT NULL,
            autor TEXT NOT NULL,
            ano_edicao INTEGER NOT NULL,
            valor TEXT NOT NULL,
            genero_id INTEGER NOT NULL REFERENCES genero (id)
        )",
    },
];

const SELECT_BOOKS: &str = "SELECT l.id, l.titulo, l.autor, l.ano_edicao, l.valor,
        g.id AS genero_id, g.nome AS genero_nome
    FROM livro l
    JOIN genero g ON g.id = l.genero_id
    ORDER BY l.id";

const SELECT_BOOK: &str = "SELECT l.id, l.titulo, l.autor, l.ano_edicao, l.valor,
        g.id AS genero_id, g.nome AS genero_nome
    FROM livro l
    JOIN genero g ON g.id = l.genero_id
    WHERE l.id = ?";

#[derive(Debug, sqlx::FromRow)]
struct BookRow {
    id: RecordId,
    titulo: String,
    autor: String,
    ano_edicao: i32,
    valor: String,
    genero_id: RecordId,
    genero_nome: String,
}

impl BookRow {
    fn into_book(self) -> Result<Book, StoreError> {
        let price = Decimal::from_str(&self.valor).map_err(|_| StoreError::InvalidStoredPrice {
            id: self.id,
            value: self.valor.clone(),
        })?;

        Ok(Book {
            id: self.id,
            title: self.titulo,
            author: self.autor,
            edition_year: self.ano_edicao,
            price,
            genre: Genre {
                id: self.genero_id,
                name: self.genero_nome,
            },
        })
    }
}

async fn fetch_book(conn: &mut SqliteConnection, id: RecordId) -> Result<Option<Book>, StoreError> {
    sqlx::query_as::<_, BookRow>(SELECT_BOOK)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(BookRow::into_book)
        .transpose()
}

/// A rejected `genero_id` reference becomes a domain error.
fn genre_violation(err: sqlx::Error, genre_id: RecordId) -> StoreError {
    match DbError::from(err) {
        DbError::ForeignKey(_) => StoreError::UnknownGenre(genre_id),
        other => StoreError::Db(other),
    }
}

/// Query interface over the catalog used by the listing pipeline and the
/// CRUD handlers.
#[async_trait]
pub trait BookStore: Send {
    /// Every book with its genre resolved, in primary key order.
    async fn books(&mut self) -> Result<Vec<Book>, StoreError>;

    async fn find_book(&mut self, id: RecordId) -> Result<Option<Book>, StoreError>;

    /// Genres ordered by name.
    async fn genres(&mut self) -> Result<Vec<Genre>, StoreError>;

    async fn create_book(&mut self, book: NewBook) -> Result<Book, StoreError>;

    /// Unconditional overwrite; concurrent edits are last-write-wins.
    async fn update_book(&mut self, id: RecordId, book: NewBook) -> Result<Book, StoreError>;

    async fn delete_book(&mut self, id: RecordId) -> Result<Book, StoreError>;
}

#[async_trait]
impl BookStore for SqliteConnection {
    async fn books(&mut self) -> Result<Vec<Book>, StoreError> {
        sqlx::query_as::<_, BookRow>(SELECT_BOOKS)
            .fetch_all(&mut *self)
            .await?
            .into_iter()
            .map(BookRow::into_book)
            .collect()
    }

    async fn find_book(&mut self, id: RecordId) -> Result<Option<Book>, StoreError> {
        fetch_book(self, id).await
    }

    async fn genres(&mut self) -> Result<Vec<Genre>, StoreError> {
        let genres = sqlx::query_as::<_, Genre>("SELECT id, nome FROM genero ORDER BY nome, id")
            .fetch_all(&mut *self)
            .await?;
        Ok(genres)
    }

    async fn create_book(&mut self, book: NewBook) -> Result<Book, StoreError> {
        let mut tx = self.begin().await?;

        let id = sqlx::query(
            "INSERT INTO livro (titulo, autor, ano_edicao, valor, genero_id)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.edition_year)
        .bind(book.price.to_string())
        .bind(book.genre_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| genre_violation(err, book.genre_id))?
        .last_insert_rowid();

        let created = fetch_book(&mut tx, id)
            .await?
            .ok_or(StoreError::BookNotFound(id))?;
        tx.commit().await?;

        tracing::info!(book_id = id, genre_id = book.genre_id, "book created");
        Ok(created)
    }

    async fn update_book(&mut self, id: RecordId, book: NewBook) -> Result<Book, StoreError> {
        let mut tx = self.begin().await?;

        let updated = sqlx::query(
            "UPDATE livro
             SET titulo = ?, autor = ?, ano_edicao = ?, valor = ?, genero_id = ?
             WHERE id = ?",
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.edition_year)
        .bind(book.price.to_string())
        .bind(book.genre_id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|err| genre_violation(err, book.genre_id))?
        .rows_affected();
        if updated == 0 {
            return Err(StoreError::BookNotFound(id));
        }

        let book = fetch_book(&mut tx, id)
            .await?
            .ok_or(StoreError::BookNotFound(id))?;
        tx.commit().await?;

        tracing::info!(book_id = id, "book updated");
        Ok(book)
    }

    async fn delete_book(&mut self, id: RecordId) -> Result<Book, StoreError> {
        let mut tx = self.begin().await?;

        let book = fetch_book(&mut tx, id)
            .await?
            .ok_or(StoreError::BookNotFound(id))?;
        sqlx::query("DELETE FROM livro WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(book_id = id, "book deleted");
        Ok(book)
    }
}

const SAMPLE_GENRES: &[&str] = &[
    "Romance",
    "Ficção Científica",
    "Fantasia",
    "Técnico",
    "Biografia",
];

/// (title, author, year, price in cents, index into `SAMPLE_GENRES`)
const SAMPLE_BOOKS: &[(&str, &str, i32, i64, usize)] = &[
    ("Dom Casmurro", "Machado de Assis", 1899, 2990, 0),
    ("Memórias Póstumas de Brás Cubas", "Machado de Assis", 1881, 3450, 0),
    ("Ensaio sobre a Cegueira", "José Saramago", 1995, 4990, 0),
    ("Neuromancer", "William Gibson", 1984, 1250, 1),
    ("Duna", "Frank Herbert", 1965, 5990, 1),
    ("O Hobbit", "J. R. R. Tolkien", 1937, 4500, 2),
    ("Clean Code", "Robert C. Martin", 2008, 8900, 3),
    ("Steve Jobs", "Walter Isaacson", 2011, 6490, 4),
];

/// Fill an empty catalog with sample genres and books.
///
/// Returns the number of books inserted; an already populated catalog is left
/// untouched.
pub async fn seed_sample_data(db: &CatalogDb) -> Result<usize, StoreError> {
    let mut conn = db.acquire().await?;
    let mut tx = conn.begin().await?;

    let populated: i64 =
        sqlx::query_scalar("SELECT (SELECT COUNT(*) FROM genero) + (SELECT COUNT(*) FROM livro)")
            .fetch_one(&mut *tx)
            .await?;
    if populated > 0 {
        tracing::debug!("catalog already populated; skipping sample data");
        return Ok(0);
    }

    let mut genre_ids = Vec::with_capacity(SAMPLE_GENRES.len());
    for name in SAMPLE_GENRES {
        let id = sqlx::query("INSERT INTO genero (nome) VALUES (?)")
            .bind(*name)
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
        genre_ids.push(id);
    }

    for (title, author, edition_year, cents, genre) in SAMPLE_BOOKS {
        sqlx::query(
            "INSERT INTO livro (titulo, autor, ano_edicao, valor, genero_id)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(*title)
        .bind(*author)
        .bind(*edition_year)
        .bind(Decimal::new(*cents, 2).to_string())
        .bind(genre_ids[*genre])
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    tracing::info!(
        genres = genre_ids.len(),
        books = SAMPLE_BOOKS.len(),
        "sample catalog seeded"
    );
    Ok(SAMPLE_BOOKS.len())
}

/// In-memory catalog with the schema applied, for tests.
#[cfg(test)]
pub(crate) async fn test_catalog(max_connections: u32) -> CatalogDb {
    let db = Database::in_memory(livros_db::PoolOptions {
        max_connections,
        acquire_timeout: std::time::Duration::from_millis(50),
    })
    .await
    .unwrap();
    for migration in MIGRATIONS {
        db.apply_migration(migration.id, migration.up).await.unwrap();
    }
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_book(title: &str, genre_id: RecordId) -> NewBook {
        NewBook {
            title: title.to_string(),
            author: "Autor".to_string(),
            edition_year: 2000,
            price: Decimal::from_str("10.00").unwrap(),
            genre_id,
        }
    }

    async fn seeded() -> CatalogDb {
        let db = test_catalog(2).await;
        seed_sample_data(&db).await.unwrap();
        db
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = test_catalog(2).await;
        assert_eq!(seed_sample_data(&db).await.unwrap(), SAMPLE_BOOKS.len());
        assert_eq!(seed_sample_data(&db).await.unwrap(), 0);

        let mut conn = db.acquire().await.unwrap();
        let books = conn.books().await.unwrap();
        assert_eq!(books.len(), SAMPLE_BOOKS.len());
        assert!(books.iter().all(|b| !b.genre.name.is_empty()));
        assert_eq!(books[3].title, "Neuromancer");
        assert_eq!(books[3].price, Decimal::from_str("12.50").unwrap());
    }

    #[tokio::test]
    async fn genres_come_sorted_by_name() {
        let db = seeded().await;
        let mut conn = db.acquire().await.unwrap();

        let names: Vec<String> = conn
            .genres()
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn create_requires_an_existing_genre() {
        let db = seeded().await;
        let mut conn = db.acquire().await.unwrap();

        let err = conn.create_book(new_book("Órfão", 404)).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownGenre(404)));

        let created = conn.create_book(new_book("Novo", 1)).await.unwrap();
        assert_eq!(created.genre.id, 1);
        assert_eq!(created.id, 9);
        assert_eq!(conn.find_book(created.id).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn update_overwrites_and_checks_target() {
        let db = seeded().await;
        let mut conn = db.acquire().await.unwrap();

        let updated = conn
            .update_book(1, new_book("Dom Casmurro (2ª ed.)", 2))
            .await
            .unwrap();
        assert_eq!(updated.id, 1);
        assert_eq!(updated.title, "Dom Casmurro (2ª ed.)");
        assert_eq!(updated.genre.id, 2);

        let missing = conn.update_book(999, new_book("x", 1)).await.unwrap_err();
        assert!(matches!(missing, StoreError::BookNotFound(999)));

        let bad_genre = conn.update_book(1, new_book("x", 77)).await.unwrap_err();
        assert!(matches!(bad_genre, StoreError::UnknownGenre(77)));
        assert_eq!(
            conn.find_book(1).await.unwrap().map(|b| b.title),
            Some("Dom Casmurro (2ª ed.)".to_string())
        );
    }

    #[tokio::test]
    async fn delete_removes_the_book_once() {
        let db = seeded().await;
        let mut conn = db.acquire().await.unwrap();

        let deleted = conn.delete_book(2).await.unwrap();
        assert_eq!(deleted.id, 2);
        assert_eq!(conn.find_book(2).await.unwrap(), None);

        let again = conn.delete_book(2).await.unwrap_err();
        assert!(matches!(again, StoreError::BookNotFound(2)));
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let db = seeded().await;
        let mut conn = db.acquire().await.unwrap();

        conn.delete_book(8).await.unwrap();
        let created = conn.create_book(new_book("Depois", 1)).await.unwrap();
        assert_eq!(created.id, 9);
    }

    #[tokio::test]
    async fn price_keeps_its_decimal_digits() {
        let db = seeded().await;
        let mut conn = db.acquire().await.unwrap();

        let mut book = new_book("Preciso", 1);
        book.price = Decimal::from_str("0.10").unwrap();
        let created = conn.create_book(book).await.unwrap();
        assert_eq!(created.price.to_string(), "0.10");
    }

    #[tokio::test]
    async fn unreadable_price_is_reported() {
        let db = seeded().await;
        let mut conn = db.acquire().await.unwrap();
        sqlx::query("UPDATE livro SET valor = 'caro' WHERE id = 3")
            .execute(&mut *conn)
            .await
            .unwrap();

        let err = conn.books().await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidStoredPrice { id: 3, .. }));
    }
}
