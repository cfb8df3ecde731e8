//! Filter, sort and page the catalog for the listing grid.

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::{ListingError, StoreError};
use super::models::Book;
use super::paging::{PaginationRequest, SortDirection};
use super::store::{BookStore, CatalogDb};

/// Columns the grid may sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Titulo,
    Autor,
    AnoEdicao,
    Valor,
    GeneroNome,
}

impl SortField {
    pub const ALL: [SortField; 6] = [
        SortField::Id,
        SortField::Titulo,
        SortField::Autor,
        SortField::AnoEdicao,
        SortField::Valor,
        SortField::GeneroNome,
    ];

    /// Name as the grid sends it
    pub fn name(self) -> &'static str {
        match self {
            SortField::Id => "Id",
            SortField::Titulo => "Titulo",
            SortField::Autor => "Autor",
            SortField::AnoEdicao => "AnoEdicao",
            SortField::Valor => "Valor",
            SortField::GeneroNome => "Genero.Nome",
        }
    }

    /// Text columns compare case-insensitively, like the search filter.
    fn compare(self, a: &Book, b: &Book) -> Ordering {
        match self {
            SortField::Id => a.id.cmp(&b.id),
            SortField::Titulo => fold_cmp(&a.title, &b.title),
            SortField::Autor => fold_cmp(&a.author, &b.author),
            SortField::AnoEdicao => a.edition_year.cmp(&b.edition_year),
            SortField::Valor => a.price.cmp(&b.price),
            SortField::GeneroNome => fold_cmp(&a.genre.name, &b.genre.name),
        }
    }
}

fn fold_cmp(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

impl FromStr for SortField {
    type Err = ListingError;

    /// Only whitelisted names are accepted, ASCII case-insensitively.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SortField::ALL
            .into_iter()
            .find(|field| field.name().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| ListingError::InvalidSortField(value.to_string()))
    }
}

/// One page of the listing, serialized as the grid's response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub rows: Vec<Book>,
    pub current: i64,
    #[serde(rename = "rowCount")]
    pub row_count: i64,
    /// Number of books in the catalog before the search filter
    pub total: usize,
}

/// Free-text search over title, author, edition year and price.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    needle: String,
    year: Option<i32>,
    price: Option<Decimal>,
}

impl SearchFilter {
    /// `None` for an empty or whitespace-only phrase.
    pub fn new(phrase: &str) -> Option<Self> {
        let phrase = phrase.trim();
        if phrase.is_empty() {
            return None;
        }

        Some(Self {
            needle: phrase.to_lowercase(),
            year: parse_year(phrase),
            price: parse_decimal(phrase),
        })
    }

    /// Any of the four predicates; numeric ones only when the phrase parsed.
    pub fn matches(&self, book: &Book) -> bool {
        book.title.to_lowercase().contains(&self.needle)
            || book.author.to_lowercase().contains(&self.needle)
            || self.year == Some(book.edition_year)
            || self.price == Some(book.price)
    }
}

/// A validated listing request, ready to run against any set of books.
#[derive(Debug, Clone)]
pub struct ListingPlan {
    current: i64,
    row_count: i64,
    skip: usize,
    take: usize,
    sort_field: SortField,
    direction: SortDirection,
    filter: Option<SearchFilter>,
}

impl ListingPlan {
    /// Validate page numbers and the sort field without touching the store.
    pub fn new(request: &PaginationRequest) -> Result<Self, ListingError> {
        if request.current < 1 || request.row_count < 1 {
            return Err(ListingError::InvalidPageParameters {
                current: request.current,
                row_count: request.row_count,
            });
        }

        let sort_field: SortField = request.sort.field.parse()?;

        let take = usize::try_from(request.row_count).unwrap_or(usize::MAX);
        // Past the end of any realistic catalog when the product overflows.
        let skip = usize::try_from(request.current - 1)
            .ok()
            .and_then(|pages| pages.checked_mul(take))
            .unwrap_or(usize::MAX);

        Ok(Self {
            current: request.current,
            row_count: request.row_count,
            skip,
            take,
            sort_field,
            direction: request.sort.direction,
            filter: request.search_phrase.as_deref().and_then(SearchFilter::new),
        })
    }

    /// Count, filter, sort (stable) and page `books`.
    pub fn apply(&self, books: Vec<Book>) -> ResultEnvelope {
        let total = books.len();

        let mut matching: Vec<Book> = match &self.filter {
            Some(filter) => books.into_iter().filter(|book| filter.matches(book)).collect(),
            None => books,
        };
        let filtered = matching.len();

        let field = self.sort_field;
        match self.direction {
            SortDirection::Asc => matching.sort_by(|a, b| field.compare(a, b)),
            SortDirection::Desc => matching.sort_by(|a, b| field.compare(b, a)),
        }

        let rows: Vec<Book> = matching.into_iter().skip(self.skip).take(self.take).collect();

        tracing::debug!(
            total,
            filtered,
            returned = rows.len(),
            sort = field.name(),
            direction = self.direction.as_str(),
            current = self.current,
            row_count = self.row_count,
            "listing page computed"
        );

        ResultEnvelope {
            rows,
            current: self.current,
            row_count: self.row_count,
            total,
        }
    }

    /// Read the catalog once and return the requested page.
    pub async fn run<S>(&self, store: &mut S) -> Result<ResultEnvelope, ListingError>
    where
        S: BookStore + ?Sized,
    {
        let books = store.books().await?;
        Ok(self.apply(books))
    }
}

/// Parse the grid's form fields and return the requested page.
///
/// The request is fully validated before a connection is taken from `db`, so
/// a bad request never waits on a busy pool.
pub async fn list_books<K, V>(
    form_fields: &[(K, V)],
    db: &CatalogDb,
) -> Result<ResultEnvelope, ListingError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let request = PaginationRequest::from_form(form_fields)?;
    let plan = ListingPlan::new(&request)?;

    let mut conn = db.acquire().await.map_err(StoreError::from)?;
    plan.run(&mut *conn).await
}

/// Integer reading of a search phrase or form value.
pub fn parse_year(text: &str) -> Option<i32> {
    text.trim().parse::<i32>().ok()
}

/// Decimal reading of a search phrase or form value. A comma is accepted as
/// the decimal separator when no dot is present (`12,50`).
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.contains(',') && !text.contains('.') {
        Decimal::from_str(&text.replacen(',', ".", 1)).ok()
    } else {
        Decimal::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::models::Genre;
    use crate::modules::books::paging::SortOrder;
    use crate::modules::books::store;

    fn book(id: i64, title: &str, author: &str, year: i32, price: &str, genre: &str) -> Book {
        Book {
            id,
            title: title.to_string(),
            author: author.to_string(),
            edition_year: year,
            price: Decimal::from_str(price).unwrap(),
            genre: Genre {
                id: id % 3 + 1,
                name: genre.to_string(),
            },
        }
    }

    fn catalog() -> Vec<Book> {
        vec![
            book(1, "Dom Casmurro", "Machado de Assis", 1899, "29.90", "Romance"),
            book(2, "Neuromancer", "William Gibson", 1984, "12.50", "Ficção"),
            book(3, "O Hobbit", "J. R. R. Tolkien", 1937, "45.00", "Fantasia"),
            book(4, "Duna", "Frank Herbert", 1965, "59.90", "Ficção"),
            book(5, "Clean Code", "Robert C. Martin", 2008, "89.00", "Técnico"),
            book(6, "Ensaio sobre a Cegueira", "José Saramago", 1995, "39.90", "Romance"),
            book(7, "Memórias Póstumas", "Machado de Assis", 1881, "19.90", "Romance"),
        ]
    }

    fn request(
        current: i64,
        row_count: i64,
        phrase: Option<&str>,
        field: &str,
        dir: SortDirection,
    ) -> PaginationRequest {
        PaginationRequest {
            current,
            row_count,
            search_phrase: phrase.map(str::to_string),
            sort: SortOrder {
                field: field.to_string(),
                direction: dir,
            },
        }
    }

    fn run(req: &PaginationRequest) -> Result<ResultEnvelope, ListingError> {
        Ok(ListingPlan::new(req)?.apply(catalog()))
    }

    fn titles(envelope: &ResultEnvelope) -> Vec<&str> {
        envelope.rows.iter().map(|b| b.title.as_str()).collect()
    }

    #[test]
    fn second_page_of_seven_holds_the_remaining_two() {
        let envelope = run(&request(2, 5, None, "Titulo", SortDirection::Asc)).unwrap();

        assert_eq!(envelope.rows.len(), 2);
        assert_eq!(envelope.total, 7);
        assert_eq!(envelope.current, 2);
        assert_eq!(envelope.row_count, 5);
        assert_eq!(titles(&envelope), vec!["Neuromancer", "O Hobbit"]);
    }

    #[test]
    fn page_beyond_the_end_is_empty() {
        let envelope = run(&request(9, 5, None, "Id", SortDirection::Asc)).unwrap();
        assert!(envelope.rows.is_empty());
        assert_eq!(envelope.total, 7);
    }

    #[test]
    fn huge_page_number_does_not_overflow() {
        let envelope = run(&request(i64::MAX, i64::MAX, None, "Id", SortDirection::Asc)).unwrap();
        assert!(envelope.rows.is_empty());
    }

    #[test]
    fn year_phrase_matches_edition_year() {
        let envelope = run(&request(1, 10, Some("1995"), "Titulo", SortDirection::Asc)).unwrap();
        assert_eq!(titles(&envelope), vec!["Ensaio sobre a Cegueira"]);
    }

    #[test]
    fn decimal_phrase_matches_price() {
        let envelope = run(&request(1, 10, Some("12.50"), "Titulo", SortDirection::Asc)).unwrap();
        assert_eq!(titles(&envelope), vec!["Neuromancer"]);

        let comma = run(&request(1, 10, Some("12,5"), "Titulo", SortDirection::Asc)).unwrap();
        assert_eq!(titles(&comma), vec!["Neuromancer"]);
    }

    #[test]
    fn text_phrase_matches_title_or_author_ignoring_case() {
        let envelope = run(&request(1, 10, Some("machado"), "Id", SortDirection::Asc)).unwrap();
        assert_eq!(titles(&envelope), vec!["Dom Casmurro", "Memórias Póstumas"]);

        let by_title = run(&request(1, 10, Some("HOBBIT"), "Id", SortDirection::Asc)).unwrap();
        assert_eq!(titles(&by_title), vec!["O Hobbit"]);
    }

    #[test]
    fn filter_is_a_pure_or_of_the_four_predicates() {
        let books = catalog();
        for phrase in ["Ma", "1984", "45.00", "o", "zzz", "19.90"] {
            let filter = SearchFilter::new(phrase).unwrap();
            let envelope = run(&request(1, 100, Some(phrase), "Id", SortDirection::Asc)).unwrap();
            let returned: Vec<i64> = envelope.rows.iter().map(|b| b.id).collect();

            let expected: Vec<i64> = books
                .iter()
                .filter(|b| {
                    let needle = phrase.to_lowercase();
                    b.title.to_lowercase().contains(&needle)
                        || b.author.to_lowercase().contains(&needle)
                        || phrase.parse::<i32>().ok() == Some(b.edition_year)
                        || Decimal::from_str(phrase).ok() == Some(b.price)
                })
                .map(|b| b.id)
                .collect();

            assert_eq!(returned, expected, "phrase {phrase:?}");
            assert!(books
                .iter()
                .filter(|b| !expected.contains(&b.id))
                .all(|b| !filter.matches(b)));
        }
    }

    #[test]
    fn total_ignores_the_search_filter() {
        for phrase in [None, Some("Romance"), Some("1995"), Some("nada disso")] {
            let envelope = run(&request(1, 3, phrase, "Titulo", SortDirection::Asc)).unwrap();
            assert_eq!(envelope.total, 7);
            assert!(envelope.rows.len() <= 3);
        }
    }

    #[test]
    fn every_sort_field_orders_monotonically() {
        for field in SortField::ALL {
            let asc = run(&request(1, 10, None, field.name(), SortDirection::Asc)).unwrap();
            assert!(
                asc.rows
                    .windows(2)
                    .all(|pair| field.compare(&pair[0], &pair[1]) != Ordering::Greater),
                "{} asc",
                field.name()
            );

            let desc = run(&request(1, 10, None, field.name(), SortDirection::Desc)).unwrap();
            assert!(
                desc.rows
                    .windows(2)
                    .all(|pair| field.compare(&pair[0], &pair[1]) != Ordering::Less),
                "{} desc",
                field.name()
            );
        }
    }

    #[test]
    fn equal_keys_keep_store_order() {
        let envelope = run(&request(1, 10, None, "Genero.Nome", SortDirection::Asc)).unwrap();
        let romance: Vec<i64> = envelope
            .rows
            .iter()
            .filter(|b| b.genre.name == "Romance")
            .map(|b| b.id)
            .collect();
        assert_eq!(romance, vec![1, 6, 7]);
    }

    #[test]
    fn text_sort_ignores_case() {
        let mut books = catalog();
        books.push(book(
            8,
            "amor de perdição",
            "Camilo Castelo Branco",
            1862,
            "15.00",
            "romance",
        ));

        let envelope = ListingPlan::new(&request(1, 3, None, "Titulo", SortDirection::Asc))
            .unwrap()
            .apply(books.clone());
        assert_eq!(
            titles(&envelope),
            vec!["amor de perdição", "Clean Code", "Dom Casmurro"]
        );

        let by_genre = ListingPlan::new(&request(1, 10, None, "Genero.Nome", SortDirection::Desc))
            .unwrap()
            .apply(books);
        let genres: Vec<&str> = by_genre.rows.iter().map(|b| b.genre.name.as_str()).collect();
        assert_eq!(genres[1..5], ["Romance", "Romance", "Romance", "romance"]);
    }

    #[test]
    fn sort_field_names_are_case_insensitive() {
        assert_eq!("valor".parse::<SortField>().unwrap(), SortField::Valor);
        assert_eq!("genero.nome".parse::<SortField>().unwrap(), SortField::GeneroNome);
    }

    #[test]
    fn unlisted_sort_field_is_rejected() {
        for field in ["DROP TABLE", "Titulo; DELETE", "GeneroId", "Genero", ""] {
            let err = run(&request(1, 10, None, field, SortDirection::Asc)).unwrap_err();
            assert!(matches!(err, ListingError::InvalidSortField(ref f) if f == field));
        }
    }

    #[test]
    fn non_positive_paging_is_rejected() {
        for (current, row_count) in [(0, 10), (1, 0), (-1, 5), (1, -5)] {
            let err =
                run(&request(current, row_count, None, "Titulo", SortDirection::Asc)).unwrap_err();
            assert!(matches!(
                err,
                ListingError::InvalidPageParameters { current: c, row_count: r }
                    if c == current && r == row_count
            ));
        }
    }

    #[test]
    fn applying_twice_gives_identical_pages() {
        let req = request(1, 4, Some("o"), "Valor", SortDirection::Desc);
        assert_eq!(run(&req).unwrap(), run(&req).unwrap());
    }

    fn form(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn seeded_catalog(max_connections: u32) -> CatalogDb {
        let db = store::test_catalog(max_connections).await;
        store::seed_sample_data(&db).await.unwrap();
        db
    }

    async fn wait_until_available(db: &CatalogDb, expected: usize) -> usize {
        for _ in 0..100 {
            if db.available_connections() == expected {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        db.available_connections()
    }

    #[tokio::test]
    async fn bad_requests_fail_without_waiting_for_a_connection() {
        let db = seeded_catalog(1).await;
        let _busy = db.acquire().await.unwrap();

        let err = list_books(
            &form(&[("current", "1"), ("rowCount", "10"), ("sort[DROP TABLE]", "asc")]),
            &db,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ListingError::InvalidSortField(ref f) if f == "DROP TABLE"));

        let err = list_books(&form(&[("current", "0"), ("rowCount", "10")]), &db)
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::InvalidPageParameters { .. }));

        let err = list_books(&form(&[("rowCount", "10")]), &db)
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::MalformedRequest(_)));

        let err = list_books(&form(&[("current", "1"), ("rowCount", "10")]), &db)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ListingError::Store(StoreError::Db(livros_db::DbError::PoolTimeout))
        ));
    }

    #[tokio::test]
    async fn parallel_listings_return_identical_pages() {
        let db = seeded_catalog(4).await;
        let fields = form(&[
            ("current", "1"),
            ("rowCount", "5"),
            ("searchPhrase", "o"),
            ("sort[Valor]", "desc"),
        ]);
        let expected = list_books(&fields, &db).await.unwrap();

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let db = db.clone();
                let fields = fields.clone();
                tokio::spawn(async move { list_books(&fields, &db).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), expected);
        }
        assert_eq!(expected.total, 8);
    }

    #[tokio::test]
    async fn failed_listing_returns_its_connection() {
        let db = seeded_catalog(2).await;
        {
            let mut conn = db.acquire().await.unwrap();
            sqlx::query("UPDATE livro SET valor = 'caro' WHERE id = 1")
                .execute(&mut *conn)
                .await
                .unwrap();
        }

        let err = list_books(&form(&[("current", "1"), ("rowCount", "10")]), &db)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ListingError::Store(StoreError::InvalidStoredPrice { id: 1, .. })
        ));

        assert_eq!(wait_until_available(&db, 2).await, 2);
        assert!(db.acquire().await.is_ok());
    }

    #[test]
    fn decimal_parsing_accepts_comma_separator() {
        assert_eq!(parse_decimal("12,50"), Decimal::from_str("12.5").ok());
        assert_eq!(parse_decimal(" 7 "), Decimal::from_str("7").ok());
        assert_eq!(parse_decimal("1.234,56"), None);
        assert_eq!(parse_decimal("abc"), None);
    }
}
