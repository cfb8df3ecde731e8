//! Listing parameters posted by the catalog grid.
//!
//! The grid sends `current`, `rowCount`, an optional `searchPhrase`, and at most
//! one sort key shaped like `sort[Titulo]=desc`.

use std::fmt;
use std::str::FromStr;

use super::error::ListingError;

/// Sort field used when the grid sends no sort key
pub const DEFAULT_SORT_FIELD: &str = "Titulo";

const SORT_KEY_PREFIX: &str = "sort";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = ListingError;

    /// Empty means ascending.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if value.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            Err(ListingError::MalformedRequest(format!(
                "sort direction must be 'asc' or 'desc', got '{value}'"
            )))
        }
    }
}

/// Requested ordering. The field name is unchecked here; the query engine
/// validates it against the sortable columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

impl Default for SortOrder {
    fn default() -> Self {
        Self {
            field: DEFAULT_SORT_FIELD.to_string(),
            direction: SortDirection::Asc,
        }
    }
}

/// Renders the grid's order expression, e.g. `Titulo asc`.
impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.field, self.direction.as_str())
    }
}

/// One listing call's parameters.
///
/// Page numbers are kept signed so that `0` and negative values reach the
/// query engine and are reported as invalid pages rather than parse failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationRequest {
    pub current: i64,
    pub row_count: i64,
    pub search_phrase: Option<String>,
    pub sort: SortOrder,
}

impl PaginationRequest {
    /// Parse the posted form fields. Pairs are taken in submission order and
    /// the first occurrence of a key wins.
    pub fn from_form<K, V>(fields: &[(K, V)]) -> Result<Self, ListingError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let sort = fields
            .iter()
            .find(|(key, _)| key.as_ref().starts_with(SORT_KEY_PREFIX))
            .map(|(key, value)| {
                Ok::<_, ListingError>(SortOrder {
                    field: sort_field_from_key(key.as_ref()).to_string(),
                    direction: value.as_ref().parse()?,
                })
            })
            .transpose()?
            .unwrap_or_default();

        let current = required_integer(fields, "current")?;
        let row_count = required_integer(fields, "rowCount")?;

        let search_phrase = lookup(fields, "searchPhrase")
            .filter(|phrase| !phrase.trim().is_empty())
            .map(str::to_string);

        Ok(Self {
            current,
            row_count,
            search_phrase,
            sort,
        })
    }

    /// Combined `"<Field> <asc|desc>"` order expression
    pub fn order_expression(&self) -> String {
        self.sort.to_string()
    }
}

/// `sort[Genero.Nome]` -> `Genero.Nome`
fn sort_field_from_key(key: &str) -> &str {
    let field = key.strip_prefix("sort[").unwrap_or(key);
    field.strip_suffix(']').unwrap_or(field)
}

fn lookup<'a, K, V>(fields: &'a [(K, V)], name: &str) -> Option<&'a str>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    fields
        .iter()
        .find(|(key, _)| key.as_ref() == name)
        .map(|(_, value)| value.as_ref())
}

fn required_integer<K, V>(fields: &[(K, V)], name: &str) -> Result<i64, ListingError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let raw = lookup(fields, name)
        .ok_or_else(|| ListingError::MalformedRequest(format!("missing field '{name}'")))?;

    raw.trim().parse::<i64>().map_err(|_| {
        ListingError::MalformedRequest(format!("field '{name}' must be an integer, got '{raw}'"))
    })
}
