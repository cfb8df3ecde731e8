use livros_db::RecordId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use super::query::{parse_decimal, parse_year};

/// Genre a book belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Genre {
    pub id: RecordId,
    #[serde(rename = "nome")]
    #[sqlx(rename = "nome")]
    pub name: String,
}

/// Book with its genre embedded, as returned by listing and details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: RecordId,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "autor")]
    pub author: String,
    #[serde(rename = "anoEdicao")]
    pub edition_year: i32,
    #[serde(rename = "valor", with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(rename = "genero")]
    pub genre: Genre,
}

/// Validated input for create and edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub edition_year: i32,
    pub price: Decimal,
    pub genre_id: RecordId,
}

/// Create/edit form as posted by the catalog page.
///
/// Numeric fields arrive as text and are parsed in [`BookForm::into_new_book`]
/// so that bad input becomes a field error instead of a rejected request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookForm {
    #[serde(rename = "Titulo", default)]
    pub title: String,
    #[serde(rename = "Autor", default)]
    pub author: String,
    #[serde(rename = "AnoEdicao", default)]
    pub edition_year: String,
    #[serde(rename = "Valor", default)]
    pub price: String,
    #[serde(rename = "GeneroId", default)]
    pub genre_id: String,
}

/// Text rules; error keys follow the JSON field names of [`Book`].
#[derive(Debug, Validate)]
struct TextFields {
    #[validate(length(min = 1, max = 200, message = "O título é obrigatório"))]
    titulo: String,
    #[validate(length(min = 1, max = 200, message = "O autor é obrigatório"))]
    autor: String,
}

impl BookForm {
    /// Trim every field, validate, and parse numeric fields.
    pub fn into_new_book(self) -> Result<NewBook, ValidationErrors> {
        let text = TextFields {
            titulo: self.title.trim().to_string(),
            autor: self.author.trim().to_string(),
        };

        let mut errors = match text.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        let edition_year =
            parse_year(self.edition_year.trim()).filter(|year| (0..=9999).contains(year));
        if edition_year.is_none() {
            errors.add(
                "anoEdicao",
                field_error("ano_invalido", "O ano de edição deve ser um número entre 0 e 9999"),
            );
        }

        let price = parse_decimal(self.price.trim()).filter(|price| !price.is_sign_negative());
        if price.is_none() {
            errors.add(
                "valor",
                field_error("valor_invalido", "O valor deve ser um número não negativo"),
            );
        }

        let genre_id = self
            .genre_id
            .trim()
            .parse::<RecordId>()
            .ok()
            .filter(|id| *id > 0);
        if genre_id.is_none() {
            errors.add(
                "generoId",
                field_error("genero_obrigatorio", "O gênero é obrigatório"),
            );
        }

        match (edition_year, price, genre_id) {
            (Some(edition_year), Some(price), Some(genre_id)) if errors.is_empty() => Ok(NewBook {
                title: text.titulo,
                author: text.autor,
                edition_year,
                price,
                genre_id,
            }),
            _ => Err(errors),
        }
    }
}

fn field_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

/// Outcome of a write operation, in the shape the catalog page expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub resultado: bool,
    pub mensagem: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<RecordId>,
}

impl OperationOutcome {
    pub fn success(mensagem: impl Into<String>, id: RecordId) -> Self {
        Self {
            resultado: true,
            mensagem: mensagem.into(),
            id: Some(id),
        }
    }
}
