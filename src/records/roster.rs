#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::borrow::Cow;

use serde::Serialize;
use tabled::Tabled;

use super::tabular::{FieldKind, FieldSpec, RowError, RowValues, TabularRow};

/// One line of the course roster export.
///
/// The export's headers are verbose, so by default the first two declared
/// fields are bound positionally to `Username` and `First Name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterRow {
    /// Student identifier.
    pub username:   Option<i64>,
    /// Given name.
    pub first_name: Option<String>,
    /// Score column, kept verbatim.
    pub score:      Option<String>,
}

/// Renders an optional cell for table output.
fn display_option<T: std::fmt::Display>(value: &Option<T>) -> Cow<'_, str> {
    value
        .as_ref()
        .map_or(Cow::Borrowed(""), |v| Cow::Owned(v.to_string()))
}

impl Tabled for RosterRow {
    const LENGTH: usize = 3;

    fn fields(&self) -> Vec<Cow<'_, str>> {
        vec![
            display_option(&self.username),
            display_option(&self.first_name),
            display_option(&self.score),
        ]
    }

    fn headers() -> Vec<Cow<'static, str>> {
        vec!["Username".into(), "First Name".into(), "Score".into()]
    }
}

impl TabularRow for RosterRow {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("username", FieldKind::Integer),
        FieldSpec::optional("first_name", FieldKind::Text),
        FieldSpec::optional("score", FieldKind::Text),
    ];
    const NAME: &'static str = "RosterRow";

    fn default_columns() -> Option<Vec<String>> {
        Some(vec!["Username".to_string(), "First Name".to_string()])
    }

    fn from_values(values: &mut RowValues) -> Result<Self, RowError> {
        Ok(Self {
            username:   values.required("username")?.into_integer(),
            first_name: values.optional("first_name").into_text(),
            score:      values.optional("score").into_text(),
        })
    }
}
