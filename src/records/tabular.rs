#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Schema-driven loader for delimited tabular exports.
//!
//! A row type declares its fields once ([`TabularRow::FIELDS`]). The loader
//! binds those fields to columns either by exact header name or through an
//! explicit, ordered column list. Binding problems are [`SchemaError`]s and
//! surface before the first row is read; cell problems only ever affect the
//! cell (or, for a required field without a cell, the row).

use std::{
    collections::HashMap,
    fmt,
    fs::File,
    io::Read,
    marker::PhantomData,
    path::Path,
};

use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use itertools::Itertools;
use thiserror::Error;

use crate::constants::TRUTHY_TOKENS;

/// How a cell is coerced into a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Kept as text.
    Text,
    /// Parsed as a signed integer.
    Integer,
    /// Parsed as a float.
    Float,
    /// Compared against the truthy token set.
    Bool,
    /// Split on commas.
    List,
}

/// Declaration of one field of a row type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Field name, also the header it binds to in name mode.
    pub name:     &'static str,
    /// Coercion rule.
    pub kind:     FieldKind,
    /// Whether a row without a cell for this field is skipped.
    pub required: bool,
}

impl FieldSpec {
    /// A field the row cannot be built without.
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    /// A field that defaults to [`FieldValue::Missing`].
    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}

/// A coerced cell.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Text cell.
    Text(String),
    /// Integer cell.
    Integer(i64),
    /// Float cell.
    Float(f64),
    /// Boolean cell.
    Bool(bool),
    /// Comma-separated cell.
    List(Vec<String>),
    /// Empty cell, or a cell that failed to coerce.
    Missing,
}

impl FieldValue {
    /// Whether the value is [`FieldValue::Missing`].
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Returns the text, if this is a text value.
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Returns the integer, if this is an integer value.
    pub fn into_integer(self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the float, if this is a float value.
    pub fn into_float(self) -> Option<f64> {
        match self {
            Self::Float(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the flag, if this is a boolean value.
    pub fn into_bool(self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the items, if this is a list value.
    pub fn into_list(self) -> Option<Vec<String>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text}"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::List(items) => write!(f, "{}", items.join(",")),
            Self::Missing => Ok(()),
        }
    }
}

/// Mapping configuration errors. These abort a load before any row is built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// An explicit column list was given but it is empty.
    #[error("the explicit column list is empty")]
    EmptyColumnList,
    /// More columns than the row type has fields.
    #[error("{given} columns were given but `{row}` only declares {fields} fields")]
    TooManyColumns {
        /// Row type name.
        row:    &'static str,
        /// Number of columns given.
        given:  usize,
        /// Number of declared fields.
        fields: usize,
    },
    /// A required field has no column to read from.
    #[error("required field `{field}` of `{row}` is not bound to any column")]
    UnboundField {
        /// Row type name.
        row:   &'static str,
        /// Field name.
        field: &'static str,
    },
    /// `load_as_dict` was asked to key on a field the row type does not have.
    #[error("`{field}` is not a field of `{row}`")]
    UnknownKeyField {
        /// Row type name.
        row:   &'static str,
        /// Requested key field.
        field: String,
    },
}

/// A row could not be turned into its row type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    /// A required field has no cell in this row.
    #[error("required field `{0}` has no cell in this row")]
    MissingField(&'static str),
}

/// The coerced cells of one row, handed to [`TabularRow::from_values`].
///
/// A field maps to `None` when the row has no cell for it at all (short row),
/// and to `Some(FieldValue::Missing)` when the cell is empty or unparsable.
#[derive(Debug, Default)]
pub struct RowValues {
    /// `(field name, value)` pairs in declaration order.
    values: Vec<(&'static str, Option<FieldValue>)>,
}

impl RowValues {
    /// Removes and returns the value of `field`; `None` when there was no cell.
    pub fn take(&mut self, field: &str) -> Option<FieldValue> {
        self.values
            .iter_mut()
            .find(|(name, _)| *name == field)
            .and_then(|(_, value)| value.take())
    }

    /// Value of a required field; errors when the row has no cell for it.
    pub fn required(&mut self, field: &'static str) -> Result<FieldValue, RowError> {
        self.take(field).ok_or(RowError::MissingField(field))
    }

    /// Value of an optional field, [`FieldValue::Missing`] when absent.
    pub fn optional(&mut self, field: &str) -> FieldValue {
        self.take(field).unwrap_or(FieldValue::Missing)
    }

    /// Borrowing lookup, used to compute lookup keys before construction.
    fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(name, _)| *name == field)
            .and_then(|(_, value)| value.as_ref())
    }
}

/// A typed row of a tabular export.
pub trait TabularRow: Sized {
    /// Row type name used in diagnostics.
    const NAME: &'static str;
    /// Declared fields, in positional order.
    const FIELDS: &'static [FieldSpec];

    /// Column list used by [`TabularLoader::new`]; `None` binds by name.
    fn default_columns() -> Option<Vec<String>> {
        None
    }

    /// Builds the row from its coerced cells.
    fn from_values(values: &mut RowValues) -> Result<Self, RowError>;
}

/// Where a declared field reads its cell from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// No column is mapped to the field.
    Unbound,
    /// The mapped column does not exist in the file.
    Absent,
    /// Index of the mapped column.
    Column(usize),
}

/// Loads rows of type `T` from delimited text with a header row.
#[derive(Debug, Clone)]
pub struct TabularLoader<T> {
    /// Explicit positional column list; `None` binds by header name.
    columns: Option<Vec<String>>,
    /// Row type marker.
    _row:    PhantomData<fn() -> T>,
}

impl<T: TabularRow> TabularLoader<T> {
    /// Uses the row type's default binding.
    pub fn new() -> Result<Self, SchemaError> {
        match T::default_columns() {
            Some(columns) => Self::with_columns(columns),
            None => Ok(Self::by_name()),
        }
    }

    /// Binds every field to the header with the same name.
    pub fn by_name() -> Self {
        Self {
            columns: None,
            _row:    PhantomData,
        }
    }

    /// Binds the i-th column name to the i-th declared field.
    ///
    /// Fields past the end of the list stay unbound and take their default;
    /// leaving a required field unbound is an error.
    pub fn with_columns(columns: Vec<String>) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::EmptyColumnList);
        }
        if columns.len() > T::FIELDS.len() {
            return Err(SchemaError::TooManyColumns {
                row:    T::NAME,
                given:  columns.len(),
                fields: T::FIELDS.len(),
            });
        }
        if let Some(field) = T::FIELDS[columns.len()..].iter().find(|f| f.required) {
            return Err(SchemaError::UnboundField {
                row:   T::NAME,
                field: field.name,
            });
        }

        Ok(Self {
            columns: Some(columns),
            _row:    PhantomData,
        })
    }

    /// Explicit column list, if any.
    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    /// Loads every row of the file at `path`.
    pub fn load(&self, path: &Path) -> Result<Vec<T>> {
        let file =
            File::open(path).with_context(|| format!("Could not open {}", path.display()))?;
        self.load_from_reader(file)
            .with_context(|| format!("Could not load rows from {}", path.display()))
    }

    /// Loads every row from `reader`.
    pub fn load_from_reader<R: Read>(&self, reader: R) -> Result<Vec<T>> {
        Ok(self
            .read_rows(reader, None)?
            .into_iter()
            .map(|(_, _, row)| row)
            .collect())
    }

    /// Loads the file at `path` into a table keyed by `key_field`.
    ///
    /// Rows without a key value are skipped. A later row with the same key
    /// replaces the earlier one.
    pub fn load_as_dict(&self, path: &Path, key_field: &str) -> Result<HashMap<String, T>> {
        let file =
            File::open(path).with_context(|| format!("Could not open {}", path.display()))?;
        self.load_as_dict_from_reader(file, key_field)
            .with_context(|| format!("Could not load rows from {}", path.display()))
    }

    /// [`TabularLoader::load_as_dict`] over an arbitrary reader.
    pub fn load_as_dict_from_reader<R: Read>(
        &self,
        reader: R,
        key_field: &str,
    ) -> Result<HashMap<String, T>> {
        let key_field = T::FIELDS
            .iter()
            .find(|f| f.name == key_field)
            .map(|f| f.name)
            .ok_or_else(|| SchemaError::UnknownKeyField {
                row:   T::NAME,
                field: key_field.to_string(),
            })?;

        let mut table = HashMap::new();
        for (line, key, row) in self.read_rows(reader, Some(key_field))? {
            match key {
                Some(key) => {
                    if table.insert(key.clone(), row).is_some() {
                        tracing::warn!(
                            "Row {line}: duplicate {key_field} `{key}`, replacing the earlier row"
                        );
                    }
                }
                None => tracing::warn!("Row {line}: no value for {key_field}, skipping"),
            }
        }
        Ok(table)
    }

    /// Resolves each declared field to a column of `headers`.
    fn bind(&self, headers: &StringRecord) -> Result<Vec<Slot>, SchemaError> {
        let find = |name: &str| headers.iter().position(|h| h == name);

        let slots = match &self.columns {
            None => T::FIELDS
                .iter()
                .map(|f| find(f.name).map_or(Slot::Unbound, Slot::Column))
                .collect_vec(),
            Some(columns) => {
                let mut slots = columns
                    .iter()
                    .map(|column| match find(column) {
                        Some(index) => Slot::Column(index),
                        None => {
                            tracing::warn!(
                                "Column `{column}` is not in the header row, its field will be \
                                 empty"
                            );
                            Slot::Absent
                        }
                    })
                    .collect_vec();
                slots.resize(T::FIELDS.len(), Slot::Unbound);
                slots
            }
        };

        if let Some((field, _)) = T::FIELDS
            .iter()
            .zip(&slots)
            .find(|(f, slot)| f.required && **slot == Slot::Unbound)
        {
            return Err(SchemaError::UnboundField {
                row:   T::NAME,
                field: field.name,
            });
        }

        Ok(slots)
    }

    /// Reads, coerces, and builds every row, with its 1-based data line and
    /// (when asked for) its lookup key.
    fn read_rows<R: Read>(
        &self,
        reader: R,
        key_field: Option<&str>,
    ) -> Result<Vec<(usize, Option<String>, T)>> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = reader.headers().context("Could not read the header row")?.clone();
        let slots = self.bind(&headers)?;

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let line = index + 1;
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    tracing::warn!("Row {line}: unreadable ({err}), skipping");
                    continue;
                }
            };

            let mut values = RowValues {
                values: T::FIELDS
                    .iter()
                    .zip(&slots)
                    .map(|(field, slot)| {
                        let value = match slot {
                            Slot::Unbound | Slot::Absent => Some(FieldValue::Missing),
                            Slot::Column(i) => record.get(*i).map(|cell| coerce(field, cell, line)),
                        };
                        (field.name, value)
                    })
                    .collect(),
            };

            let key = key_field
                .and_then(|field| values.get(field))
                .filter(|value| !value.is_missing())
                .map(ToString::to_string);

            match T::from_values(&mut values) {
                Ok(row) => rows.push((line, key, row)),
                Err(err) => tracing::warn!("Row {line}: {err}, skipping"),
            }
        }

        Ok(rows)
    }
}

/// Coerces one cell according to its field declaration.
///
/// Empty cells and conversion failures become [`FieldValue::Missing`].
fn coerce(field: &FieldSpec, cell: &str, line: usize) -> FieldValue {
    if cell.is_empty() {
        return FieldValue::Missing;
    }

    let parsed = match field.kind {
        FieldKind::Text => Some(FieldValue::Text(cell.to_string())),
        FieldKind::Integer => cell.parse().ok().map(FieldValue::Integer),
        FieldKind::Float => cell.parse().ok().map(FieldValue::Float),
        FieldKind::Bool => Some(FieldValue::Bool(
            TRUTHY_TOKENS.contains(&cell.to_lowercase().as_str()),
        )),
        FieldKind::List => Some(FieldValue::List(
            cell.split(',').map(|item| item.trim().to_string()).collect(),
        )),
    };

    parsed.unwrap_or_else(|| {
        tracing::warn!(
            "Row {line}: `{cell}` is not a valid {:?} for `{}`, leaving it empty",
            field.kind,
            field.name
        );
        FieldValue::Missing
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_follows_field_kind() {
        let int = FieldSpec::required("n", FieldKind::Integer);
        assert_eq!(coerce(&int, "42", 1), FieldValue::Integer(42));
        assert_eq!(coerce(&int, "4x", 1), FieldValue::Missing);
        assert_eq!(coerce(&int, "", 1), FieldValue::Missing);

        let flag = FieldSpec::optional("b", FieldKind::Bool);
        assert_eq!(coerce(&flag, "Yes", 1), FieldValue::Bool(true));
        assert_eq!(coerce(&flag, "nope", 1), FieldValue::Bool(false));

        let list = FieldSpec::optional("l", FieldKind::List);
        assert_eq!(
            coerce(&list, "a, b", 1),
            FieldValue::List(vec!["a".into(), "b".into()])
        );
    }
}
