/// Gridbase Column Implementation
///
/// A Column describes one typed field of a table. Every cell written under a
/// column carries a `CellValue` whose variant matches the column's type.
///
/// Display order is the column `position`; equal positions fall back to
/// creation order, which is the order columns are stored in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GridError, Result};

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Text,
    Number,
}

impl ColumnType {
    /// Parse raw user input into a cell value of this type.
    ///
    /// TEXT input is passed through untouched. NUMBER input is trimmed and
    /// parsed as a float; empty or unparseable input becomes a null number
    /// rather than an error.
    pub fn parse_input(&self, input: &str) -> CellValue {
        match self {
            ColumnType::Text => CellValue::Text(input.to_string()),
            ColumnType::Number => {
                let trimmed = input.trim();
                if trimmed.is_empty() {
                    return CellValue::Number(None);
                }
                CellValue::Number(trimmed.parse::<f64>().ok().filter(|n| n.is_finite()))
            }
        }
    }

    /// The value a cell of this type shows before it is ever written.
    pub fn empty_value(&self) -> CellValue {
        match self {
            ColumnType::Text => CellValue::Text(String::new()),
            ColumnType::Number => CellValue::Number(None),
        }
    }
}

/// Cell value, tagged by the type of the owning column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "UPPERCASE")]
pub enum CellValue {
    Text(String),
    Number(Option<f64>),
}

impl CellValue {
    pub fn column_type(&self) -> ColumnType {
        match self {
            CellValue::Text(_) => ColumnType::Text,
            CellValue::Number(_) => ColumnType::Number,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(v) => *v,
            _ => None,
        }
    }

    /// Null number or blank text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Text(v) => v.trim().is_empty(),
            CellValue::Number(v) => v.is_none(),
        }
    }

    /// Text shown in the grid and staged into the edit buffer.
    pub fn display_text(&self) -> String {
        match self {
            CellValue::Text(v) => v.clone(),
            CellValue::Number(Some(n)) => n.to_string(),
            CellValue::Number(None) => String::new(),
        }
    }

    /// Convert a value to another column type, used when a column changes type.
    pub fn convert_to(&self, target: ColumnType) -> CellValue {
        if self.column_type() == target {
            return self.clone();
        }
        target.parse_input(&self.display_text())
    }
}

/// Column metadata owned by a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: Uuid,
    pub table_id: Uuid,
    pub name: String,
    pub column_type: ColumnType,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl Column {
    pub fn new(table_id: Uuid, name: &str, column_type: ColumnType, position: i32) -> Result<Self> {
        let name = validate_name("Column", name)?;
        Ok(Column {
            id: Uuid::new_v4(),
            table_id,
            name,
            column_type,
            position,
            created_at: Utc::now(),
        })
    }

    /// Validate a value against this column's type
    pub fn validate_value(&self, value: &CellValue) -> Result<()> {
        if value.column_type() != self.column_type {
            return Err(GridError::TypeMismatch {
                expected: self.column_type,
                found: value.column_type(),
            });
        }
        Ok(())
    }
}

/// Partial column update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnEdit {
    pub name: Option<String>,
    pub column_type: Option<ColumnType>,
    pub position: Option<i32>,
}

/// Sort columns into display order. The sort is stable so equal positions keep
/// creation order.
pub fn display_order(columns: &mut [Column]) {
    columns.sort_by_key(|c| c.position);
}

pub(crate) fn validate_name(kind: &'static str, name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(GridError::EmptyName(kind));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_input() {
        assert_eq!(ColumnType::Number.parse_input(" 42.5 "), CellValue::Number(Some(42.5)));
        assert_eq!(ColumnType::Number.parse_input(""), CellValue::Number(None));
        assert_eq!(ColumnType::Number.parse_input("abc"), CellValue::Number(None));
        assert_eq!(ColumnType::Number.parse_input("NaN"), CellValue::Number(None));
    }

    #[test]
    fn test_parse_text_passthrough() {
        assert_eq!(
            ColumnType::Text.parse_input("  spaced  "),
            CellValue::Text("  spaced  ".to_string())
        );
    }

    #[test]
    fn test_display_text() {
        assert_eq!(CellValue::Number(Some(5.0)).display_text(), "5");
        assert_eq!(CellValue::Number(Some(2.5)).display_text(), "2.5");
        assert_eq!(CellValue::Number(None).display_text(), "");
    }

    #[test]
    fn test_convert_between_types() {
        let text = CellValue::Text("17".to_string());
        assert_eq!(text.convert_to(ColumnType::Number), CellValue::Number(Some(17.0)));

        let word = CellValue::Text("seventeen".to_string());
        assert_eq!(word.convert_to(ColumnType::Number), CellValue::Number(None));

        let number = CellValue::Number(Some(3.0));
        assert_eq!(number.convert_to(ColumnType::Text), CellValue::Text("3".to_string()));
    }

    #[test]
    fn test_validate_value_type() {
        let col = Column::new(Uuid::new_v4(), "Amount", ColumnType::Number, 0).unwrap();
        assert!(col.validate_value(&CellValue::Number(None)).is_ok());
        assert!(matches!(
            col.validate_value(&CellValue::Text("x".to_string())),
            Err(GridError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(matches!(
            Column::new(Uuid::new_v4(), "   ", ColumnType::Text, 0),
            Err(GridError::EmptyName("Column"))
        ));
    }

    #[test]
    fn test_display_order_ties_keep_creation_order() {
        let table = Uuid::new_v4();
        let mut cols = vec![
            Column::new(table, "b", ColumnType::Text, 1).unwrap(),
            Column::new(table, "a", ColumnType::Text, 0).unwrap(),
            Column::new(table, "c", ColumnType::Text, 1).unwrap(),
        ];
        display_order(&mut cols);
        let names: Vec<&str> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cell_value_wire_format() {
        let json = serde_json::to_string(&CellValue::Number(Some(1.5))).unwrap();
        assert_eq!(json, r#"{"type":"NUMBER","value":1.5}"#);
        let back: CellValue = serde_json::from_str(r#"{"type":"TEXT","value":"hi"}"#).unwrap();
        assert_eq!(back, CellValue::Text("hi".to_string()));
    }
}
