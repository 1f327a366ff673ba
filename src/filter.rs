//! Filter and sort descriptors for row queries.
//!
//! Filter conditions are AND-combined in declaration order. Sort criteria form
//! a lexicographic ordering where the first criterion is primary.
//!
//! Conditions are compiled against the table's columns once per query so the
//! per-row check does no column lookups and no repeated value parsing.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::column::{CellValue, Column, ColumnType};
use crate::error::{GridError, Result};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    #[serde(alias = "is", alias = "=")]
    Equals,
    #[serde(alias = "is not", alias = "!=")]
    NotEquals,
    Contains,
    #[serde(alias = "does not contain")]
    NotContains,
    #[serde(alias = "is empty")]
    IsEmpty,
    #[serde(alias = "is not empty")]
    IsNotEmpty,
    #[serde(alias = ">")]
    GreaterThan,
    #[serde(alias = "<")]
    LessThan,
}

impl FilterOperator {
    /// Operators that ignore the comparison value
    pub fn is_unary(&self) -> bool {
        matches!(self, FilterOperator::IsEmpty | FilterOperator::IsNotEmpty)
    }
}

impl FromStr for FilterOperator {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "is" | "=" | "equals" => Ok(FilterOperator::Equals),
            "is not" | "!=" | "not_equals" => Ok(FilterOperator::NotEquals),
            "contains" => Ok(FilterOperator::Contains),
            "does not contain" | "not_contains" => Ok(FilterOperator::NotContains),
            "is empty" | "is_empty" => Ok(FilterOperator::IsEmpty),
            "is not empty" | "is_not_empty" => Ok(FilterOperator::IsNotEmpty),
            ">" | "greater_than" => Ok(FilterOperator::GreaterThan),
            "<" | "less_than" => Ok(FilterOperator::LessThan),
            other => Err(format!("Unknown filter operator: '{}'", other)),
        }
    }
}

/// A single filter condition on one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub column_id: Uuid,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
}

impl FilterCondition {
    pub fn new(column_id: Uuid, operator: FilterOperator, value: impl Into<String>) -> Self {
        FilterCondition {
            column_id,
            operator,
            value: value.into(),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A single sort criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortCriterion {
    pub column_id: Uuid,
    pub direction: SortDirection,
}

impl SortCriterion {
    pub fn ascending(column_id: Uuid) -> Self {
        SortCriterion {
            column_id,
            direction: SortDirection::Asc,
        }
    }

    pub fn descending(column_id: Uuid) -> Self {
        SortCriterion {
            column_id,
            direction: SortDirection::Desc,
        }
    }
}

/// A filter condition resolved against its column
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    column_id: Uuid,
    column_type: ColumnType,
    operator: FilterOperator,
    text: String,
    needle: String,
    number: Option<f64>,
}

impl CompiledFilter {
    pub fn compile(condition: &FilterCondition, columns: &HashMap<Uuid, &Column>) -> Result<Self> {
        let column = columns
            .get(&condition.column_id)
            .ok_or(GridError::ColumnNotFound(condition.column_id))?;
        Ok(CompiledFilter {
            column_id: condition.column_id,
            column_type: column.column_type,
            operator: condition.operator,
            text: condition.value.clone(),
            needle: condition.value.to_lowercase(),
            number: condition.value.trim().parse::<f64>().ok(),
        })
    }

    pub fn compile_all(conditions: &[FilterCondition], columns: &[Column]) -> Result<Vec<Self>> {
        let by_id: HashMap<Uuid, &Column> = columns.iter().map(|c| (c.id, c)).collect();
        conditions.iter().map(|c| Self::compile(c, &by_id)).collect()
    }

    pub fn column_id(&self) -> Uuid {
        self.column_id
    }

    /// Evaluate the condition against a row's cell for this column.
    /// A row without a cell for the column is treated as empty.
    pub fn matches(&self, cell: Option<&CellValue>) -> bool {
        match self.operator {
            FilterOperator::Equals => self.equals(cell),
            FilterOperator::NotEquals => !self.equals(cell),
            FilterOperator::Contains => self.contains(cell),
            FilterOperator::NotContains => !self.contains(cell),
            FilterOperator::IsEmpty => cell.map_or(true, CellValue::is_blank),
            FilterOperator::IsNotEmpty => !cell.map_or(true, CellValue::is_blank),
            FilterOperator::GreaterThan => self.numeric(cell).map_or(false, |(v, n)| v > n),
            FilterOperator::LessThan => self.numeric(cell).map_or(false, |(v, n)| v < n),
        }
    }

    fn equals(&self, cell: Option<&CellValue>) -> bool {
        match (self.column_type, cell) {
            (ColumnType::Text, Some(CellValue::Text(v))) => *v == self.text,
            (ColumnType::Number, Some(CellValue::Number(Some(v)))) => self.number == Some(*v),
            _ => false,
        }
    }

    fn contains(&self, cell: Option<&CellValue>) -> bool {
        match cell {
            Some(CellValue::Text(v)) => v.to_lowercase().contains(&self.needle),
            _ => false,
        }
    }

    fn numeric(&self, cell: Option<&CellValue>) -> Option<(f64, f64)> {
        let value = cell.and_then(CellValue::as_number)?;
        Some((value, self.number?))
    }
}

/// Compare two cells for sorting.
///
/// Two present numbers compare numerically. Anything else compares as
/// lower-cased display text, where a missing cell or null number is "".
pub fn compare_cells(a: Option<&CellValue>, b: Option<&CellValue>) -> Ordering {
    if let (Some(x), Some(y)) = (a.and_then(CellValue::as_number), b.and_then(CellValue::as_number)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    let key = |cell: Option<&CellValue>| cell.map(|c| c.display_text().to_lowercase()).unwrap_or_default();
    key(a).cmp(&key(b))
}

/// Lexicographic comparison over sort criteria, first criterion primary.
pub fn compare_by<'a, 'b, A, B>(criteria: &[SortCriterion], cell_a: A, cell_b: B) -> Ordering
where
    A: Fn(Uuid) -> Option<&'a CellValue>,
    B: Fn(Uuid) -> Option<&'b CellValue>,
{
    for criterion in criteria {
        let cmp = compare_cells(cell_a(criterion.column_id), cell_b(criterion.column_id));
        let cmp = match criterion.direction {
            SortDirection::Asc => cmp,
            SortDirection::Desc => cmp.reverse(),
        };
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}
