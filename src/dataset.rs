use anyhow::{Context, Result};
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

/// In-memory table loaded once from a CSV file. Read-only after load.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, rejecting rows whose width differs from the header.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if headers.is_empty() {
            anyhow::bail!("Table has no columns");
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != headers.len()) {
            anyhow::bail!(
                "Row {} has {} fields, expected {}",
                i + 1,
                row.len(),
                headers.len()
            );
        }
        Ok(Self { headers, rows })
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open dataset {}", path.display()))?;
        Self::from_csv_reader(reader)
            .with_context(|| format!("Failed to load dataset {}", path.display()))
    }

    #[cfg(test)]
    pub fn from_csv_str(data: &str) -> Result<Self> {
        Self::from_csv_reader(csv::Reader::from_reader(data.as_bytes()))
    }

    fn from_csv_reader<R: std::io::Read>(mut reader: csv::Reader<R>) -> Result<Self> {
        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("Malformed CSV record")?;
            rows.push(record.iter().map(|f| f.to_string()).collect());
        }

        Self::new(headers, rows)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[cfg(test)]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Index of a column, matched case-insensitively.
    fn column_index(&self, name: &str) -> Result<usize, QueryError> {
        self.headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| QueryError::UnknownColumn(name.to_string()))
    }

    /// First `n` rows as a new table.
    pub fn head(&self, n: usize) -> Table {
        Table {
            headers: self.headers.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Run a structured query against the table.
    pub fn execute(&self, query: &TableQuery) -> Result<QueryOutcome, QueryError> {
        let selected = self.filter_rows(query.filters())?;

        match query {
            TableQuery::Count { .. } => Ok(QueryOutcome::Count(selected.len())),
            TableQuery::Sum { column, .. } => {
                let values = self.numeric_values(&selected, column)?;
                Ok(QueryOutcome::Number(values.iter().sum()))
            }
            TableQuery::Mean { column, .. } => {
                let values = self.numeric_values(&selected, column)?;
                if values.is_empty() {
                    return Err(QueryError::EmptySelection(column.clone()));
                }
                Ok(QueryOutcome::Number(values.iter().sum::<f64>() / values.len() as f64))
            }
            TableQuery::Min { column, .. } => {
                let values = self.numeric_values(&selected, column)?;
                values
                    .into_iter()
                    .reduce(f64::min)
                    .map(QueryOutcome::Number)
                    .ok_or_else(|| QueryError::EmptySelection(column.clone()))
            }
            TableQuery::Max { column, .. } => {
                let values = self.numeric_values(&selected, column)?;
                values
                    .into_iter()
                    .reduce(f64::max)
                    .map(QueryOutcome::Number)
                    .ok_or_else(|| QueryError::EmptySelection(column.clone()))
            }
            TableQuery::Lookup { columns, limit, .. } => {
                let rows: Vec<&Vec<String>> = match limit {
                    Some(n) => selected.into_iter().take(*n).collect(),
                    None => selected,
                };
                self.project(&rows, columns).map(QueryOutcome::Rows)
            }
            TableQuery::Top {
                column,
                descending,
                limit,
                columns,
                ..
            } => {
                let idx = self.column_index(column)?;
                let mut keyed = Vec::with_capacity(selected.len());
                for row in selected {
                    let cell = row[idx].trim();
                    if cell.is_empty() {
                        continue;
                    }
                    let value = parse_number(cell)
                        .ok_or_else(|| QueryError::NotNumeric(column.clone(), cell.to_string()))?;
                    keyed.push((value, row));
                }
                keyed.sort_by(|a, b| {
                    let ord = a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal);
                    if *descending { ord.reverse() } else { ord }
                });
                let rows: Vec<&Vec<String>> = keyed.into_iter().take(*limit).map(|(_, r)| r).collect();
                self.project(&rows, columns).map(QueryOutcome::Rows)
            }
        }
    }

    fn filter_rows(&self, filters: &[Filter]) -> Result<Vec<&Vec<String>>, QueryError> {
        let resolved = filters
            .iter()
            .map(|f| self.column_index(&f.column).map(|idx| (idx, f)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self
            .rows
            .iter()
            .filter(|row| resolved.iter().all(|(idx, f)| f.matches(&row[*idx])))
            .collect())
    }

    /// Numeric cells of `column`; blank cells are skipped, other non-numbers are an error.
    fn numeric_values(&self, rows: &[&Vec<String>], column: &str) -> Result<Vec<f64>, QueryError> {
        let idx = self.column_index(column)?;
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            let cell = row[idx].trim();
            if cell.is_empty() {
                continue;
            }
            let value = parse_number(cell)
                .ok_or_else(|| QueryError::NotNumeric(column.to_string(), cell.to_string()))?;
            values.push(value);
        }
        Ok(values)
    }

    fn project(&self, rows: &[&Vec<String>], columns: &[String]) -> Result<Table, QueryError> {
        if columns.is_empty() {
            return Ok(Table {
                headers: self.headers.clone(),
                rows: rows.iter().map(|r| (*r).clone()).collect(),
            });
        }

        let indices = columns
            .iter()
            .map(|c| self.column_index(c))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Table {
            headers: indices.iter().map(|&i| self.headers[i].clone()).collect(),
            rows: rows
                .iter()
                .map(|r| indices.iter().map(|&i| r[i].clone()).collect())
                .collect(),
        })
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.headers.join(" | "))?;
        for row in &self.rows {
            writeln!(f, "{}", row.join(" | "))?;
        }
        Ok(())
    }
}

/// Parse a cell as a number, ignoring thousands separators and a trailing `%`.
pub fn parse_number(cell: &str) -> Option<f64> {
    let cleaned: String = cell.trim().trim_end_matches('%').chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Render a number: integral values without a fraction, others with up to 4 decimals.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let s = format!("{:.4}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum QueryError {
    #[error("Unknown column: {0}")]
    UnknownColumn(String),
    #[error("Column {0} has a non-numeric value: {1:?}")]
    NotNumeric(String, String),
    #[error("No numeric values in column {0} for the selected rows")]
    EmptySelection(String),
}

/// Structured query produced by the model for the tabular tool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum TableQuery {
    Count {
        #[serde(default)]
        filters: Vec<Filter>,
    },
    Sum {
        column: String,
        #[serde(default)]
        filters: Vec<Filter>,
    },
    Mean {
        column: String,
        #[serde(default)]
        filters: Vec<Filter>,
    },
    Min {
        column: String,
        #[serde(default)]
        filters: Vec<Filter>,
    },
    Max {
        column: String,
        #[serde(default)]
        filters: Vec<Filter>,
    },
    Lookup {
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default)]
        filters: Vec<Filter>,
        #[serde(default)]
        limit: Option<usize>,
    },
    Top {
        column: String,
        #[serde(default = "default_descending")]
        descending: bool,
        #[serde(default = "default_top_limit")]
        limit: usize,
        #[serde(default)]
        columns: Vec<String>,
        #[serde(default)]
        filters: Vec<Filter>,
    },
}

fn default_descending() -> bool {
    true
}

fn default_top_limit() -> usize {
    5
}

impl TableQuery {
    pub fn filters(&self) -> &[Filter] {
        match self {
            TableQuery::Count { filters }
            | TableQuery::Sum { filters, .. }
            | TableQuery::Mean { filters, .. }
            | TableQuery::Min { filters, .. }
            | TableQuery::Max { filters, .. }
            | TableQuery::Lookup { filters, .. }
            | TableQuery::Top { filters, .. } => filters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
}

impl Filter {
    fn matches(&self, cell: &str) -> bool {
        let wanted = match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        if self.op == FilterOp::Contains {
            return cell.to_lowercase().contains(&wanted.to_lowercase());
        }

        let ordering = match (parse_number(cell), parse_number(&wanted)) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => match self.op {
                FilterOp::Eq | FilterOp::Ne => {
                    Some(cell.trim().to_lowercase().cmp(&wanted.trim().to_lowercase()))
                }
                // Ordering comparisons need numbers on both sides.
                _ => None,
            },
        };

        match (self.op, ordering) {
            (FilterOp::Eq, Some(o)) => o == Ordering::Equal,
            (FilterOp::Ne, Some(o)) => o != Ordering::Equal,
            (FilterOp::Gt, Some(o)) => o == Ordering::Greater,
            (FilterOp::Ge, Some(o)) => o != Ordering::Less,
            (FilterOp::Lt, Some(o)) => o == Ordering::Less,
            (FilterOp::Le, Some(o)) => o != Ordering::Greater,
            _ => false,
        }
    }
}

/// Raw result of a table query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Count(usize),
    Number(f64),
    Rows(Table),
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOutcome::Count(n) => write!(f, "{}", n),
            QueryOutcome::Number(v) => write!(f, "{}", format_number(*v)),
            QueryOutcome::Rows(table) if table.row_count() == 0 => write!(f, "No matching rows"),
            QueryOutcome::Rows(table) => write!(f, "{}", table.to_string().trim_end()),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const POPULATION_CSV: &str = "\
Country,Population,Density,UrbanPop%
India,\"1,428,627,663\",481,36%
China,1425671352,152,65%
United States,339996563,37,83%
Indonesia,277534122,153,59%
Canada,38781291,4,82%
";

    pub(crate) fn population() -> Table {
        Table::from_csv_str(POPULATION_CSV).unwrap()
    }

    fn query(json: &str) -> TableQuery {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_load_population_csv() {
        let table = population();
        assert_eq!(table.row_count(), 5);
        assert_eq!(table.headers()[1], "Population");
        assert_eq!(table.rows()[0][1], "1,428,627,663");
    }

    #[test]
    fn test_ragged_csv_is_rejected() {
        let err = Table::from_csv_str("a,b\n1,2\n3\n").unwrap_err();
        assert!(format!("{:#}", err).contains("Malformed CSV record"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(Table::from_csv_path("does/not/exist.csv").is_err());
    }

    #[test]
    fn test_count_all_rows() {
        let outcome = population().execute(&query(r#"{"operation":"count"}"#)).unwrap();
        assert_eq!(outcome, QueryOutcome::Count(5));
        assert_eq!(outcome.to_string(), "5");
    }

    #[test]
    fn test_sum_population() {
        let outcome = population()
            .execute(&query(r#"{"operation":"sum","column":"Population"}"#))
            .unwrap();
        let expected = 1_428_627_663u64 + 1_425_671_352 + 339_996_563 + 277_534_122 + 38_781_291;
        assert_eq!(outcome.to_string(), expected.to_string());
    }

    #[test]
    fn test_filtered_lookup_is_case_insensitive() {
        let outcome = population()
            .execute(&query(
                r#"{"operation":"lookup","columns":["population"],"filters":[{"column":"country","op":"eq","value":"canada"}]}"#,
            ))
            .unwrap();
        match outcome {
            QueryOutcome::Rows(table) => {
                assert_eq!(table.headers(), &["Population".to_string()]);
                assert_eq!(table.rows(), &[vec!["38781291".to_string()]]);
            }
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_numeric_filter_and_mean() {
        let outcome = population()
            .execute(&query(
                r#"{"operation":"mean","column":"UrbanPop%","filters":[{"column":"Density","op":"lt","value":200}]}"#,
            ))
            .unwrap();
        // China 65, United States 83, Indonesia 59, Canada 82
        assert_eq!(outcome.to_string(), "72.25");
    }

    #[test]
    fn test_top_sorts_descending_by_default() {
        let outcome = population()
            .execute(&query(r#"{"operation":"top","column":"Density","limit":2,"columns":["Country"]}"#))
            .unwrap();
        assert_eq!(outcome.to_string(), "Country\nIndia\nIndonesia");
    }

    #[test]
    fn test_blank_cells_skipped_by_numeric_operations() {
        let table = Table::from_csv_str("Country,Migrants\nA,10\nB,\nC,30\n").unwrap();

        let top = table
            .execute(&query(r#"{"operation":"top","column":"Migrants","columns":["Country"]}"#))
            .unwrap();
        assert_eq!(top.to_string(), "Country\nC\nA");

        let sum = table.execute(&query(r#"{"operation":"sum","column":"Migrants"}"#)).unwrap();
        assert_eq!(sum.to_string(), "40");
    }

    #[test]
    fn test_unknown_column() {
        let err = population()
            .execute(&query(r#"{"operation":"sum","column":"GDP"}"#))
            .unwrap_err();
        assert_eq!(err, QueryError::UnknownColumn("GDP".to_string()));
    }

    #[test]
    fn test_sum_over_text_column_fails() {
        let err = population()
            .execute(&query(r#"{"operation":"sum","column":"Country"}"#))
            .unwrap_err();
        assert!(matches!(err, QueryError::NotNumeric(_, _)));
    }

    #[test]
    fn test_max_of_empty_selection() {
        let err = population()
            .execute(&query(
                r#"{"operation":"max","column":"Population","filters":[{"column":"Country","op":"eq","value":"Atlantis"}]}"#,
            ))
            .unwrap_err();
        assert_eq!(err, QueryError::EmptySelection("Population".to_string()));
    }

    #[test]
    fn test_empty_lookup_renders_message() {
        let outcome = population()
            .execute(&query(
                r#"{"operation":"lookup","filters":[{"column":"Country","op":"contains","value":"land"}]}"#,
            ))
            .unwrap();
        assert_eq!(outcome.to_string(), "No matching rows");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(1.0 / 3.0), "0.3333");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("1,000"), Some(1000.0));
        assert_eq!(parse_number(" 36% "), Some(36.0));
        assert_eq!(parse_number("N.A."), None);
        assert_eq!(parse_number(""), None);
    }
}
