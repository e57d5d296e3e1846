//! CSV client import
//!
//! Parses an uploaded CSV into client drafts. Rows without an email are
//! skipped (short records count as missing the trailing cells), records the
//! reader cannot parse or that carry extra cells are counted as errors with their
//! line numbers, and everything else becomes one draft row for a single bulk
//! insert.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use coachdeck_api::{ApiError, Result, Row};

/// Client column an external header can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientField {
    Email,
    Name,
    Phone,
    Tags,
}

impl ClientField {
    fn column(&self) -> &'static str {
        match self {
            ClientField::Email => "email",
            ClientField::Name => "name",
            ClientField::Phone => "phone",
            ClientField::Tags => "tags",
        }
    }
}

impl fmt::Display for ClientField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for ClientField {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(ClientField::Email),
            "name" => Ok(ClientField::Name),
            "phone" => Ok(ClientField::Phone),
            "tags" => Ok(ClientField::Tags),
            other => Err(ApiError::invalid_input(format!(
                "unknown client field '{other}'"
            ))),
        }
    }
}

/// Maps CSV header names (case-insensitive, trimmed) to client fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    headers: HashMap<String, ClientField>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        let mut mapping = Self::empty();
        for header in ["email", "e-mail", "email address"] {
            mapping = mapping.with(header, ClientField::Email);
        }
        for header in ["name", "full name", "first name"] {
            mapping = mapping.with(header, ClientField::Name);
        }
        for header in ["phone", "phone number", "mobile"] {
            mapping = mapping.with(header, ClientField::Phone);
        }
        for header in ["tags", "labels"] {
            mapping = mapping.with(header, ClientField::Tags);
        }
        mapping
    }
}

impl ColumnMapping {
    pub fn empty() -> Self {
        Self {
            headers: HashMap::new(),
        }
    }

    pub fn with(mut self, header: &str, field: ClientField) -> Self {
        self.headers.insert(normalize(header), field);
        self
    }

    /// Parse a `header=field` override, as given on the command line.
    pub fn with_override(self, spec: &str) -> Result<Self> {
        let (header, field) = spec.split_once('=').ok_or_else(|| {
            ApiError::invalid_input(format!("expected header=field, got '{spec}'"))
        })?;
        Ok(self.with(header, field.parse()?))
    }

    pub fn field_for(&self, header: &str) -> Option<ClientField> {
        self.headers.get(&normalize(header)).copied()
    }
}

fn normalize(header: &str) -> String {
    header.trim().to_lowercase()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub errors: usize,
    /// 1-based line numbers of the records that failed to parse
    pub error_lines: Vec<u64>,
}

/// Drafts ready for insert, plus what was left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedImport {
    pub drafts: Vec<Row>,
    pub skipped: usize,
    pub errors: usize,
    pub error_lines: Vec<u64>,
}

impl ParsedImport {
    pub fn summary(&self, imported: usize) -> ImportSummary {
        ImportSummary {
            imported,
            skipped: self.skipped,
            errors: self.errors,
            error_lines: self.error_lines.clone(),
        }
    }
}

pub fn parse_clients(bytes: &[u8], mapping: &ColumnMapping) -> Result<ParsedImport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let columns: Vec<Option<ClientField>> = reader
        .headers()
        .map_err(|e| ApiError::invalid_input(format!("unreadable header row: {e}")))?
        .iter()
        .map(|header| mapping.field_for(header))
        .collect();
    if !columns.contains(&Some(ClientField::Email)) {
        return Err(ApiError::invalid_input("no column maps to email"));
    }

    let mut parsed = ParsedImport::default();
    for (index, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                // Header is line 1
                let line = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(index as u64 + 2);
                parsed.errors += 1;
                parsed.error_lines.push(line);
                continue;
            }
        };

        // Short records are padded with empty cells; extra cells have no column
        if record.len() > columns.len() {
            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(index as u64 + 2);
            parsed.errors += 1;
            parsed.error_lines.push(line);
            continue;
        }

        let mut draft = Row::new();
        let mut tags: Vec<String> = Vec::new();
        for (value, field) in record.iter().zip(&columns) {
            let Some(field) = field else { continue };
            match field {
                ClientField::Tags => tags.extend(split_tags(value)),
                // First non-empty cell wins when several headers map to one field
                _ if value.is_empty() || draft.contains_key(field.column()) => {}
                ClientField::Email => {
                    draft.insert(
                        field.column().to_string(),
                        Value::String(value.to_lowercase()),
                    );
                }
                other => {
                    draft.insert(other.column().to_string(), Value::String(value.to_string()));
                }
            }
        }

        let has_email = draft
            .get("email")
            .and_then(Value::as_str)
            .is_some_and(|email| !email.is_empty());
        if !has_email {
            parsed.skipped += 1;
            continue;
        }

        let mut seen = HashSet::new();
        tags.retain(|tag| seen.insert(tag.clone()));
        draft.insert(
            "tags".to_string(),
            Value::Array(tags.into_iter().map(Value::String).collect()),
        );
        parsed.drafts.push(draft);
    }

    Ok(parsed)
}

fn split_tags(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split([',', ';', '|'])
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_with_missing_emails() -> String {
        let mut csv = String::from("Email,Full Name,Tags\n");
        for i in 0..10 {
            if i == 3 || i == 7 {
                csv.push_str(&format!(",No Email {i},vip\n"));
            } else {
                csv.push_str(&format!("client{i}@example.com,Client {i},\"vip; 2026|\"\n"));
            }
        }
        csv
    }

    #[test]
    fn test_rows_without_email_are_skipped() {
        let parsed = parse_clients(csv_with_missing_emails().as_bytes(), &ColumnMapping::default())
            .unwrap();
        let summary = parsed.summary(parsed.drafts.len());
        assert_eq!(summary.imported, 8);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.errors, 0);

        let first = &parsed.drafts[0];
        assert_eq!(first["email"], "client0@example.com");
        assert_eq!(first["name"], "Client 0");
        assert_eq!(first["tags"], serde_json::json!(["vip", "2026"]));
    }

    #[test]
    fn test_short_rows_missing_trailing_email_are_skipped() {
        let mut csv = String::from("name,email\n");
        for i in 0..10 {
            if i == 2 || i == 6 {
                csv.push_str(&format!("No Email {i}\n"));
            } else {
                csv.push_str(&format!("Client {i},client{i}@example.com\n"));
            }
        }
        let parsed = parse_clients(csv.as_bytes(), &ColumnMapping::default()).unwrap();
        let summary = parsed.summary(parsed.drafts.len());
        assert_eq!((summary.imported, summary.skipped, summary.errors), (8, 2, 0));
    }

    #[test]
    fn test_first_non_empty_alias_wins() {
        let csv = "Email,E-mail,Name,Full Name\nada@example.com,,Ada,\n,bo@example.com,,Bo B\n";
        let parsed = parse_clients(csv.as_bytes(), &ColumnMapping::default()).unwrap();
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.drafts.len(), 2);
        assert_eq!(parsed.drafts[0]["email"], "ada@example.com");
        assert_eq!(parsed.drafts[0]["name"], "Ada");
        assert_eq!(parsed.drafts[1]["email"], "bo@example.com");
        assert_eq!(parsed.drafts[1]["name"], "Bo B");
    }

    #[test]
    fn test_repeated_tags_keep_first_occurrence() {
        let csv = "email,tags\nada@example.com,\"vip;x;vip|x;new\"\n";
        let parsed = parse_clients(csv.as_bytes(), &ColumnMapping::default()).unwrap();
        assert_eq!(parsed.drafts[0]["tags"], serde_json::json!(["vip", "x", "new"]));
    }

    #[test]
    fn test_records_with_extra_cells_are_errors_with_lines() {
        let csv = "email,name\na@example.com,A\nb@example.com,B,extra\nc@example.com,C\n";
        let parsed = parse_clients(csv.as_bytes(), &ColumnMapping::default()).unwrap();
        assert_eq!(parsed.drafts.len(), 2);
        assert_eq!(parsed.errors, 1);
        assert_eq!(parsed.error_lines, vec![3]);
    }

    #[test]
    fn test_custom_mapping_and_ignored_columns() {
        let mapping = ColumnMapping::empty()
            .with_override("Contact=email")
            .unwrap()
            .with("Cell", ClientField::Phone);
        let csv = "Contact,Cell,Favourite Colour\n  Ada@Example.com ,555-1234,green\n";
        let parsed = parse_clients(csv.as_bytes(), &mapping).unwrap();
        assert_eq!(parsed.drafts.len(), 1);
        let draft = &parsed.drafts[0];
        assert_eq!(draft["email"], "ada@example.com");
        assert_eq!(draft["phone"], "555-1234");
        assert!(!draft.contains_key("Favourite Colour"));
    }

    #[test]
    fn test_missing_email_column_is_rejected() {
        let err = parse_clients(b"name,phone\nA,1\n", &ColumnMapping::default()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput { .. }));
        assert!("bogus".parse::<ClientField>().is_err());
        assert!(ColumnMapping::default().with_override("no-equals").is_err());
    }
}
