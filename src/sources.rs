use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::SourceType;

/// Canonical field a raw export column feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Date,
    Description,
    Amount,
    Check,
    Notes,
    /// Read and thrown away (running balances, addresses).
    Ignore,
}

impl Field {
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Date | Self::Description | Self::Amount)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub raw: String,
    pub field: Field,
}

/// What to do with rows that have blank cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicy {
    /// Any blank mapped cell drops the whole row.
    DropIncomplete,
    /// Blank optional cells are discarded; blank required cells make the
    /// row malformed.
    DiscardOptional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_type: SourceType,
    /// Regex matched against file names in the input directory.
    pub file_pattern: String,
    /// Preamble lines before the header row.
    #[serde(default)]
    pub header_row: usize,
    pub columns: Vec<ColumnMapping>,
    pub row_policy: RowPolicy,
}

impl SourceConfig {
    pub fn pattern(&self) -> Result<Regex> {
        Ok(Regex::new(&self.file_pattern)?)
    }
}

fn mapping(columns: &[(&str, Field)]) -> Vec<ColumnMapping> {
    columns
        .iter()
        .map(|(raw, field)| ColumnMapping {
            raw: raw.to_string(),
            field: *field,
        })
        .collect()
}

pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            source_type: SourceType::Checking,
            file_pattern: r"^stmt.*\.csv$".to_string(),
            header_row: 5,
            columns: mapping(&[
                ("Date", Field::Date),
                ("Description", Field::Description),
                ("Amount", Field::Amount),
                ("Running Bal.", Field::Ignore),
            ]),
            row_policy: RowPolicy::DropIncomplete,
        },
        SourceConfig {
            source_type: SourceType::CreditCard,
            file_pattern: r"_\d{4}.*\.csv$".to_string(),
            header_row: 0,
            columns: mapping(&[
                ("Posted Date", Field::Date),
                ("Reference Number", Field::Check),
                ("Payee", Field::Description),
                ("Address", Field::Ignore),
                ("Amount", Field::Amount),
            ]),
            row_policy: RowPolicy::DiscardOptional,
        },
    ]
}

/// Pair every CSV in `input_dir` with the first source config whose
/// pattern matches its file name. Files nobody claims are skipped.
pub fn discover_inputs<'a>(
    input_dir: &Path,
    sources: &'a [SourceConfig],
) -> Result<Vec<(PathBuf, &'a SourceConfig)>> {
    if !input_dir.exists() {
        return Ok(Vec::new());
    }
    let patterns = sources
        .iter()
        .map(|s| Ok((s.pattern()?, s)))
        .collect::<Result<Vec<_>>>()?;

    let mut paths: Vec<PathBuf> = std::fs::read_dir(input_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut found = Vec::new();
    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match patterns.iter().find(|(re, _)| re.is_match(name)) {
            Some((_, source)) => found.push((path.clone(), *source)),
            None => tracing::debug!(file = %path.display(), "no source config matches, skipping"),
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sources_cover_both_types() {
        let sources = default_sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source_type, SourceType::Checking);
        assert_eq!(sources[1].source_type, SourceType::CreditCard);
        for s in &sources {
            for required in [Field::Date, Field::Description, Field::Amount] {
                assert!(s.columns.iter().any(|c| c.field == required));
            }
        }
    }

    #[test]
    fn test_patterns_match_expected_names() {
        let sources = default_sources();
        assert!(sources[0].pattern().unwrap().is_match("stmt (3).csv"));
        assert!(!sources[0].pattern().unwrap().is_match("March2023_8522.csv"));
        assert!(sources[1].pattern().unwrap().is_match("March2023_8522.csv"));
        assert!(!sources[1].pattern().unwrap().is_match("stmt.csv"));
    }

    #[test]
    fn test_discover_inputs_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["stmt_b.csv", "stmt_a.csv", "Jan_8522.csv", "notes.txt", "other.csv"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        let sources = default_sources();
        let found = discover_inputs(dir.path(), &sources).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|(p, s)| (p.file_name().unwrap().to_str().unwrap().to_string(), s.source_type))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Jan_8522.csv".to_string(), SourceType::CreditCard),
                ("stmt_a.csv".to_string(), SourceType::Checking),
                ("stmt_b.csv".to_string(), SourceType::Checking),
            ]
        );
    }

    #[test]
    fn test_discover_inputs_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let sources = default_sources();
        let found = discover_inputs(&dir.path().join("nope"), &sources).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_source_config_json_roundtrip_names() {
        let json = serde_json::to_string(&default_sources()[1]).unwrap();
        assert!(json.contains("\"discard_optional\""));
        assert!(json.contains("\"CreditCard\""));
    }
}
