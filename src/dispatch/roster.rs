//! Call-center roster import from back-office CSV exports.
//!
//! Operations exports the executive roster as a CSV with the columns
//! `id,name,phone,accepts,active`; `accepts` carries a lead-type label and
//! `active` a yes/no flag. The importer builds [`Executive`] records ready
//! to seed an executive pool.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use super::{Executive, LeadType};

#[derive(Debug)]
pub enum RosterImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    UnknownLeadType { row: usize, value: String },
}

impl std::fmt::Display for RosterImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RosterImportError::Io(err) => write!(f, "failed to read roster export: {}", err),
            RosterImportError::Csv(err) => write!(f, "invalid roster CSV data: {}", err),
            RosterImportError::UnknownLeadType { row, value } => {
                write!(f, "row {}: unknown lead type '{}'", row, value)
            }
        }
    }
}

impl std::error::Error for RosterImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RosterImportError::Io(err) => Some(err),
            RosterImportError::Csv(err) => Some(err),
            RosterImportError::UnknownLeadType { .. } => None,
        }
    }
}

impl From<std::io::Error> for RosterImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for RosterImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

#[derive(Debug, Deserialize)]
struct RosterRow {
    id: String,
    name: String,
    phone: String,
    accepts: String,
    #[serde(default)]
    active: Option<String>,
}

fn parse_lead_type(value: &str) -> Option<LeadType> {
    match value.trim().to_ascii_lowercase().as_str() {
        "agent" => Some(LeadType::Agent),
        "customer" => Some(LeadType::Customer),
        "property" => Some(LeadType::Property),
        _ => None,
    }
}

fn parse_active(value: Option<&str>) -> bool {
    match value {
        // Missing column means the executive is on the active roster.
        None => true,
        Some(raw) => matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "y" | "yes" | "true" | "active"
        ),
    }
}

pub struct RosterImporter;

impl RosterImporter {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Vec<Executive>, RosterImportError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<Executive>, RosterImportError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut executives = Vec::new();
        for (index, record) in csv_reader.deserialize::<RosterRow>().enumerate() {
            let row = record?;
            let accepts = parse_lead_type(&row.accepts).ok_or_else(|| {
                RosterImportError::UnknownLeadType {
                    row: index + 1,
                    value: row.accepts.clone(),
                }
            })?;

            let mut executive = Executive::new(&row.id, &row.name, &row.phone, accepts);
            executive.active = parse_active(row.active.as_deref());
            executives.push(executive);
        }

        Ok(executives)
    }
}
