//! Admin chess-grid editor.
//!
//! Loads the spreadsheet-backed grid of a complex, lets the operator
//! stage status changes per row and saves them as one batch holding only
//! the rows whose status actually changed.

use regex::Regex;
use serde_json::Value;
use std::fmt::Write as _;
use tracing::{debug, info};

use crate::api::{ComplexApi, GridRecord, StatusUpdate};
use crate::types::{CrmError, CrmResult, UnitStatus};

/// Header names of the columns the editor works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridColumns {
    pub unit: String,
    pub status: String,
    pub block: Option<String>,
    pub floor: Option<String>,
}

impl GridColumns {
    /// Find columns by header name. Unit number and status are required.
    pub fn detect<'a, I>(headers: I) -> CrmResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let unit_re = header_regex(r"(?i)номер\s*помещени")?;
        let status_re = header_regex(r"(?i)статус")?;
        let block_re = header_regex(r"(?i)блок|подъезд")?;
        let floor_re = header_regex(r"(?i)этаж")?;

        let (mut unit, mut status, mut block, mut floor) = (None, None, None, None);
        for header in headers {
            if unit.is_none() && unit_re.is_match(header) {
                unit = Some(header.to_string());
            } else if status.is_none() && status_re.is_match(header) {
                status = Some(header.to_string());
            } else if block.is_none() && block_re.is_match(header) {
                block = Some(header.to_string());
            } else if floor.is_none() && floor_re.is_match(header) {
                floor = Some(header.to_string());
            }
        }

        match (unit, status) {
            (Some(unit), Some(status)) => Ok(Self {
                unit,
                status,
                block,
                floor,
            }),
            (unit, _) => Err(CrmError::Decode {
                endpoint: "/excel/complexes/{jk}/chess".to_string(),
                message: if unit.is_none() {
                    "no unit number column in grid".to_string()
                } else {
                    "no status column in grid".to_string()
                },
            }),
        }
    }
}

fn header_regex(pattern: &str) -> CrmResult<Regex> {
    Regex::new(pattern).map_err(|e| CrmError::Config(format!("bad header pattern {pattern}: {e}")))
}

/// Cell text: strings trimmed, numbers printed, null and missing empty.
pub(crate) fn cell_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridRow {
    pub block: String,
    pub floor: String,
    pub unit: String,
    /// Status as loaded; `None` when the cell held something unrecognised.
    pub loaded: Option<UnitStatus>,
    pub loaded_raw: String,
    pub staged: Option<UnitStatus>,
}

impl GridRow {
    /// The staged status, if it differs from what was loaded.
    pub fn change(&self) -> Option<UnitStatus> {
        self.staged.filter(|s| Some(*s) != self.loaded)
    }
}

pub struct GridEditor {
    complex: String,
    columns: GridColumns,
    rows: Vec<GridRow>,
}

impl GridEditor {
    pub fn from_records(complex: &str, records: &[GridRecord]) -> CrmResult<Self> {
        let Some(first) = records.first() else {
            return Ok(Self {
                complex: complex.to_string(),
                columns: GridColumns {
                    unit: String::new(),
                    status: String::new(),
                    block: None,
                    floor: None,
                },
                rows: Vec::new(),
            });
        };
        let columns = GridColumns::detect(first.keys().map(String::as_str))?;

        let rows = records
            .iter()
            .map(|rec| {
                let raw = cell_text(rec.get(&columns.status));
                GridRow {
                    block: columns
                        .block
                        .as_ref()
                        .map(|c| cell_text(rec.get(c)))
                        .unwrap_or_default(),
                    floor: columns
                        .floor
                        .as_ref()
                        .map(|c| cell_text(rec.get(c)))
                        .unwrap_or_default(),
                    unit: cell_text(rec.get(&columns.unit)),
                    loaded: UnitStatus::parse(&raw),
                    loaded_raw: raw,
                    staged: None,
                }
            })
            .collect();

        Ok(Self {
            complex: complex.to_string(),
            columns,
            rows,
        })
    }

    pub async fn load<A: ComplexApi + ?Sized>(api: &A, complex: &str) -> CrmResult<Self> {
        let records = api.fetch_chess_grid(complex).await?;
        let editor = Self::from_records(complex, &records)?;
        info!(complex, rows = editor.rows.len(), "Chess grid loaded");
        Ok(editor)
    }

    pub fn complex(&self) -> &str {
        &self.complex
    }

    pub fn columns(&self) -> &GridColumns {
        &self.columns
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    /// Index of the row for `unit`, optionally narrowed by block.
    ///
    /// Without a block the unit number must be unique across the grid.
    pub fn find(&self, unit: &str, block: Option<&str>) -> CrmResult<usize> {
        let matches: Vec<usize> = self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.unit == unit && block.map_or(true, |b| r.block == b))
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [index] => Ok(*index),
            [] => Err(CrmError::Validation(format!(
                "unit {unit} not found in {}",
                self.complex
            ))),
            many => {
                let blocks: Vec<&str> = many.iter().map(|&i| self.rows[i].block.as_str()).collect();
                Err(CrmError::Validation(format!(
                    "unit {unit} exists in blocks {}; use BLOCK/UNIT",
                    blocks.join(", ")
                )))
            }
        }
    }

    pub fn stage(&mut self, index: usize, status: UnitStatus) -> CrmResult<()> {
        let row = self
            .rows
            .get_mut(index)
            .ok_or_else(|| CrmError::Validation(format!("no grid row {index}")))?;
        debug!(unit = %row.unit, from = %row.loaded_raw, to = %status, "Status staged");
        row.staged = Some(status);
        Ok(())
    }

    pub fn stage_unit(&mut self, unit: &str, block: Option<&str>, status: UnitStatus) -> CrmResult<()> {
        let index = self.find(unit, block)?;
        self.stage(index, status)
    }

    /// Batch of changed rows, in grid order.
    pub fn pending(&self) -> Vec<StatusUpdate> {
        self.rows
            .iter()
            .filter_map(|row| {
                row.change().map(|status| StatusUpdate {
                    complex_name: self.complex.clone(),
                    block_name: row.block.clone(),
                    floor: row.floor.clone(),
                    apartment_number: row.unit.clone(),
                    new_status: status,
                })
            })
            .collect()
    }

    /// Save staged changes. Returns how many rows were sent; an empty
    /// batch makes no request.
    pub async fn submit<A: ComplexApi + ?Sized>(&mut self, api: &A) -> CrmResult<usize> {
        let updates = self.pending();
        if updates.is_empty() {
            debug!(complex = %self.complex, "No staged changes");
            return Ok(0);
        }

        api.save_chess_grid(&self.complex, &updates).await?;

        for row in &mut self.rows {
            if let Some(status) = row.staged.take() {
                row.loaded = Some(status);
                row.loaded_raw = status.to_string();
            }
        }
        info!(complex = %self.complex, count = updates.len(), "Chess grid saved");
        Ok(updates.len())
    }

    /// Plain-text table; staged changes are marked with `*`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<10} {:<6} {:<10} {}", "Блок", "Этаж", "Номер", "Статус");
        for row in &self.rows {
            let status = match row.change() {
                Some(s) => format!("{s} *"),
                None => row
                    .loaded
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| row.loaded_raw.clone()),
            };
            let _ = writeln!(out, "{:<10} {:<6} {:<10} {}", row.block, row.floor, row.unit, status);
        }
        out
    }
}
