//! Sales chess board (shaxmatka) of a complex.
//!
//! The backend sends positional rows:
//! `[block, unit_type, status, rooms, number, size, floor, price?]`.

use rust_decimal::Decimal;
use serde_json::Value;
use std::fmt::Write as _;
use tracing::{debug, info, warn};

use super::editor::cell_text;
use crate::api::{ApartmentQuery, ComplexApi};
use crate::pricing::format_amount;
use crate::pricing::selection::PaymentSelection;
use crate::types::{parse_area, parse_floor, Apartment, CrmError, CrmResult, UnitStatus};

const MIN_COLUMNS: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub struct BoardUnit {
    pub block: String,
    pub unit_type: String,
    pub status: Option<UnitStatus>,
    pub rooms: Option<u32>,
    pub number: String,
    /// Size as sent, used verbatim in the apartment-info query.
    pub size: String,
    pub floor: i32,
    pub floor_raw: String,
    pub price: Option<Decimal>,
}

impl BoardUnit {
    fn from_row(row: &[Value]) -> Option<Self> {
        if row.len() < MIN_COLUMNS {
            return None;
        }
        let floor_raw = cell_text(row.get(6));
        let floor = parse_floor(&floor_raw)?;
        let price = row
            .get(7)
            .map(|v| cell_text(Some(v)).replace(' ', ""))
            .and_then(|s| parse_area(&s));

        Some(Self {
            block: cell_text(row.first()),
            unit_type: cell_text(row.get(1)),
            status: UnitStatus::parse(&cell_text(row.get(2))),
            rooms: cell_text(row.get(3)).parse().ok(),
            number: cell_text(row.get(4)),
            size: cell_text(row.get(5)),
            floor,
            floor_raw,
            price,
        })
    }

    pub fn is_available(&self) -> bool {
        self.status == Some(UnitStatus::Available)
    }

    /// Price on the card: only available units show one.
    pub fn shown_price(&self) -> Option<Decimal> {
        if self.is_available() {
            self.price
        } else {
            None
        }
    }

    pub fn to_apartment(&self, complex: &str) -> Apartment {
        Apartment {
            complex_name: complex.to_string(),
            block_name: self.block.clone(),
            floor: self.floor,
            unit_number: self.number.clone(),
            area_sqm: parse_area(&self.size),
            rooms: self.rooms,
            unit_type: (!self.unit_type.is_empty()).then(|| self.unit_type.clone()),
        }
    }

    pub fn query(&self, complex: &str) -> ApartmentQuery {
        ApartmentQuery {
            complex_name: complex.to_string(),
            block_name: self.block.clone(),
            apartment_size: self.size.clone(),
            floor: self.floor_raw.clone(),
            apartment_number: self.number.clone(),
        }
    }

    fn card(&self) -> String {
        let mark = match self.status {
            Some(UnitStatus::Available) => "+",
            Some(UnitStatus::Sold) => "x",
            Some(UnitStatus::Booked) => "b",
            None => "?",
        };
        let mut card = format!("[{mark} №{}", self.number);
        if let Some(rooms) = self.rooms {
            let _ = write!(card, " {rooms}к");
        }
        if !self.size.is_empty() {
            let _ = write!(card, " {}м²", self.size);
        }
        if let Some(price) = self.shown_price() {
            let _ = write!(card, " {}", format_amount(price));
        }
        card.push(']');
        card
    }
}

pub struct ChessBoard {
    complex: String,
    units: Vec<BoardUnit>,
}

impl ChessBoard {
    pub fn from_rows(complex: &str, rows: &[Vec<Value>]) -> Self {
        let mut units = Vec::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            match BoardUnit::from_row(row) {
                Some(unit) => units.push(unit),
                None => warn!(complex, row = i, "Skipping malformed board row"),
            }
        }
        Self {
            complex: complex.to_string(),
            units,
        }
    }

    pub async fn load<A: ComplexApi + ?Sized>(api: &A, complex: &str) -> CrmResult<Self> {
        let rows = api.fetch_board(complex).await?;
        let board = Self::from_rows(complex, &rows);
        info!(complex, units = board.units.len(), "Chess board loaded");
        Ok(board)
    }

    pub fn complex(&self) -> &str {
        &self.complex
    }

    pub fn units(&self) -> &[BoardUnit] {
        &self.units
    }

    /// Distinct blocks in first-seen order.
    pub fn blocks(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !seen.contains(&unit.block.as_str()) {
                seen.push(&unit.block);
            }
        }
        seen
    }

    /// Floors of `block`, top floor first.
    pub fn floors(&self, block: &str) -> Vec<i32> {
        let mut floors: Vec<i32> = self
            .units
            .iter()
            .filter(|u| u.block == block)
            .map(|u| u.floor)
            .collect();
        floors.sort_unstable_by(|a, b| b.cmp(a));
        floors.dedup();
        floors
    }

    pub fn units_on(&self, block: &str, floor: i32) -> impl Iterator<Item = &BoardUnit> {
        let block = block.to_string();
        self.units
            .iter()
            .filter(move |u| u.block == block && u.floor == floor)
    }

    pub fn find(&self, block: &str, number: &str) -> Option<&BoardUnit> {
        self.units
            .iter()
            .find(|u| u.block == block && u.number == number)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for block in self.blocks() {
            let _ = writeln!(out, "{block}");
            for floor in self.floors(block) {
                let cards: Vec<String> = self.units_on(block, floor).map(BoardUnit::card).collect();
                let _ = writeln!(out, "  {floor:>3} | {}", cards.join(" "));
            }
        }
        out
    }

    /// Open an available unit: fetch its tier prices and build a selection.
    pub async fn open_unit<A: ComplexApi + ?Sized>(
        &self,
        api: &A,
        block: &str,
        number: &str,
    ) -> CrmResult<PaymentSelection> {
        let unit = self.find(block, number).ok_or_else(|| {
            CrmError::Validation(format!("unit {number} not found in block {block}"))
        })?;
        if !unit.is_available() {
            return Err(CrmError::Validation(format!(
                "unit {number} is not available"
            )));
        }

        let info = api.apartment_info(&unit.query(&self.complex)).await?;
        debug!(
            complex = %self.complex,
            block,
            number,
            months_left = info.months_left,
            "Apartment info fetched"
        );
        let mut selection = PaymentSelection::from_info(&self.complex, block, &info)?;
        if selection.apartment().rooms.is_none() {
            selection.set_rooms(unit.rooms);
        }
        Ok(selection)
    }
}
