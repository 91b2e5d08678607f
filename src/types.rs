//! Shared types for the CRM client tier.
//!
//! These types form the data model used across all modules.
//! They are kept free of I/O so that the api, pricing, grid and
//! tracker modules can depend on them without circular references.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Apartment
// ---------------------------------------------------------------------------

/// An apartment picked from a complex's chess grid.
///
/// Lives only as long as the current selection or viewing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Apartment {
    pub complex_name: String,
    pub block_name: String,
    pub floor: i32,
    pub unit_number: String,
    pub area_sqm: Option<Decimal>,
    pub rooms: Option<u32>,
    /// "жилое" / "нежилое" as reported by the grid, when present.
    pub unit_type: Option<String>,
}

impl fmt::Display for Apartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / floor {} / №{}",
            self.complex_name, self.block_name, self.floor, self.unit_number
        )?;
        if let Some(area) = self.area_sqm {
            write!(f, " ({area} m²)")?;
        }
        Ok(())
    }
}

impl Apartment {
    /// Helper to build a test/sample apartment with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        Apartment {
            complex_name: "ЖК_Рассвет".to_string(),
            block_name: "Блок А".to_string(),
            floor: 5,
            unit_number: "42".to_string(),
            area_sqm: Some(Decimal::new(5567, 2)),
            rooms: Some(2),
            unit_type: Some("жилое".to_string()),
        }
    }
}

/// Parse an area figure as typed by sales staff: `"55,67"`, `"55.67"`, `" 60 "`.
pub fn parse_area(raw: &str) -> Option<Decimal> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Parse a floor figure that may arrive as `"5"`, `"5.0"` or `"5,0"`.
pub fn parse_floor(raw: &str) -> Option<i32> {
    parse_area(raw)?.trunc().to_i32()
}

// ---------------------------------------------------------------------------
// Unit status
// ---------------------------------------------------------------------------

/// Availability of a unit in the chess grid.
///
/// An unordered enumeration: any status may follow any other, the
/// backend is the sole arbiter of transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitStatus {
    Available,
    Sold,
    Booked,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 3] = [UnitStatus::Available, UnitStatus::Sold, UnitStatus::Booked];

    /// The literal the backend stores.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Available => "свободна",
            UnitStatus::Sold => "продана",
            UnitStatus::Booked => "бронь",
        }
    }

    /// Case-insensitive parse. Accepts the editor's "Свободно" label too.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "свободна" | "свободно" => Some(UnitStatus::Available),
            "продана" => Some(UnitStatus::Sold),
            "бронь" => Some(UnitStatus::Booked),
            _ => None,
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitStatus {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnitStatus::parse(s).ok_or_else(|| CrmError::Validation(format!("unknown unit status: {s}")))
    }
}

impl Serialize for UnitStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UnitStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        UnitStatus::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown unit status: {raw}")))
    }
}

// ---------------------------------------------------------------------------
// Complexes and pricing inputs
// ---------------------------------------------------------------------------

/// A residential complex (ЖК) as listed by `/api/complexes/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Complex {
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
}

/// Price per square metre for each up-front tier.
///
/// Tier N means N% is paid up front; 100 is a full payment.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PriceTiers {
    pub per_sqm_100: Decimal,
    pub per_sqm_70: Decimal,
    pub per_sqm_50: Decimal,
    pub per_sqm_30: Decimal,
}

impl PriceTiers {
    /// Price per square metre for an up-front percentage.
    /// Anything not 100/70/50 falls back to the 30% tier.
    pub fn for_percent(&self, percent: u8) -> Decimal {
        match percent {
            100 => self.per_sqm_100,
            70 => self.per_sqm_70,
            50 => self.per_sqm_50,
            _ => self.per_sqm_30,
        }
    }
}

/// Payload of `/api/complexes/apartment-info` (`data` field).
#[derive(Debug, Clone, Deserialize)]
pub struct ApartmentInfo {
    #[serde(rename = "pricePerM2_100", default)]
    pub price_per_m2_100: Decimal,
    #[serde(rename = "pricePerM2_70", default)]
    pub price_per_m2_70: Decimal,
    #[serde(rename = "pricePerM2_50", default)]
    pub price_per_m2_50: Decimal,
    #[serde(rename = "pricePerM2_30", default)]
    pub price_per_m2_30: Decimal,
    /// List price at the 100% tier, if the backend had one.
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(deserialize_with = "de_stringish")]
    pub floor: String,
    #[serde(deserialize_with = "de_stringish")]
    pub size: String,
    #[serde(deserialize_with = "de_stringish")]
    pub apartment_number: String,
    #[serde(default)]
    pub months_left: u32,
    #[serde(rename = "roomsCount", default, deserialize_with = "de_opt_u32_lenient")]
    pub rooms_count: Option<u32>,
    #[serde(rename = "unitType", default)]
    pub unit_type: Option<String>,
    /// Complexes offer hybrid plans only when the backend enables them.
    #[serde(default)]
    pub hybrid_installment_enabled: bool,
}

impl ApartmentInfo {
    pub fn tiers(&self) -> PriceTiers {
        PriceTiers {
            per_sqm_100: self.price_per_m2_100,
            per_sqm_70: self.price_per_m2_70,
            per_sqm_50: self.price_per_m2_50,
            per_sqm_30: self.price_per_m2_30,
        }
    }

    pub fn area(&self) -> Option<Decimal> {
        parse_area(&self.size)
    }
}

/// Accept a JSON string or number and keep its textual form.
fn de_stringish<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Rooms arrive as `2`, `"2"`, `"2,0"` or free text; free text becomes `None`.
fn de_opt_u32_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64().map(|f| f as u32),
        Some(serde_json::Value::String(s)) => parse_floor(&s).and_then(|n| u32::try_from(n).ok()),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

/// Kanban column of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    Cold,
    Warm,
    Hot,
}

impl LeadStatus {
    /// Kanban columns, left to right.
    pub const ALL: [LeadStatus; 3] = [LeadStatus::Cold, LeadStatus::Warm, LeadStatus::Hot];
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeadStatus::Cold => write!(f, "COLD"),
            LeadStatus::Warm => write!(f, "WARM"),
            LeadStatus::Hot => write!(f, "HOT"),
        }
    }
}

impl FromStr for LeadStatus {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "COLD" => Ok(LeadStatus::Cold),
            "WARM" => Ok(LeadStatus::Warm),
            "HOT" => Ok(LeadStatus::Hot),
            other => Err(CrmError::Validation(format!("unknown lead status: {other}"))),
        }
    }
}

/// Processing state of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadState {
    New,
    Processed,
}

/// How the client intends to pay, as the lead form labels it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    #[serde(rename = "Единовременно")]
    Full,
    #[serde(rename = "Рассрочка")]
    Installment,
    #[serde(rename = "Гибридная")]
    Hybrid,
}

/// A lead record as returned by `/api/leads*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: i64,
    pub full_name: String,
    #[serde(default)]
    pub phone: String,
    pub status: LeadStatus,
    #[serde(default)]
    pub state: Option<LeadState>,
    #[serde(default)]
    pub complex_name: Option<String>,
    #[serde(default)]
    pub block: Option<String>,
    #[serde(default)]
    pub total_price: Option<Decimal>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Language preference
// ---------------------------------------------------------------------------

/// Landing page language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ru,
    Uz,
}

impl Language {
    pub fn toggled(self) -> Self {
        match self {
            Language::Ru => Language::Uz,
            Language::Uz => Language::Ru,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Ru => write!(f, "ru"),
            Language::Uz => write!(f, "uz"),
        }
    }
}

impl FromStr for Language {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ru" => Ok(Language::Ru),
            "uz" => Ok(Language::Uz),
            other => Err(CrmError::Validation(format!("unsupported language: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors surfaced by the client tier.
///
/// Deliberately flat: HTTP-ok vs not-ok, plus client-side checks.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("Backend returned {status} for {endpoint}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type CrmResult<T> = std::result::Result<T, CrmError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
