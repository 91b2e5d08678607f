//! `/api/miniapp/*`: Telegram Mini App users, view sessions and interest.
//!
//! The view-session endpoints feed the interest tracker; the backend
//! owns the score (views, time points, event bonuses) and the 180 s cap.

use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::client::CrmClient;
use super::MiniAppApi;
use crate::types::{Apartment, CrmResult};

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct UserInit {
    /// Raw Telegram `initData` string.
    pub init_data: String,
    /// Deep-link payload (ad source); `"telegram"` when absent.
    pub start_param: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MiniAppUser {
    pub id: i64,
    pub telegram_id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub source_payload: String,
    #[serde(default)]
    pub favorites_count: u32,
}

// ---------------------------------------------------------------------------
// View sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSessionStart {
    pub telegram_id: i64,
    pub complex_name: String,
    pub block_name: String,
    pub floor: i32,
    pub unit_number: String,
    pub area_sqm: Option<Decimal>,
    pub rooms: Option<u32>,
}

impl ViewSessionStart {
    pub fn new(telegram_id: i64, apartment: &Apartment) -> Self {
        Self {
            telegram_id,
            complex_name: apartment.complex_name.clone(),
            block_name: apartment.block_name.clone(),
            floor: apartment.floor,
            unit_number: apartment.unit_number.clone(),
            area_sqm: apartment.area_sqm,
            rooms: apartment.rooms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewSessionStarted {
    pub session_id: i64,
    pub score_id: i64,
    #[serde(default)]
    pub view_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartbeatRequest {
    pub session_id: i64,
    pub telegram_id: i64,
    /// Seconds since the previous heartbeat, at most 30.
    pub seconds_elapsed: u32,
    pub is_visible: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatAck {
    pub session_id: i64,
    pub total_active_seconds: u32,
    #[serde(default)]
    pub time_score: u32,
    /// Set by the backend once the per-apartment cap is reached.
    #[serde(default)]
    pub should_end: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSessionEnd {
    pub session_id: i64,
    pub telegram_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewSessionSummary {
    pub session_id: i64,
    #[serde(default)]
    pub total_score: u32,
    #[serde(default)]
    pub time_score: u32,
    #[serde(default)]
    pub total_time_seconds: u32,
}

// ---------------------------------------------------------------------------
// Interest events and favorites
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestEventKind {
    PaymentView,
    MapView,
}

impl fmt::Display for InterestEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterestEventKind::PaymentView => write!(f, "payment_view"),
            InterestEventKind::MapView => write!(f, "map_view"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterestEventRequest {
    pub telegram_id: i64,
    pub complex_name: String,
    pub block_name: String,
    pub floor: i32,
    pub unit_number: String,
    pub event_type: InterestEventKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterestEventAck {
    pub score_id: i64,
    pub event_type: String,
    #[serde(default)]
    pub bonus_added: u32,
    #[serde(default)]
    pub total_score: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FavoriteRequest {
    pub telegram_id: i64,
    pub complex_name: String,
    pub block_name: String,
    pub floor: i32,
    pub unit_number: String,
    pub area_sqm: Option<Decimal>,
    pub rooms: Option<u32>,
    pub price_snapshot: Option<Decimal>,
}

impl FavoriteRequest {
    pub fn new(telegram_id: i64, apartment: &Apartment, price_snapshot: Option<Decimal>) -> Self {
        Self {
            telegram_id,
            complex_name: apartment.complex_name.clone(),
            block_name: apartment.block_name.clone(),
            floor: apartment.floor,
            unit_number: apartment.unit_number.clone(),
            area_sqm: apartment.area_sqm,
            rooms: apartment.rooms,
            price_snapshot,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FavoriteAck {
    pub success: bool,
    pub is_favorite: bool,
    #[serde(default)]
    pub total_score: u32,
}

// ---------------------------------------------------------------------------
// Lead requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadRequestKind {
    LeaveRequest,
    Book,
    Question,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadRequestCreate {
    pub telegram_id: i64,
    pub request_type: LeadRequestKind,
    pub complex_name: Option<String>,
    pub block_name: Option<String>,
    pub floor: Option<i32>,
    pub unit_number: Option<String>,
    pub area_sqm: Option<Decimal>,
    pub rooms: Option<u32>,
    pub price_snapshot: Option<Decimal>,
    pub payment_type_interest: Option<String>,
}

impl LeadRequestCreate {
    pub fn general(telegram_id: i64, kind: LeadRequestKind) -> Self {
        Self {
            telegram_id,
            request_type: kind,
            complex_name: None,
            block_name: None,
            floor: None,
            unit_number: None,
            area_sqm: None,
            rooms: None,
            price_snapshot: None,
            payment_type_interest: None,
        }
    }

    pub fn for_apartment(telegram_id: i64, kind: LeadRequestKind, apartment: &Apartment) -> Self {
        Self {
            complex_name: Some(apartment.complex_name.clone()),
            block_name: Some(apartment.block_name.clone()),
            floor: Some(apartment.floor),
            unit_number: Some(apartment.unit_number.clone()),
            area_sqm: apartment.area_sqm,
            rooms: apartment.rooms,
            ..Self::general(telegram_id, kind)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeadRequestRecord {
    pub id: i64,
    pub request_type: String,
    pub status: String,
    #[serde(default)]
    pub interest_score: Option<u32>,
}

// ---------------------------------------------------------------------------
// Client impl
// ---------------------------------------------------------------------------

#[async_trait]
impl MiniAppApi for CrmClient {
    async fn init_user(&self, init: &UserInit) -> CrmResult<MiniAppUser> {
        self.send_json(Method::POST, "/api/miniapp/init", init).await
    }

    async fn start_view_session(&self, req: &ViewSessionStart) -> CrmResult<ViewSessionStarted> {
        self.send_json(Method::POST, "/api/miniapp/view-session/start", req)
            .await
    }

    async fn heartbeat(&self, req: &HeartbeatRequest) -> CrmResult<HeartbeatAck> {
        self.send_json(Method::POST, "/api/miniapp/view-session/heartbeat", req)
            .await
    }

    async fn end_view_session(&self, req: &ViewSessionEnd) -> CrmResult<ViewSessionSummary> {
        self.send_json(Method::POST, "/api/miniapp/view-session/end", req)
            .await
    }

    async fn record_interest_event(&self, req: &InterestEventRequest) -> CrmResult<InterestEventAck> {
        self.send_json(Method::POST, "/api/miniapp/interest-event", req)
            .await
    }

    async fn add_favorite(&self, req: &FavoriteRequest) -> CrmResult<FavoriteAck> {
        self.send_json(Method::POST, "/api/miniapp/favorites", req).await
    }

    async fn remove_favorite(&self, req: &FavoriteRequest) -> CrmResult<FavoriteAck> {
        self.send_json(Method::DELETE, "/api/miniapp/favorites", req).await
    }

    async fn create_lead_request(&self, req: &LeadRequestCreate) -> CrmResult<LeadRequestRecord> {
        self.send_json(Method::POST, "/api/miniapp/lead-request", req)
            .await
    }
}
