//! Backend REST API consumer.
//!
//! Defines one trait per backend area and a single reqwest-backed
//! implementation, [`CrmClient`]:
//! - `ComplexApi`: complexes, sales chess board, apartment info, admin grid
//! - `MiniAppApi`: Telegram Mini App users, view sessions, interest events
//! - `LeadApi`: lead creation, status moves, search
//! - `FinanceApi`: payment plans, payments, dashboard stats
//!
//! Components that do I/O take these traits so tests can swap in mocks.

pub mod client;
pub mod complexes;
pub mod finance;
pub mod leads;
pub mod miniapp;

use async_trait::async_trait;

use crate::types::{ApartmentInfo, Complex, CrmResult, Lead, LeadState, LeadStatus};

pub use client::CrmClient;
pub use complexes::{ApartmentQuery, ComplexFiles, GridRecord, StatusUpdate};
pub use finance::{FinanceStats, InstallmentPlanRequest, PaymentKind, PaymentRequest};
pub use leads::NewLead;
pub use miniapp::{
    FavoriteAck, FavoriteRequest, HeartbeatAck, HeartbeatRequest, InterestEventAck,
    InterestEventKind, InterestEventRequest, LeadRequestCreate, LeadRequestKind, LeadRequestRecord,
    MiniAppUser, UserInit, ViewSessionEnd, ViewSessionStart, ViewSessionStarted,
    ViewSessionSummary,
};

/// Residential complexes, their chess boards and spreadsheet-backed grids.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ComplexApi: Send + Sync {
    /// `GET /api/complexes/`
    async fn list_complexes(&self) -> CrmResult<Vec<Complex>>;

    /// `GET /api/complexes/jk/{jk}`: positional shaxmatka rows.
    async fn fetch_board(&self, complex: &str) -> CrmResult<Vec<Vec<serde_json::Value>>>;

    /// `GET /api/complexes/apartment-info`
    async fn apartment_info(&self, query: &ApartmentQuery) -> CrmResult<ApartmentInfo>;

    /// `GET /excel/complexes`
    async fn list_grid_complexes(&self) -> CrmResult<Vec<String>>;

    /// `GET /excel/complexes/{jk}/files`
    async fn list_complex_files(&self, complex: &str) -> CrmResult<Vec<String>>;

    /// `GET /excel/complexes/{jk}/chess`
    async fn fetch_chess_grid(&self, complex: &str) -> CrmResult<Vec<GridRecord>>;

    /// `PUT /excel/complexes/{jk}/chess` with the whole batch.
    async fn save_chess_grid(&self, complex: &str, updates: &[StatusUpdate]) -> CrmResult<()>;
}

/// Telegram Mini App endpoints.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MiniAppApi: Send + Sync {
    async fn init_user(&self, init: &UserInit) -> CrmResult<MiniAppUser>;

    async fn start_view_session(&self, req: &ViewSessionStart) -> CrmResult<ViewSessionStarted>;

    async fn heartbeat(&self, req: &HeartbeatRequest) -> CrmResult<HeartbeatAck>;

    async fn end_view_session(&self, req: &ViewSessionEnd) -> CrmResult<ViewSessionSummary>;

    async fn record_interest_event(&self, req: &InterestEventRequest) -> CrmResult<InterestEventAck>;

    async fn add_favorite(&self, req: &FavoriteRequest) -> CrmResult<FavoriteAck>;

    async fn remove_favorite(&self, req: &FavoriteRequest) -> CrmResult<FavoriteAck>;

    async fn create_lead_request(&self, req: &LeadRequestCreate) -> CrmResult<LeadRequestRecord>;
}

/// Sales leads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeadApi: Send + Sync {
    /// `POST /api/leads/`: returns the stored lead.
    async fn create_lead(&self, lead: &NewLead) -> CrmResult<Lead>;

    /// `PUT /api/leads/{id}`: move a lead to another column.
    async fn update_lead_status(&self, id: i64, status: LeadStatus, state: LeadState)
        -> CrmResult<Lead>;

    /// `GET /api/leads/search?query=`
    async fn search_leads(&self, query: &str) -> CrmResult<Vec<Lead>>;

    /// `GET /api/leads/user/{id}?include_callbacks=true`
    async fn leads_for_user(&self, user_id: i64) -> CrmResult<Vec<Lead>>;
}

/// Finance endpoints used by the lead form and finance dashboard.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FinanceApi: Send + Sync {
    async fn stats(&self) -> CrmResult<FinanceStats>;

    async fn create_installment_plan(&self, plan: &InstallmentPlanRequest) -> CrmResult<()>;

    async fn create_payment(&self, payment: &PaymentRequest) -> CrmResult<()>;
}
