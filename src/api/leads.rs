//! `/api/leads*`: lead capture, Kanban moves and search.

use async_trait::async_trait;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::Serialize;

use super::client::CrmClient;
use super::LeadApi;
use crate::types::{CrmError, CrmResult, Lead, LeadState, LeadStatus, PaymentType};

/// Body of `POST /api/leads/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewLead {
    pub full_name: String,
    pub phone: String,
    pub region: Option<String>,
    /// Where the lead came from (Instagram, referral, ...).
    pub contact_source: Option<String>,
    pub status: LeadStatus,
    pub state: LeadState,
    pub square_meters: Option<Decimal>,
    pub rooms: Option<u32>,
    pub floor: Option<i32>,
    pub number_apartments: Option<String>,
    pub complex_name: Option<String>,
    pub block: Option<String>,
    pub total_price: Decimal,
    pub currency: String,
    pub payment_type: PaymentType,
    pub monthly_payment: Option<Decimal>,
    pub installment_period: u32,
    pub down_payment: Option<Decimal>,
    pub down_payment_percent: Option<String>,
    pub notes: String,
    pub user_id: Option<i64>,
}

impl NewLead {
    /// A cold, new lead with only contact details filled in.
    pub fn contact(full_name: &str, phone: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            phone: phone.to_string(),
            region: None,
            contact_source: None,
            status: LeadStatus::Cold,
            state: LeadState::New,
            square_meters: None,
            rooms: None,
            floor: None,
            number_apartments: None,
            complex_name: None,
            block: None,
            total_price: Decimal::ZERO,
            currency: "UZS".to_string(),
            payment_type: PaymentType::Full,
            monthly_payment: None,
            installment_period: 0,
            down_payment: None,
            down_payment_percent: None,
            notes: String::new(),
            user_id: None,
        }
    }

    /// Presence checks the lead form performs before submitting.
    pub fn validate(&self) -> CrmResult<()> {
        let mut missing = Vec::new();
        if self.full_name.trim().is_empty() {
            missing.push("full_name");
        }
        if self.phone.trim().is_empty() {
            missing.push("phone");
        }
        if !missing.is_empty() {
            return Err(CrmError::Validation(format!(
                "required fields missing: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusMove {
    status: LeadStatus,
    state: LeadState,
}

// ---------------------------------------------------------------------------
// Kanban helpers
// ---------------------------------------------------------------------------

/// Group leads into Kanban columns in board order (COLD, WARM, HOT).
/// Columns with no leads are present but empty.
pub fn group_by_status(leads: Vec<Lead>) -> Vec<(LeadStatus, Vec<Lead>)> {
    let mut columns: Vec<(LeadStatus, Vec<Lead>)> =
        LeadStatus::ALL.iter().map(|&s| (s, Vec::new())).collect();
    for lead in leads {
        if let Some((_, column)) = columns.iter_mut().find(|(s, _)| *s == lead.status) {
            column.push(lead);
        }
    }
    columns
}

/// A drag between columns. Dropping into the same column is refused.
pub fn check_move(from: LeadStatus, to: LeadStatus) -> CrmResult<()> {
    if from == to {
        return Err(CrmError::Validation(format!(
            "lead is already in column {to}"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Client impl
// ---------------------------------------------------------------------------

#[async_trait]
impl LeadApi for CrmClient {
    async fn create_lead(&self, lead: &NewLead) -> CrmResult<Lead> {
        lead.validate()?;
        self.send_json(Method::POST, "/api/leads/", lead).await
    }

    async fn update_lead_status(
        &self,
        id: i64,
        status: LeadStatus,
        state: LeadState,
    ) -> CrmResult<Lead> {
        self.send_json(Method::PUT, &format!("/api/leads/{id}"), &StatusMove { status, state })
            .await
    }

    async fn search_leads(&self, query: &str) -> CrmResult<Vec<Lead>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.get_json(&format!(
            "/api/leads/search?query={}",
            urlencoding::encode(query)
        ))
        .await
    }

    async fn leads_for_user(&self, user_id: i64) -> CrmResult<Vec<Lead>> {
        self.get_json(&format!("/api/leads/user/{user_id}?include_callbacks=true"))
            .await
    }
}
