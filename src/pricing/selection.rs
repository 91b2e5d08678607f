//! The buyer's current apartment + payment plan choice.
//!
//! Holds at most one active plan: selecting another plan replaces the
//! previously derived figures. Only a confirmed selection reaches the
//! backend; dropping an unconfirmed one discards it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::{PaymentPlan, PlanQuote, PricingCalculator, PricingInput};
use crate::api::{
    FinanceApi, InstallmentPlanRequest, LeadApi, NewLead, PaymentKind, PaymentRequest,
};
use crate::types::{parse_floor, Apartment, ApartmentInfo, CrmError, CrmResult, Lead, PaymentType};

#[derive(Debug, Clone)]
pub struct PaymentSelection {
    apartment: Apartment,
    input: PricingInput,
    hybrid_enabled: bool,
    active: Option<PlanQuote>,
}

impl PaymentSelection {
    pub fn new(apartment: Apartment, input: PricingInput) -> Self {
        Self {
            apartment,
            input,
            hybrid_enabled: true,
            active: None,
        }
    }

    /// Build a selection from an `apartment-info` answer.
    pub fn from_info(complex: &str, block: &str, info: &ApartmentInfo) -> CrmResult<Self> {
        let area = info.area().ok_or_else(|| {
            CrmError::Validation(format!("apartment size is not a number: {}", info.size))
        })?;
        let floor = parse_floor(&info.floor)
            .ok_or_else(|| CrmError::Validation(format!("floor is not a number: {}", info.floor)))?;

        let apartment = Apartment {
            complex_name: complex.to_string(),
            block_name: block.to_string(),
            floor,
            unit_number: info.apartment_number.clone(),
            area_sqm: Some(area),
            rooms: info.rooms_count,
            unit_type: info.unit_type.clone(),
        };
        let input = PricingInput {
            tiers: info.tiers(),
            area_sqm: area,
            months_left: info.months_left,
            list_total: info.total_price,
        };
        Ok(Self::new(apartment, input).with_hybrid(info.hybrid_installment_enabled))
    }

    /// Whether the complex offers hybrid plans.
    pub fn with_hybrid(mut self, enabled: bool) -> Self {
        self.hybrid_enabled = enabled;
        self
    }

    pub fn hybrid_enabled(&self) -> bool {
        self.hybrid_enabled
    }

    /// Plans this complex offers, in display order.
    pub fn offered_plans(&self) -> Vec<PaymentPlan> {
        PaymentPlan::all()
            .into_iter()
            .filter(|plan| self.hybrid_enabled || !matches!(plan, PaymentPlan::Hybrid(_)))
            .collect()
    }

    /// Quote every offered plan without changing the active choice.
    pub fn quote_offered(&self, calculator: &PricingCalculator) -> CrmResult<Vec<PlanQuote>> {
        self.offered_plans()
            .into_iter()
            .map(|plan| calculator.quote(plan, &self.input))
            .collect()
    }

    pub fn apartment(&self) -> &Apartment {
        &self.apartment
    }

    /// Fill in the room count from the board when apartment-info lacks it.
    pub fn set_rooms(&mut self, rooms: Option<u32>) {
        self.apartment.rooms = rooms;
    }

    pub fn input(&self) -> &PricingInput {
        &self.input
    }

    pub fn active(&self) -> Option<&PlanQuote> {
        self.active.as_ref()
    }

    /// Make `plan` the active choice, replacing any earlier one.
    pub fn select(&mut self, calculator: &PricingCalculator, plan: PaymentPlan) -> CrmResult<&PlanQuote> {
        if matches!(plan, PaymentPlan::Hybrid(_)) && !self.hybrid_enabled {
            return Err(CrmError::Validation(format!(
                "hybrid plans are not offered for {}",
                self.apartment.complex_name
            )));
        }
        let quote = calculator.quote(plan, &self.input)?;
        debug!(apartment = %self.apartment, plan = %plan, "Plan selected");
        Ok(self.active.insert(quote))
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    /// The "Выбрать" step. Fails when no plan has been picked.
    pub fn confirm(self) -> CrmResult<ConfirmedSelection> {
        let quote = self
            .active
            .ok_or_else(|| CrmError::Validation("no payment plan selected".to_string()))?;
        info!(apartment = %self.apartment, plan = %quote.plan, "Selection confirmed");
        Ok(ConfirmedSelection {
            apartment: self.apartment,
            quote,
        })
    }
}

/// A confirmed apartment + plan, ready to be attached to a lead.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedSelection {
    pub apartment: Apartment,
    pub quote: PlanQuote,
}

impl ConfirmedSelection {
    /// Amount the lead form shows: the down payment for installments,
    /// the full price otherwise.
    pub fn form_amount(&self) -> Decimal {
        match self.quote.plan {
            PaymentPlan::Installment(_) => self.quote.down_payment,
            _ => self.quote.total_price,
        }
    }

    pub fn down_payment_label(&self) -> Option<String> {
        match self.quote.plan {
            PaymentPlan::Full => None,
            PaymentPlan::Installment(t) => Some(format!("{}%", t.percent())),
            PaymentPlan::Hybrid(h) => Some(format!("Гибридная {}% + 30%", h.percent())),
        }
    }

    /// Fill the apartment and payment fields of a contact-only lead.
    pub fn apply_to(&self, mut lead: NewLead) -> NewLead {
        let plan = self.quote.plan;
        lead.complex_name = Some(self.apartment.complex_name.clone());
        lead.block = Some(self.apartment.block_name.clone());
        lead.floor = Some(self.apartment.floor);
        lead.number_apartments = Some(self.apartment.unit_number.clone());
        lead.square_meters = self.apartment.area_sqm;
        lead.rooms = self.apartment.rooms;
        lead.total_price = self.form_amount();
        lead.payment_type = plan.payment_type();
        lead.installment_period = self.quote.term_months;
        lead.monthly_payment = match plan {
            PaymentPlan::Full => None,
            _ => Some(self.quote.monthly_payment),
        };
        lead.down_payment = match plan {
            PaymentPlan::Full => None,
            _ => Some(self.quote.down_payment),
        };
        lead.down_payment_percent = self.down_payment_label();
        lead
    }
}

/// Create the lead, then its finance records.
///
/// Installment and hybrid leads with a term get an installment plan and
/// a first payment; full-payment leads get one payment for the total.
/// Stops at the first failure; nothing is retried or rolled back.
pub async fn submit_lead<L, F>(
    leads: &L,
    finance: &F,
    lead: &NewLead,
    now: DateTime<Utc>,
) -> CrmResult<Lead>
where
    L: LeadApi + ?Sized,
    F: FinanceApi + ?Sized,
{
    let created = leads.create_lead(lead).await?;
    info!(lead_id = created.id, payment_type = ?lead.payment_type, "Lead created");

    match lead.payment_type {
        PaymentType::Installment | PaymentType::Hybrid if lead.installment_period > 0 => {
            finance
                .create_installment_plan(&InstallmentPlanRequest {
                    lead_id: created.id,
                    total_amount: lead.total_price,
                    number_of_payments: lead.installment_period,
                    start_date: now,
                })
                .await?;
            finance
                .create_payment(&PaymentRequest {
                    lead_id: created.id,
                    amount: lead.monthly_payment.unwrap_or(Decimal::ZERO),
                    due_date: now,
                    payment_type: PaymentKind::Installment,
                })
                .await?;
        }
        PaymentType::Full => {
            finance
                .create_payment(&PaymentRequest {
                    lead_id: created.id,
                    amount: lead.total_price,
                    due_date: now,
                    payment_type: PaymentKind::Full,
                })
                .await?;
        }
        _ => {}
    }

    Ok(created)
}
