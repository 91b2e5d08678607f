//! Apartment pricing and payment-plan calculator.
//!
//! Turns per-tier prices per square metre into a concrete plan:
//! full payment, installment (30/50/70% up front) or hybrid
//! (20/30% up front, flat middle months, a final lump).
//! All money is `Decimal`; displayed amounts are whole currency units.

pub mod schedule;
pub mod selection;

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::fmt;
use tracing::debug;

use crate::types::{CrmError, CrmResult, PaymentType, PriceTiers};

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// Up-front share of an installment plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallmentTier {
    P30,
    P50,
    P70,
}

impl InstallmentTier {
    pub const ALL: [InstallmentTier; 3] = [InstallmentTier::P70, InstallmentTier::P50, InstallmentTier::P30];

    pub fn percent(self) -> u8 {
        match self {
            InstallmentTier::P30 => 30,
            InstallmentTier::P50 => 50,
            InstallmentTier::P70 => 70,
        }
    }
}

impl TryFrom<u8> for InstallmentTier {
    type Error = CrmError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            30 => Ok(InstallmentTier::P30),
            50 => Ok(InstallmentTier::P50),
            70 => Ok(InstallmentTier::P70),
            other => Err(CrmError::Validation(format!(
                "installment up-front share must be 30, 50 or 70, got {other}"
            ))),
        }
    }
}

/// Up-front share of a hybrid plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HybridInitial {
    P20,
    P30,
}

impl HybridInitial {
    pub const ALL: [HybridInitial; 2] = [HybridInitial::P30, HybridInitial::P20];

    pub fn percent(self) -> u8 {
        match self {
            HybridInitial::P20 => 20,
            HybridInitial::P30 => 30,
        }
    }
}

impl TryFrom<u8> for HybridInitial {
    type Error = CrmError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            20 => Ok(HybridInitial::P20),
            30 => Ok(HybridInitial::P30),
            other => Err(CrmError::Validation(format!(
                "hybrid up-front share must be 20 or 30, got {other}"
            ))),
        }
    }
}

/// The payment plan a buyer picks. Exactly one is active per selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentPlan {
    Full,
    Installment(InstallmentTier),
    Hybrid(HybridInitial),
}

impl PaymentPlan {
    /// Parse CLI-style plan names: `full`, `installment-30`, `hybrid-20`.
    pub fn parse(raw: &str) -> CrmResult<Self> {
        let raw = raw.trim().to_lowercase();
        if raw == "full" || raw == "100" {
            return Ok(PaymentPlan::Full);
        }
        let (kind, pct) = raw
            .split_once('-')
            .ok_or_else(|| CrmError::Validation(format!("unknown payment plan: {raw}")))?;
        let pct: u8 = pct
            .trim_end_matches('%')
            .parse()
            .map_err(|_| CrmError::Validation(format!("bad percentage in plan: {raw}")))?;
        match kind {
            "installment" => Ok(PaymentPlan::Installment(pct.try_into()?)),
            "hybrid" => Ok(PaymentPlan::Hybrid(pct.try_into()?)),
            _ => Err(CrmError::Validation(format!("unknown payment plan: {raw}"))),
        }
    }

    pub fn payment_type(&self) -> PaymentType {
        match self {
            PaymentPlan::Full => PaymentType::Full,
            PaymentPlan::Installment(_) => PaymentType::Installment,
            PaymentPlan::Hybrid(_) => PaymentType::Hybrid,
        }
    }

    /// Every plan the sales modal offers, in button order.
    pub fn all() -> Vec<PaymentPlan> {
        let mut plans = vec![PaymentPlan::Full];
        plans.extend(InstallmentTier::ALL.iter().map(|t| PaymentPlan::Installment(*t)));
        plans.extend(HybridInitial::ALL.iter().map(|h| PaymentPlan::Hybrid(*h)));
        plans
    }
}

impl fmt::Display for PaymentPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentPlan::Full => write!(f, "100% Оплата"),
            PaymentPlan::Installment(t) => write!(f, "Рассрочка {}%", t.percent()),
            PaymentPlan::Hybrid(h) => write!(f, "Гибридная {}% + 30%", h.percent()),
        }
    }
}

// ---------------------------------------------------------------------------
// Quote
// ---------------------------------------------------------------------------

/// Derived figures for one plan, rounded to whole currency units.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanQuote {
    pub plan: PaymentPlan,
    pub price_per_sqm: Decimal,
    pub total_price: Decimal,
    pub down_payment: Decimal,
    pub monthly_payment: Decimal,
    /// 0 for a full payment.
    pub term_months: u32,
    /// Months carrying `monthly_payment`.
    pub monthly_count: u32,
    /// Hybrid only: the deferred final payment.
    pub last_payment: Option<Decimal>,
    /// Savings against the list price, never negative.
    pub savings: Decimal,
}

impl PlanQuote {
    /// Sum of every scheduled payment.
    pub fn scheduled_total(&self) -> Decimal {
        self.down_payment
            + self.monthly_payment * Decimal::from(self.monthly_count)
            + self.last_payment.unwrap_or(Decimal::ZERO)
    }
}

impl fmt::Display for PlanQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: total {} сум", self.plan, format_amount(self.total_price))?;
        match self.plan {
            PaymentPlan::Full => {}
            PaymentPlan::Installment(_) => write!(
                f,
                ", down {} сум, monthly ({} mo.) {} сум",
                format_amount(self.down_payment),
                self.monthly_count,
                format_amount(self.monthly_payment)
            )?,
            PaymentPlan::Hybrid(_) => write!(
                f,
                ", down {} сум, monthly (first {} mo.) {} сум, last ({}-й месяц) {} сум",
                format_amount(self.down_payment),
                self.monthly_count,
                format_amount(self.monthly_payment),
                self.term_months,
                format_amount(self.last_payment.unwrap_or(Decimal::ZERO))
            )?,
        }
        if self.savings > Decimal::ZERO {
            write!(f, ", savings {} сум", format_amount(self.savings))?;
        }
        Ok(())
    }
}

/// Round to whole currency units, halves away from zero.
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// `50000000` → `"50 000 000"`.
pub fn format_amount(amount: Decimal) -> String {
    let whole = round_currency(amount);
    let digits = whole.abs().trunc().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(' ');
        }
        out.push(ch);
    }
    if whole.is_sign_negative() && !whole.is_zero() {
        out.insert(0, '-');
    }
    out
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Inputs shared by every plan for one apartment.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingInput {
    pub tiers: PriceTiers,
    pub area_sqm: Decimal,
    /// Months until handover, as reported by the backend.
    pub months_left: u32,
    /// List price (100% tier × area) for the savings line, if known.
    pub list_total: Option<Decimal>,
}

pub struct PricingCalculator {
    hybrid_final_percent: u8,
}

impl Default for PricingCalculator {
    fn default() -> Self {
        Self { hybrid_final_percent: 30 }
    }
}

impl PricingCalculator {
    pub fn new(hybrid_final_percent: u8) -> Self {
        Self { hybrid_final_percent }
    }

    pub fn quote(&self, plan: PaymentPlan, input: &PricingInput) -> CrmResult<PlanQuote> {
        if input.area_sqm <= Decimal::ZERO {
            return Err(CrmError::Validation(format!(
                "area must be positive, got {}",
                input.area_sqm
            )));
        }

        let quote = match plan {
            PaymentPlan::Full => self.full(input)?,
            PaymentPlan::Installment(tier) => self.installment(tier, input)?,
            PaymentPlan::Hybrid(initial) => self.hybrid(initial, input)?,
        };

        debug!(
            plan = %plan,
            total = %quote.total_price,
            down = %quote.down_payment,
            monthly = %quote.monthly_payment,
            term = quote.term_months,
            "Plan quoted"
        );

        Ok(quote)
    }

    /// Quote every offered plan; used for side-by-side display.
    pub fn quote_all(&self, input: &PricingInput) -> CrmResult<Vec<PlanQuote>> {
        PaymentPlan::all()
            .into_iter()
            .map(|plan| self.quote(plan, input))
            .collect()
    }

    fn full(&self, input: &PricingInput) -> CrmResult<PlanQuote> {
        let price = input.tiers.per_sqm_100;
        let total = mul(price, input.area_sqm)?;
        Ok(PlanQuote {
            plan: PaymentPlan::Full,
            price_per_sqm: price,
            total_price: round_currency(total),
            down_payment: round_currency(total),
            monthly_payment: Decimal::ZERO,
            term_months: 0,
            monthly_count: 0,
            last_payment: None,
            savings: savings(input.list_total, total),
        })
    }

    fn installment(&self, tier: InstallmentTier, input: &PricingInput) -> CrmResult<PlanQuote> {
        let price = input.tiers.for_percent(tier.percent());
        let total = mul(price, input.area_sqm)?;
        let down = mul(total, share(tier.percent()))?;
        let term = input.months_left.max(1);
        let monthly = (total - down) / Decimal::from(term);

        Ok(PlanQuote {
            plan: PaymentPlan::Installment(tier),
            price_per_sqm: price,
            total_price: round_currency(total),
            down_payment: round_currency(down),
            monthly_payment: round_currency(monthly),
            term_months: term,
            monthly_count: term,
            last_payment: None,
            savings: savings(input.list_total, total),
        })
    }

    fn hybrid(&self, initial: HybridInitial, input: &PricingInput) -> CrmResult<PlanQuote> {
        // Hybrid always prices at the 30% tier.
        let price = input.tiers.per_sqm_30;
        let total = mul(price, input.area_sqm)?;
        let down = mul(total, share(initial.percent()))?;
        let last = mul(total, share(self.hybrid_final_percent))?;
        let term = input.months_left.max(1);
        let middle_months = if term > 1 { term - 1 } else { 1 };
        let monthly = (total - down - last) / Decimal::from(middle_months);

        Ok(PlanQuote {
            plan: PaymentPlan::Hybrid(initial),
            price_per_sqm: price,
            total_price: round_currency(total),
            down_payment: round_currency(down),
            monthly_payment: round_currency(monthly),
            term_months: term,
            monthly_count: middle_months,
            last_payment: Some(round_currency(last)),
            savings: savings(input.list_total, total),
        })
    }
}

fn mul(a: Decimal, b: Decimal) -> CrmResult<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| CrmError::Validation(format!("price × area out of range ({a} × {b})")))
}

fn share(percent: u8) -> Decimal {
    Decimal::from(percent) / dec!(100)
}

fn savings(list_total: Option<Decimal>, total: Decimal) -> Decimal {
    match list_total {
        Some(list) if list > total => round_currency(list - total),
        _ => Decimal::ZERO,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
