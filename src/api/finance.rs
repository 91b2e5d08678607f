//! `/api/finance/*`: payment plans, payments and dashboard counters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::client::CrmClient;
use super::FinanceApi;
use crate::types::CrmResult;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FinanceStats {
    #[serde(default)]
    pub overdue_payments: u32,
    #[serde(default)]
    pub previous_overdue_payments: u32,
    #[serde(default)]
    pub timely_payments: u32,
    #[serde(default)]
    pub previous_timely_payments: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallmentPlanRequest {
    pub lead_id: i64,
    pub total_amount: Decimal,
    pub number_of_payments: u32,
    pub start_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Installment,
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRequest {
    pub lead_id: i64,
    pub amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub payment_type: PaymentKind,
}

#[async_trait]
impl FinanceApi for CrmClient {
    async fn stats(&self) -> CrmResult<FinanceStats> {
        self.get_json("/api/finance/stats").await
    }

    async fn create_installment_plan(&self, plan: &InstallmentPlanRequest) -> CrmResult<()> {
        let _: serde_json::Value = self
            .send_json(Method::POST, "/api/finance/installments/plan", plan)
            .await?;
        Ok(())
    }

    async fn create_payment(&self, payment: &PaymentRequest) -> CrmResult<()> {
        let _: serde_json::Value = self
            .send_json(Method::POST, "/api/finance/payments/", payment)
            .await?;
        Ok(())
    }
}
