//! Mock backend for integration testing.
//!
//! Implements every API trait in memory: a small complex with a sales
//! board and an admin grid, view sessions that enforce the 180 s cap the
//! way the real backend does, and lead/finance sinks the tests inspect.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use realty_crm::api::*;
use realty_crm::types::*;

pub const COMPLEX: &str = "ЖК_Рассвет";
const SESSION_CAP: u32 = 180;

/// A mock CRM backend for deterministic testing.
///
/// Clones share state, so one clone can be moved into a tracker while
/// the test keeps another to inspect what was sent.
#[derive(Clone)]
pub struct MockBackend {
    board: Arc<Vec<Vec<Value>>>,
    grid: Arc<Mutex<Vec<GridRecord>>>,
    pub grid_batches: Arc<Mutex<Vec<Vec<StatusUpdate>>>>,
    pub heartbeats: Arc<Mutex<Vec<HeartbeatRequest>>>,
    session_totals: Arc<Mutex<HashMap<i64, u32>>>,
    pub ended_sessions: Arc<Mutex<Vec<i64>>>,
    pub events: Arc<Mutex<Vec<InterestEventRequest>>>,
    pub leads: Arc<Mutex<Vec<Lead>>>,
    pub plans: Arc<Mutex<Vec<InstallmentPlanRequest>>>,
    pub payments: Arc<Mutex<Vec<PaymentRequest>>>,
    next_id: Arc<Mutex<i64>>,
    /// If set, all operations will return this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let board: Vec<Vec<Value>> = serde_json::from_value(json!([
            ["Блок А", "жилое", "свободна", 2, "42", "50", 5, 45000000],
            ["Блок А", "жилое", "продана", 3, "43", "70", 5, 63000000],
            ["Блок А", "жилое", "бронь", 1, "51", "38,5", 6],
            ["Блок Б", "жилое", "свободна", 2, "11", "55,67", 1, 50103000]
        ]))
        .unwrap_or_default();

        let grid: Vec<GridRecord> = serde_json::from_value(json!([
            {"Подъезд": "Блок А", "Этаж": 5, "Номер помещения": "42", "Статус": "свободна"},
            {"Подъезд": "Блок А", "Этаж": 5, "Номер помещения": "43", "Статус": "продана"},
            {"Подъезд": "Блок А", "Этаж": 6, "Номер помещения": "51", "Статус": "бронь"},
            {"Подъезд": "Блок Б", "Этаж": 1, "Номер помещения": "11", "Статус": "свободна"}
        ]))
        .unwrap_or_default();

        Self {
            board: Arc::new(board),
            grid: Arc::new(Mutex::new(grid)),
            grid_batches: Arc::new(Mutex::new(Vec::new())),
            heartbeats: Arc::new(Mutex::new(Vec::new())),
            session_totals: Arc::new(Mutex::new(HashMap::new())),
            ended_sessions: Arc::new(Mutex::new(Vec::new())),
            events: Arc::new(Mutex::new(Vec::new())),
            leads: Arc::new(Mutex::new(Vec::new())),
            plans: Arc::new(Mutex::new(Vec::new())),
            payments: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(Mutex::new(1)),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    /// Clear any forced error.
    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn grid_status(&self, unit: &str) -> Option<String> {
        self.grid
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.get("Номер помещения").and_then(Value::as_str) == Some(unit))
            .and_then(|r| r.get("Статус").and_then(Value::as_str).map(str::to_string))
    }

    pub fn reported_seconds(&self) -> u32 {
        self.heartbeats.lock().unwrap().iter().map(|h| h.seconds_elapsed).sum()
    }

    fn check(&self, endpoint: &str) -> CrmResult<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(err) => Err(CrmError::Api {
                endpoint: endpoint.to_string(),
                status: 500,
                body: err.clone(),
            }),
            None => Ok(()),
        }
    }

    fn next_id(&self) -> i64 {
        let mut id = self.next_id.lock().unwrap();
        let current = *id;
        *id += 1;
        current
    }
}

#[async_trait]
impl ComplexApi for MockBackend {
    async fn list_complexes(&self) -> CrmResult<Vec<Complex>> {
        self.check("/api/complexes/")?;
        Ok(vec![Complex {
            name: COMPLEX.to_string(),
            address: Some("Ташкент".to_string()),
        }])
    }

    async fn fetch_board(&self, complex: &str) -> CrmResult<Vec<Vec<Value>>> {
        self.check("/api/complexes/jk")?;
        if complex != COMPLEX {
            return Err(CrmError::Api {
                endpoint: "/api/complexes/jk".into(),
                status: 404,
                body: "not found".into(),
            });
        }
        Ok(self.board.as_ref().clone())
    }

    async fn apartment_info(&self, query: &ApartmentQuery) -> CrmResult<ApartmentInfo> {
        self.check("/api/complexes/apartment-info")?;
        let info = json!({
            "pricePerM2_100": 900000,
            "pricePerM2_70": 950000,
            "pricePerM2_50": 980000,
            "pricePerM2_30": 1000000,
            "total_price": 50000000,
            "floor": query.floor,
            "size": query.apartment_size,
            "apartment_number": query.apartment_number,
            "months_left": 10,
            "hybrid_installment_enabled": true
        });
        serde_json::from_value(info).map_err(|e| CrmError::Decode {
            endpoint: "/api/complexes/apartment-info".into(),
            message: e.to_string(),
        })
    }

    async fn list_grid_complexes(&self) -> CrmResult<Vec<String>> {
        self.check("/excel/complexes")?;
        Ok(vec![COMPLEX.to_string()])
    }

    async fn list_complex_files(&self, _complex: &str) -> CrmResult<Vec<String>> {
        self.check("/excel/complexes/files")?;
        Ok(vec![
            "rassvet_jk_data.xlsx".to_string(),
            "rassvet_price_shaxamtka.xlsx".to_string(),
        ])
    }

    async fn fetch_chess_grid(&self, _complex: &str) -> CrmResult<Vec<GridRecord>> {
        self.check("/excel/complexes/chess")?;
        Ok(self.grid.lock().unwrap().clone())
    }

    async fn save_chess_grid(&self, _complex: &str, updates: &[StatusUpdate]) -> CrmResult<()> {
        self.check("/excel/complexes/chess")?;
        let mut grid = self.grid.lock().unwrap();
        for update in updates {
            for row in grid.iter_mut() {
                let unit = row.get("Номер помещения").and_then(Value::as_str);
                let block = row.get("Подъезд").and_then(Value::as_str);
                if unit == Some(update.apartment_number.as_str())
                    && block == Some(update.block_name.as_str())
                {
                    row.insert("Статус".into(), Value::String(update.new_status.to_string()));
                }
            }
        }
        self.grid_batches.lock().unwrap().push(updates.to_vec());
        Ok(())
    }
}

#[async_trait]
impl MiniAppApi for MockBackend {
    async fn init_user(&self, init: &UserInit) -> CrmResult<MiniAppUser> {
        self.check("/api/miniapp/init")?;
        Ok(MiniAppUser {
            id: self.next_id(),
            telegram_id: 777,
            first_name: None,
            last_name: None,
            username: None,
            source_payload: init.start_param.clone().unwrap_or_else(|| "telegram".into()),
            favorites_count: 0,
        })
    }

    async fn start_view_session(&self, _req: &ViewSessionStart) -> CrmResult<ViewSessionStarted> {
        self.check("/api/miniapp/view-session/start")?;
        let session_id = self.next_id();
        self.session_totals.lock().unwrap().insert(session_id, 0);
        Ok(ViewSessionStarted {
            session_id,
            score_id: 1,
            view_count: 1,
        })
    }

    async fn heartbeat(&self, req: &HeartbeatRequest) -> CrmResult<HeartbeatAck> {
        self.check("/api/miniapp/view-session/heartbeat")?;
        self.heartbeats.lock().unwrap().push(req.clone());
        let mut totals = self.session_totals.lock().unwrap();
        let total = totals.entry(req.session_id).or_insert(0);
        *total = (*total + req.seconds_elapsed.min(30)).min(SESSION_CAP);
        Ok(HeartbeatAck {
            session_id: req.session_id,
            total_active_seconds: *total,
            time_score: *total / 10,
            should_end: *total >= SESSION_CAP,
        })
    }

    async fn end_view_session(&self, req: &ViewSessionEnd) -> CrmResult<ViewSessionSummary> {
        self.check("/api/miniapp/view-session/end")?;
        self.ended_sessions.lock().unwrap().push(req.session_id);
        let total = self
            .session_totals
            .lock()
            .unwrap()
            .get(&req.session_id)
            .copied()
            .unwrap_or(0);
        Ok(ViewSessionSummary {
            session_id: req.session_id,
            total_score: 1 + total / 10,
            time_score: total / 10,
            total_time_seconds: total,
        })
    }

    async fn record_interest_event(&self, req: &InterestEventRequest) -> CrmResult<InterestEventAck> {
        self.check("/api/miniapp/interest-event")?;
        self.events.lock().unwrap().push(req.clone());
        let bonus = match req.event_type {
            InterestEventKind::PaymentView => 3,
            InterestEventKind::MapView => 2,
        };
        Ok(InterestEventAck {
            score_id: 1,
            event_type: req.event_type.to_string(),
            bonus_added: bonus,
            total_score: 1 + bonus,
        })
    }

    async fn add_favorite(&self, _req: &FavoriteRequest) -> CrmResult<FavoriteAck> {
        self.check("/api/miniapp/favorites")?;
        Ok(FavoriteAck {
            success: true,
            is_favorite: true,
            total_score: 5,
        })
    }

    async fn remove_favorite(&self, _req: &FavoriteRequest) -> CrmResult<FavoriteAck> {
        self.check("/api/miniapp/favorites")?;
        Ok(FavoriteAck {
            success: true,
            is_favorite: false,
            total_score: 0,
        })
    }

    async fn create_lead_request(&self, req: &LeadRequestCreate) -> CrmResult<LeadRequestRecord> {
        self.check("/api/miniapp/lead-request")?;
        Ok(LeadRequestRecord {
            id: self.next_id(),
            request_type: serde_json::to_value(req.request_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            status: "new".into(),
            interest_score: None,
        })
    }
}

#[async_trait]
impl LeadApi for MockBackend {
    async fn create_lead(&self, lead: &NewLead) -> CrmResult<Lead> {
        self.check("/api/leads/")?;
        lead.validate()?;
        let stored = Lead {
            id: self.next_id(),
            full_name: lead.full_name.clone(),
            phone: lead.phone.clone(),
            status: lead.status,
            state: Some(lead.state),
            complex_name: lead.complex_name.clone(),
            block: lead.block.clone(),
            total_price: Some(lead.total_price),
            user_id: lead.user_id,
        };
        self.leads.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn update_lead_status(&self, id: i64, status: LeadStatus, state: LeadState) -> CrmResult<Lead> {
        self.check("/api/leads/")?;
        let mut leads = self.leads.lock().unwrap();
        let lead = leads.iter_mut().find(|l| l.id == id).ok_or_else(|| CrmError::Api {
            endpoint: "/api/leads/".into(),
            status: 404,
            body: format!("lead {id} not found"),
        })?;
        lead.status = status;
        lead.state = Some(state);
        Ok(lead.clone())
    }

    async fn search_leads(&self, query: &str) -> CrmResult<Vec<Lead>> {
        self.check("/api/leads/search")?;
        let q = query.to_lowercase();
        Ok(self
            .leads
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.full_name.to_lowercase().contains(&q) || l.phone.contains(&q))
            .cloned()
            .collect())
    }

    async fn leads_for_user(&self, user_id: i64) -> CrmResult<Vec<Lead>> {
        self.check("/api/leads/user")?;
        Ok(self
            .leads
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.user_id == Some(user_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FinanceApi for MockBackend {
    async fn stats(&self) -> CrmResult<FinanceStats> {
        self.check("/api/finance/stats")?;
        Ok(FinanceStats {
            overdue_payments: 0,
            previous_overdue_payments: 0,
            timely_payments: self.payments.lock().unwrap().len() as u32,
            previous_timely_payments: 0,
        })
    }

    async fn create_installment_plan(&self, plan: &InstallmentPlanRequest) -> CrmResult<()> {
        self.check("/api/finance/installments/plan")?;
        self.plans.lock().unwrap().push(plan.clone());
        Ok(())
    }

    async fn create_payment(&self, payment: &PaymentRequest) -> CrmResult<()> {
        self.check("/api/finance/payments/")?;
        self.payments.lock().unwrap().push(payment.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_forced_error() {
        let backend = MockBackend::new();
        backend.set_error("backend down");
        let err = backend.list_complexes().await.unwrap_err();
        assert!(err.to_string().contains("backend down"));

        backend.clear_error();
        assert_eq!(backend.list_complexes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_caps_session_total() {
        let backend = MockBackend::new();
        let started = backend
            .start_view_session(&ViewSessionStart::new(
                777,
                &Apartment {
                    complex_name: COMPLEX.into(),
                    block_name: "Блок А".into(),
                    floor: 5,
                    unit_number: "42".into(),
                    area_sqm: None,
                    rooms: None,
                    unit_type: None,
                },
            ))
            .await
            .unwrap();
        let mut last = None;
        for _ in 0..8 {
            last = Some(
                backend
                    .heartbeat(&HeartbeatRequest {
                        session_id: started.session_id,
                        telegram_id: 777,
                        seconds_elapsed: 30,
                        is_visible: true,
                    })
                    .await
                    .unwrap(),
            );
        }
        let last = last.unwrap();
        assert_eq!(last.total_active_seconds, 180);
        assert!(last.should_end);
    }
}
