//! End-to-end flows against the in-memory backend.

use chrono::Utc;
use rust_decimal_macros::dec;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};

use realty_crm::api::leads::{check_move, group_by_status};
use realty_crm::api::{InterestEventKind, LeadApi, NewLead, PaymentKind};
use realty_crm::config::TrackerConfig;
use realty_crm::grid::{ChessBoard, GridEditor};
use realty_crm::pricing::selection::submit_lead;
use realty_crm::pricing::{HybridInitial, InstallmentTier, PaymentPlan, PricingCalculator};
use realty_crm::tracker::{InterestTracker, PageSignal};
use realty_crm::types::{LeadState, LeadStatus, UnitStatus};

use crate::mock_backend::{MockBackend, COMPLEX};

// ---------------------------------------------------------------------------
// Sales: board → quote → lead
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_installment_lead_flow() {
    let backend = MockBackend::new();
    let calc = PricingCalculator::default();

    let board = ChessBoard::load(&backend, COMPLEX).await.unwrap();
    assert_eq!(board.blocks(), vec!["Блок А", "Блок Б"]);
    assert_eq!(board.floors("Блок А"), vec![6, 5]);

    let mut selection = board.open_unit(&backend, "Блок А", "42").await.unwrap();
    let quote = selection
        .select(&calc, PaymentPlan::Installment(InstallmentTier::P30))
        .unwrap();
    assert_eq!(quote.total_price, dec!(50000000));
    assert_eq!(quote.down_payment, dec!(15000000));
    assert_eq!(quote.monthly_payment, dec!(3500000));

    let confirmed = selection.confirm().unwrap();
    let lead = confirmed.apply_to(NewLead::contact("Азиз Каримов", "+998901234567"));
    let created = submit_lead(&backend, &backend, &lead, Utc::now()).await.unwrap();

    let leads = backend.leads.lock().unwrap().clone();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].id, created.id);
    assert_eq!(leads[0].status, LeadStatus::Cold);
    assert_eq!(leads[0].total_price, Some(dec!(15000000)));

    let plans = backend.plans.lock().unwrap().clone();
    assert_eq!(plans.len(), 1);
    assert_eq!(plans[0].number_of_payments, 10);

    let payments = backend.payments.lock().unwrap().clone();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, dec!(3500000));
    assert_eq!(payments[0].payment_type, PaymentKind::Installment);
}

#[tokio::test]
async fn test_full_payment_lead_creates_single_payment() {
    let backend = MockBackend::new();
    let calc = PricingCalculator::default();

    let board = ChessBoard::load(&backend, COMPLEX).await.unwrap();
    let mut selection = board.open_unit(&backend, "Блок А", "42").await.unwrap();
    selection.select(&calc, PaymentPlan::Full).unwrap();
    let quote = selection.active().unwrap();
    assert_eq!(quote.total_price, dec!(45000000));
    assert_eq!(quote.savings, dec!(5000000));

    let lead = selection
        .confirm()
        .unwrap()
        .apply_to(NewLead::contact("Азиз", "+998901234567"));
    submit_lead(&backend, &backend, &lead, Utc::now()).await.unwrap();

    assert!(backend.plans.lock().unwrap().is_empty());
    let payments = backend.payments.lock().unwrap().clone();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, dec!(45000000));
    assert_eq!(payments[0].payment_type, PaymentKind::Full);
}

#[tokio::test]
async fn test_hybrid_lead_creates_plan() {
    let backend = MockBackend::new();
    let calc = PricingCalculator::default();

    let board = ChessBoard::load(&backend, COMPLEX).await.unwrap();
    let mut selection = board.open_unit(&backend, "Блок А", "42").await.unwrap();
    // Last pick wins.
    selection.select(&calc, PaymentPlan::Full).unwrap();
    selection.select(&calc, PaymentPlan::Hybrid(HybridInitial::P20)).unwrap();

    let lead = selection
        .confirm()
        .unwrap()
        .apply_to(NewLead::contact("Азиз", "+998901234567"));
    submit_lead(&backend, &backend, &lead, Utc::now()).await.unwrap();

    assert_eq!(backend.plans.lock().unwrap().len(), 1);
    let payments = backend.payments.lock().unwrap().clone();
    assert_eq!(payments[0].amount, dec!(2777778));
}

#[tokio::test]
async fn test_backend_failure_records_nothing() {
    let backend = MockBackend::new();
    let board = ChessBoard::load(&backend, COMPLEX).await.unwrap();
    let mut selection = board.open_unit(&backend, "Блок Б", "11").await.unwrap();
    selection
        .select(&PricingCalculator::default(), PaymentPlan::Installment(InstallmentTier::P50))
        .unwrap();
    let lead = selection
        .confirm()
        .unwrap()
        .apply_to(NewLead::contact("Азиз", "+998901234567"));

    backend.set_error("database is locked");
    assert!(submit_lead(&backend, &backend, &lead, Utc::now()).await.is_err());
    assert!(backend.leads.lock().unwrap().is_empty());
    assert!(backend.payments.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_sold_unit_cannot_be_opened() {
    let backend = MockBackend::new();
    let board = ChessBoard::load(&backend, COMPLEX).await.unwrap();
    assert!(board.open_unit(&backend, "Блок А", "43").await.is_err());
}

// ---------------------------------------------------------------------------
// Admin grid
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_grid_batch_sends_only_changes() {
    let backend = MockBackend::new();

    let mut editor = GridEditor::load(&backend, COMPLEX).await.unwrap();
    editor.stage_unit("42", Some("Блок А"), UnitStatus::Available).unwrap();
    editor.stage_unit("43", Some("Блок А"), UnitStatus::Available).unwrap();
    editor.stage_unit("51", None, UnitStatus::Sold).unwrap();
    assert_eq!(editor.submit(&backend).await.unwrap(), 2);

    assert_eq!(backend.grid_status("43").as_deref(), Some("свободна"));
    assert_eq!(backend.grid_status("51").as_deref(), Some("продана"));

    let batches = backend.grid_batches.lock().unwrap().clone();
    assert_eq!(batches.len(), 1);
    assert!(batches[0].iter().all(|u| u.complex_name == COMPLEX));

    // Reloaded grid has nothing pending.
    let mut reloaded = GridEditor::load(&backend, COMPLEX).await.unwrap();
    assert_eq!(reloaded.submit(&backend).await.unwrap(), 0);
    assert_eq!(backend.grid_batches.lock().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Interest tracking
// ---------------------------------------------------------------------------

async fn open_tracker(backend: &MockBackend) -> InterestTracker<MockBackend> {
    let board = ChessBoard::load(backend, COMPLEX).await.unwrap();
    let apartment = board.find("Блок А", "42").unwrap().to_apartment(COMPLEX);
    let mut tracker = InterestTracker::new(backend.clone(), 777, TrackerConfig::default());
    tracker.start_session(apartment).await.unwrap();
    tracker
}

#[tokio::test(start_paused = true)]
async fn test_tracker_stops_at_session_cap() {
    let backend = MockBackend::new();
    let mut tracker = open_tracker(&backend).await;

    let (tx, rx) = watch::channel(PageSignal::default());
    let user = async move {
        for activity in 1..=120u64 {
            time::sleep(Duration::from_secs(5)).await;
            let _ = tx.send(PageSignal {
                visible: true,
                activity,
            });
        }
    };

    let summary = tracker.run(rx, user).await.unwrap();
    assert_eq!(backend.reported_seconds(), 180);
    assert_eq!(summary.total_time_seconds, 180);
    assert_eq!(backend.ended_sessions.lock().unwrap().len(), 1);
    assert!(backend
        .heartbeats
        .lock()
        .unwrap()
        .iter()
        .all(|h| h.seconds_elapsed <= 30));
}

#[tokio::test(start_paused = true)]
async fn test_tracker_hidden_time_not_reported() {
    let backend = MockBackend::new();
    let mut tracker = open_tracker(&backend).await;
    let start = Instant::now();

    let (tx, rx) = watch::channel(PageSignal::default());
    let user = async move {
        let mut activity = 0;
        for second in (5..=95u64).step_by(5) {
            time::sleep_until(start + Duration::from_secs(second)).await;
            activity += 1;
            let _ = tx.send(PageSignal {
                visible: !(15..60).contains(&second),
                activity,
            });
        }
    };

    tracker.run(rx, user).await;
    let reported = backend.reported_seconds();
    // 10 s before hiding, then ticks at 70/80/90 after showing again.
    assert!((30..=40).contains(&reported), "reported {reported}");
    assert!(backend.heartbeats.lock().unwrap().iter().all(|h| h.is_visible));
}

#[tokio::test]
async fn test_new_session_ends_previous() {
    let backend = MockBackend::new();
    let mut tracker = open_tracker(&backend).await;
    let first = tracker.session_info().unwrap().session_id;

    let board = ChessBoard::load(&backend, COMPLEX).await.unwrap();
    let other = board.find("Блок Б", "11").unwrap().to_apartment(COMPLEX);
    tracker.start_session(other).await.unwrap();

    assert_eq!(*backend.ended_sessions.lock().unwrap(), vec![first]);
    assert_eq!(tracker.session_info().unwrap().apartment.unit_number, "11");
}

#[tokio::test]
async fn test_interest_events_for_open_apartment() {
    let backend = MockBackend::new();
    let tracker = open_tracker(&backend).await;

    let ack = tracker
        .record_event(InterestEventKind::PaymentView)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ack.bonus_added, 3);
    let ack = tracker
        .record_event(InterestEventKind::MapView)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ack.bonus_added, 2);
    assert_eq!(backend.events.lock().unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Leads Kanban
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_kanban_move() {
    let backend = MockBackend::new();
    for name in ["Азиз", "Дилноза"] {
        let mut lead = NewLead::contact(name, "+998900000000");
        lead.user_id = Some(5);
        backend.create_lead(&lead).await.unwrap();
    }

    let leads = backend.leads_for_user(5).await.unwrap();
    let id = leads[0].id;
    assert!(check_move(LeadStatus::Cold, LeadStatus::Cold).is_err());
    check_move(LeadStatus::Cold, LeadStatus::Hot).unwrap();
    let moved = backend
        .update_lead_status(id, LeadStatus::Hot, LeadState::Processed)
        .await
        .unwrap();
    assert_eq!(moved.state, Some(LeadState::Processed));

    let columns = group_by_status(backend.leads_for_user(5).await.unwrap());
    let counts: Vec<(LeadStatus, usize)> = columns.iter().map(|(s, l)| (*s, l.len())).collect();
    assert_eq!(
        counts,
        vec![(LeadStatus::Cold, 1), (LeadStatus::Warm, 0), (LeadStatus::Hot, 1)]
    );

    let found = backend.search_leads("дилноза").await.unwrap();
    assert_eq!(found.len(), 1);
}
