//! Integration tests for the purchase saga over in-memory services.

use std::time::Duration;

use async_trait::async_trait;
use common::Money;
use saga::{
    CallJournal, CompensationResult, InMemoryCatalogService, InMemoryInventoryService,
    InMemoryPaymentService, InMemoryPurchaseService, InventoryService, PaymentReceipt,
    PaymentService, PurchaseSaga, ReservationReceipt, RetryPolicy, SagaError, SagaOrchestrator,
    SagaRequest, SagaSettings, SagaState, SagaStatus, Step,
};
use tokio_util::sync::CancellationToken;

type TestOrchestrator = SagaOrchestrator<
    InMemoryCatalogService,
    InMemoryPurchaseService,
    InMemoryPaymentService,
    InMemoryInventoryService,
>;

struct TestHarness {
    orchestrator: TestOrchestrator,
    journal: CallJournal,
    catalog: InMemoryCatalogService,
    purchases: InMemoryPurchaseService,
    payments: InMemoryPaymentService,
    inventory: InMemoryInventoryService,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_settings(SagaSettings::immediate(3))
    }

    fn with_settings(settings: SagaSettings) -> Self {
        let journal = CallJournal::new();
        let catalog = InMemoryCatalogService::new()
            .with_journal(journal.clone())
            .with_product("Widget", Money::from_cents(1999));
        let purchases = InMemoryPurchaseService::new().with_journal(journal.clone());
        let payments = InMemoryPaymentService::new().with_journal(journal.clone());
        let inventory = InMemoryInventoryService::new()
            .with_journal(journal.clone())
            .with_stock("Widget", 10);

        let orchestrator = SagaOrchestrator::new(
            catalog.clone(),
            purchases.clone(),
            payments.clone(),
            inventory.clone(),
            settings,
        );

        Self {
            orchestrator,
            journal,
            catalog,
            purchases,
            payments,
            inventory,
        }
    }

    fn widget_request() -> SagaRequest {
        SagaRequest::new("u1", "Widget", Money::from_cents(1999)).unwrap()
    }
}

#[tokio::test]
async fn test_happy_path_commits_every_step() {
    let h = TestHarness::new();

    let report = h.orchestrator.execute(TestHarness::widget_request()).await;

    assert_eq!(report.status, SagaStatus::Ok);
    assert_eq!(report.final_state, SagaState::Succeeded);
    assert_eq!(
        report.history,
        vec![
            SagaState::Init,
            SagaState::Validating,
            SagaState::Purchasing,
            SagaState::Paying,
            SagaState::Reserving,
            SagaState::Succeeded
        ]
    );
    assert!(report.compensation.is_none());

    let outcome = &report.outcome;
    assert!(outcome.success);
    assert_eq!(outcome.message, "Purchase processed successfully");
    assert!(outcome.error.is_none());
    let data = outcome.data.as_ref().unwrap();
    assert_eq!(data.product.name, "Widget");
    assert_eq!(data.purchase_id, "PUR-0001");
    assert_eq!(data.payment_id, "PAY-0001");
    assert_eq!(data.reservation_id, "RES-0001");

    assert_eq!(
        h.journal.entries(),
        vec![
            "catalog.find_product(Widget)",
            "purchases.create(u1/Widget)",
            "payments.charge(PUR-0001/$19.99)",
            "inventory.reserve(Widgetx1)"
        ]
    );
    assert_eq!(h.purchases.purchase_count(), 1);
    assert_eq!(h.payments.payment_count(), 1);
    assert_eq!(h.inventory.stock("Widget"), 9);
}

#[tokio::test]
async fn test_unknown_product_is_not_found_without_compensation() {
    let h = TestHarness::new();
    let request = SagaRequest::new("u1", "Gadget", Money::from_cents(500)).unwrap();

    let report = h.orchestrator.execute(request).await;

    assert_eq!(report.status, SagaStatus::NotFound);
    assert_eq!(report.status.code(), 404);
    assert_eq!(report.final_state, SagaState::Failed);
    assert_eq!(
        report.history,
        vec![SagaState::Init, SagaState::Validating, SagaState::Failed]
    );
    assert!(report.compensation.is_none());
    assert_eq!(
        report.outcome.error.as_deref(),
        Some("Product 'Gadget' does not exist in the catalog")
    );
    assert_eq!(h.journal.entries(), vec!["catalog.find_product(Gadget)"]);
}

#[tokio::test]
async fn test_catalog_outage_is_single_attempt_not_found() {
    let h = TestHarness::new();
    h.catalog.set_unavailable(true);

    let report = h.orchestrator.execute(TestHarness::widget_request()).await;

    assert_eq!(report.status, SagaStatus::NotFound);
    assert_eq!(h.catalog.lookup_count(), 1);
    assert!(
        report
            .outcome
            .error
            .as_deref()
            .unwrap()
            .starts_with("Product 'Widget' could not be validated")
    );
    assert_eq!(h.purchases.create_attempts(), 0);
}

#[tokio::test]
async fn test_purchase_retries_exhausted_is_conflict_without_compensation() {
    let h = TestHarness::new();
    h.purchases.set_fail_on_create(true);

    let report = h.orchestrator.execute(TestHarness::widget_request()).await;

    assert_eq!(report.status, SagaStatus::Conflict);
    assert_eq!(report.final_state, SagaState::Failed);
    assert!(!report.history.contains(&SagaState::Compensating));
    assert!(report.compensation.is_none());
    assert_eq!(report.outcome.attempts_used, Some(3));
    assert_eq!(report.outcome.message, "Purchase failed");
    assert!(
        report
            .outcome
            .error
            .as_deref()
            .unwrap()
            .starts_with("Failed to create purchase after 3 attempts")
    );
    assert_eq!(h.purchases.create_attempts(), 3);
    assert_eq!(h.payments.charge_attempts(), 0);
    assert!(h.journal.calls_to("purchases", "cancel").is_empty());
}

#[tokio::test]
async fn test_transient_purchase_failure_recovers() {
    let h = TestHarness::new();
    h.purchases.fail_next_creates(2);

    let report = h.orchestrator.execute(TestHarness::widget_request()).await;

    assert_eq!(report.status, SagaStatus::Ok);
    assert_eq!(h.purchases.create_attempts(), 3);
    assert_eq!(h.purchases.purchase_count(), 1);
}

#[tokio::test]
async fn test_payment_failure_cancels_purchase() {
    let h = TestHarness::new();
    h.payments.set_fail_on_charge(true);

    let report = h.orchestrator.execute(TestHarness::widget_request()).await;

    assert_eq!(report.status, SagaStatus::Conflict);
    assert_eq!(report.final_state, SagaState::Failed);
    assert_eq!(
        report.history,
        vec![
            SagaState::Init,
            SagaState::Validating,
            SagaState::Purchasing,
            SagaState::Paying,
            SagaState::Compensating,
            SagaState::Failed
        ]
    );
    assert_eq!(report.outcome.attempts_used, Some(3));
    assert_eq!(
        report.outcome.message,
        "Purchase failed - compensations executed"
    );

    let compensation = report.compensation.unwrap();
    assert_eq!(compensation.attempted_steps(), vec![Step::Purchase]);
    assert_eq!(h.payments.charge_attempts(), 3);
    assert!(h.journal.calls_to("payments", "refund").is_empty());
    assert_eq!(
        h.journal.calls_to("purchases", "cancel"),
        vec!["purchases.cancel(PUR-0001)"]
    );
    assert_eq!(h.purchases.purchase_count(), 0);
    assert_eq!(h.inventory.reserve_attempts(), 0);
}

#[tokio::test]
async fn test_inventory_failure_refunds_then_cancels() {
    let h = TestHarness::new();
    h.inventory.set_stock("Widget", 0);

    let report = h.orchestrator.execute(TestHarness::widget_request()).await;

    assert_eq!(report.status, SagaStatus::Conflict);
    assert_eq!(report.final_state, SagaState::Failed);
    // inventory is never retried and reports no attempt count
    assert_eq!(h.inventory.reserve_attempts(), 1);
    assert_eq!(report.outcome.attempts_used, None);
    assert!(
        report
            .outcome
            .error
            .as_deref()
            .unwrap()
            .starts_with("Failed to reserve inventory")
    );

    let compensation_calls: Vec<String> = h
        .journal
        .entries()
        .into_iter()
        .skip_while(|entry| !entry.starts_with("inventory."))
        .skip(1)
        .collect();
    assert_eq!(
        compensation_calls,
        vec!["payments.refund(PAY-0001)", "purchases.cancel(PUR-0001)"]
    );
    assert_eq!(h.payments.payment_count(), 0);
    assert_eq!(h.purchases.purchase_count(), 0);
}

#[tokio::test]
async fn test_failed_refund_does_not_change_outcome() {
    let h = TestHarness::new();
    h.inventory.set_fail_on_reserve(true);
    h.payments.set_fail_on_refund(true);

    let report = h.orchestrator.execute(TestHarness::widget_request()).await;

    assert_eq!(report.status, SagaStatus::Conflict);
    assert_eq!(report.final_state, SagaState::Failed);
    let compensation = report.compensation.unwrap();
    assert_eq!(compensation.failed_steps(), vec![Step::Payment]);
    assert!(matches!(
        compensation.records()[1].result,
        CompensationResult::Compensated { .. }
    ));
    assert_eq!(h.journal.calls_to("payments", "refund").len(), 1);
    assert_eq!(h.payments.payment_count(), 1);
    assert_eq!(h.purchases.purchase_count(), 0);
}

#[derive(Clone)]
struct PanickingInventory;

#[async_trait]
impl InventoryService for PanickingInventory {
    async fn reserve(
        &self,
        _product_name: &str,
        _quantity: u32,
    ) -> Result<ReservationReceipt, SagaError> {
        panic!("inventory client bug");
    }
}

#[tokio::test]
async fn test_panic_in_step_is_internal_error_with_full_compensation() {
    let journal = CallJournal::new();
    let purchases = InMemoryPurchaseService::new().with_journal(journal.clone());
    let payments = InMemoryPaymentService::new().with_journal(journal.clone());
    let orchestrator = SagaOrchestrator::new(
        InMemoryCatalogService::new().with_product("Widget", Money::from_cents(1999)),
        purchases.clone(),
        payments.clone(),
        PanickingInventory,
        SagaSettings::immediate(3),
    );

    let report = orchestrator.execute(TestHarness::widget_request()).await;

    assert_eq!(report.status, SagaStatus::InternalError);
    assert_eq!(report.status.code(), 500);
    assert_eq!(report.final_state, SagaState::Failed);
    assert_eq!(report.outcome.error.as_deref(), Some("Internal server error"));
    assert_eq!(
        journal.entries()[2..],
        ["payments.refund(PAY-0001)", "purchases.cancel(PUR-0001)"]
    );
    assert_eq!(purchases.purchase_count(), 0);
    assert_eq!(payments.payment_count(), 0);
}

/// Fails every charge and cancels the saga while doing so.
struct CancellingPayments {
    cancel: CancellationToken,
}

#[async_trait]
impl PaymentService for CancellingPayments {
    async fn charge(
        &self,
        _user_id: &str,
        _amount: Money,
        _purchase_id: &str,
    ) -> Result<PaymentReceipt, SagaError> {
        self.cancel.cancel();
        Err(SagaError::Transport {
            service: "payments",
            reason: "connection reset".to_string(),
        })
    }

    async fn refund(&self, _payment_id: &str) -> Result<(), SagaError> {
        panic!("nothing was charged");
    }
}

#[tokio::test]
async fn test_cancellation_during_backoff_compensates_committed_steps() {
    let shutdown = CancellationToken::new();
    let purchases = InMemoryPurchaseService::new();
    let settings = SagaSettings {
        retry: RetryPolicy::new(5, Duration::from_secs(3600)),
        step_delay: Duration::ZERO,
    };
    let orchestrator = SagaOrchestrator::new(
        InMemoryCatalogService::new().with_product("Widget", Money::from_cents(1999)),
        purchases.clone(),
        CancellingPayments {
            cancel: shutdown.clone(),
        },
        InMemoryInventoryService::new().with_stock("Widget", 1),
        settings,
    )
    .with_shutdown(shutdown);

    let report = orchestrator.execute(TestHarness::widget_request()).await;

    assert_eq!(report.status, SagaStatus::InternalError);
    assert_eq!(report.final_state, SagaState::Failed);
    let compensation = report.compensation.unwrap();
    assert_eq!(compensation.attempted_steps(), vec![Step::Purchase]);
    assert_eq!(purchases.purchase_count(), 0);
}

#[tokio::test]
async fn test_concurrent_sagas_keep_separate_progress() {
    let h = TestHarness::new();
    h.inventory.set_stock("Widget", 1);

    let first = SagaRequest::new("u1", "Widget", Money::from_cents(1999)).unwrap();
    let second = SagaRequest::new("u2", "Widget", Money::from_cents(1999)).unwrap();
    let (a, b) = tokio::join!(h.orchestrator.execute(first), h.orchestrator.execute(second));

    let mut statuses = vec![a.status.code(), b.status.code()];
    statuses.sort();
    assert_eq!(statuses, vec![200, 409]);
    assert_ne!(a.saga_id, b.saga_id);

    let (winner, loser) = if a.status == SagaStatus::Ok { (a, b) } else { (b, a) };
    let data = winner.outcome.data.unwrap();
    // only the loser's own transactions were undone
    assert!(h.purchases.has_purchase(&data.purchase_id));
    assert!(h.payments.has_payment(&data.payment_id));
    assert_eq!(h.purchases.purchase_count(), 1);
    assert_eq!(h.payments.payment_count(), 1);
    assert_eq!(
        loser.compensation.unwrap().attempted_steps(),
        vec![Step::Payment, Step::Purchase]
    );
}

#[tokio::test]
async fn test_every_execution_reaches_exactly_one_terminal_state() {
    let scenarios: Vec<Box<dyn Fn(&TestHarness)>> = vec![
        Box::new(|_: &TestHarness| {}),
        Box::new(|h: &TestHarness| h.catalog.set_unavailable(true)),
        Box::new(|h: &TestHarness| h.purchases.set_fail_on_create(true)),
        Box::new(|h: &TestHarness| h.payments.set_fail_on_charge(true)),
        Box::new(|h: &TestHarness| h.inventory.set_fail_on_reserve(true)),
    ];

    for setup in scenarios {
        let h = TestHarness::new();
        setup(&h);
        let report = h.orchestrator.execute(TestHarness::widget_request()).await;

        assert!(report.final_state.is_terminal());
        let terminal_count = report
            .history
            .iter()
            .filter(|state| state.is_terminal())
            .count();
        assert_eq!(terminal_count, 1);
        assert_eq!(
            report.outcome.success,
            report.final_state == SagaState::Succeeded
        );
    }
}

#[tokio::test]
async fn test_orchestrator_behind_trait_object() {
    let h = TestHarness::new();
    let saga: &dyn PurchaseSaga = &h.orchestrator;

    let report = saga.execute(TestHarness::widget_request()).await;

    assert_eq!(report.status, SagaStatus::Ok);
}

fn paced(step_delay: Duration) -> SagaSettings {
    SagaSettings {
        retry: RetryPolicy::new(3, Duration::ZERO),
        step_delay,
    }
}

#[tokio::test(start_paused = true)]
async fn test_forward_steps_pause_between_each_other() {
    let h = TestHarness::with_settings(paced(Duration::from_secs(2)));
    let start = tokio::time::Instant::now();

    let report = h.orchestrator.execute(TestHarness::widget_request()).await;

    assert_eq!(report.status, SagaStatus::Ok);
    // no pause after the last step
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(6), "elapsed: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(7), "elapsed: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_during_forward_pause_cancels_purchase() {
    let h = TestHarness::with_settings(paced(Duration::from_secs(2)));
    let cancel = CancellationToken::new();

    // the purchase commits at 2s and the next pause runs until 4s
    let (report, ()) = tokio::join!(
        h.orchestrator
            .execute_with_cancel(TestHarness::widget_request(), cancel.clone()),
        async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            cancel.cancel();
        }
    );

    assert_eq!(report.status, SagaStatus::InternalError);
    assert_eq!(report.final_state, SagaState::Failed);
    assert!(report.history.contains(&SagaState::Compensating));
    assert_eq!(
        report.compensation.unwrap().attempted_steps(),
        vec![Step::Purchase]
    );
    assert_eq!(
        h.journal.calls_to("purchases", "cancel"),
        vec!["purchases.cancel(PUR-0001)"]
    );
    assert_eq!(h.payments.charge_attempts(), 0);
    assert_eq!(h.purchases.purchase_count(), 0);
}
