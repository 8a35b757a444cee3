//! Selector and strategy behaviour against in-memory collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use remit_core::{AccountType, JobContext, Tenant, TenantId, TenantStatus};
use remit_db::DbError;
use remit_dispatch::{
    idempotency_key, BackendKind, BackendSelection, CustodialDispatcher, DispatchError,
    DispatchSelector, LedgerDispatcher, PaymentClaim, PaymentStatus, PaymentStore, ReadyPayment,
    StatusUpdate,
    SubmissionQueue, SubmissionRequest, Transfer, TransferClient, TransferError, TransferRequest,
    TransferStatus,
};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

const LEDGER_ACCOUNT: &str = "GBUKOFF6FX6767LKKOD3P7KAS43I3Z7CNUBPCH33YZKPPR53ZDRAHCE7";
const ISSUER: &str = "GA5ZSEJYB37JRC5AVCIA5MOP4RHTM335X2KGX3IHOJAPP5RE34K4KZVN";
const WALLET: &str = "1000216185";

#[derive(Default)]
struct PaymentTables {
    ready: HashMap<TenantId, Vec<ReadyPayment>>,
    locked: HashSet<String>,
    updates: Vec<(TenantId, StatusUpdate)>,
}

/// Payment store with row-lock semantics: claimed payments are invisible to
/// other claims until the holder commits or drops its claim.
#[derive(Default)]
struct MemoryPayments {
    tables: Arc<Mutex<PaymentTables>>,
}

impl MemoryPayments {
    fn seed(&self, tenant: TenantId, payments: Vec<ReadyPayment>) {
        self.tables.lock().unwrap().ready.insert(tenant, payments);
    }

    fn updates_with(&self, status: PaymentStatus) -> Vec<String> {
        self.tables
            .lock()
            .unwrap()
            .updates
            .iter()
            .filter(|(_, u)| u.status == status)
            .map(|(_, u)| u.payment_id.clone())
            .collect()
    }

    fn ready_ids(&self, tenant: TenantId) -> Vec<String> {
        let tables = self.tables.lock().unwrap();
        tables
            .ready
            .get(&tenant)
            .map(|all| all.iter().map(|p| p.id.clone()).collect())
            .unwrap_or_default()
    }

    fn locked_count(&self) -> usize {
        self.tables.lock().unwrap().locked.len()
    }
}

#[async_trait]
impl PaymentStore for MemoryPayments {
    async fn claim_ready(
        &self,
        ctx: &JobContext,
        limit: usize,
    ) -> Result<Box<dyn PaymentClaim>, DispatchError> {
        let tenant = ctx.tenant().ok_or(DispatchError::NoTenantInContext)?;
        let mut tables = self.tables.lock().unwrap();
        let payments: Vec<ReadyPayment> = tables
            .ready
            .get(&tenant.id)
            .map(|all| {
                all.iter()
                    .filter(|p| !tables.locked.contains(&p.id))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        tables.locked.extend(payments.iter().map(|p| p.id.clone()));

        Ok(Box::new(MemoryClaim {
            tables: Arc::clone(&self.tables),
            tenant: tenant.id,
            payments,
            staged: Vec::new(),
        }))
    }
}

struct MemoryClaim {
    tables: Arc<Mutex<PaymentTables>>,
    tenant: TenantId,
    payments: Vec<ReadyPayment>,
    staged: Vec<StatusUpdate>,
}

#[async_trait]
impl PaymentClaim for MemoryClaim {
    fn payments(&self) -> &[ReadyPayment] {
        &self.payments
    }

    async fn update_statuses(&mut self, updates: &[StatusUpdate]) -> Result<(), DispatchError> {
        self.staged.extend_from_slice(updates);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DispatchError> {
        let mut claim = self;
        let staged = std::mem::take(&mut claim.staged);
        {
            let mut tables = claim.tables.lock().unwrap();
            for update in staged {
                if update.status != PaymentStatus::Ready {
                    if let Some(ready) = tables.ready.get_mut(&claim.tenant) {
                        ready.retain(|p| p.id != update.payment_id);
                    }
                }
                tables.updates.push((claim.tenant, update));
            }
        }
        Ok(())
    }
}

impl Drop for MemoryClaim {
    fn drop(&mut self) {
        if let Ok(mut tables) = self.tables.lock() {
            for payment in &self.payments {
                tables.locked.remove(&payment.id);
            }
        }
    }
}

#[derive(Default)]
struct RecordingQueue {
    fail: AtomicBool,
    batches: Mutex<Vec<Vec<SubmissionRequest>>>,
}

#[async_trait]
impl SubmissionQueue for RecordingQueue {
    async fn enqueue(&self, batch: &[SubmissionRequest]) -> Result<(), DispatchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispatchError::Enqueue {
                count: batch.len(),
                source: DbError::NotFound,
            });
        }
        self.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

#[derive(Default)]
struct FakeTransfers {
    reject_destination: Mutex<Option<String>>,
    latency: Mutex<Option<Duration>>,
    requests: Mutex<Vec<TransferRequest>>,
}

#[async_trait]
impl TransferClient for FakeTransfers {
    async fn create_transfer(&self, request: &TransferRequest) -> Result<Transfer, TransferError> {
        self.requests.lock().unwrap().push(request.clone());
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let reject = self.reject_destination.lock().unwrap().clone();
        if reject.as_deref() == Some(request.destination_address.as_str()) {
            return Err(TransferError::Rejected {
                status: 400,
                message: "insufficient funds".to_string(),
            });
        }
        Ok(Transfer {
            id: format!("tr-{}", &request.idempotency_key[..8]),
            status: TransferStatus::Pending,
            transaction_hash: None,
        })
    }
}

fn payment(id: &str, destination: &str) -> ReadyPayment {
    ReadyPayment {
        id: id.to_string(),
        status: PaymentStatus::Ready,
        amount: Decimal::new(2500, 2),
        asset_code: "USDC".to_string(),
        asset_issuer: ISSUER.to_string(),
        destination: destination.to_string(),
    }
}

fn tenant_ctx(name: &str) -> (Tenant, JobContext) {
    let tenant = Tenant::new(name).with_status(TenantStatus::Activated);
    let ctx = JobContext::for_tenant(tenant.clone(), CancellationToken::new());
    (tenant, ctx)
}

struct Harness {
    payments: Arc<MemoryPayments>,
    queue: Arc<RecordingQueue>,
    transfers: Arc<FakeTransfers>,
    selector: DispatchSelector,
}

fn harness(with_custodial: bool) -> Harness {
    let payments = Arc::new(MemoryPayments::default());
    let queue = Arc::new(RecordingQueue::default());
    let transfers = Arc::new(FakeTransfers::default());

    let ledger = LedgerDispatcher::new(payments.clone(), queue.clone());
    let custodial = with_custodial
        .then(|| CustodialDispatcher::new(payments.clone(), transfers.clone()));

    Harness {
        payments,
        queue,
        transfers,
        selector: DispatchSelector::new(ledger, custodial),
    }
}

fn ledger_selection() -> BackendSelection {
    BackendSelection::new(AccountType::DistributionStellarDbVault, LEDGER_ACCOUNT)
}

fn custodial_selection() -> BackendSelection {
    BackendSelection::new(AccountType::DistributionCircleDbVault, WALLET)
}

#[test]
fn selector_maps_kinds_to_strategies() {
    let h = harness(true);
    assert_eq!(
        h.selector.select(BackendKind::LedgerDirect).unwrap().kind(),
        BackendKind::LedgerDirect
    );
    assert_eq!(
        h.selector.select(BackendKind::CustodialApi).unwrap().kind(),
        BackendKind::CustodialApi
    );
}

#[test]
fn custodial_strategy_unavailable_without_credentials() {
    let h = harness(false);
    assert!(!h.selector.has_custodial());
    assert!(matches!(
        h.selector.select(BackendKind::CustodialApi),
        Err(DispatchError::BackendUnavailable(BackendKind::CustodialApi))
    ));
}

#[tokio::test]
async fn ledger_batch_enqueues_valid_payments_tagged_with_tenant() {
    let h = harness(false);
    let (tenant, ctx) = tenant_ctx("ledger-org");
    let mut invalid = payment("p3", LEDGER_ACCOUNT);
    invalid.amount = Decimal::ZERO;
    h.payments.seed(
        tenant.id,
        vec![payment("p1", LEDGER_ACCOUNT), payment("p2", LEDGER_ACCOUNT), invalid],
    );

    let selection = ledger_selection();
    let outcome = h
        .selector
        .select(selection.kind)
        .unwrap()
        .submit_batch(&ctx, &selection, 10)
        .await
        .unwrap();

    assert_eq!(outcome.claimed, 3);
    assert_eq!(outcome.submitted, 2);
    assert_eq!(outcome.failed, 1);

    let batches = h.queue.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert!(batches[0]
        .iter()
        .all(|r| r.tenant_id == tenant.id && r.source_account == LEDGER_ACCOUNT));
    assert_eq!(h.payments.updates_with(PaymentStatus::Pending), vec!["p1", "p2"]);
    assert_eq!(h.payments.updates_with(PaymentStatus::Failed), vec!["p3"]);
}

#[tokio::test]
async fn ledger_batch_respects_the_limit() {
    let h = harness(false);
    let (tenant, ctx) = tenant_ctx("ledger-org");
    h.payments.seed(
        tenant.id,
        (0..5).map(|i| payment(&format!("p{i}"), LEDGER_ACCOUNT)).collect(),
    );

    let selection = ledger_selection();
    let outcome = h
        .selector
        .select(selection.kind)
        .unwrap()
        .submit_batch(&ctx, &selection, 2)
        .await
        .unwrap();

    assert_eq!(outcome.claimed, 2);
    assert_eq!(outcome.submitted, 2);
}

#[tokio::test]
async fn ledger_enqueue_failure_leaves_payments_ready() {
    let h = harness(false);
    let (tenant, ctx) = tenant_ctx("ledger-org");
    h.payments.seed(tenant.id, vec![payment("p1", LEDGER_ACCOUNT)]);
    h.queue.fail.store(true, Ordering::SeqCst);

    let selection = ledger_selection();
    let err = h
        .selector
        .select(selection.kind)
        .unwrap()
        .submit_batch(&ctx, &selection, 10)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Enqueue { count: 1, .. }));
    assert!(h.payments.updates_with(PaymentStatus::Pending).is_empty());
    assert_eq!(h.payments.locked_count(), 0);

    // The released payment is claimed again once the queue recovers.
    h.queue.fail.store(false, Ordering::SeqCst);
    let outcome = h
        .selector
        .select(selection.kind)
        .unwrap()
        .submit_batch(&ctx, &selection, 10)
        .await
        .unwrap();
    assert_eq!(outcome.submitted, 1);
    assert_eq!(h.payments.updates_with(PaymentStatus::Pending), vec!["p1"]);
    assert!(h.payments.ready_ids(tenant.id).is_empty());
}

#[tokio::test]
async fn ledger_dispatcher_refuses_custodial_selection() {
    let h = harness(true);
    let (_, ctx) = tenant_ctx("org");
    let err = h
        .selector
        .select(BackendKind::LedgerDirect)
        .unwrap()
        .submit_batch(&ctx, &custodial_selection(), 10)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::BackendMismatch { .. }));
}

#[tokio::test]
async fn custodial_batch_continues_past_a_failed_transfer() {
    let h = harness(true);
    let (tenant, ctx) = tenant_ctx("circle-org");
    let rejected_dest = "GCBADDESTINATIONXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX";
    h.payments.seed(
        tenant.id,
        vec![
            payment("p1", LEDGER_ACCOUNT),
            payment("p2", rejected_dest),
            payment("p3", LEDGER_ACCOUNT),
        ],
    );
    *h.transfers.reject_destination.lock().unwrap() = Some(rejected_dest.to_string());

    let selection = custodial_selection();
    let outcome = h
        .selector
        .select(selection.kind)
        .unwrap()
        .submit_batch(&ctx, &selection, 10)
        .await
        .unwrap();

    assert_eq!(outcome.claimed, 3);
    assert_eq!(outcome.submitted, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(h.payments.updates_with(PaymentStatus::Failed), vec!["p2"]);
    assert_eq!(h.payments.updates_with(PaymentStatus::Pending), vec!["p1", "p3"]);

    let requests = h.transfers.requests.lock().unwrap();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].source_wallet_id, WALLET);
    assert_eq!(requests[0].currency, "USD");
    assert_eq!(requests[0].idempotency_key, idempotency_key(tenant.id, "p1"));
}

#[tokio::test]
async fn custodial_batch_fails_unsupported_assets_without_calling_the_api() {
    let h = harness(true);
    let (tenant, ctx) = tenant_ctx("circle-org");
    let mut native = payment("p1", LEDGER_ACCOUNT);
    native.asset_code = "XLM".to_string();
    native.asset_issuer = String::new();
    h.payments.seed(tenant.id, vec![native]);

    let selection = custodial_selection();
    let outcome = h
        .selector
        .select(selection.kind)
        .unwrap()
        .submit_batch(&ctx, &selection, 10)
        .await
        .unwrap();

    assert_eq!(outcome.failed, 1);
    assert!(h.transfers.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn strategies_require_a_tenant_in_context() {
    let h = harness(true);
    let ctx = JobContext::host(CancellationToken::new());
    let selection = custodial_selection();

    let err = h
        .selector
        .select(selection.kind)
        .unwrap()
        .submit_batch(&ctx, &selection, 10)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::NoTenantInContext));
}

#[tokio::test]
async fn batches_only_touch_the_context_tenant() {
    let h = harness(false);
    let (a, ctx_a) = tenant_ctx("alpha");
    let (b, _) = tenant_ctx("beta");
    h.payments.seed(a.id, vec![payment("a1", LEDGER_ACCOUNT)]);
    h.payments.seed(b.id, vec![payment("b1", LEDGER_ACCOUNT)]);

    let selection = ledger_selection();
    h.selector
        .select(selection.kind)
        .unwrap()
        .submit_batch(&ctx_a, &selection, 10)
        .await
        .unwrap();

    let tables = h.payments.tables.lock().unwrap();
    assert!(tables.updates.iter().all(|(tenant_id, _)| *tenant_id == a.id));
    let batches = h.queue.batches.lock().unwrap();
    assert_eq!(batches[0][0].payment_id, "a1");
}

#[tokio::test]
async fn overlapping_batches_split_ready_payments_between_them() {
    let h = harness(true);
    let (tenant, ctx) = tenant_ctx("circle-org");
    h.payments.seed(
        tenant.id,
        (1..=3).map(|i| payment(&format!("p{i}"), LEDGER_ACCOUNT)).collect(),
    );
    *h.transfers.latency.lock().unwrap() = Some(Duration::from_millis(20));

    let selection = custodial_selection();
    let dispatcher = h.selector.select(selection.kind).unwrap();
    let (first, second) = tokio::join!(
        dispatcher.submit_batch(&ctx, &selection, 2),
        dispatcher.submit_batch(&ctx, &selection, 2),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.claimed + second.claimed, 3);
    assert_eq!(second.claimed, 1);

    let mut keys: Vec<String> = h
        .transfers
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(|r| r.idempotency_key.clone())
        .collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), 3, "every payment is transferred exactly once");

    let mut pending = h.payments.updates_with(PaymentStatus::Pending);
    pending.sort();
    assert_eq!(pending, vec!["p1", "p2", "p3"]);
    assert_eq!(h.payments.locked_count(), 0);
}

#[tokio::test]
async fn payments_left_on_shutdown_stay_ready() {
    let h = harness(true);
    let (tenant, _) = tenant_ctx("circle-org");
    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = JobContext::for_tenant(tenant.clone(), cancel);
    h.payments.seed(tenant.id, vec![payment("p1", LEDGER_ACCOUNT)]);

    let selection = custodial_selection();
    let outcome = h
        .selector
        .select(selection.kind)
        .unwrap()
        .submit_batch(&ctx, &selection, 10)
        .await
        .unwrap();

    assert_eq!(outcome.claimed, 1);
    assert_eq!(outcome.submitted, 0);
    assert!(h.transfers.requests.lock().unwrap().is_empty());
    assert_eq!(h.payments.ready_ids(tenant.id), vec!["p1"]);
    assert_eq!(h.payments.locked_count(), 0);
}
