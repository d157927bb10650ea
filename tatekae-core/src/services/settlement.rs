//! Settlement service - plans and commits the transfers that zero out balances
//!
//! Planning is pure: a greedy pass pairs creditors with debtors. Execution
//! writes one pending settlement record per transfer and never aborts the
//! batch on a single failure. Once every transfer of a plan is written, the
//! records the plan was computed from and the pending settlement records
//! are closed out (marked settled).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Balance, BalanceSheet, Beneficiary, ExpenseRecord, ExpenseUpdate, PlanSource, SettlementPlan,
    SettlementTransfer, User, UserDirectory, EPSILON,
};
use crate::ports::LedgerStore;
use crate::services::balance::{compute_balances, BalanceService};

pub const DEFAULT_SETTLEMENT_MEMO: &str = "bulk settlement";

/// Produce the transfers that bring every balance to zero.
///
/// Creditors (net above [`EPSILON`]) and debtors (net below `-EPSILON`) are
/// each taken in the order given. For a [`BalanceSheet`] that is largest
/// creditor first and least indebted debtor first. Two cursors walk the
/// lists; each step pays `min(credit, debt)` from the current debtor to the
/// current creditor and advances whichever side is exhausted.
///
/// Amounts are rounded half away from zero to whole units. A match that
/// rounds to zero is not emitted. The input is not modified.
pub fn plan_settlements(balances: &[Balance]) -> Vec<SettlementTransfer> {
    let mut creditors: Vec<(&str, Decimal)> = balances
        .iter()
        .filter(|b| b.net_amount > EPSILON)
        .map(|b| (b.user_name.as_str(), b.net_amount))
        .collect();
    // debts are kept as positive magnitudes
    let mut debtors: Vec<(&str, Decimal)> = balances
        .iter()
        .filter(|b| b.net_amount < -EPSILON)
        .map(|b| (b.user_name.as_str(), -b.net_amount))
        .collect();

    let mut transfers = Vec::with_capacity(creditors.len() + debtors.len());
    let (mut i, mut j) = (0, 0);

    while i < creditors.len() && j < debtors.len() {
        let amount = creditors[i].1.min(debtors[j].1);

        if amount > EPSILON {
            let rounded = round_to_unit(amount);
            if rounded > Decimal::ZERO {
                transfers.push(SettlementTransfer::new(debtors[j].0, creditors[i].0, rounded));
            }
        }

        creditors[i].1 -= amount;
        debtors[j].1 -= amount;

        if creditors[i].1 < EPSILON {
            i += 1;
        }
        if debtors[j].1 < EPSILON {
            j += 1;
        }
    }

    transfers
}

fn round_to_unit(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Algorithm that turns balances into transfers
pub trait SettlementStrategy: Send + Sync {
    fn plan(&self, balances: &[Balance]) -> Vec<SettlementTransfer>;
}

/// Largest-first greedy matching, see [`plan_settlements`]
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySettlement;

impl SettlementStrategy for GreedySettlement {
    fn plan(&self, balances: &[Balance]) -> Vec<SettlementTransfer> {
        plan_settlements(balances)
    }
}

/// What happened to a single transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferOutcome {
    /// A settled record was written
    Written { expense_id: Uuid },
    /// Nothing was written; the transfer could not be mapped to users
    Skipped { reason: String },
    /// The store rejected the write
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transfer: SettlementTransfer,
    #[serde(flatten)]
    pub outcome: TransferOutcome,
}

/// Per-transfer outcome of a settlement batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettlementBatchResult {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<TransferResult>,
}

impl SettlementBatchResult {
    fn push(&mut self, transfer: SettlementTransfer, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Written { .. } => self.written += 1,
            TransferOutcome::Skipped { .. } => self.skipped += 1,
            TransferOutcome::Failed { .. } => self.failed += 1,
        }
        self.results.push(TransferResult { transfer, outcome });
    }

    /// True when every transfer was written
    pub fn is_complete(&self) -> bool {
        self.skipped == 0 && self.failed == 0
    }

    /// Transfers whose write failed and may be retried
    pub fn failed_transfers(&self) -> Vec<SettlementTransfer> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TransferOutcome::Failed { .. }))
            .map(|r| r.transfer.clone())
            .collect()
    }

    pub fn written_ids(&self) -> Vec<Uuid> {
        self.results
            .iter()
            .filter_map(|r| match r.outcome {
                TransferOutcome::Written { expense_id } => Some(expense_id),
                _ => None,
            })
            .collect()
    }
}

/// Writes one settled expense record per transfer
pub struct SettlementExecutor {
    store: Arc<dyn LedgerStore>,
    memo: String,
}

impl SettlementExecutor {
    pub fn new(store: Arc<dyn LedgerStore>, memo: impl Into<String>) -> Self {
        Self {
            store,
            memo: memo.into(),
        }
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    /// Commit a batch of transfers
    pub async fn execute(
        &self,
        project_id: Uuid,
        transfers: &[SettlementTransfer],
        directory: &UserDirectory,
    ) -> SettlementBatchResult {
        self.execute_with_progress(project_id, transfers, directory, |_| {})
            .await
    }

    /// Commit a batch of transfers, reporting each outcome as it happens.
    ///
    /// Writes are issued one after another in plan order. A transfer whose
    /// names do not resolve is skipped; a rejected write is recorded and the
    /// batch carries on. Already written records are never rolled back.
    pub async fn execute_with_progress<F>(
        &self,
        project_id: Uuid,
        transfers: &[SettlementTransfer],
        directory: &UserDirectory,
        mut on_progress: F,
    ) -> SettlementBatchResult
    where
        F: FnMut(&TransferResult) + Send,
    {
        let mut batch = SettlementBatchResult::default();

        for transfer in transfers {
            let outcome = match self.to_record(transfer, directory) {
                Err(e) => {
                    tracing::warn!(error = %e, "skipping settlement transfer");
                    TransferOutcome::Skipped {
                        reason: e.to_string(),
                    }
                }
                Ok(record) => match self.store.create_expense(project_id, &record).await {
                    Ok(expense_id) => TransferOutcome::Written { expense_id },
                    Err(e) => {
                        tracing::warn!(
                            project_id = %project_id,
                            expense_id = %record.id,
                            error = %e,
                            "settlement write failed"
                        );
                        TransferOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                },
            };

            batch.push(transfer.clone(), outcome);
            if let Some(last) = batch.results.last() {
                on_progress(last);
            }
        }

        tracing::info!(
            project_id = %project_id,
            written = batch.written,
            skipped = batch.skipped,
            failed = batch.failed,
            "settlement batch finished"
        );

        batch
    }

    fn to_record(
        &self,
        transfer: &SettlementTransfer,
        directory: &UserDirectory,
    ) -> Result<ExpenseRecord> {
        if transfer.amount <= Decimal::ZERO {
            return Err(Error::validation(format!(
                "transfer amount {} is not positive",
                transfer.amount
            )));
        }
        let debtor = resolve(directory, &transfer.from_user_name)?;
        let creditor = resolve(directory, &transfer.to_user_name)?;
        if debtor.id == creditor.id {
            return Err(Error::validation(format!(
                "transfer from {} to itself",
                debtor.name
            )));
        }

        Ok(ExpenseRecord::settlement(
            debtor.id,
            Beneficiary::new(creditor.id, &creditor.name),
            transfer.amount,
            &self.memo,
        ))
    }
}

fn resolve<'a>(directory: &'a UserDirectory, name: &str) -> Result<&'a User> {
    directory.resolve(name).ok_or_else(|| {
        if directory.is_ambiguous(name) {
            Error::Resolution(format!("user name '{}' is shared by several users", name))
        } else {
            Error::Resolution(format!("no user named '{}'", name))
        }
    })
}

/// Balances and the plan that would settle them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementPreview {
    pub balances: BalanceSheet,
    pub plan: SettlementPlan,
}

/// Outcome of executing a plan, with the balances recomputed afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub batch: SettlementBatchResult,
    /// Records closed out after a complete batch
    pub closed: usize,
    pub close_failed: usize,
    /// Plan sources edited or deleted since the preview. When non-zero
    /// nothing is closed out.
    pub stale: usize,
    pub balances_after: BalanceSheet,
}

impl SettlementReport {
    /// True when every transfer landed and nothing is left to settle
    pub fn is_fully_settled(&self) -> bool {
        self.batch.is_complete()
            && self.close_failed == 0
            && self.stale == 0
            && self.balances_after.is_settled()
    }
}

#[derive(Debug, Default)]
struct CloseOut {
    closed: usize,
    failed: usize,
    stale: usize,
}

/// Settlement orchestration: preview, execute, close out, recompute.
///
/// Written settlement records stay pending, and keep counting toward
/// balances, until a complete batch closes out the plan's sources together
/// with every pending record. After a partial batch the recomputed balances
/// therefore already reflect the transfers that were written, and a fresh
/// preview plans only what is still owed.
pub struct SettlementService {
    store: Arc<dyn LedgerStore>,
    balance_service: BalanceService,
    executor: SettlementExecutor,
    strategy: Box<dyn SettlementStrategy>,
}

impl SettlementService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        balance_service: BalanceService,
        executor: SettlementExecutor,
    ) -> Self {
        Self {
            store,
            balance_service,
            executor,
            strategy: Box::new(GreedySettlement),
        }
    }

    pub fn with_strategy(mut self, strategy: impl SettlementStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Compute balances and the transfers that would settle them
    pub async fn preview(&self, project_id: Uuid) -> Result<SettlementPreview> {
        let users = self.store.list_users(project_id).await?;
        let expenses = self.store.list_expenses(project_id).await?;
        let balances = compute_balances(&users, &expenses, self.balance_service.policy())?;

        let sources = expenses
            .iter()
            .filter(|e| e.counts_toward_balance())
            .map(PlanSource::of)
            .collect();
        let plan = SettlementPlan::new(self.strategy.plan(&balances.balances)).with_sources(sources);

        Ok(SettlementPreview { balances, plan })
    }

    /// Execute a previewed plan and recompute balances from the store
    pub async fn settle(&self, project_id: Uuid, plan: &SettlementPlan) -> Result<SettlementReport> {
        self.settle_with_progress(project_id, plan, |_| {}).await
    }

    pub async fn settle_with_progress<F>(
        &self,
        project_id: Uuid,
        plan: &SettlementPlan,
        on_progress: F,
    ) -> Result<SettlementReport>
    where
        F: FnMut(&TransferResult) + Send,
    {
        self.run(project_id, plan, &plan.transfers, &[], on_progress)
            .await
    }

    /// Re-send only the transfers that failed in `previous`, a batch of `plan`.
    ///
    /// Skipped entries of `previous` are carried into the new batch, so the
    /// plan is closed out only once every one of its transfers was written.
    pub async fn retry(
        &self,
        project_id: Uuid,
        plan: &SettlementPlan,
        previous: &SettlementBatchResult,
    ) -> Result<SettlementReport> {
        let carried: Vec<TransferResult> = previous
            .results
            .iter()
            .filter(|r| matches!(r.outcome, TransferOutcome::Skipped { .. }))
            .cloned()
            .collect();

        self.run(
            project_id,
            plan,
            &previous.failed_transfers(),
            &carried,
            |_| {},
        )
        .await
    }

    async fn run<F>(
        &self,
        project_id: Uuid,
        plan: &SettlementPlan,
        transfers: &[SettlementTransfer],
        carried: &[TransferResult],
        on_progress: F,
    ) -> Result<SettlementReport>
    where
        F: FnMut(&TransferResult) + Send,
    {
        let users = self.store.list_users(project_id).await?;
        let directory = UserDirectory::from_users(&users);

        let mut batch = self
            .executor
            .execute_with_progress(project_id, transfers, &directory, on_progress)
            .await;
        for result in carried {
            batch.push(result.transfer.clone(), result.outcome.clone());
        }

        let close = if batch.is_complete() {
            self.close_out(project_id, &plan.sources).await
        } else {
            CloseOut::default()
        };

        let balances_after = self.balance_service.compute(project_id).await?;

        Ok(SettlementReport {
            batch,
            closed: close.closed,
            close_failed: close.failed,
            stale: close.stale,
            balances_after,
        })
    }

    /// Mark the plan's sources and every pending settlement record as
    /// settled. Nothing is touched if a source changed since the preview.
    async fn close_out(&self, project_id: Uuid, sources: &[PlanSource]) -> CloseOut {
        let current = match self.store.list_expenses(project_id).await {
            Ok(expenses) => expenses,
            Err(e) => {
                tracing::warn!(project_id = %project_id, error = %e, "cannot load expenses for close-out");
                return CloseOut {
                    failed: sources.len().max(1),
                    ..CloseOut::default()
                };
            }
        };

        let by_id: HashMap<Uuid, &ExpenseRecord> = current.iter().map(|e| (e.id, e)).collect();
        let stale = sources
            .iter()
            .filter(|s| !by_id.get(&s.expense_id).is_some_and(|e| s.matches(e)))
            .count();
        if stale > 0 {
            tracing::warn!(
                project_id = %project_id,
                stale,
                "expenses changed since the preview, leaving the ledger open"
            );
            return CloseOut {
                stale,
                ..CloseOut::default()
            };
        }

        let source_ids: HashSet<Uuid> = sources.iter().map(|s| s.expense_id).collect();
        let update = ExpenseUpdate::closed();
        let mut out = CloseOut::default();

        for expense in current
            .iter()
            .filter(|e| e.pending || source_ids.contains(&e.id))
        {
            match self
                .store
                .update_expense(project_id, expense.id, &update)
                .await
            {
                Ok(_) => out.closed += 1,
                // deleted in the meantime
                Err(Error::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(expense_id = %expense.id, error = %e, "failed to close out expense");
                    out.failed += 1;
                }
            }
        }

        out
    }
}
