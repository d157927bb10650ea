//! Balance service - folds expense records into per-user net balances

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{
    Balance, BalanceSheet, DanglingReference, ExpenseRecord, ReferencePolicy, ReferenceRole, User,
};
use crate::ports::LedgerStore;

/// Compute one net balance per user from the unsettled expenses.
///
/// Every record is validated first; a single malformed record rejects the
/// whole call. The payer of each unsettled record is credited the full
/// amount and every beneficiary is debited an exact equal share. Settled
/// records do not contribute, except settlement records still pending
/// close-out. Arithmetic overflow is a validation error.
///
/// Contributions for user ids missing from `users` are handled per
/// `policy`: skipped and listed in [`BalanceSheet::dangling`], or rejected.
///
/// The result is sorted by net amount, largest creditor first; equal
/// amounts keep the order of `users`.
pub fn compute_balances(
    users: &[User],
    expenses: &[ExpenseRecord],
    policy: ReferencePolicy,
) -> Result<BalanceSheet> {
    for expense in expenses {
        expense.validate()?;
    }

    let mut nets: HashMap<Uuid, Balance> = HashMap::with_capacity(users.len());
    for user in users {
        if nets
            .insert(user.id, Balance::new(user.id, &user.name, Decimal::ZERO))
            .is_some()
        {
            return Err(Error::validation(format!("user {} is listed twice", user.id)));
        }
    }

    let mut dangling = Vec::new();
    for expense in expenses.iter().filter(|e| e.counts_toward_balance()) {
        let share = expense.share_per_beneficiary().ok_or_else(|| {
            Error::validation(format!("expense {} has no beneficiaries", expense.id))
        })?;

        match nets.get_mut(&expense.payer_id) {
            Some(balance) => adjust(balance, expense.amount, expense)?,
            None => record_dangling(
                &mut dangling,
                policy,
                DanglingReference {
                    expense_id: expense.id,
                    user_id: expense.payer_id,
                    role: ReferenceRole::Payer,
                    amount: expense.amount,
                },
            )?,
        }

        for beneficiary in &expense.beneficiaries {
            match nets.get_mut(&beneficiary.user_id) {
                Some(balance) => adjust(balance, -share, expense)?,
                None => record_dangling(
                    &mut dangling,
                    policy,
                    DanglingReference {
                        expense_id: expense.id,
                        user_id: beneficiary.user_id,
                        role: ReferenceRole::Beneficiary,
                        amount: share,
                    },
                )?,
            }
        }
    }

    let mut balances: Vec<Balance> = users.iter().filter_map(|u| nets.remove(&u.id)).collect();
    // stable: ties keep user order
    balances.sort_by(|a, b| b.net_amount.cmp(&a.net_amount));

    Ok(BalanceSheet { balances, dangling })
}

fn adjust(balance: &mut Balance, delta: Decimal, expense: &ExpenseRecord) -> Result<()> {
    balance.net_amount = balance.net_amount.checked_add(delta).ok_or_else(|| {
        Error::validation(format!(
            "balance of user {} overflows at expense {}",
            balance.user_id, expense.id
        ))
    })?;
    Ok(())
}

fn record_dangling(
    dangling: &mut Vec<DanglingReference>,
    policy: ReferencePolicy,
    reference: DanglingReference,
) -> Result<()> {
    match policy {
        ReferencePolicy::Reject => Err(Error::inconsistency(reference.to_string())),
        ReferencePolicy::Skip => {
            tracing::warn!(
                expense_id = %reference.expense_id,
                user_id = %reference.user_id,
                role = %reference.role,
                "skipping contribution of unknown user; balances no longer sum to zero"
            );
            dangling.push(reference);
            Ok(())
        }
    }
}

/// Balance service: loads a project snapshot and computes its balances
pub struct BalanceService {
    store: Arc<dyn LedgerStore>,
    policy: ReferencePolicy,
}

impl BalanceService {
    pub fn new(store: Arc<dyn LedgerStore>, policy: ReferencePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> ReferencePolicy {
        self.policy
    }

    /// Compute fresh balances for a project; nothing is cached
    pub async fn compute(&self, project_id: Uuid) -> Result<BalanceSheet> {
        let users = self.store.list_users(project_id).await?;
        let expenses = self.store.list_expenses(project_id).await?;
        compute_balances(&users, &expenses, self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rstest::rstest;

    use crate::domain::{Beneficiary, EPSILON};

    fn users(names: &[&str]) -> Vec<User> {
        names.iter().map(|n| User::new(*n)).collect()
    }

    fn expense(payer: &User, beneficiaries: &[&User], amount: i64) -> ExpenseRecord {
        ExpenseRecord::new(
            payer.id,
            beneficiaries
                .iter()
                .map(|u| Beneficiary::new(u.id, &u.name))
                .collect(),
            Decimal::new(amount, 0),
            NaiveDate::from_ymd_opt(2026, 1, 3).unwrap(),
        )
    }

    fn nets(sheet: &BalanceSheet) -> Vec<(String, Decimal)> {
        sheet
            .balances
            .iter()
            .map(|b| (b.user_name.clone(), b.net_amount))
            .collect()
    }

    #[test]
    fn test_split_between_two_beneficiaries() {
        let u = users(&["A", "B", "C"]);
        let expenses = vec![expense(&u[0], &[&u[1], &u[2]], 3000)];

        let sheet = compute_balances(&u, &expenses, ReferencePolicy::Skip).unwrap();

        assert_eq!(
            nets(&sheet),
            vec![
                ("A".to_string(), Decimal::new(3000, 0)),
                ("B".to_string(), Decimal::new(-1500, 0)),
                ("C".to_string(), Decimal::new(-1500, 0)),
            ]
        );
        assert!(sheet.is_balanced());
        assert!(sheet.dangling.is_empty());
    }

    #[test]
    fn test_single_beneficiary() {
        let u = users(&["A", "B"]);
        let expenses = vec![expense(&u[0], &[&u[1]], 3000)];

        let sheet = compute_balances(&u, &expenses, ReferencePolicy::Skip).unwrap();

        assert_eq!(sheet.get(u[0].id).unwrap().net_amount, Decimal::new(3000, 0));
        assert_eq!(sheet.get(u[1].id).unwrap().net_amount, Decimal::new(-3000, 0));
    }

    #[test]
    fn test_payer_can_be_a_beneficiary() {
        let u = users(&["A", "B"]);
        let expenses = vec![expense(&u[0], &[&u[0], &u[1]], 3000)];

        let sheet = compute_balances(&u, &expenses, ReferencePolicy::Skip).unwrap();

        assert_eq!(sheet.get(u[0].id).unwrap().net_amount, Decimal::new(1500, 0));
        assert_eq!(sheet.get(u[1].id).unwrap().net_amount, Decimal::new(-1500, 0));
    }

    #[test]
    fn test_settled_records_are_excluded() {
        let u = users(&["A", "B"]);
        let mut settled = expense(&u[0], &[&u[1]], 3000);
        settled.mark_settled();
        let open = expense(&u[1], &[&u[0]], 1000);

        let sheet = compute_balances(&u, &[settled, open], ReferencePolicy::Skip).unwrap();

        assert_eq!(sheet.get(u[1].id).unwrap().net_amount, Decimal::new(1000, 0));
        assert_eq!(sheet.get(u[0].id).unwrap().net_amount, Decimal::new(-1000, 0));
    }

    #[test]
    fn test_pending_settlement_record_counts() {
        let u = users(&["A", "B"]);
        let open = expense(&u[0], &[&u[1]], 3000);
        let transfer = ExpenseRecord::settlement(
            u[1].id,
            Beneficiary::new(u[0].id, "A"),
            Decimal::new(1000, 0),
            "bulk settlement",
        );

        let sheet = compute_balances(&u, &[open, transfer.clone()], ReferencePolicy::Skip).unwrap();
        assert_eq!(sheet.get(u[0].id).unwrap().net_amount, Decimal::new(2000, 0));
        assert_eq!(sheet.get(u[1].id).unwrap().net_amount, Decimal::new(-2000, 0));

        let mut closed = transfer;
        closed.pending = false;
        let sheet = compute_balances(&u, &[closed], ReferencePolicy::Skip).unwrap();
        assert!(sheet.is_settled());
    }

    #[test]
    fn test_oversized_amounts_are_an_error() {
        let u = users(&["A", "B"]);
        let mut big = expense(&u[0], &[&u[1]], 1);
        big.amount = Decimal::MAX / Decimal::TWO + Decimal::ONE;
        let mut again = big.clone();
        again.id = Uuid::new_v4();

        let err = compute_balances(&u, &[big, again], ReferencePolicy::Skip).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_adjust_reports_overflow() {
        let u = users(&["A"]);
        let record = expense(&u[0], &[&u[0]], 1);
        let mut balance = Balance::new(u[0].id, "A", Decimal::MAX);

        let err = adjust(&mut balance, Decimal::ONE, &record).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(balance.net_amount, Decimal::MAX);
    }

    #[test]
    fn test_uneven_split_stays_zero_sum() {
        let u = users(&["A", "B", "C", "D"]);
        let expenses = vec![
            expense(&u[0], &[&u[1], &u[2], &u[3]], 1000),
            expense(&u[1], &[&u[0], &u[2], &u[3]], 700),
        ];

        let sheet = compute_balances(&u, &expenses, ReferencePolicy::Skip).unwrap();

        assert!(sheet.total().abs() <= EPSILON);
    }

    #[test]
    fn test_ties_keep_user_order() {
        let u = users(&["A", "B", "C"]);
        let expenses = vec![expense(&u[0], &[&u[1], &u[2]], 3000)];

        let sheet = compute_balances(&u, &expenses, ReferencePolicy::Skip).unwrap();
        let order: Vec<&str> = sheet.balances.iter().map(|b| b.user_name.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);

        let reversed: Vec<User> = u.iter().rev().cloned().collect();
        let sheet = compute_balances(&reversed, &expenses, ReferencePolicy::Skip).unwrap();
        let order: Vec<&str> = sheet.balances.iter().map(|b| b.user_name.as_str()).collect();
        assert_eq!(order, vec!["A", "C", "B"]);
    }

    #[test]
    fn test_users_without_expenses_get_zero() {
        let u = users(&["A", "B", "C"]);
        let sheet = compute_balances(&u, &[], ReferencePolicy::Skip).unwrap();

        assert_eq!(sheet.balances.len(), 3);
        assert!(sheet.is_settled());
    }

    #[test]
    fn test_dangling_reference_is_reported() {
        let u = users(&["A", "B"]);
        let ghost = User::new("Ghost");
        let expenses = vec![expense(&u[0], &[&u[1], &ghost], 3000)];

        let sheet = compute_balances(&u, &expenses, ReferencePolicy::Skip).unwrap();

        assert_eq!(sheet.dangling.len(), 1);
        assert_eq!(sheet.dangling[0].user_id, ghost.id);
        assert_eq!(sheet.dangling[0].role, ReferenceRole::Beneficiary);
        assert_eq!(sheet.dangling[0].amount, Decimal::new(1500, 0));
        assert!(!sheet.is_balanced());
    }

    #[test]
    fn test_dangling_payer_is_reported() {
        let u = users(&["A"]);
        let ghost = User::new("Ghost");
        let expenses = vec![expense(&ghost, &[&u[0]], 500)];

        let sheet = compute_balances(&u, &expenses, ReferencePolicy::Skip).unwrap();

        assert_eq!(sheet.dangling.len(), 1);
        assert_eq!(sheet.dangling[0].role, ReferenceRole::Payer);
        assert_eq!(sheet.get(u[0].id).unwrap().net_amount, Decimal::new(-500, 0));
    }

    #[test]
    fn test_reject_policy_fails_on_dangling_reference() {
        let u = users(&["A"]);
        let ghost = User::new("Ghost");
        let expenses = vec![expense(&u[0], &[&ghost], 500)];

        let err = compute_balances(&u, &expenses, ReferencePolicy::Reject).unwrap_err();
        assert!(matches!(err, Error::InputInconsistency(_)));
    }

    #[rstest]
    #[case::zero_amount(0)]
    #[case::negative_amount(-100)]
    fn test_invalid_amount_is_rejected(#[case] amount: i64) {
        let u = users(&["A", "B"]);
        let expenses = vec![expense(&u[0], &[&u[1]], amount)];

        let err = compute_balances(&u, &expenses, ReferencePolicy::Skip).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_settled_but_malformed_record_is_still_rejected() {
        let u = users(&["A", "B"]);
        let mut bad = expense(&u[0], &[], 100);
        bad.settled = true;

        let err = compute_balances(&u, &[bad], ReferencePolicy::Skip).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_duplicate_user_is_rejected() {
        let a = User::new("A");
        let err = compute_balances(&[a.clone(), a], &[], ReferencePolicy::Skip).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let u = users(&["A", "B", "C"]);
        let expenses = vec![
            expense(&u[0], &[&u[1], &u[2]], 3000),
            expense(&u[2], &[&u[0]], 800),
        ];

        let first = compute_balances(&u, &expenses, ReferencePolicy::Skip).unwrap();
        let second = compute_balances(&u, &expenses, ReferencePolicy::Skip).unwrap();
        assert_eq!(first, second);
    }
}
