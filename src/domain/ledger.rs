use chrono::{DateTime, Datelike, Month, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{normalize, zero, Transaction, TransactionKind};

/// Unconditional deposit and withdrawal sums for a set of transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub added: Decimal,
    pub spent: Decimal,
}

impl Totals {
    /// Both sides are non-negative and bounded, so the difference cannot overflow.
    pub fn net(&self) -> Decimal {
        self.added - self.spent
    }

    fn record(mut self, tx: &Transaction) -> Result<Self, FoldError> {
        let slot = match tx.kind {
            TransactionKind::Deposit => &mut self.added,
            TransactionKind::Withdraw => &mut self.spent,
        };
        *slot = slot.checked_add(tx.value).ok_or(FoldError::Overflow)?;
        Ok(self)
    }
}

impl Default for Totals {
    fn default() -> Self {
        Self {
            added: zero(),
            spent: zero(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FoldError {
    #[error("running total exceeds the representable decimal range")]
    Overflow,
    #[error("year {0} is outside the supported calendar range")]
    YearOutOfRange(i32),
}

/// One month of a yearly rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthBucket {
    /// 1 = January ... 12 = December
    pub month: u32,
    pub name: String,
    pub total_added: Decimal,
    pub total_spent: Decimal,
    pub opening_balance: Decimal,
    pub closing_balance: Decimal,
}

/// Sum deposits and withdrawals, failing instead of wrapping past `Decimal::MAX`.
pub fn totals<'a>(
    transactions: impl IntoIterator<Item = &'a Transaction>,
) -> Result<Totals, FoldError> {
    transactions
        .into_iter()
        .try_fold(Totals::default(), |totals, tx| totals.record(tx))
}

/// Balance computed by folding the log: deposits minus withdrawals.
pub fn derived_balance(transactions: &[Transaction]) -> Result<Decimal, FoldError> {
    Ok(normalize(totals(transactions)?.net()))
}

/// First instant of the given month in UTC, or `None` outside chrono's range.
fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Roll a wallet's transactions up into twelve month buckets for `year`.
///
/// January opens at the derived balance of everything strictly before the
/// year; each month closes at `opening + added - spent` and the next month
/// opens where the previous one closed.
pub fn monthly_rollup(
    year: i32,
    transactions: &[Transaction],
) -> Result<Vec<MonthBucket>, FoldError> {
    let out_of_range = || FoldError::YearOutOfRange(year);
    let year_start = month_start(year, 1).ok_or_else(out_of_range)?;
    // The end bound only needs to exist for December's upper edge.
    let year_end = year
        .checked_add(1)
        .and_then(|next| month_start(next, 1))
        .ok_or_else(out_of_range)?;

    let before = transactions.iter().filter(|tx| tx.created_at < year_start);
    let opening = normalize(totals(before)?.net());

    let mut months = [Totals::default(); 12];
    for tx in transactions
        .iter()
        .filter(|tx| tx.created_at >= year_start && tx.created_at < year_end)
    {
        let index = tx.created_at.month0() as usize;
        months[index] = months[index].record(tx)?;
    }

    let mut running = opening;
    let mut buckets = Vec::with_capacity(months.len());
    for (index, totals) in months.iter().enumerate() {
        let month = index as u32 + 1;
        let opening_balance = running;
        let closing_balance = opening_balance
            .checked_add(totals.net())
            .map(normalize)
            .ok_or(FoldError::Overflow)?;
        running = closing_balance;

        buckets.push(MonthBucket {
            month,
            name: Month::try_from(month as u8)
                .map(|m| m.name().to_string())
                .unwrap_or_default(),
            total_added: normalize(totals.added),
            total_spent: normalize(totals.spent),
            opening_balance,
            closing_balance,
        });
    }

    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;
    use crate::domain::{Amount, WalletId};

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    fn deposit(wallet: WalletId, amount: &str, when: DateTime<Utc>) -> Transaction {
        Transaction::deposit(wallet, Amount::parse(amount).unwrap(), when)
    }

    fn withdraw(wallet: WalletId, amount: &str, when: DateTime<Utc>) -> Transaction {
        Transaction::withdraw(wallet, Amount::parse(amount).unwrap(), when)
    }

    fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    #[test]
    fn test_derived_balance_empty() {
        assert_eq!(derived_balance(&[]).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_derived_balance_mixed() {
        let wallet = Uuid::new_v4();
        let transactions = vec![
            deposit(wallet, "100", at(2024, 1, 1)),
            withdraw(wallet, "30.25", at(2024, 1, 2)),
            deposit(wallet, "0.25", at(2024, 1, 3)),
        ];

        assert_eq!(derived_balance(&transactions).unwrap(), dec(70));
    }

    #[test]
    fn test_totals() {
        let wallet = Uuid::new_v4();
        let transactions = vec![
            deposit(wallet, "100", at(2024, 1, 1)),
            deposit(wallet, "50", at(2024, 6, 1)),
            withdraw(wallet, "20", at(2025, 1, 1)),
        ];

        let totals = totals(&transactions).unwrap();
        assert_eq!(totals.added, dec(150));
        assert_eq!(totals.spent, dec(20));
        assert_eq!(totals.net(), dec(130));
    }

    #[test]
    fn test_monthly_rollup_february_march() {
        let wallet = Uuid::new_v4();
        let transactions = vec![
            deposit(wallet, "100", at(2024, 2, 10)),
            withdraw(wallet, "30", at(2024, 3, 5)),
        ];

        let buckets = monthly_rollup(2024, &transactions).unwrap();
        assert_eq!(buckets.len(), 12);

        assert_eq!(buckets[0].name, "January");
        assert_eq!(buckets[0].opening_balance, dec(0));
        assert_eq!(buckets[0].closing_balance, dec(0));

        assert_eq!(buckets[1].opening_balance, dec(0));
        assert_eq!(buckets[1].total_added, dec(100));
        assert_eq!(buckets[1].closing_balance, dec(100));

        assert_eq!(buckets[2].opening_balance, dec(100));
        assert_eq!(buckets[2].total_spent, dec(30));
        assert_eq!(buckets[2].closing_balance, dec(70));

        assert_eq!(buckets[3].opening_balance, dec(70));
        assert_eq!(buckets[11].closing_balance, dec(70));
        assert_eq!(buckets[11].name, "December");
    }

    #[test]
    fn test_monthly_rollup_carries_prior_years() {
        let wallet = Uuid::new_v4();
        let transactions = vec![
            deposit(wallet, "500", at(2022, 7, 1)),
            withdraw(wallet, "100", at(2023, 12, 31)),
            deposit(wallet, "10", at(2025, 1, 1)),
        ];

        let buckets = monthly_rollup(2024, &transactions).unwrap();
        for bucket in &buckets {
            assert_eq!(bucket.opening_balance, dec(400));
            assert_eq!(bucket.closing_balance, dec(400));
            assert_eq!(bucket.total_added, dec(0));
            assert_eq!(bucket.total_spent, dec(0));
        }
    }

    #[test]
    fn test_monthly_rollup_is_a_running_fold() {
        let wallet = Uuid::new_v4();
        let transactions = vec![
            deposit(wallet, "10", at(2024, 1, 31)),
            deposit(wallet, "20", at(2024, 4, 15)),
            withdraw(wallet, "5", at(2024, 4, 16)),
            deposit(wallet, "1.5", at(2024, 12, 31)),
        ];

        let buckets = monthly_rollup(2024, &transactions).unwrap();
        for pair in buckets.windows(2) {
            assert_eq!(pair[1].opening_balance, pair[0].closing_balance);
        }
        for bucket in &buckets {
            assert_eq!(
                bucket.closing_balance,
                bucket.opening_balance + bucket.total_added - bucket.total_spent
            );
        }
        assert_eq!(
            buckets[11].closing_balance,
            derived_balance(&transactions).unwrap()
        );
    }

    #[test]
    fn test_monthly_rollup_month_boundaries() {
        let wallet = Uuid::new_v4();
        let last_instant_of_jan = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        let first_instant_of_feb = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let transactions = vec![
            deposit(wallet, "1", last_instant_of_jan),
            deposit(wallet, "2", first_instant_of_feb),
        ];

        let buckets = monthly_rollup(2024, &transactions).unwrap();
        assert_eq!(buckets[0].total_added, dec(1));
        assert_eq!(buckets[1].total_added, dec(2));
    }

    #[test]
    fn test_monthly_rollup_rejects_unrepresentable_year() {
        assert_eq!(
            monthly_rollup(i32::MAX, &[]).unwrap_err(),
            FoldError::YearOutOfRange(i32::MAX)
        );
    }

    fn max_deposit(wallet: WalletId, when: DateTime<Utc>) -> Transaction {
        Transaction::deposit(wallet, Amount::new(Decimal::MAX).unwrap(), when)
    }

    #[test]
    fn test_totals_overflow_is_an_error() {
        let wallet = Uuid::new_v4();
        let transactions = vec![
            max_deposit(wallet, at(2024, 1, 1)),
            withdraw(wallet, "1", at(2024, 1, 2)),
        ];
        assert_eq!(totals(&transactions).unwrap().net(), Decimal::MAX - dec(1));

        // Balance went MAX -> 0 -> MAX, but the deposit side alone no longer fits
        let transactions = vec![
            max_deposit(wallet, at(2024, 1, 1)),
            Transaction::withdraw(wallet, Amount::new(Decimal::MAX).unwrap(), at(2024, 1, 2)),
            max_deposit(wallet, at(2024, 1, 3)),
        ];
        assert_eq!(totals(&transactions).unwrap_err(), FoldError::Overflow);
        assert_eq!(derived_balance(&transactions).unwrap_err(), FoldError::Overflow);
        assert_eq!(
            monthly_rollup(2024, &transactions).unwrap_err(),
            FoldError::Overflow
        );
    }

    #[test]
    fn test_monthly_rollup_overflow_across_months() {
        let wallet = Uuid::new_v4();
        // Each month's own sums fit; the closing chain does not
        let transactions = vec![
            max_deposit(wallet, at(2023, 12, 1)),
            max_deposit(wallet, at(2024, 3, 1)),
        ];
        assert_eq!(
            monthly_rollup(2024, &transactions).unwrap_err(),
            FoldError::Overflow
        );
    }
}
