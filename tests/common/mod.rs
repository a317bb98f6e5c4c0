// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use fiscus::application::LedgerService;
use fiscus::domain::{Amount, ManualClock, WalletId};
use rust_decimal::Decimal;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Test service whose transactions are stamped by a manual clock
pub async fn test_service_with_clock(
    start: DateTime<Utc>,
) -> Result<(LedgerService, Arc<ManualClock>, TempDir)> {
    let (service, temp_dir) = test_service().await?;
    let clock = Arc::new(ManualClock::new(start));
    let service = service.with_clock(clock.clone());
    Ok((service, clock, temp_dir))
}

/// Midnight UTC on the given day
pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn amount(s: &str) -> Amount {
    Amount::parse(s).unwrap()
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Create a wallet and fund it with an opening deposit
pub async fn funded_wallet(service: &LedgerService, name: &str, funds: &str) -> Result<WalletId> {
    let wallet = service.create_wallet(name).await?;
    service.deposit(wallet.id, amount(funds)).await?;
    Ok(wallet.id)
}
