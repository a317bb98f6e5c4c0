mod common;

use anyhow::Result;
use chrono::Duration;
use common::{amount, dec, test_service, test_service_with_clock, utc};
use fiscus::application::LedgerError;

#[tokio::test]
async fn test_monthly_report_february_march() -> Result<()> {
    let (service, clock, _temp) = test_service_with_clock(utc(2024, 2, 10)).await?;
    let wallet = service.create_wallet("Monthly").await?.id;

    service.deposit(wallet, amount("100")).await?;
    clock.set(utc(2024, 3, 5));
    service.withdraw(wallet, amount("30")).await?;

    let report = service.reports().monthly_report(wallet, 2024).await?;
    let months = &report.monthly_report;
    assert_eq!(report.year, 2024);
    assert_eq!(months.len(), 12);

    assert_eq!(months[0].name, "January");
    assert_eq!(months[0].opening_balance, dec("0"));
    assert_eq!(months[0].closing_balance, dec("0"));

    assert_eq!(months[1].opening_balance, dec("0"));
    assert_eq!(months[1].total_added, dec("100"));
    assert_eq!(months[1].closing_balance, dec("100"));

    assert_eq!(months[2].opening_balance, dec("100"));
    assert_eq!(months[2].total_spent, dec("30"));
    assert_eq!(months[2].closing_balance, dec("70"));

    assert_eq!(months[3].opening_balance, dec("70"));
    assert_eq!(months[11].closing_balance, dec("70"));

    Ok(())
}

#[tokio::test]
async fn test_monthly_report_carries_prior_years() -> Result<()> {
    let (service, clock, _temp) = test_service_with_clock(utc(2023, 11, 20)).await?;
    let wallet = service.create_wallet("Carry").await?.id;

    service.deposit(wallet, amount("500")).await?;
    clock.set(utc(2023, 12, 31) + Duration::hours(23) + Duration::minutes(59));
    service.withdraw(wallet, amount("125.50")).await?;

    // Exactly at the year boundary belongs to the new year
    clock.set(utc(2024, 1, 1));
    service.deposit(wallet, amount("10")).await?;

    let report = service.reports().monthly_report(wallet, 2024).await?;
    let january = &report.monthly_report[0];
    assert_eq!(january.opening_balance, dec("374.50"));
    assert_eq!(january.total_added, dec("10"));
    assert_eq!(january.closing_balance, dec("384.50"));

    // The prior year's own report ends where 2024 begins
    let previous = service.reports().monthly_report(wallet, 2023).await?;
    assert_eq!(previous.monthly_report[10].total_added, dec("500"));
    assert_eq!(previous.monthly_report[11].total_spent, dec("125.50"));
    assert_eq!(previous.monthly_report[11].closing_balance, dec("374.50"));

    Ok(())
}

#[tokio::test]
async fn test_monthly_report_chains_months() -> Result<()> {
    let (service, clock, _temp) = test_service_with_clock(utc(2024, 1, 3)).await?;
    let a = service.create_wallet("A").await?.id;
    let b = service.create_wallet("B").await?.id;
    service.deposit(a, amount("1000")).await?;

    for month in 1..=12 {
        clock.set(utc(2024, month, 15));
        service.transfer(a, b, amount(&format!("{}.10", month * 3))).await?;
        if month % 4 == 0 {
            service.withdraw(b, amount("5")).await?;
        }
    }

    for wallet in [a, b] {
        let report = service.reports().monthly_report(wallet, 2024).await?;
        let months = &report.monthly_report;
        for m in 0..11 {
            assert_eq!(months[m + 1].opening_balance, months[m].closing_balance);
        }
        for bucket in months {
            assert_eq!(
                bucket.closing_balance,
                bucket.opening_balance + bucket.total_added - bucket.total_spent
            );
        }

        let stored = service.get_wallet(wallet).await?.balance;
        assert_eq!(months[11].closing_balance, stored);
    }

    Ok(())
}

#[tokio::test]
async fn test_empty_year_report() -> Result<()> {
    let (service, clock, _temp) = test_service_with_clock(utc(2022, 6, 1)).await?;
    let wallet = service.create_wallet("Idle").await?.id;
    service.deposit(wallet, amount("40")).await?;
    clock.advance(Duration::days(10));

    let report = service.reports().monthly_report(wallet, 2025).await?;
    for bucket in &report.monthly_report {
        assert_eq!(bucket.opening_balance, dec("40"));
        assert_eq!(bucket.closing_balance, dec("40"));
        assert_eq!(bucket.total_added, dec("0"));
        assert_eq!(bucket.total_spent, dec("0"));
    }

    Ok(())
}

#[tokio::test]
async fn test_invalid_year_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let wallet = service.create_wallet("Any").await?.id;

    let err = service
        .reports()
        .monthly_report(wallet, i32::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InvalidYear(year) if year == i32::MAX));

    Ok(())
}

#[tokio::test]
async fn test_summary_totals() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let a = service.create_wallet("A").await?.id;
    let b = service.create_wallet("B").await?.id;

    service.deposit(a, amount("200")).await?;
    service.withdraw(a, amount("20.25")).await?;
    service.transfer(a, b, amount("50")).await?;
    service.deposit(a, amount("0.25")).await?;

    let summary = service.reports().summary(a).await?;
    assert_eq!(summary.total_added, dec("200.25"));
    assert_eq!(summary.total_spent, dec("70.25"));
    assert_eq!(summary.current_balance, dec("130"));

    let check = service.reports().derived_balance(a).await?;
    assert_eq!(check.derived_balance, summary.current_balance);
    assert!(check.is_consistent());

    // Enough for `wallet show` without a second read
    let wallet = service.get_wallet(a).await?;
    assert_eq!(check.name, wallet.name);
    assert_eq!(check.created_at, wallet.created_at);

    Ok(())
}

#[tokio::test]
async fn test_report_serialization_uses_strings() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let wallet = service.create_wallet("Json").await?.id;
    service.deposit(wallet, amount("12.5")).await?;

    let listing = service.reports().wallet_transactions(wallet).await?;
    let json = serde_json::to_value(&listing)?;
    assert_eq!(json["stored_balance"], "12.50");
    assert_eq!(json["derived_balance"], "12.50");
    assert_eq!(json["transactions"][0]["type"], "Deposit");
    assert_eq!(json["transactions"][0]["value"], "12.50");

    Ok(())
}
