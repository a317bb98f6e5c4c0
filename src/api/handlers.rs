use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::{
    parse_wallet_id, LedgerError, LedgerService, MonthlyReport, WalletSummary, WalletTransactions,
};
use crate::domain::{Amount, WalletId};

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreateWalletResponse {
    pub wallet_id: WalletId,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    #[serde(default)]
    pub wallet_id: Value,
    #[serde(default)]
    pub amount: Value,
}

#[derive(Debug, Serialize)]
pub struct AddResponse {
    pub wallet_id: WalletId,
    pub new_balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct SpendResponse {
    pub wallet_id: WalletId,
    pub remaining_balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    #[serde(default)]
    pub from_wallet: Value,
    #[serde(default)]
    pub to_wallet: Value,
    #[serde(default)]
    pub amount: Value,
}

#[derive(Debug, Serialize)]
pub struct WalletBalance {
    pub id: WalletId,
    pub balance: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub from: WalletBalance,
    pub to: WalletBalance,
    pub transferred_amount: Amount,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub wallet_id: WalletId,
    pub balance: Decimal,
}

/// Only a string can name a wallet; any other JSON value, or none, is not found.
fn wallet_id_from_json(value: &Value) -> Result<WalletId, LedgerError> {
    match value {
        Value::String(raw) => parse_wallet_id(raw),
        other => Err(LedgerError::WalletNotFound(vec![other.to_string()])),
    }
}

/// Amounts arrive as JSON strings or numbers; anything else is not an amount.
/// Numbers keep their literal digits (serde_json `arbitrary_precision`).
fn amount_from_json(value: &Value) -> Result<Amount, LedgerError> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Null => return Err(LedgerError::InvalidAmount("amount is required".into())),
        other => return Err(LedgerError::InvalidAmount(format!("not a number: {}", other))),
    };
    Ok(Amount::parse(&raw)?)
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn create_wallet(
    State(service): State<LedgerService>,
    payload: Result<Json<CreateWalletRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateWalletResponse>), ApiError> {
    let Json(req) = payload?;
    let wallet = service.create_wallet(req.name).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateWalletResponse {
            wallet_id: wallet.id,
        }),
    ))
}

pub async fn add_money(
    State(service): State<LedgerService>,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<AddResponse>, ApiError> {
    let Json(req) = payload?;
    let wallet_id = wallet_id_from_json(&req.wallet_id)?;
    let amount = amount_from_json(&req.amount)?;
    let new_balance = service.deposit(wallet_id, amount).await?;
    Ok(Json(AddResponse {
        wallet_id,
        new_balance,
    }))
}

pub async fn spend_money(
    State(service): State<LedgerService>,
    payload: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<SpendResponse>, ApiError> {
    let Json(req) = payload?;
    let wallet_id = wallet_id_from_json(&req.wallet_id)?;
    let amount = amount_from_json(&req.amount)?;
    let remaining_balance = service.withdraw(wallet_id, amount).await?;
    Ok(Json(SpendResponse {
        wallet_id,
        remaining_balance,
    }))
}

pub async fn transfer_money(
    State(service): State<LedgerService>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<TransferResponse>, ApiError> {
    let Json(req) = payload?;
    let from = wallet_id_from_json(&req.from_wallet)?;
    let to = wallet_id_from_json(&req.to_wallet)?;
    let amount = amount_from_json(&req.amount)?;
    let result = service.transfer(from, to, amount).await?;
    Ok(Json(TransferResponse {
        from: WalletBalance {
            id: result.from_wallet,
            balance: result.from_balance,
        },
        to: WalletBalance {
            id: result.to_wallet,
            balance: result.to_balance,
        },
        transferred_amount: result.amount,
    }))
}

pub async fn wallet_balance(
    State(service): State<LedgerService>,
    Path(wallet_id): Path<String>,
) -> Result<Json<BalanceResponse>, LedgerError> {
    let wallet = service.get_wallet(parse_wallet_id(&wallet_id)?).await?;
    Ok(Json(BalanceResponse {
        wallet_id: wallet.id,
        balance: wallet.balance,
    }))
}

pub async fn wallet_transactions(
    State(service): State<LedgerService>,
    Path(wallet_id): Path<String>,
) -> Result<Json<WalletTransactions>, LedgerError> {
    let wallet_id = parse_wallet_id(&wallet_id)?;
    Ok(Json(service.reports().wallet_transactions(wallet_id).await?))
}

pub async fn wallet_summary(
    State(service): State<LedgerService>,
    Path(wallet_id): Path<String>,
) -> Result<Json<WalletSummary>, LedgerError> {
    let wallet_id = parse_wallet_id(&wallet_id)?;
    Ok(Json(service.reports().summary(wallet_id).await?))
}

pub async fn monthly_report(
    State(service): State<LedgerService>,
    path: Result<Path<(String, i32)>, PathRejection>,
) -> Result<Json<MonthlyReport>, ApiError> {
    let Path((wallet_id, year)) = path?;
    let wallet_id = parse_wallet_id(&wallet_id)?;
    Ok(Json(service.reports().monthly_report(wallet_id, year).await?))
}
