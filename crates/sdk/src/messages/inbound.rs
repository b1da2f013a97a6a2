//! Messages delivered by the hub.

use serde::{Deserialize, Serialize};

use super::CurrencyAmount;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AtomicLockResponseV1 {
    pub lock_id: String,
    pub end_to_end_id: String,
    pub debtor_amount: CurrencyAmount,
    pub creditor_amount: CurrencyAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AtomicTransferResponseV1 {
    pub lock_id: String,
    pub status_code: i32,
    #[serde(default)]
    pub message: Option<String>,
}

/// Funds credited to the institution through an atomic transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AtomicTransferFundsV1 {
    pub lock_id: String,
    pub fi_to_fi_customer_credit_transfer: serde_json::Value,
}

/// The hub rejected an earlier message (ISO20022 admi.002).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageRejectV1 {
    pub message_reject: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PayawayFundsV1 {
    pub fi_to_fi_customer_credit_transfer: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PayawayCompleteV1 {
    pub bank_to_customer_debit_credit_notification: serde_json::Value,
}

/// Funds the hub asks the institution to set aside for a lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EarmarkFundsV1 {
    pub lock_id: String,
    pub account: String,
    pub amount: CurrencyAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EarmarkCompleteV1 {
    pub lock_id: String,
    pub amount: CurrencyAmount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EarmarkReleaseV1 {
    pub lock_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BankPartnersResponseV1 {
    pub bank_partners: Vec<BankPartner>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BankPartner {
    pub rtgs_global_id: String,
    pub bank_name: String,
}
