//! Messages sent to the hub.

use serde::{Deserialize, Serialize};

/// An amount in a given currency. The amount is kept as its decimal text so
/// no precision is lost in transit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CurrencyAmount {
    pub ccy: String,
    pub amt: String,
}

impl CurrencyAmount {
    pub fn new(ccy: impl Into<String>, amt: impl Into<String>) -> Self {
        Self {
            ccy: ccy.into(),
            amt: amt.into(),
        }
    }
}

/// Request to lock funds for an atomic transfer with a partner bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AtomicLockRequestV1 {
    pub bank_partner_rtgs_global_id: String,
    pub creditor_amount: CurrencyAmount,
    pub debtor_account: String,
    pub creditor_account: String,
    pub end_to_end_id: String,
}

/// Request to execute a previously locked atomic transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AtomicTransferRequestV1 {
    pub lock_id: String,
    pub end_to_end_id: String,
    /// ISO20022 FIToFICstmrCdtTrf document.
    pub fi_to_fi_customer_credit_transfer: serde_json::Value,
}

/// Confirms or declines an earmark raised by the hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EarmarkConfirmationV1 {
    pub lock_id: String,
    pub success: bool,
}

/// Confirms or declines funds received through an atomic transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AtomicTransferConfirmationV1 {
    pub lock_id: String,
    pub success: bool,
}

/// Updates the ledger position the hub holds for the institution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateLedgerRequestV1 {
    pub account_number: String,
    pub amount: CurrencyAmount,
}

/// Creates a payaway (ISO20022 pacs.008).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PayawayCreationV1 {
    pub fi_to_fi_customer_credit_transfer: serde_json::Value,
}

/// Confirms a received payaway (ISO20022 camt.054).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PayawayConfirmationV1 {
    pub bank_to_customer_debit_credit_notification: serde_json::Value,
}

/// Rejects a received payaway (ISO20022 admi.002).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PayawayRejectionV1 {
    pub message_reject: serde_json::Value,
}

/// Asks the hub for the institution's bank partners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BankPartnersRequestV1 {
    pub rtgs_global_id: String,
}
