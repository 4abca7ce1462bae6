use crate::error::{LedgerError, Result};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Storage format for every timestamp column (local wall-clock time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Largest amount the ledger stores. Below it every two-decimal amount
/// round-trips exactly through a REAL column.
pub const MAX_AMOUNT_UNITS: i64 = 1_000_000_000_000;

pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount.abs() > Decimal::from(MAX_AMOUNT_UNITS) {
        return Err(LedgerError::Invalid(format!(
            "amount {amount} exceeds the ledger limit of {MAX_AMOUNT_UNITS}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionCategory {
    Tax,
    Fee,
    Rental,
    Misc,
}

impl TransactionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tax => "tax",
            Self::Fee => "fee",
            Self::Rental => "rental",
            Self::Misc => "misc",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tax" => Some(Self::Tax),
            "fee" => Some(Self::Fee),
            "rental" => Some(Self::Rental),
            "misc" => Some(Self::Misc),
            _ => None,
        }
    }

    /// Infer the category from a type code prefix (`TAXE_`, `ACTE_`, `LOCATION_`).
    pub fn from_type_code(type_code: &str) -> Self {
        let upper = type_code.to_uppercase();
        if upper.starts_with("TAXE") {
            Self::Tax
        } else if upper.starts_with("ACTE") {
            Self::Fee
        } else if upper.starts_with("LOCATION") {
            Self::Rental
        } else {
            Self::Misc
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub type_code: String, // e.g. "TAXE_FONCIERE"
    pub category: TransactionCategory,
    pub label: String,
    pub amount: Decimal,
    pub payer_name: Option<String>,
    pub payer_number: Option<String>,
    pub citizen_id: Option<i64>,
    pub agent_id: Option<i64>,
    pub payment_mode: String,
    pub status: TransactionStatus,
    pub receipt_number: String,
    pub reference: String,
    pub created_at: NaiveDateTime,
}

/// Input for a ledger insert. `created_at` defaults to the local clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub type_code: String,
    pub category: TransactionCategory,
    pub label: String,
    pub amount: Decimal,
    #[serde(default)]
    pub payer_name: Option<String>,
    #[serde(default)]
    pub payer_number: Option<String>,
    #[serde(default)]
    pub citizen_id: Option<i64>,
    #[serde(default)]
    pub agent_id: Option<i64>,
    #[serde(default = "default_payment_mode")]
    pub payment_mode: String,
    #[serde(default = "default_status")]
    pub status: TransactionStatus,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

fn default_payment_mode() -> String {
    "Espèces".to_string()
}

fn default_status() -> TransactionStatus {
    TransactionStatus::Completed
}

impl NewTransaction {
    pub fn new(type_code: &str, label: &str, amount: Decimal) -> Self {
        Self {
            type_code: type_code.to_string(),
            category: TransactionCategory::from_type_code(type_code),
            label: label.to_string(),
            amount,
            payer_name: None,
            payer_number: None,
            citizen_id: None,
            agent_id: None,
            payment_mode: default_payment_mode(),
            status: default_status(),
            created_at: None,
        }
    }

    pub fn with_agent(mut self, agent_id: i64) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn at(mut self, created_at: NaiveDateTime) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_payer(mut self, name: &str, number: Option<&str>) -> Self {
        self.payer_name = Some(name.to_string());
        self.payer_number = number.map(str::to_string);
        self
    }
}

/// Receipt number unique per insert: `REC-<timestamp>-<8 hex>`.
pub fn generate_receipt_number(at: &NaiveDateTime) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("REC-{}-{}", at.format("%Y%m%d%H%M%S"), &suffix[..8].to_uppercase())
}

/// Human-readable reference combining the receipt and the payer, when known.
pub fn build_reference(receipt: &str, payer_name: Option<&str>, payer_number: Option<&str>) -> String {
    match (payer_name.filter(|n| !n.is_empty()), payer_number.filter(|n| !n.is_empty())) {
        (Some(name), Some(number)) => format!("{receipt} - {name} ({number})"),
        (Some(name), None) => format!("{receipt} - {name}"),
        _ => receipt.to_string(),
    }
}
