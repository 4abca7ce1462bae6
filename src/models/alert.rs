use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertPriority {
    Normal,
    Critical,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NORMAL" => Some(Self::Normal),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub category: String, // anomaly or pattern code, e.g. "ANOMALIE_TAXE"
    pub amount: Option<Decimal>,
    pub priority: AlertPriority,
    pub resolved: bool,
    pub created_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
    pub dedup_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAlert {
    pub title: String,
    pub description: String,
    pub category: String,
    pub amount: Option<Decimal>,
    pub priority: AlertPriority,
    pub dedup_key: Option<String>,
}

impl NewAlert {
    pub fn new(title: impl Into<String>, description: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            category: category.into(),
            amount: None,
            priority: AlertPriority::Normal,
            dedup_key: None,
        }
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn priority(mut self, priority: AlertPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn dedup_key(mut self, key: Option<String>) -> Self {
        self.dedup_key = key;
        self
    }
}
