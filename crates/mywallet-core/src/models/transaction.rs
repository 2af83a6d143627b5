use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
            TransactionType::Transfer => "transfer",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            "transfer" => Ok(Self::Transfer),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: f64,
    pub category: String,
    #[serde(default)]
    pub description: String,
    pub date: String,
    #[serde(rename = "accountId")]
    pub account_id: String,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Transaction {
    /// Amount with the sign the user expects: expenses negative.
    pub fn signed_amount(&self) -> f64 {
        match self.kind {
            TransactionType::Expense => -self.amount.abs(),
            _ => self.amount,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewTransaction {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: f64,
    pub category: String,
    pub description: String,
    pub date: String,
    #[serde(rename = "accountId")]
    pub account_id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionUpdate {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransactionType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "accountId", skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

/// Query filters for listing transactions. Unset fields are not sent.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub kind: Option<TransactionType>,
    pub account_id: Option<String>,
}

impl TransactionFilter {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(ref start) = self.start_date {
            query.push(("startDate".to_string(), start.clone()));
        }
        if let Some(ref end) = self.end_date {
            query.push(("endDate".to_string(), end.clone()));
        }
        if let Some(kind) = self.kind {
            query.push(("type".to_string(), kind.as_str().to_string()));
        }
        if let Some(ref account) = self.account_id {
            query.push(("accountId".to_string(), account.clone()));
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    #[serde(rename = "totalIncome")]
    pub total_income: f64,
    #[serde(rename = "totalExpense")]
    pub total_expense: f64,
    pub balance: f64,
    #[serde(rename = "transactionCount")]
    pub transaction_count: u64,
}
