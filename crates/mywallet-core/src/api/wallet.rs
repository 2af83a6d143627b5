//! Wallet resources: transactions, accounts, categories, reports and the
//! user profile. All of them are plain calls through [`ApiClient::send`].

use tracing::debug;

use super::request::ApiRequest;
use super::{ApiClient, ApiError};
use crate::models::{
    Account, AccountUpdate, Category, CategoryReport, CategoryType, CategoryUpdate, DateRange,
    ExportFormat, MonthlyReport, NewAccount, NewCategory, NewTransaction, ProfileUpdate,
    TotalBalance, Transaction, TransactionFilter, TransactionSummary, TransactionUpdate,
    UserProfile, UserStats,
};

impl ApiClient {
    // ===== Transactions =====

    pub async fn list_transactions(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, ApiError> {
        let transactions: Vec<Transaction> =
            self.get_with_query("/transactions", filter.to_query()).await?;
        debug!("Fetched {} transactions", transactions.len());
        Ok(transactions)
    }

    pub async fn get_transaction(&self, id: &str) -> Result<Transaction, ApiError> {
        self.get(&format!("/transactions/{}", id)).await
    }

    pub async fn create_transaction(&self, transaction: &NewTransaction) -> Result<Transaction, ApiError> {
        self.post("/transactions", transaction).await
    }

    pub async fn update_transaction(&self, id: &str, update: &TransactionUpdate) -> Result<Transaction, ApiError> {
        self.put(&format!("/transactions/{}", id), update).await
    }

    pub async fn delete_transaction(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/transactions/{}", id)).await
    }

    pub async fn transaction_summary(&self, range: &DateRange) -> Result<TransactionSummary, ApiError> {
        self.get_with_query("/transactions/summary", range.to_query()).await
    }

    // ===== Accounts =====

    pub async fn list_accounts(&self) -> Result<Vec<Account>, ApiError> {
        self.get("/accounts").await
    }

    pub async fn get_account(&self, id: &str) -> Result<Account, ApiError> {
        self.get(&format!("/accounts/{}", id)).await
    }

    pub async fn create_account(&self, account: &NewAccount) -> Result<Account, ApiError> {
        self.post("/accounts", account).await
    }

    pub async fn update_account(&self, id: &str, update: &AccountUpdate) -> Result<Account, ApiError> {
        self.put(&format!("/accounts/{}", id), update).await
    }

    pub async fn delete_account(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/accounts/{}", id)).await
    }

    pub async fn total_balance(&self) -> Result<TotalBalance, ApiError> {
        self.get("/accounts/balance").await
    }

    // ===== Categories =====

    pub async fn list_categories(&self, kind: Option<CategoryType>) -> Result<Vec<Category>, ApiError> {
        let mut request = ApiRequest::get("/categories");
        if let Some(kind) = kind {
            request = request.param("type", kind.as_str());
        }
        self.send(request).await?.json()
    }

    pub async fn get_category(&self, id: &str) -> Result<Category, ApiError> {
        self.get(&format!("/categories/{}", id)).await
    }

    pub async fn create_category(&self, category: &NewCategory) -> Result<Category, ApiError> {
        self.post("/categories", category).await
    }

    pub async fn update_category(&self, id: &str, update: &CategoryUpdate) -> Result<Category, ApiError> {
        self.put(&format!("/categories/{}", id), update).await
    }

    pub async fn delete_category(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/categories/{}", id)).await
    }

    // ===== Reports =====

    pub async fn report_by_category(&self, range: &DateRange) -> Result<Vec<CategoryReport>, ApiError> {
        self.get_with_query("/reports/by-category", range.to_query()).await
    }

    pub async fn report_monthly(&self, year: i32) -> Result<Vec<MonthlyReport>, ApiError> {
        self.send(ApiRequest::get("/reports/monthly").param("year", year))
            .await?
            .json()
    }

    /// Raw export file contents (CSV text or PDF bytes).
    pub async fn export_report(&self, format: ExportFormat, range: &DateRange) -> Result<Vec<u8>, ApiError> {
        let request = ApiRequest::get("/reports/export")
            .param("format", format.as_str())
            .query(range.to_query());
        Ok(self.send(request).await?.body)
    }

    // ===== User =====

    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        self.get("/user/profile").await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        self.put("/user/profile", update).await
    }

    pub async fn user_stats(&self) -> Result<UserStats, ApiError> {
        self.get("/user/stats").await
    }
}
