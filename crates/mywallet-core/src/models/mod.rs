//! Data models for MyWallet API resources.
//!
//! Field names follow the API's camelCase JSON. Create payloads carry only
//! the fields the client may set; update payloads are all-optional and send
//! only what is present.
//!
//! - `Transaction`, `TransactionFilter`, `TransactionSummary`
//! - `Account`, `TotalBalance`
//! - `Category`
//! - Report rows: `CategoryReport`, `MonthlyReport`
//! - `UserProfile`, `UserStats`

pub mod account;
pub mod category;
pub mod report;
pub mod transaction;
pub mod user;

pub use account::{Account, AccountType, AccountUpdate, NewAccount, TotalBalance};
pub use category::{Category, CategoryType, CategoryUpdate, NewCategory};
pub use report::{CategoryReport, DateRange, ExportFormat, MonthlyReport};
pub use transaction::{
    NewTransaction, Transaction, TransactionFilter, TransactionSummary, TransactionType,
    TransactionUpdate,
};
pub use user::{ProfileUpdate, UserProfile, UserStats};
