use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use mywallet_core::models::{
    CategoryType, DateRange, ExportFormat, TransactionFilter, TransactionType,
};
use mywallet_core::{ApiClient, AuthError, Config, LoginCredentials, SessionStatus};

/// Environment variable consulted before prompting for a password
const PASSWORD_ENV: &str = "MYWALLET_PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "mywallet", version, about = "MyWallet personal finance client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in (or create an account with --sign-up)
    Login {
        #[arg(short, long)]
        username: Option<String>,
        #[arg(long)]
        sign_up: bool,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show who is signed in
    Status,
    /// List transactions
    Transactions {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long = "type")]
        kind: Option<TransactionType>,
        #[arg(long)]
        account: Option<String>,
    },
    /// Income, expense and balance totals
    Summary {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// List accounts
    Accounts,
    /// Total balance across accounts
    Balance,
    /// List categories
    Categories {
        #[arg(long = "type")]
        kind: Option<CategoryType>,
    },
    /// Reports computed by the server
    Report {
        #[command(subcommand)]
        report: ReportCommand,
    },
    /// Show the user profile and usage stats
    Profile,
}

#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    Monthly {
        #[arg(long)]
        year: i32,
    },
    ByCategory {
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    Export {
        #[arg(long, default_value = "csv")]
        format: ExportFormat,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
}

pub async fn run(command: Command, api: &ApiClient, config: &mut Config) -> Result<()> {
    match command {
        Command::Login { username, sign_up } => login(api, config, username, sign_up).await,
        Command::Logout => {
            api.session().sign_out().await;
            println!("Signed out");
            Ok(())
        }
        Command::Status => {
            status(api);
            Ok(())
        }
        other => {
            if !api.session().is_signed_in() {
                anyhow::bail!("Not signed in. Run `mywallet login` first.");
            }
            resource(other, api).await
        }
    }
}

async fn login(api: &ApiClient, config: &mut Config, username: Option<String>, sign_up: bool) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt("Username: ")?,
    };
    let password = match std::env::var(PASSWORD_ENV) {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };
    if username.is_empty() || password.is_empty() {
        anyhow::bail!("Username and password required");
    }

    let credentials = LoginCredentials::new(username.clone(), password);
    let result = if sign_up {
        api.session().sign_up(&credentials).await
    } else {
        api.session().sign_in(&credentials).await
    };

    let identity = match result {
        Ok(identity) => identity,
        Err(e @ AuthError::InvalidCredentials(_)) => anyhow::bail!("Login failed: {}", e.user_message()),
        Err(e) => return Err(anyhow::Error::new(e).context("Login failed")),
    };

    config.last_username = Some(username);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }
    println!("Signed in as {}", identity.display());
    Ok(())
}

fn status(api: &ApiClient) {
    let session = api.session();
    match session.status() {
        SessionStatus::SignedIn(identity) => {
            println!("Signed in as {} (via {})", identity.display(), session.provider_name());
            if let Some(minutes) = session.current_token().and_then(|c| c.minutes_until_expiry()) {
                println!("Token expires in {} min", minutes);
            }
        }
        SessionStatus::SignedOut | SessionStatus::Unknown => println!("Not signed in"),
    }
}

async fn resource(command: Command, api: &ApiClient) -> Result<()> {
    match command {
        Command::Transactions { start, end, kind, account } => {
            let filter = TransactionFilter {
                start_date: start,
                end_date: end,
                kind,
                account_id: account,
            };
            for tx in api.list_transactions(&filter).await? {
                println!(
                    "{}  {:>12.2}  {:<16} {}",
                    tx.date,
                    tx.signed_amount(),
                    tx.category,
                    tx.description
                );
            }
        }
        Command::Summary { start, end } => {
            let summary = api
                .transaction_summary(&DateRange { start_date: start, end_date: end })
                .await?;
            println!("Income:       {:>12.2}", summary.total_income);
            println!("Expense:      {:>12.2}", summary.total_expense);
            println!("Balance:      {:>12.2}", summary.balance);
            println!("Transactions: {:>12}", summary.transaction_count);
        }
        Command::Accounts => {
            for account in api.list_accounts().await? {
                println!(
                    "{:<24} {:>12.2} {}",
                    account.name, account.balance, account.currency
                );
            }
        }
        Command::Balance => {
            let balance = api.total_balance().await?;
            println!("{:.2} {}", balance.total_balance, balance.currency);
        }
        Command::Categories { kind } => {
            for category in api.list_categories(kind).await? {
                println!("{:<24} {}", category.name, category.kind.as_str());
            }
        }
        Command::Report { report } => run_report(report, api).await?,
        Command::Profile => {
            let profile = api.profile().await?;
            let stats = api.user_stats().await?;
            println!("{}", profile.name_for_display());
            if let Some(ref email) = profile.email {
                println!("Email: {}", email);
            }
            if let Some(ref preferences) = profile.preferences {
                println!("Preferences: {}", serde_json::to_string_pretty(preferences)?);
            }
            println!(
                "{} transactions, {} accounts, {} categories",
                stats.total_transactions, stats.total_accounts, stats.total_categories
            );
            if let Some(ref last) = stats.last_transaction_date {
                println!("Last transaction: {}", last);
            }
        }
        Command::Login { .. } | Command::Logout | Command::Status => unreachable!("handled in run"),
    }
    Ok(())
}

async fn run_report(report: ReportCommand, api: &ApiClient) -> Result<()> {
    match report {
        ReportCommand::Monthly { year } => {
            for row in api.report_monthly(year).await? {
                println!(
                    "{:>2}  income {:>12.2}  expense {:>12.2}  balance {:>12.2}",
                    row.month, row.income, row.expense, row.balance
                );
            }
        }
        ReportCommand::ByCategory { start, end } => {
            let range = DateRange { start_date: start, end_date: end };
            for row in api.report_by_category(&range).await? {
                println!(
                    "{:<24} {:>12.2} {:>6.1}% ({} transactions)",
                    row.category, row.amount, row.percentage, row.transaction_count
                );
            }
        }
        ReportCommand::Export { format, output, start, end } => {
            let range = DateRange { start_date: start, end_date: end };
            let bytes = api.export_report(format, &range).await?;
            std::fs::write(&output, &bytes)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Wrote {} bytes to {}", bytes.len(), output.display());
        }
    }
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transactions_filters() {
        let cli = Cli::try_parse_from([
            "mywallet", "transactions", "--type", "expense", "--start", "2024-01-01",
        ])
        .unwrap();
        match cli.command {
            Command::Transactions { kind, start, end, account } => {
                assert_eq!(kind, Some(TransactionType::Expense));
                assert_eq!(start.as_deref(), Some("2024-01-01"));
                assert!(end.is_none());
                assert!(account.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_report_export() {
        let cli = Cli::try_parse_from([
            "mywallet", "report", "export", "--format", "pdf", "-o", "out.pdf",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Report {
                report: ReportCommand::Export { format: ExportFormat::Pdf, .. }
            }
        ));
    }

    #[test]
    fn test_rejects_unknown_type() {
        assert!(Cli::try_parse_from(["mywallet", "categories", "--type", "gift"]).is_err());
    }
}
