//! `fitquota user`: provision, inspect and upgrade accounts.

use anyhow::{Context, Result};

use fitquota::quota::{Account, NewAccount, QuotaService};

use super::UserAction;

/// Handle `fitquota user` subcommands.
pub(crate) async fn cmd_user(service: &QuotaService, action: UserAction) -> Result<()> {
    match action {
        UserAction::Add {
            external_id,
            email,
            name,
        } => {
            let account = service
                .directory()
                .provision(NewAccount {
                    external_id,
                    email,
                    full_name: name,
                })
                .await
                .context("failed to provision user")?;
            print_account(&account);
        }
        UserAction::Show { external_id } => {
            let account = service
                .directory()
                .resolve(&external_id)
                .await
                .with_context(|| format!("failed to look up {external_id}"))?;
            print_account(&account);
        }
        UserAction::SetPaid { external_id, paid } => {
            let status = service
                .set_paid_status(&external_id, paid)
                .await
                .with_context(|| format!("failed to update {external_id}"))?;
            println!(
                "{}: {}",
                status.external_id,
                if status.is_paid { "paid" } else { "free" }
            );
        }
    }
    Ok(())
}

fn print_account(account: &Account) {
    for (label, value) in account_rows(account) {
        println!("{label:<12} {value}");
    }
}

fn account_rows(account: &Account) -> Vec<(&'static str, String)> {
    vec![
        ("External ID", account.external_id.clone()),
        ("Internal ID", account.id.to_string()),
        ("Email", account.email.clone().unwrap_or_else(|| "-".into())),
        ("Name", account.full_name.clone().unwrap_or_else(|| "-".into())),
        ("Tier", if account.is_paid { "paid" } else { "free" }.into()),
        ("Created", account.created_at.clone()),
    ]
}
