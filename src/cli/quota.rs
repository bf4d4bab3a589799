//! `fitquota quota`: inspect or record usage from the command line.

use anyhow::{Context, Result};

use fitquota::quota::{QuotaService, UNLIMITED};

use super::QuotaAction;

fn show_limit(value: i64) -> String {
    if value == UNLIMITED {
        "unlimited".to_string()
    } else {
        value.to_string()
    }
}

/// Handle `fitquota quota` subcommands.
pub(crate) async fn cmd_quota(service: &QuotaService, action: QuotaAction) -> Result<()> {
    match action {
        QuotaAction::Status { external_id } => {
            let s = service
                .status(&external_id)
                .await
                .with_context(|| format!("failed to fetch quota for {external_id}"))?;

            println!(
                "{:<16} {:<6} {:<10} {:<10} {:<6} {}",
                "User", "Used", "Limit", "Remaining", "Paid", "Resets"
            );
            println!("{}", "-".repeat(76));
            println!(
                "{:<16} {:<6} {:<10} {:<10} {:<6} {}",
                external_id,
                s.used,
                show_limit(s.limit),
                show_limit(s.remaining),
                s.is_paid,
                s.reset_time.to_rfc3339(),
            );
        }
        QuotaAction::Check { external_id } => {
            let c = service
                .check(&external_id)
                .await
                .with_context(|| format!("failed to check quota for {external_id}"))?;
            if c.allowed {
                println!(
                    "allowed ({} used, {} remaining)",
                    c.used,
                    show_limit(c.remaining)
                );
            } else {
                println!(
                    "denied: daily limit of {} reached, resets at {}",
                    c.limit,
                    c.reset_time.to_rfc3339()
                );
            }
        }
        QuotaAction::Increment { external_id } => {
            let i = service
                .increment(&external_id)
                .await
                .with_context(|| format!("failed to increment quota for {external_id}"))?;
            println!(
                "recorded: {} used, {} remaining",
                i.used,
                show_limit(i.remaining)
            );
        }
    }

    Ok(())
}
