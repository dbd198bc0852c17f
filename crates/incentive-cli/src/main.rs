// Incentive CLI - operator client for the incentive ledger API

mod client;
mod template;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use incentive_core::{CreditEventType, DefinitionError, HistoryRow};
use serde_json::{json, Value};
use std::path::PathBuf;

use client::ApiClient;

/// Incentive - award bonuses, adjust credits and manage promo codes
#[derive(Parser)]
#[command(name = "incentive")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Base URL of the incentive server
    #[arg(long, env = "INCENTIVES_URL", default_value = "http://localhost:5000", global = true)]
    server: String,

    /// Print the raw JSON response
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a balance and its history (use "all" for every user)
    Balance {
        user: String,

        #[arg(long, value_name = "YYYY-MM-DD")]
        start_date: Option<String>,

        #[arg(long, value_name = "YYYY-MM-DD")]
        end_date: Option<String>,

        #[arg(long, value_parser = parse_event_type)]
        event_type: Option<CreditEventType>,

        #[arg(long)]
        scheme_id: Option<i64>,

        #[arg(long)]
        promo_id: Option<i64>,
    },
    /// Award a scheme bonus
    Award {
        #[arg(long)]
        user: String,

        #[arg(long)]
        scheme: i64,

        /// Triggering transaction (required by tiered and percentage schemes)
        #[arg(long)]
        transaction: Option<String>,

        /// Reuse a key to retry safely (a fresh one is generated otherwise)
        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Record a manual credit adjustment
    Adjust {
        #[arg(long)]
        user: String,

        /// Signed amount: positive for EARNED, negative otherwise
        #[arg(long, allow_hyphen_values = true)]
        amount: String,

        #[arg(long = "type", value_parser = parse_event_type)]
        event_type: CreditEventType,

        #[arg(long)]
        reason: String,

        #[arg(long)]
        notes: String,

        #[arg(long)]
        scheme_id: Option<i64>,

        #[arg(long)]
        idempotency_key: Option<String>,
    },
    /// Validate, redeem and manage promo codes
    Promo {
        #[command(subcommand)]
        action: PromoAction,
    },
    /// Bonus scheme administration
    Schemes {
        #[command(subcommand)]
        action: ListAction,
    },
    /// User segment administration
    Segments {
        #[command(subcommand)]
        action: ListAction,
    },
}

#[derive(Subcommand)]
enum PromoAction {
    /// List all promo codes
    List,
    /// Check a code against a transfer without consuming it
    Validate {
        #[arg(long)]
        code: String,

        #[arg(long)]
        amount: String,

        #[arg(long)]
        user: Option<String>,

        /// Source currency
        #[arg(long)]
        from: Option<String>,

        /// Destination currency
        #[arg(long)]
        to: Option<String>,

        /// Payment method
        #[arg(long)]
        method: Option<String>,
    },
    /// Redeem a code
    Apply {
        #[arg(long)]
        code: String,

        #[arg(long)]
        discount: String,

        /// Redeeming user; needs --transaction so the per-user cap can count it
        #[arg(long, requires = "transaction")]
        user: Option<String>,

        #[arg(long)]
        transaction: Option<String>,
    },
    /// Disable a code (kill switch)
    Disable { id: i64 },
    /// Re-enable a disabled code
    Enable { id: i64 },
    /// Generate a batch of codes from a JSON template
    Generate {
        #[arg(long)]
        count: usize,

        #[arg(long)]
        prefix: Option<String>,

        #[arg(long, value_name = "FILE")]
        template: PathBuf,
    },
}

#[derive(Subcommand)]
enum ListAction {
    /// List all entries
    List,
}

fn parse_event_type(s: &str) -> Result<CreditEventType, DefinitionError> {
    s.parse()
}

fn main() {
    let cli = Cli::parse();
    let client = ApiClient::new(&cli.server);

    let result = match cli.command {
        Commands::Balance {
            user,
            start_date,
            end_date,
            event_type,
            scheme_id,
            promo_id,
        } => {
            let mut query = Vec::new();
            if let Some(v) = start_date {
                query.push(("startDate", v));
            }
            if let Some(v) = end_date {
                query.push(("endDate", v));
            }
            if let Some(v) = event_type {
                query.push(("eventType", v.to_string()));
            }
            if let Some(v) = scheme_id {
                query.push(("schemeId", v.to_string()));
            }
            if let Some(v) = promo_id {
                query.push(("promoId", v.to_string()));
            }
            handle_balance(&client, &user, &query, cli.json)
        }
        Commands::Award {
            user,
            scheme,
            transaction,
            idempotency_key,
        } => handle_award(&client, &user, scheme, transaction, idempotency_key, cli.json),
        Commands::Adjust {
            user,
            amount,
            event_type,
            reason,
            notes,
            scheme_id,
            idempotency_key,
        } => {
            let body = json!({
                "user_id": user,
                "amount": amount,
                "type": event_type.as_str(),
                "reason_code": reason,
                "notes": notes,
                "scheme_id": scheme_id,
                "idempotency_key": idempotency_key,
            });
            handle_adjust(&client, &body, cli.json)
        }
        Commands::Promo { action } => handle_promo(&client, action, cli.json),
        Commands::Schemes { action: ListAction::List } => {
            handle_list(&client, "/bonus-schemes", cli.json, print_scheme)
        }
        Commands::Segments { action: ListAction::List } => {
            handle_list(&client, "/user-segments", cli.json, print_segment)
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "✗".red().bold(), format!("Error: {}", e).red());
        std::process::exit(1);
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_balance(
    client: &ApiClient,
    user: &str,
    query: &[(&str, String)],
    raw: bool,
) -> Result<()> {
    let response = client.get(&format!("/credits/{}", user), query)?;
    if raw {
        return print_json(&response);
    }

    let history: Vec<HistoryRow> = serde_json::from_value(response["history"].clone())?;
    let currency = response["currency"].as_str().unwrap_or_default();

    println!("Balance:        {} {}", value_text(&response["balance"]).bold(), currency);
    println!("Cost incurred:  {} {}", value_text(&response["cost_incurred"]), currency);
    println!();

    if history.is_empty() {
        println!("{}", "No history".dimmed());
        return Ok(());
    }
    for row in &history {
        let amount = row.amount.to_string();
        let amount = if row.event_type.is_credit() {
            amount.green()
        } else {
            amount.red()
        };
        println!(
            "  {}  {:<8} {:>12}  {:<10} {}",
            row.created_at.format("%Y-%m-%d %H:%M"),
            row.event_type.as_str(),
            amount,
            row.user_id,
            row.scheme_name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

fn handle_award(
    client: &ApiClient,
    user: &str,
    scheme: i64,
    transaction: Option<String>,
    idempotency_key: Option<String>,
    raw: bool,
) -> Result<()> {
    let key = idempotency_key.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let response = client.post(
        "/credits/award-bonus",
        &json!({
            "user_id": user,
            "scheme_id": scheme,
            "transaction_id": transaction,
            "idempotency_key": key,
        }),
    )?;
    if raw {
        return print_json(&response);
    }

    let heading = if response["idempotent"] == true {
        "Award already recorded".yellow()
    } else {
        "Bonus awarded".green()
    };
    println!("{} {}", "✓".green().bold(), heading);
    println!();
    println!("  Scheme:  {}", response["scheme_name"].as_str().unwrap_or_default());
    println!("  Amount:  {}", value_text(&response["amount"]));
    println!("  Expires: {}", value_text(&response["expires_at"]));
    println!("  Entry:   {}", value_text(&response["id"]));
    println!("  Key:     {}", key.dimmed());
    Ok(())
}

fn handle_adjust(client: &ApiClient, body: &Value, raw: bool) -> Result<()> {
    let response = client.post("/credits/manual", body)?;
    if raw {
        return print_json(&response);
    }

    println!(
        "{} Adjustment recorded: {} (entry {})",
        "✓".green().bold(),
        value_text(&response["new_balance_impact"]),
        value_text(&response["id"])
    );
    Ok(())
}

fn handle_promo(client: &ApiClient, action: PromoAction, raw: bool) -> Result<()> {
    let response = match action {
        PromoAction::List => return handle_list(client, "/promocodes", raw, print_promo),
        PromoAction::Validate {
            code,
            amount,
            user,
            from,
            to,
            method,
        } => {
            let response = client.post(
                "/promocodes/validate",
                &json!({
                    "code": code,
                    "amount": amount,
                    "user_id": user,
                    "source_currency": from,
                    "dest_currency": to,
                    "payment_method": method,
                }),
            )?;
            if !raw {
                println!(
                    "{} {} valid: {} (discount {})",
                    "✓".green().bold(),
                    value_text(&response["code"]),
                    value_text(&response["display_text"]),
                    value_text(&response["discount"])
                );
                return Ok(());
            }
            response
        }
        PromoAction::Apply {
            code,
            discount,
            user,
            transaction,
        } => {
            let response = client.post(
                "/promocodes/apply",
                &json!({
                    "code": code,
                    "discount_amount": discount,
                    "user_id": user,
                    "transaction_id": transaction,
                }),
            )?;
            if !raw {
                println!(
                    "{} Redeemed. Uses: {}, discount utilised: {}",
                    "✓".green().bold(),
                    value_text(&response["usage_count"]),
                    value_text(&response["total_discount_utilized"])
                );
                return Ok(());
            }
            response
        }
        PromoAction::Disable { id } => set_status(client, id, "Disabled", raw)?,
        PromoAction::Enable { id } => set_status(client, id, "Active", raw)?,
        PromoAction::Generate {
            count,
            prefix,
            template,
        } => {
            let draft = template::load_template(&template)?;
            let body = template::batch_request(count, prefix.as_deref(), &draft)?;
            let response = client.post("/promocodes/generate", &body)?;
            if !raw {
                println!(
                    "{} Created {} of {} codes",
                    "✓".green().bold(),
                    value_text(&response["created"]),
                    value_text(&response["requested"])
                );
                for code in response["codes"].as_array().into_iter().flatten() {
                    println!("  {}", value_text(code));
                }
                return Ok(());
            }
            response
        }
    };
    print_json(&response)
}

fn set_status(client: &ApiClient, id: i64, status: &str, raw: bool) -> Result<Value> {
    let response = client.put(&format!("/promocodes/{}/status", id), &json!({ "status": status }))?;
    if !raw {
        let marker = if status == "Active" {
            status.green()
        } else {
            status.red()
        };
        println!("{} Promo code {} is now {}", "✓".green().bold(), id, marker);
    }
    Ok(response)
}

fn handle_list(
    client: &ApiClient,
    path: &str,
    raw: bool,
    print_row: fn(&Value),
) -> Result<()> {
    let response = client.get(path, &[])?;
    if raw {
        return print_json(&response);
    }
    let rows = response["data"].as_array().cloned().unwrap_or_default();
    if rows.is_empty() {
        println!("{}", "Nothing found".dimmed());
    }
    for row in &rows {
        print_row(row);
    }
    Ok(())
}

fn print_scheme(row: &Value) {
    println!(
        "  {:>4}  {:<30} {:<30} {}",
        value_text(&row["id"]),
        value_text(&row["name"]),
        value_text(&row["bonus_type"]),
        status_marker(&value_text(&row["status"]))
    );
}

fn print_segment(row: &Value) {
    println!(
        "  {:>4}  {:<30} {}",
        value_text(&row["id"]),
        value_text(&row["name"]),
        value_text(&row["criteria"]["type"])
    );
}

fn print_promo(row: &Value) {
    println!(
        "  {:>4}  {:<20} {:<10} {:>8}  uses {}/{}  {}",
        value_text(&row["id"]),
        value_text(&row["code"]),
        value_text(&row["type"]),
        value_text(&row["value"]),
        value_text(&row["usage_count"]),
        value_text(&row["usage_limit_global"]),
        status_marker(&value_text(&row["status"]))
    );
}

fn status_marker(status: &str) -> colored::ColoredString {
    if status.eq_ignore_ascii_case("active") {
        status.green()
    } else {
        status.yellow()
    }
}

/// Renders a JSON scalar without quotes.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
