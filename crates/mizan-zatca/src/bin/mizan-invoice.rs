//! # Mizan Invoice Tool
//!
//! Operator commands over the invoice pipeline.
//!
//! ## Usage
//! ```bash
//! # Invoice every open sale
//! cargo run -p mizan-zatca --bin mizan-invoice -- create --all-open
//!
//! # Invoice specific sales for a named customer
//! cargo run -p mizan-zatca --bin mizan-invoice -- create --customer "Acme" <SALE_ID>...
//!
//! # Render, finish or audit
//! cargo run -p mizan-zatca --bin mizan-invoice -- xml <INVOICE_ID>
//! cargo run -p mizan-zatca --bin mizan-invoice -- finalize <INVOICE_ID>
//! cargo run -p mizan-zatca --bin mizan-invoice -- verify
//! cargo run -p mizan-zatca --bin mizan-invoice -- list
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG`. Results go to stdout.

use std::env;
use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use mizan_zatca::{InvoiceService, ZatcaConfig};

const USAGE: &str = "\
Mizan POS Invoice Tool

Usage: mizan-invoice [--config <PATH>] <COMMAND>

Commands:
  create [--customer <NAME>] (--all-open | <SALE_ID>...)
                      Create and finalize an invoice
  xml <INVOICE_ID>    Print the Phase-1 UBL document
  finalize <INVOICE_ID>
                      Complete any missing stage and print the Phase-2 UBL document
  verify              Check every hash, signature and link in the chain
  list                List invoices in chain order

Options:
  -c, --config <PATH> Config file (default: mizan.toml in the user config dir)
  -h, --help          Show this help message";

enum Command {
    Create {
        customer: Option<String>,
        all_open: bool,
        sale_ids: Vec<String>,
    },
    Xml(String),
    Finalize(String),
    Verify,
    List,
}

struct Args {
    config: Option<PathBuf>,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<Option<Args>, String> {
    let mut config = None;
    let mut rest = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => return Ok(None),
            "--config" | "-c" => {
                let path = args.get(i + 1).ok_or("--config needs a path")?;
                config = Some(PathBuf::from(path));
                i += 1;
            }
            _ => rest.push(args[i].clone()),
        }
        i += 1;
    }

    let Some((name, operands)) = rest.split_first() else {
        return Ok(None);
    };

    let single = |what: &str| -> Result<String, String> {
        match operands {
            [id] => Ok(id.clone()),
            _ => Err(format!("{name} takes exactly one {what}")),
        }
    };

    let command = match name.as_str() {
        "create" => {
            let mut customer = None;
            let mut all_open = false;
            let mut sale_ids = Vec::new();

            let mut j = 0;
            while j < operands.len() {
                match operands[j].as_str() {
                    "--customer" => {
                        customer = Some(operands.get(j + 1).ok_or("--customer needs a name")?.clone());
                        j += 1;
                    }
                    "--all-open" => all_open = true,
                    id => sale_ids.push(id.to_string()),
                }
                j += 1;
            }

            if all_open == !sale_ids.is_empty() {
                return Err("create takes either --all-open or a list of sale ids".into());
            }

            Command::Create {
                customer,
                all_open,
                sale_ids,
            }
        }
        "xml" => Command::Xml(single("invoice id")?),
        "finalize" => Command::Finalize(single("invoice id")?),
        "verify" => Command::Verify,
        "list" => Command::List,
        other => return Err(format!("unknown command: {other}")),
    };

    Ok(Some(Args { config, command }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mizan=debug,sqlx=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let raw: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{USAGE}");
            return Ok(());
        }
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    let config = ZatcaConfig::load(args.config)?;
    let service = InvoiceService::new(&config).await?;
    info!(db = %config.database.path.display(), "Invoice service ready");

    match args.command {
        Command::Create {
            customer,
            all_open,
            sale_ids,
        } => {
            let sale_ids = if all_open {
                service
                    .database()
                    .sales()
                    .list_uninvoiced()
                    .await?
                    .into_iter()
                    .map(|s| s.id)
                    .collect()
            } else {
                sale_ids
            };

            let invoice = service.create_invoice(&sale_ids, customer.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&invoice)?);
        }
        Command::Xml(id) => println!("{}", service.get_invoice_xml(&id).await?),
        Command::Finalize(id) => println!("{}", service.finalize_invoice_phase2(&id).await?),
        Command::Verify => {
            let report = service.verify_chain().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_intact() {
                std::process::exit(1);
            }
        }
        Command::List => {
            let invoices = service.list_invoices().await?;
            println!("{}", serde_json::to_string_pretty(&invoices)?);
        }
    }

    Ok(())
}
