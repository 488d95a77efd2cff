use std::net::SocketAddr;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde_json::Value;

use rpcBatcher::clients::calendar_client::{CalendarClient, RpcCalendarClient};
use rpcBatcher::config::{AppConfig, DEFAULT_LISTEN_ADDR};
use rpcBatcher::models::call::CallDescriptor;
use rpcBatcher::runtime;
use rpcBatcher::service::calendar_service::CalendarStore;

#[derive(Parser)]
#[command(name = "rpc-batcher", about = "Batched RPC dispatcher and demo calendar server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the calendar service over batched RPC.
    Serve {
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Dispatch calls given as `service.method` or `service.method=<json params>`.
    Call {
        #[arg(required = true)]
        calls: Vec<String>,
    },
    /// List the events of one day.
    Agenda { day: NaiveDate },
}

pub async fn cli(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { addr } => {
            let addr = match addr {
                Some(addr) => addr,
                None => config
                    .get_prop("RPC_LISTEN_ADDR")
                    .unwrap_or(DEFAULT_LISTEN_ADDR.to_string())
                    .parse()?,
            };
            runtime::run_server(addr, Arc::new(CalendarStore::new())).await;
        }
        Commands::Call { calls } => {
            let descriptors = calls
                .iter()
                .map(|arg| parse_call_arg(arg))
                .collect::<Result<Vec<_>, _>>()?;
            let dispatcher = runtime::build_dispatcher(&config)?;
            let mut failures = 0;
            for (route, result) in runtime::run_calls(&dispatcher, descriptors).await {
                match result {
                    Ok(value) => println!("{} => {}", route, value),
                    Err(err) => {
                        failures += 1;
                        println!("{} failed: {}", route, err);
                    }
                }
            }
            dispatcher.shutdown().await;
            if failures > 0 {
                return Err(format!("{} call(s) failed", failures).into());
            }
        }
        Commands::Agenda { day } => {
            let dispatcher = Arc::new(runtime::build_dispatcher(&config)?);
            let client = RpcCalendarClient::new(dispatcher.clone());
            let events = client.get_events_for_day(day).await;
            dispatcher.shutdown().await;
            let events = events?;
            if events.is_empty() {
                println!("Nothing scheduled on {}", day);
            }
            for event in events {
                println!(
                    "{} - {}  {}",
                    event.start_time.format("%H:%M"),
                    event.end_time.format("%H:%M"),
                    event.title
                );
            }
        }
    }
    Ok(())
}

fn parse_call_arg(arg: &str) -> Result<CallDescriptor, String> {
    let (route, params) = match arg.split_once('=') {
        Some((route, raw)) => {
            let params: Value = serde_json::from_str(raw)
                .map_err(|e| format!("Invalid params for {}: {}", route, e))?;
            (route, params)
        }
        None => (arg, Value::Null),
    };
    CallDescriptor::parse(route, params)
        .ok_or_else(|| format!("Expected service.method, got {:?}", route))
}
