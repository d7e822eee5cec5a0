//! Validate a KNX bridge configuration file and print what it defines

use clap::Parser;
use knxweb_rust::{config::Config, dpt, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "knxweb-config-check")]
#[command(about = "Check a knx.cfg file and list its gateways, devices and addresses")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file
    #[arg(default_value = "knx.cfg")]
    config: PathBuf,

    /// Also list the registered datapoint types
    #[arg(long)]
    types: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let config = Config::load(&args.config)?;

    println!("\n🔧 {}", args.config.display());
    println!("========================================\n");

    if let Some(logdir) = &config.logdir {
        println!("logdir   {}", logdir.display());
    }
    if let Some(port) = config.port {
        println!("port     {port}");
    }
    for gateway in &config.gateways {
        println!("gateway  {} {}", gateway.address, gateway.groups.join(" "));
    }
    println!("\n{} devices:", config.devices.len());
    for (addr, name) in &config.devices {
        println!("  {:<12} {name}", addr.to_string());
    }

    let mut unknown = 0;
    println!("\n{} addresses:", config.addresses.len());
    for (addr, entry) in &config.addresses {
        let kind = match dpt::lookup(&entry.dpt) {
            Some(dpt) => format!("{} ({})", dpt.tag, dpt.name),
            None => {
                unknown += 1;
                format!("{} ❌ unknown type", entry.dpt)
            }
        };
        println!("  {:<12} {:<32} {kind}", addr.to_string(), entry.name);
    }

    if config.gateways.is_empty() {
        println!("\n💡 No gateway configured; pass one with --knx when starting the server.");
    }
    if unknown > 0 {
        println!("\n💡 {unknown} address(es) have an unknown type and will be shown raw.");
    }

    if args.types {
        println!("\nRegistered datapoint types:");
        for dpt in dpt::registered_types() {
            println!("  {:<8} {:<24} {}", dpt.tag, dpt.name, dpt.unit);
        }
    }

    Ok(())
}
