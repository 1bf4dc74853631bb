use std::path::{Path, PathBuf};

use clap::{ArgAction, ArgMatches, arg};
use dragnet_dns::{Client, ClientConfiguration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), ()> {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cmd = clap::Command::new("dragnet")
        .about("Fault tolerant DNS lookups over a pool of public resolvers")
        .arg(
            arg!(--cfg <PATH> "Resolver configuration file to use")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--resolver <ADDRESS> "Resolver to use instead of the configured ones")
                .action(ArgAction::Append),
        )
        .subcommand_required(true)
        .subcommand(
            clap::Command::new("resolve")
                .about("Look up records for a name")
                .arg(arg!(<NAME> "DNS name to query"))
                .arg(arg!([TYPE] "DNS record type to query").default_value("A")),
        )
        .subcommand(
            clap::Command::new("reverse")
                .about("Find the hostname for an IP address")
                .arg(arg!(<ADDRESS> "IPv4 or IPv6 address")),
        )
        .subcommand(
            clap::Command::new("axfr")
                .about("Attempt a zone transfer")
                .arg(arg!(<ZONE> "Zone to transfer"))
                .arg(arg!(<SERVER> "Nameserver to transfer from"))
                .arg(arg!(--domain <DOMAIN> "Root domain the zone belongs to")),
        );

    let args = cmd.get_matches();
    if let Err(error) = run(&args).await {
        eprintln!("{error}");
        Err(())
    } else {
        Ok(())
    }
}

async fn load_config(path: Option<&Path>) -> Result<ClientConfiguration, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(ClientConfiguration::default());
    };
    let config_file: Vec<u8> = tokio::fs::read(path).await?;
    Ok(toml_edit::de::from_slice(&config_file)?)
}

async fn run(args: &ArgMatches) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(args.get_one::<PathBuf>("cfg").map(PathBuf::as_path)).await?;
    if let Some(resolvers) = args.get_many::<String>("resolver") {
        config.resolvers = resolvers.cloned().collect();
    }

    let client = Client::new(config).await;
    debug!(resolvers = client.pool().len(), "client constructed");

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let outcome = dispatch(&client, args, &cancel).await;
    trace!("shutting down resolvers");
    client.shutdown().await;
    outcome
}

async fn dispatch(
    client: &Client,
    args: &ArgMatches,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    match args.subcommand() {
        Some(("resolve", sub)) => {
            let name = sub.get_one::<String>("NAME").expect("name is required");
            let mnemonic = sub.get_one::<String>("TYPE").expect("type has a default");
            for answer in client.resolve_until(name, mnemonic, cancel).await? {
                println!("{answer}");
            }
        }
        Some(("reverse", sub)) => {
            let address = sub.get_one::<String>("ADDRESS").expect("address is required");
            let lookup = client.reverse_until(address, cancel).await?;
            println!("{} PTR {}", lookup.ptr, lookup.hostname);
        }
        Some(("axfr", sub)) => {
            let zone = sub.get_one::<String>("ZONE").expect("zone is required");
            let server = sub.get_one::<String>("SERVER").expect("server is required");
            let domain = sub.get_one::<String>("domain").unwrap_or(zone);
            for discovery in client
                .zone_transfer_until(zone, domain, server, cancel)
                .await?
            {
                println!("{} ({}, {})", discovery.name, discovery.tag, discovery.source);
                for record in &discovery.records {
                    println!("    {record}");
                }
            }
        }
        _ => unreachable!("a subcommand is required"),
    }
    Ok(())
}
