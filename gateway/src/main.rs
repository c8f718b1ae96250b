use args::Args;
use clap::Parser;
use server::ServeConfig;

mod args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = config::Config::load(&args.config)?;
    if let Some(listen_address) = args.listen_address {
        config.server.listen_address = listen_address;
    }

    let log_filter = args.log_filter.as_deref().unwrap_or(&config.telemetry.log_filter).to_string();
    telemetry::init(&log_filter);

    let listen_address = config.server.listen_address.parse()?;

    server::serve(ServeConfig {
        listen_address,
        config,
        version: env!("CARGO_PKG_VERSION").to_string(),
        bound_addr_sender: None,
    })
    .await
}
