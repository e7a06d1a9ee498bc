use clap::Parser;
use pingora_core::server::configuration::Opt;
use pingora_core::server::Server;
use std::path::PathBuf;

use imgrelay::config::RelayConfig;
use imgrelay::proxy::RelayProxy;

/// Image transform relay - validates and forwards image requests to an
/// imgproxy-compatible transform service, built on Cloudflare's Pingora
#[derive(Parser, Debug)]
#[command(name = "imgrelay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Daemon mode
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Test configuration and exit
    #[arg(long)]
    test: bool,

    /// Upgrade workers gracefully
    #[arg(long)]
    upgrade: bool,

    /// Emit logs as JSON (one object per line)
    #[arg(long)]
    json_logs: bool,
}

fn main() {
    let args = Args::parse();

    imgrelay::logging::init_subscriber(args.json_logs)
        .expect("Failed to initialize logging subsystem");

    let config = RelayConfig::from_file(&args.config).unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    tracing::info!(
        config_file = %args.config.display(),
        server_address = %config.server.address,
        server_port = config.server.port,
        endpoint_path = %config.endpoint_path,
        upstream = %config.upstream.base_url,
        signed = config.signature.is_some(),
        "Configuration loaded successfully"
    );

    let opt = Opt {
        daemon: args.daemon,
        test: args.test,
        upgrade: args.upgrade,
        ..Default::default()
    };

    let mut server = Server::new(Some(opt)).expect("Failed to create Pingora server");
    server.bootstrap();

    let listen_addr = format!("{}:{}", config.server.address, config.server.port);

    let proxy = RelayProxy::new(config).unwrap_or_else(|e| {
        eprintln!("Failed to build relay: {}", e);
        std::process::exit(1);
    });

    let mut proxy_service = pingora_proxy::http_proxy_service(&server.configuration, proxy);
    proxy_service.add_tcp(&listen_addr);

    tracing::info!(
        address = %listen_addr,
        "Starting image transform relay"
    );

    server.add_service(proxy_service);

    // Blocks until shutdown
    server.run_forever();
}
