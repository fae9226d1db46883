use color_eyre::eyre::{Result, WrapErr, eyre};
use echoservice::common::EchoServerTrait;
use echoservice::echo::ProcessContext;
use echoservice::echo::context::ENVIRONMENT_VAR;
use echoservice::http::config::DEFAULT_PORT;
use echoservice::http::{HttpConfig, HttpEchoServer};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn usage(program: &str) {
    eprintln!("Usage: {program} [port] [bind_ip]");
    eprintln!("  port:    Port to listen on (default: $PORT or {DEFAULT_PORT})");
    eprintln!("  bind_ip: Address to bind to (default: $HOST or 0.0.0.0)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  {ENVIRONMENT_VAR}    Deployment environment reported by /echo (default: development)");
    eprintln!("  RUST_LOG   Log filter (default: echoservice=info)");
    eprintln!();
    eprintln!("Endpoints:");
    eprintln!("  GET  /health  Health check");
    eprintln!("  ANY  /echo    Request echo");
}

/// Resolves the bind address from arguments, then environment, then defaults
fn bind_addr(args: &[String]) -> Result<SocketAddr> {
    let port = match args.get(1).cloned().or_else(|| std::env::var("PORT").ok()) {
        Some(port) => port
            .parse::<u16>()
            .wrap_err_with(|| format!("Invalid port: {port}"))?,
        None => DEFAULT_PORT,
    };

    let ip = match args.get(2).cloned().or_else(|| std::env::var("HOST").ok()) {
        Some(ip) => ip
            .parse::<IpAddr>()
            .wrap_err_with(|| format!("Invalid bind address: {ip}"))?,
        None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
    };

    Ok(SocketAddr::new(ip, port))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("echoservice=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("echoservice");
    if args.iter().skip(1).any(|arg| arg == "-h" || arg == "--help") {
        usage(program);
        return Ok(());
    }
    if args.len() > 3 {
        usage(program);
        return Err(eyre!("Too many arguments"));
    }

    let config = HttpConfig {
        bind_addr: bind_addr(&args)?,
        ..Default::default()
    };
    let context = ProcessContext::capture();

    info!(
        address = %config.bind_addr,
        environment = %context.environment(),
        max_connections = config.limits.max_concurrent_connections,
        "Starting HTTP echo service"
    );

    let server = HttpEchoServer::with_context(config, Arc::new(context));
    server.run().await.wrap_err("Failed to run HTTP echo service")?;

    Ok(())
}
