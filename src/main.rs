//! Path Inspector CLI
//!
//! `probe`   - classify the NAT in front of this host with live STUN probes
//! `explain` - replay a recorded two-peer session and explain its path

use std::net::SocketAddr;

use path_inspector::config::InspectorConfig;
use path_inspector::nat::{NatDetector, StunProber};
use path_inspector::session::{run_session, SessionCapture};
use path_inspector::stun::UdpStunProber;
use path_inspector::PeerId;

const USAGE: &str = "\
usage:
  path-inspector probe [--config <file>] [--bind <addr:port>] [--peer <name>]
  path-inspector explain --session <file> [--config <file>] [--json]";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();

    let config = match parse_arg(&args, "--config") {
        Some(path) => InspectorConfig::load(&path)?,
        None => InspectorConfig::default(),
    };

    match args.get(1).map(String::as_str) {
        Some("probe") => probe(&args, &config),
        Some("explain") => explain(&args, &config),
        _ => {
            eprintln!("{}", USAGE);
            Err("missing or unknown command".into())
        }
    }
}

fn probe(args: &[String], config: &InspectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let peer = PeerId::new(parse_arg(args, "--peer").unwrap_or_else(|| "local".to_string()));
    let mut prober = match parse_arg(args, "--bind") {
        Some(addr) => {
            let addr: SocketAddr = addr.parse().map_err(|_| "Invalid bind address")?;
            UdpStunProber::bind(addr)?
        }
        None => UdpStunProber::bind_default()?,
    };

    let servers = config.resolve_stun_servers();
    if servers.is_empty() {
        return Err("no STUN server could be resolved".into());
    }

    log::info!("Path Inspector probing NAT...");
    log::info!("  Socket:  {}", prober.local_addr());
    log::info!("  Servers: {:?}", servers);
    log::info!("  Timeout: {} ms", config.probe_timeout_ms);

    let detector = NatDetector::from_config(peer, config);
    let assessment = detector.detect(&mut prober, &servers);

    println!("{}", assessment.describe());
    if assessment.nat_type == path_inspector::nat::NatType::Symmetric {
        log::warn!("Peers behind this NAT will often need a relay");
    }
    Ok(())
}

fn explain(args: &[String], config: &InspectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let path = parse_arg(args, "--session").ok_or("explain needs --session <file>")?;
    let (offerer, answerer) = SessionCapture::load(&path)?.into_plans()?;

    log::info!("Replaying session capture {}", path);
    let report = run_session(config, offerer, answerer)?;

    if args.iter().any(|a| a == "--json") {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report.render(&config.components));
    }
    Ok(())
}

fn parse_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
