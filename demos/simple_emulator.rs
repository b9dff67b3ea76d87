//! Simple virtual camera emulator
//!
//! Run with: cargo run --example simple_emulator [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example simple_emulator                  # binds to 0.0.0.0:8000
//!   cargo run --example simple_emulator 127.0.0.1:8080   # binds to 127.0.0.1:8080
//!
//! Starts one virtual camera backed by an RTSP upstream (edit UPSTREAM_URL
//! below to point at a real source). Discover it with any ONVIF client on
//! the local network, pull its events, and inject a motion trigger:
//!
//!   - Discovery: WS-Discovery probe on 239.255.255.250:3702
//!   - Device service: http://<host>:8000/onvif/<device-id>/device_service
//!   - Events: CreatePullPointSubscription, then PullMessages

use std::net::SocketAddr;
use std::time::Duration;

use onvif_emu::registry::{DeviceDescriptor, StreamProfile};
use onvif_emu::soap::server::SoapServerConfig;
use onvif_emu::{Emulator, EmulatorConfig, EventPayload};

const UPSTREAM_URL: &str = "rtsp://127.0.0.1:554/stream";

fn print_usage() {
    eprintln!("Usage: simple_emulator [BIND_ADDR]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    HTTP bind address (default: 0.0.0.0:8000)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let bind_addr: SocketAddr = match args.get(1) {
        Some(addr) => match addr.replace("localhost", "127.0.0.1").parse() {
            Ok(addr) => addr,
            Err(_) => {
                eprintln!("Error: invalid bind address '{}'", addr);
                print_usage();
                std::process::exit(1);
            }
        },
        None => "0.0.0.0:8000".parse()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("onvif_emu=debug".parse()?)
                .add_directive("simple_emulator=debug".parse()?),
        )
        .init();

    let base_url = format!("http://{}", bind_addr);
    let config = EmulatorConfig::default()
        .http_bind(bind_addr)
        .soap(SoapServerConfig::default().base_url(base_url));
    let emulator = Emulator::new(config);

    let device = DeviceDescriptor::new("Porch Camera")
        .identity("Acme", "VC 100", "1.0.0")
        .profile(StreamProfile::new("main", UPSTREAM_URL))
        .topic("motion")
        .topic("tamper");
    let device_id = device.id;
    emulator.registry().create(device).await?;

    println!("Virtual camera running");
    println!();
    println!("Device service:");
    println!("  http://{}/onvif/{}/device_service", bind_addr, device_id);
    println!();
    println!("A motion trigger fires every 30 seconds for demonstration.");
    println!();

    // Periodic demo trigger: motion on, auto-reverting after 5 seconds
    let trigger = emulator.trigger().clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = trigger
                .submit(
                    device_id,
                    "motion",
                    EventPayload::Boolean(true),
                    Some(Duration::from_secs(5)),
                )
                .await
            {
                eprintln!("Trigger failed: {}", e);
            }
        }
    });

    tokio::select! {
        result = emulator.run() => {
            if let Err(e) = result {
                eprintln!("Emulator error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    Ok(())
}
