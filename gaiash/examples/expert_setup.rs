//! Gaia first-boot setup example
//!
//! This example connects to a freshly installed Gaia appliance, defines the
//! expert password, and optionally runs the first time configuration wizard
//! from a local config file. Every step is idempotent: running the example
//! twice against the same appliance changes nothing the second time.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example expert_setup -- --host gw1 --user admin --password admin123 \
//!     --expert Expert123!
//! ```
//!
//! With the first time configuration wizard:
//! ```bash
//! cargo run --example expert_setup -- --host gw1 --user admin --password admin123 \
//!     --expert Expert123! --ftw ./ftw.conf
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use gaiash::driver::{CommandRequest, Driver, DriverBuilder, RetryPolicy};
use gaiash::platform::vendors::gaia;
use gaiash::transport::HostKeyVerification;
use secrecy::SecretString;

/// Where the wizard config is staged on the appliance.
const REMOTE_FTW_PATH: &str = "/home/admin/ftw.conf";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("=== gaiash Expert Setup Example ===\n");
    println!("Connecting to {}:{}...", args.host, args.port);

    let mut builder = DriverBuilder::new(&args.host)
        .port(args.port)
        .username(&args.user)
        .timeout(Duration::from_secs(args.timeout))
        .retry(RetryPolicy::new(
            5,
            Duration::from_secs(2),
            2.0,
            Duration::from_secs(60),
        ))
        .host_key_verification(HostKeyVerification::AcceptNew);

    if let Some(password) = &args.password {
        builder = builder.password(password);
    } else if let Some(key_path) = &args.key {
        builder = builder.private_key(key_path);
    } else {
        eprintln!("Error: Must provide either --password or --key");
        std::process::exit(1);
    }

    let mut driver = builder.build()?;
    driver.open().await?;

    if let Some(session) = driver.session() {
        println!("Connected ({} shell)", session.mode());
        if !session.banner().is_empty() {
            println!("{}\n", session.banner());
        }
    }

    // --- Expert password ---
    let Some(expert) = args.expert else {
        eprintln!("Error: --expert is required");
        std::process::exit(1);
    };
    let expert = SecretString::from(expert);

    let outcome = gaia::set_privileged_password(&mut driver, &expert).await?;
    if outcome.was_applied() {
        println!("Expert password defined");
    } else {
        println!("Expert password already set, skipped");
    }

    let response = driver
        .run_command(&CommandRequest::query("show version all"))
        .await?;
    println!("\n{}\n", response.output);

    // --- First time configuration wizard ---
    if let Some(path) = &args.ftw {
        let contents = std::fs::read_to_string(path)?;
        println!("Applying first time configuration from {}...", path.display());
        let outcome = gaia::apply_config_file(&mut driver, REMOTE_FTW_PATH, &contents).await?;
        if outcome.was_applied() {
            println!("First time configuration completed");
        } else {
            println!("First time configuration already completed, skipped");
        }
    }

    let response = driver
        .run_command(&CommandRequest::query("hostname").privileged())
        .await?;
    println!("Hostname (expert shell): {}", response.output);

    println!("\nClosing connection...");
    driver.close().await?;
    println!("Done!");

    Ok(())
}

/// Simple argument parser
struct Args {
    host: String,
    port: u16,
    user: String,
    password: Option<String>,
    key: Option<PathBuf>,
    expert: Option<String>,
    ftw: Option<PathBuf>,
    timeout: u64,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "localhost".to_string();
        let mut port = 22u16;
        let mut user = "admin".to_string();
        let mut password = None;
        let mut key = None;
        let mut expert = env::var("GAIA_EXPERT_PASSWORD").ok();
        let mut ftw = None;
        let mut timeout = 30u64;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    i += 1;
                    if i < args.len() {
                        host = args[i].clone();
                    }
                }
                "--port" | "-p" => {
                    i += 1;
                    if i < args.len() {
                        port = args[i].parse().unwrap_or(22);
                    }
                }
                "--user" | "-u" => {
                    i += 1;
                    if i < args.len() {
                        user = args[i].clone();
                    }
                }
                "--password" | "-P" => {
                    i += 1;
                    if i < args.len() {
                        password = Some(args[i].clone());
                    }
                }
                "--key" | "-k" => {
                    i += 1;
                    if i < args.len() {
                        key = Some(PathBuf::from(&args[i]));
                    }
                }
                "--expert" | "-e" => {
                    i += 1;
                    if i < args.len() {
                        expert = Some(args[i].clone());
                    }
                }
                "--ftw" | "-f" => {
                    i += 1;
                    if i < args.len() {
                        ftw = Some(PathBuf::from(&args[i]));
                    }
                }
                "--timeout" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        timeout = args[i].parse().unwrap_or(30);
                    }
                }
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                _ => {}
            }
            i += 1;
        }

        Self {
            host,
            port,
            user,
            password,
            key,
            expert,
            ftw,
            timeout,
        }
    }

    fn print_help() {
        println!(
            r#"gaiash expert setup example

Defines the expert password on a Gaia appliance and optionally runs the
first time configuration wizard. Safe to run repeatedly.

USAGE:
    cargo run --example expert_setup -- [OPTIONS]

OPTIONS:
    -h, --host <HOST>        Target host [default: localhost]
    -p, --port <PORT>        SSH port [default: 22]
    -u, --user <USER>        Username [default: admin]
    -P, --password <PASS>    Password for authentication
    -k, --key <PATH>         Path to SSH private key
    -e, --expert <PASS>      Expert password [env: GAIA_EXPERT_PASSWORD]
    -f, --ftw <PATH>         First time configuration file to apply
    -t, --timeout <SECS>     Connection timeout [default: 30]
    --help                   Print this help message
"#
        );
    }
}
