//! ethauth application entry point.
//!
//! Bootstraps the server:
//! 1. Load configuration from environment
//! 2. Pick Redis or in-memory stores
//! 3. Spawn the pending-login cleanup job
//! 4. Build router with API routes, security headers, CORS, and request tracing
//! 5. Start Axum server
//!
//! Also supports `keygen` and `sign` subcommands for testing logins without a wallet.

use ethauth::{
    auth::{
        middleware::AppState,
        verify::{address_of, sign_personal_message},
    },
    cleanup,
    clock::SystemClock,
    config::Config,
    routes,
};
use k256::ecdsa::SigningKey;
use rand::Rng;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use zeroize::Zeroizing;

/// Generate a random secp256k1 key. Returns (private key hex, checksum address).
fn keygen() -> Result<(Zeroizing<String>, String), String> {
    let mut rng = rand::rng();
    // A random 32-byte string is out of the curve order with negligible probability
    for _ in 0..8 {
        let mut seed = Zeroizing::new([0u8; 32]);
        rng.fill(&mut seed[..]);
        if let Ok(key) = SigningKey::from_slice(&seed[..]) {
            let address = address_of(key.verifying_key()).to_checksum(None);
            return Ok((Zeroizing::new(hex::encode(&seed[..])), address));
        }
    }
    Err("could not derive a valid key".to_string())
}

/// Sign `message` with a hex private key, wallet style. Returns `0x`-prefixed hex.
fn sign(private_key_hex: &str, message: &str) -> Result<String, String> {
    let hex_part = private_key_hex
        .strip_prefix("0x")
        .unwrap_or(private_key_hex);
    let bytes = Zeroizing::new(
        hex::decode(hex_part).map_err(|e| format!("Invalid key hex: {}", e))?,
    );
    let key = SigningKey::from_slice(&bytes).map_err(|e| format!("Invalid key: {}", e))?;
    let signature = sign_personal_message(&key, message).map_err(|e| e.to_string())?;
    Ok(format!("0x{}", hex::encode(signature)))
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  ethauth                       run the server");
    eprintln!("  ethauth keygen                print a new private key and its address");
    eprintln!("  ethauth sign <private-key>    sign the message read from stdin");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  printf '%s' \"$MESSAGE\" | ethauth sign 0xac09...ff80");
}

/// Handle a subcommand. Returns the process exit code.
fn run_subcommand(args: &[String]) -> i32 {
    match args {
        [cmd] if cmd == "keygen" => match keygen() {
            Ok((key, address)) => {
                println!("private_key: 0x{}", key.as_str());
                println!("address:     {}", address);
                0
            }
            Err(e) => {
                eprintln!("Error generating key: {}", e);
                1
            }
        },
        [cmd, key] if cmd == "sign" => {
            let mut message = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut message) {
                eprintln!("Error reading message: {}", e);
                return 1;
            }
            // Tolerate the newline `echo` appends; sign-in messages never end with one
            if message.ends_with('\n') {
                message.pop();
            }
            match sign(key, &message) {
                Ok(signature) => {
                    println!("{}", signature);
                    0
                }
                Err(e) => {
                    eprintln!("Error signing message: {}", e);
                    1
                }
            }
        }
        _ => {
            print_usage();
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        std::process::exit(run_subcommand(&args));
    }

    // Initialize tracing with env filter support (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config from environment
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    tracing::info!(config = ?config, "Starting ethauth on {}", config.bind_addr);

    let bind_addr = config.bind_addr;
    let cleanup_interval = Duration::from_secs(config.cleanup_interval_secs);
    let backend = if config.redis_url.is_some() { "redis" } else { "memory" };

    let state = match AppState::new(config, Arc::new(SystemClock)) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Invalid Redis URL");
            std::process::exit(1);
        }
    };
    tracing::info!(backend = backend, "Login stores ready");

    tokio::spawn(cleanup::run_cleanup_loop(
        state.auth.nonces().clone(),
        state.auth.sessions().clone(),
        cleanup_interval,
    ));

    // Explicit CORS: deny all cross-origin requests (single-origin deployment).
    // CorsLayer::new() with no allowed origins rejects all CORS preflight requests.
    let app = routes::app(state)
        .layer(CorsLayer::new())
        .layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %bind_addr, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on {}", bind_addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}
