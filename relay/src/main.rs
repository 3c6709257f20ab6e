//! Velocity relay HTTP entrypoint.
//!
//! Endpoints:
//! - `GET /health` - Liveness probe
//! - `GET /signers` - Signer addresses per configured chain
//! - `POST /transactions` - Submit a contract call
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `CONFIG` names the configuration file (default `config.json`)
//! - `HOST`, `PORT` control the binding address when the file does not
//! - `RUST_LOG` filters log output, `OTEL_*` variables enable OpenTelemetry export

mod run;

use std::process;

use crate::run::run;

#[tokio::main]
async fn main() {
    let result = run().await;
    if let Err(e) = result {
        eprintln!("{e}");
        process::exit(1)
    }
}
