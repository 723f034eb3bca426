//! # Calculator Engine Demo
//!
//! A line-oriented JSON transport in front of the dispatch engine. Each input
//! line is a `CallRequest`; each output line is the matching `CallResponse`.
//! The session id handed back by the engine is reused for later lines that
//! carry none, so a sign-in sticks for the rest of the input. A line that is
//! not a valid request stops the demo with an error.
//!
//! ## Usage
//! ```bash
//! # One call
//! cargo run -p calculator-engine -- --public \
//!   --request '{"contract":"Calc","method":"Add","params":[2,3],"id":1}'
//!
//! # A scripted session
//! printf '%s\n' \
//!   '{"contract":"Session","method":"SignIn","params":["ada"],"id":1}' \
//!   '{"contract":"Calc","method":"Double","params":[21],"id":2}' \
//!   '{"contract":"Keys","method":"Rename","params":["a","a"],"id":3}' \
//!   | cargo run -p calculator-engine
//! ```

mod contracts;

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use turul_rpc_cache::InMemoryCacheBackend;
use turul_rpc_protocol::{CallRequest, CallResponse};
use turul_rpc_server::{
    ClientEndpoint, ContractRegistry, DispatchEngine, ErrorDisclosure, RegistryPolicy,
};

use crate::contracts::{Calc, Keys, Session};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Skip authorization for every contract
    #[arg(long)]
    public: bool,

    /// Echo internal error text back to callers
    #[arg(long)]
    verbose_errors: bool,

    /// Policy file (TOML); TURUL_RPC_* variables apply when absent
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Handle a single JSON request instead of reading stdin
    #[arg(short, long)]
    request: Option<String>,
}

fn load_policy(args: &Args) -> Result<RegistryPolicy> {
    let mut policy = match &args.config {
        Some(path) => {
            let document = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read policy file {}", path.display()))?;
            RegistryPolicy::from_toml_str(&document)?
        }
        None => RegistryPolicy::from_env()?,
    };

    if args.public {
        policy = policy.with_public_access(true);
    }
    if args.verbose_errors {
        policy = policy.with_error_disclosure(ErrorDisclosure::Verbose);
    }
    Ok(policy)
}

fn build_engine(policy: RegistryPolicy) -> Result<DispatchEngine> {
    let registry = ContractRegistry::builder()
        .policy(policy)
        .register::<Calc>()
        .register::<Keys>()
        .register::<Session>()
        .build()?;
    info!("Registered contracts: {}", registry.contracts().join(", "));

    let slot = Arc::new(OnceLock::new());
    let engine = DispatchEngine::builder()
        .registry(Arc::new(registry))
        .container(Arc::new(contracts::container(slot.clone())))
        .cache_backend(Arc::new(InMemoryCacheBackend::new()))
        .build()?;

    if slot.set(engine.clone()).is_err() {
        warn!("Engine slot was already filled");
    }
    Ok(engine)
}

async fn handle_line(
    engine: &DispatchEngine,
    line: &str,
    session_id: &mut String,
) -> Result<CallResponse> {
    let mut request: CallRequest =
        serde_json::from_str(line).with_context(|| format!("Invalid request: {}", line))?;
    if !request.has_session() && !session_id.is_empty() {
        request.session_id = session_id.clone();
    }

    let response = engine.handle_call(request, ClientEndpoint::local()).await;
    if *session_id != response.session_id {
        debug!("Using session {}", response.session_id);
        *session_id = response.session_id.clone();
    }
    Ok(response)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calculator_engine=info,turul_rpc_server=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let engine = build_engine(load_policy(&args)?)?;
    let mut session_id = String::new();

    if let Some(line) = &args.request {
        let response = handle_line(&engine, line, &mut session_id).await?;
        println!("{}", serde_json::to_string(&response)?);
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // A line that does not decode ends the stream, like a broken connection
        let response = handle_line(&engine, line, &mut session_id).await?;
        println!("{}", serde_json::to_string(&response)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use turul_rpc_protocol::StatusCode;

    #[tokio::test]
    async fn test_session_carries_across_lines() {
        let engine = build_engine(RegistryPolicy::default()).unwrap();
        let mut session_id = String::new();

        let signed_in = handle_line(
            &engine,
            r#"{"contract":"Session","method":"SignIn","params":["ada"],"id":1}"#,
            &mut session_id,
        )
        .await
        .unwrap();
        assert_eq!(signed_in.status, StatusCode::Ok);
        assert_eq!(session_id, signed_in.session_id);

        let doubled = handle_line(
            &engine,
            r#"{"contract":"Calc","method":"Double","params":[21],"id":2}"#,
            &mut session_id,
        )
        .await
        .unwrap();
        assert_eq!(doubled.values, vec![serde_json::json!(42)]);
        assert_eq!(doubled.session_id, signed_in.session_id);
    }

    #[tokio::test]
    async fn test_undecodable_line_is_an_error() {
        let engine = build_engine(RegistryPolicy::default()).unwrap();
        let mut session_id = String::new();

        let err = handle_line(&engine, "{not json", &mut session_id)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid request"));
        assert!(session_id.is_empty());
    }
}
