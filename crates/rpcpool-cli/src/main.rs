// Copyright 2025 rpcpool Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # rpcpool CLI Entry Point
//!
//! Makes a single call through a failover pool and prints the raw JSON result.
//!
//! ## Usage
//!
//! ```bash
//! # Two endpoints, default limits
//! rpcpool call -u http://127.0.0.1:8545 -u https://rpc.example.org eth_blockNumber
//!
//! # Positional params as a JSON array, stats on stderr
//! rpcpool call -u http://127.0.0.1:8545 --stats eth_getBalance '["0xabc", "latest"]'
//!
//! # Load a pool config file and override a limit
//! rpcpool call --config pool.json --rps 2 eth_chainId
//! ```
//!
//! The result goes to stdout; logs, events and stats go to stderr, so the
//! output can be piped to `jq`.

use anyhow::{bail, Context, Result};
use argh::FromArgs;
use rpcpool_client::{EndpointLimits, Pool, PoolConfig, PoolOptions};
use rpcpool_metrics::{EventHook, RpcEvent};
use serde_json::Value;
use std::sync::Arc;

/// Concurrency per endpoint when neither a config file nor a flag sets one.
const DEFAULT_IN_FLIGHT: usize = 4;

/// Chain id used when neither a config file nor a flag sets one.
const DEFAULT_CHAIN_ID: u64 = 1;

#[derive(FromArgs, Debug)]
/// rpcpool - resilient client-side RPC pool
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Commands {
    Call(CallArgs),
}

/// Arguments for a single pooled call.
///
/// Every limit flag overrides the matching value of `--config`.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "call")]
/// make one RPC call through the pool
struct CallArgs {
    /// endpoint URL (http:// or https://), repeat for several endpoints
    #[argh(option, short = 'u', long = "url")]
    urls: Vec<String>,

    /// path to a JSON pool config file
    #[argh(option)]
    config: Option<String>,

    /// chain id used in provider ids and events
    #[argh(option)]
    chain_id: Option<u64>,

    /// maximum in-flight calls per endpoint
    #[argh(option)]
    in_flight: Option<usize>,

    /// per-call timeout in milliseconds
    #[argh(option)]
    timeout_ms: Option<u64>,

    /// requests per second per endpoint (0 disables rate limiting)
    #[argh(option)]
    rps: Option<f64>,

    /// token bucket size per endpoint
    #[argh(option)]
    burst: Option<u32>,

    /// maximum number of distinct endpoints tried
    #[argh(option)]
    attempts: Option<usize>,

    /// log every request/response/error event as JSON
    #[argh(switch)]
    events: bool,

    /// print the pool stats snapshot to stderr after the call
    #[argh(switch)]
    stats: bool,

    /// name of the RPC method to call
    #[argh(positional)]
    method: String,

    /// params as a JSON array (a single non-array value is wrapped)
    #[argh(positional)]
    params: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default log level is INFO; RUST_LOG overrides it
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Call(args) => run_call(args).await,
    }
}

/// Builds the pool, performs the call and prints the result.
async fn run_call(args: CallArgs) -> Result<()> {
    let config = build_config(&args)?;
    let params = parse_params(args.params.as_deref())?;

    let mut options = PoolOptions::default();
    if args.events {
        options = options.with_event_hook(event_logger());
    }

    let pool = Pool::with_options(config, options).context("Failed to create pool")?;
    tracing::debug!(endpoints = pool.endpoint_count(), method = %args.method, "Calling");

    let outcome = pool.call(&args.method, params).await;

    if args.stats {
        let snapshot = pool.stats().snapshot();
        eprintln!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    let result = outcome.with_context(|| format!("Call to {} failed", args.method))?;
    println!("{}", serde_json::to_string(&result)?);

    Ok(())
}

/// Merges the config file (if any) with the command-line overrides.
fn build_config(args: &CallArgs) -> Result<PoolConfig> {
    let mut config = match &args.config {
        Some(path) => PoolConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => PoolConfig::new(DEFAULT_CHAIN_ID, Vec::new(), EndpointLimits::new(DEFAULT_IN_FLIGHT)),
    };

    if !args.urls.is_empty() {
        config.urls = args.urls.clone();
    }
    if let Some(chain_id) = args.chain_id {
        config.chain_id = chain_id;
    }
    if let Some(in_flight) = args.in_flight {
        config.per_endpoint.in_flight = in_flight;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.per_endpoint.timeout_ms = timeout_ms;
    }
    if let Some(rps) = args.rps {
        config.per_endpoint.rps = rps;
    }
    if let Some(burst) = args.burst {
        config.per_endpoint.rps_burst = Some(burst);
    }
    if let Some(attempts) = args.attempts {
        config.retry.attempts = attempts;
    }

    if config.urls.is_empty() {
        bail!("No endpoints configured: pass --url or a --config file with urls");
    }
    config.validate()?;

    Ok(config)
}

/// Parses positional params; absent means no params.
fn parse_params(raw: Option<&str>) -> Result<Vec<Value>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in params: {}", e))?;

    Ok(match value {
        Value::Array(items) => items,
        other => vec![other],
    })
}

/// Observer that logs each event as one JSON line.
fn event_logger() -> EventHook {
    Arc::new(|event: &RpcEvent| match serde_json::to_string(event) {
        Ok(json) => tracing::info!(target: "rpcpool::events", "{}", json),
        Err(e) => tracing::warn!("Failed to serialize event: {}", e),
    })
}
