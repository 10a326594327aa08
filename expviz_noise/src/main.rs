//! Noise generator: a stand-in monitored process that publishes /debug/vars
//! with values that change every tick.

mod noise;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use clap::Parser;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;
use tracing_subscriber::EnvFilter;

use noise::Noise;

#[derive(Debug, Parser)]
#[command(name = "expviz_noise", version, about = "Serve a noisy /debug/vars for expviz to watch")]
struct Args {
    /// Interface to listen on
    #[arg(short, long, default_value = "127.0.0.1")]
    interface: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 6060)]
    port: u16,

    /// Milliseconds between updates
    #[arg(long, default_value_t = 20)]
    tick_ms: u64,

    /// RNG seed; random when omitted
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone)]
struct AppState {
    // Last serialized document, refreshed by the sampler
    last_json: Arc<RwLock<String>>,
}

// Background sampler: advance the simulation and refresh the cached document.
fn spawn_sampler(
    state: AppState,
    mut noise: Noise,
    cmdline: Vec<String>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            noise.tick();
            let js = noise.document(&cmdline).to_string();
            *state.last_json.write().await = js;
        }
    })
}

async fn vars(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.last_json.read().await.clone();
    ([(header::CONTENT_TYPE, "application/json; charset=utf-8")], body)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = Args::parse();

    let seed = args.seed.unwrap_or_else(rand::random);
    let mut noise = Noise::new(seed);
    // Serve a complete document from the first request on.
    noise.tick();
    let cmdline: Vec<String> = std::env::args().collect();
    let state = AppState {
        last_json: Arc::new(RwLock::new(noise.document(&cmdline).to_string())),
    };
    let sampler = spawn_sampler(
        state.clone(),
        noise,
        cmdline,
        Duration::from_millis(args.tick_ms.max(1)),
    );

    let app = Router::new()
        .route("/debug/vars", get(vars))
        .with_state(state);

    let addr = SocketAddr::new(args.interface, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("couldn't listen on {addr}"))?;
    info!(seed, "noise generator running at http://{}/debug/vars", listener.local_addr()?);

    let res = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    sampler.abort();
    res.context("server error")
}
