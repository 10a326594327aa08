//! expviz entry point: first fetch, then poll in the background and serve viewers.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use expviz::cli::Cli;
use expviz::hub::SnapshotHub;
use expviz::poller::spawn_poller;
use expviz::server;
use expviz::source::{HttpSource, SnapshotSource};
use expviz::state::AppState;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// URL a local browser can reach; a wildcard bind is opened via loopback.
fn viewer_url(addr: SocketAddr) -> String {
    let host = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    format!("http://{}/", SocketAddr::new(host, addr.port()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let source = HttpSource::new(&cli.target, cli.fetch_timeout())?;
    // An unreachable target at startup is fatal; later failures follow the poll policy.
    let first = source
        .fetch()
        .await
        .with_context(|| format!("couldn't get expvar from {}", source.endpoint()))?;
    info!(endpoint = %source.endpoint(), "first snapshot received");

    let hub = SnapshotHub::new(cli.backlog.get());
    hub.publish(first)?;
    let mut poller = spawn_poller(source, hub.clone(), cli.poll_config());

    let listener = server::bind(cli.interface, cli.port)
        .await
        .with_context(|| format!("couldn't listen on {}:{}", cli.interface, cli.port))?;
    let addr = listener.local_addr()?;
    println!("expviz running at http://{addr}");
    if cli.open {
        let url = viewer_url(addr);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = webbrowser::open(&url) {
                warn!(%url, "couldn't open a browser: {e}");
            }
        });
    }

    let shutdown = {
        let hub = hub.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("couldn't install Ctrl-C handler: {e}");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
            hub.close();
        }
    };
    let state = AppState::new(hub.clone(), cli.static_dir.clone());

    tokio::select! {
        res = server::serve(listener, state, shutdown) => {
            poller.abort();
            res.context("server error")
        }
        res = &mut poller => {
            hub.close();
            match res {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e).context("lost the upstream"),
                Err(e) => Err(e).context("poller task failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_binds_open_on_loopback() {
        assert_eq!(viewer_url("0.0.0.0:8080".parse().unwrap()), "http://127.0.0.1:8080/");
        assert_eq!(viewer_url("[::]:8080".parse().unwrap()), "http://[::1]:8080/");
        assert_eq!(viewer_url("10.1.2.3:80".parse().unwrap()), "http://10.1.2.3:80/");
    }
}
