//! Prometheus-format metrics, served from the exporter's own thread.
//!
//! Runs entirely off the core loop's thread: it owns no part of the `Fifo`
//! and only ever reads `Statistics` through atomics, so it can't introduce
//! contention or ordering hazards with the tarpit itself.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use log::info;

use crate::stats::Statistics;
use crate::errx;

/// Build a minimal single-threaded tokio runtime and block this thread on
/// serving `listen` until the process exits.
pub(crate) fn run(listen: Vec<SocketAddr>, stats: Arc<Statistics>, startup: Instant) {
    let mut runtime = tokio::runtime::Builder::new()
        .basic_scheduler()
        .enable_all()
        .build()
        .unwrap_or_else(|err| errx(exitcode::UNAVAILABLE, format!("tokio, error: {}", err)));

    runtime.block_on(async {
        let servers = listen.into_iter().map(|addr| {
            info!("exporter listen, addr: {}", addr);
            let stats = Arc::clone(&stats);
            let make_svc = make_service_fn(move |_conn| {
                let stats = Arc::clone(&stats);
                async move {
                    Ok::<_, Infallible>(service_fn(move |req| {
                        let stats = Arc::clone(&stats);
                        async move { handle(stats, startup, req).await }
                    }))
                }
            });
            Server::bind(&addr).serve(make_svc)
        });

        futures::future::join_all(servers).await;
    });
}

async fn handle(
    stats: Arc<Statistics>,
    startup: Instant,
    _request: Request<Body>,
) -> Result<Response<Body>, Infallible> {
    let (connects, bytes_sent, active) = stats.export_snapshot();
    let uptime = startup.elapsed().as_secs_f64();

    let body = format!(
        "# HELP tarpitd_uptime_seconds Time since the process started.\n\
         # TYPE tarpitd_uptime_seconds gauge\n\
         tarpitd_uptime_seconds {uptime}\n\
         # HELP tarpitd_connects_total Clients accepted since startup.\n\
         # TYPE tarpitd_connects_total counter\n\
         tarpitd_connects_total {connects}\n\
         # HELP tarpitd_bytes_sent_total Bytes written to tarpitted clients since startup.\n\
         # TYPE tarpitd_bytes_sent_total counter\n\
         tarpitd_bytes_sent_total {bytes_sent}\n\
         # HELP tarpitd_clients_active Clients currently enrolled.\n\
         # TYPE tarpitd_clients_active gauge\n\
         tarpitd_clients_active {active}\n",
        uptime = uptime,
        connects = connects,
        bytes_sent = bytes_sent,
        active = active,
    );

    Ok(Response::new(Body::from(body)))
}
