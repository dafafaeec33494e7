//! Expose a handful of metrics and drive them from a ticker and from unix
//! signals.
//!
//! ```text
//! cargo run --example observer -- --endpoint 127.0.0.1:8080
//! kill -USR1 <pid>   # bumps observed_user_signals_total{signal="SIGUSR1"}
//! curl localhost:8080/metrics
//! ```

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use pullmetrics::{Counter, Gauge, Histogram, Metrics, DEFAULT_ENDPOINT};
use tokio::signal::unix::{signal, SignalKind};

const RESPONSE_TIMES: [f64; 4] = [15.0, 20.0, 25.0, 30.0];

#[derive(Parser, Debug)]
struct Args {
    /// host:port to expose metrics on
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,
}

/// Everything the signal loop needs to record, resolved once up front. The
/// observer only holds instance handles, it never sees the facade.
struct Observer {
    sigusr1: Counter,
    sigusr2: Counter,
    seconds: Gauge,
    response_time: Histogram,
}

impl Observer {
    fn new(metrics: &Metrics) -> anyhow::Result<Self> {
        let signals = metrics
            .add_counter_family("observed_user_signals_total", "Number of observed user signals", &[])?;
        let seconds = metrics.add_gauge_family("current_seconds", "Seconds into the current minute", &[])?;
        let response_time =
            metrics.add_histogram_family("random_time_responses", "Random response time", &[])?;
        Ok(Self {
            sigusr1: signals.add(&[("signal", "SIGUSR1")])?,
            sigusr2: signals.add(&[("signal", "SIGUSR2")])?,
            seconds: seconds.add(&[("unit", "seconds")])?,
            response_time: response_time.add(&[("unit", "seconds")], &[17.5, 22.5, 27.5])?,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let metrics = Metrics::new();
    let addr = metrics
        .serve(&args.endpoint)
        .with_context(|| format!("failed to expose metrics on {}", args.endpoint))?;
    tracing::info!(%addr, "serving metrics");

    let observer = Observer::new(&metrics)?;

    // By-name updates work too, they just pay for the lookup every time.
    metrics.add_counter_family("main_example_total", "Main example counter total", &[])?;
    metrics.increment("main_example_total", &[], 5.0);

    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;
    let mut term = signal(SignalKind::terminate())?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut count = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                observer.seconds.set(count as f64);
                let pick = rand_index(count, RESPONSE_TIMES.len());
                observer.response_time.record(RESPONSE_TIMES[pick]);
                count = (count + 1) % 60;
            }
            _ = usr1.recv() => observer.sigusr1.incr(),
            _ = usr2.recv() => observer.sigusr2.incr(),
            _ = term.recv() => break,
            _ = &mut ctrl_c => break,
        }
    }

    tracing::info!("shutting down");
    // Stopping joins the exposer thread, keep that off the async workers.
    tokio::task::spawn_blocking(move || metrics.stop()).await?;
    Ok(())
}

/// Cheap scramble so the histogram gets something that looks random without
/// pulling in an rng.
fn rand_index(seed: u64, len: usize) -> usize {
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17);
    (mixed % len as u64) as usize
}
