use std::io;
use std::time::Duration;

use clap::Parser;
use comms::msg::Mode;
use log::info;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use coordinator::channel::{Collector, Dispatcher};
use coordinator::registry::Registry;
use coordinator::retry::RetryPolicy;
use coordinator::session::{Session, SessionConfig};

/// Coordinator for a distributed fine-tuning worker fleet.
#[derive(Debug, Parser)]
#[command(name = "coordinator")]
struct Args {
    /// Worker dispatch address (host:port); repeat once per worker.
    #[arg(long = "worker", required = true)]
    workers: Vec<String>,

    /// Operating mode for the session.
    #[arg(long, default_value = "train")]
    mode: Mode,

    /// Model identifier forwarded to workers during setup.
    #[arg(long, default_value = "facebook/opt-1.3b")]
    model_name: String,

    /// Training epochs per worker.
    #[arg(long, default_value_t = 2)]
    epochs: u32,

    /// Port the shared response collector listens on.
    #[arg(long, default_value_t = 5557)]
    collector_port: u16,

    /// Barrier bound per phase, in seconds.
    #[arg(long, default_value_t = 300)]
    phase_timeout_secs: u64,

    /// Wait bound per inference question, in seconds.
    #[arg(long, default_value_t = 60)]
    infer_timeout_secs: u64,

    /// Maximum training retry rounds for failed workers.
    #[arg(long, default_value_t = 2)]
    retry_attempts: u32,

    /// Base backoff between training retry rounds, in milliseconds.
    #[arg(long, default_value_t = 500)]
    retry_base_ms: u64,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    // Transport initialization is the only fatal path: bind the shared
    // collector, then open one command channel per worker.
    let listener = TcpListener::bind(("0.0.0.0", args.collector_port)).await?;
    info!("collector listening at {}", listener.local_addr()?);

    let mut registry = Registry::new();
    let mut dispatcher = Dispatcher::new();
    let collector = Collector::new(64);

    for (idx, addr) in args.workers.iter().enumerate() {
        let id = idx as u32 + 1;
        let stream = TcpStream::connect(addr.as_str()).await.map_err(|e| {
            io::Error::new(e.kind(), format!("failed to connect to worker at {addr}: {e}"))
        })?;
        let (rx, tx) = stream.into_split();
        let (_, tx) = comms::channel(rx, tx);

        registry.register(id, addr.clone());
        dispatcher.insert(id, tx);
        info!("worker {id} command channel open to {addr}");
    }

    collector.serve(listener);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let cfg = SessionConfig {
        mode: args.mode,
        model_name: args.model_name,
        epochs: args.epochs,
        phase_timeout: Duration::from_secs(args.phase_timeout_secs),
        infer_timeout: Duration::from_secs(args.infer_timeout_secs),
        retry: RetryPolicy {
            max_attempts: args.retry_attempts,
            base_delay: Duration::from_millis(args.retry_base_ms),
            ..RetryPolicy::default()
        },
    };

    let mut session = Session::new(registry, dispatcher, collector, cfg, cancel);
    session.run().await.map_err(io::Error::other)?;

    info!("session complete");
    Ok(())
}
