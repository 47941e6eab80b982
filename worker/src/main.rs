use std::io;
use std::path::PathBuf;

use clap::Parser;
use log::info;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;

use worker::Worker;
use worker::engine::SimEngine;

/// Worker node for the distributed fine-tuning fleet.
#[derive(Debug, Parser)]
#[command(name = "worker")]
struct Args {
    /// Port to listen on for coordinator commands.
    #[arg(long, default_value_t = 5555)]
    port: u16,

    /// Coordinator host to deliver responses to.
    #[arg(long, default_value = "127.0.0.1")]
    coordinator: String,

    /// Coordinator collector port.
    #[arg(long, default_value_t = 5557)]
    coordinator_port: u16,

    /// Directory for dataset files.
    #[arg(long, default_value = "./client_data")]
    data_dir: PathBuf,

    /// Fail the first training attempt, to exercise coordinator retries.
    #[arg(long)]
    flaky: bool,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let list = TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!("listening at 0.0.0.0:{}", args.port);

    let (stream, peer) = list.accept().await?;
    let (rx, tx) = stream.into_split();
    let (rx, _) = comms::channel(rx, tx);
    info!("coordinator connected from {peer}");

    let collector_addr = format!("{}:{}", args.coordinator, args.coordinator_port);
    let stream = TcpStream::connect(&collector_addr).await?;
    let (c_rx, c_tx) = stream.into_split();
    let (_, tx) = comms::channel(c_rx, c_tx);
    info!("response channel open to {collector_addr}");

    let mut engine = SimEngine::new(&args.data_dir);
    if args.flaky {
        engine = engine.flaky();
    }

    let worker = Worker::new(engine);

    tokio::select! {
        ret = worker.run(rx, tx) => {
            ret?;
            info!("wrapping up, disconnecting");
        }
        _ = signal::ctrl_c() => {
            info!("interrupt received, terminating without response");
        }
    }

    Ok(())
}
