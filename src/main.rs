use std::net;

use clap::Parser;
use tokio::sync::mpsc;

use ospf_lib::config::{AreaConfig, InterfaceConfig, RouterConfig};
use ospf_lib::packet::Output;
use ospf_lib::router::event::{self, Event};
use ospf_lib::Router;

mod cli;

/// Overlay OSPF router: the link state engine behind a small command line.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// router id in dotted quad form
    #[arg(long)]
    router_id: net::Ipv4Addr,
    /// IFINDEX,NAME,ADDR/PREFIXLEN,AREA,COST; repeat for every interface
    #[arg(long = "interface")]
    interfaces: Vec<InterfaceConfig>,
    /// areas configured as stub areas
    #[arg(long = "stub-area")]
    stub_areas: Vec<net::Ipv4Addr>,
    /// lsdb size above which summary and overlay origination stops
    #[arg(long)]
    lsdb_limit: Option<usize>,
    /// seconds between retransmissions of unacknowledged lsas
    #[arg(long, default_value_t = ospf_lib::config::DEFAULT_RXMT_INTERVAL)]
    rxmt_interval: u32,
    /// milliseconds between a topology change and the routing calculation
    #[arg(long, default_value_t = ospf_lib::config::DEFAULT_SPF_DELAY_MS)]
    spf_delay: u32,
    /// seconds to wait for flush acknowledgments on exit
    #[arg(long, default_value_t = ospf_lib::config::DEFAULT_SHUTDOWN_WAIT)]
    shutdown_wait: u32,
    /// seed for timer jitter, defaults to the router id
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn into_config(self) -> RouterConfig {
        let mut config = RouterConfig::new(self.router_id);
        for interface in self.interfaces {
            config = config.with_interface(interface);
        }
        for stub in self.stub_areas {
            match config.areas.iter_mut().find(|area| area.id == stub) {
                Some(area) => area.stub = true,
                None => config.areas.push(AreaConfig { id: stub, stub: true }),
            }
        }
        config.lsdb_limit = self.lsdb_limit;
        config.rxmt_interval = self.rxmt_interval;
        config.spf_delay_ms = self.spf_delay;
        config.shutdown_wait = self.shutdown_wait;
        if let Some(seed) = self.seed {
            config.random_seed = seed;
        }
        config
    }
}

async fn print_output(mut output: mpsc::Receiver<Output>) {
    while let Some(packet) = output.recv().await {
        ospf_lib::util::log(&packet.display());
        ospf_lib::util::debug(&hex::encode(packet.packet.to_bytes()));
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let router = Router::new(args.into_config())?;
    let prompt = router.router_id().to_string();

    let (event_tx, event_rx) = mpsc::channel::<Event>(128);
    let (output_tx, output_rx) = mpsc::channel::<Output>(128);
    tokio::spawn(print_output(output_rx));

    let signal_tx = event_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = signal_tx.send(Event::Shutdown).await;
        }
    });

    tokio::task::spawn_blocking(move || {
        if let Err(err) = cli::cli(event_tx, prompt) {
            ospf_lib::util::error(&format!("cli: {}", err));
        }
    });

    let router = event::run(router, event_rx, output_tx).await;
    println!("{}", router.show_timers());
    // the cli thread may still sit in readline
    std::process::exit(0);
}
