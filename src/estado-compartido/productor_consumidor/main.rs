use clap::Parser;
use tracing::{error, info};

use sincro_clasicos::producer_consumer::{BUFFER_SIZE, CONSUMERS, ITEMS_TO_PRODUCE};
use sincro_clasicos::trace::init_tracing;
use sincro_clasicos::{run_production, ProductionConfig};

/// Un productor y varios consumidores sobre un buffer circular acotado.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Lugares del buffer circular
    #[arg(long, default_value_t = BUFFER_SIZE)]
    capacity: usize,

    /// Cantidad de items que escribe el productor antes de terminar
    #[arg(long, default_value_t = ITEMS_TO_PRODUCE)]
    items: usize,

    /// Cantidad de consumidores
    #[arg(long, default_value_t = CONSUMERS)]
    consumers: usize,

    /// Muestra también los movimientos de los cursores
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose).expect("setting default subscriber failed");

    let config = ProductionConfig {
        capacity: args.capacity,
        items: args.items,
        consumers: args.consumers,
    };

    match run_production(&config) {
        Ok(report) => {
            for (id, consumed) in &report.consumed {
                info!("Consumer {} consumed {} items", id, consumed.len());
            }
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
