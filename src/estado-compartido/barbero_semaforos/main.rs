use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use sincro_clasicos::barber_shop::UNSPECIFIED;
use sincro_clasicos::trace::init_tracing;
use sincro_clasicos::{run_shop, ShopConfig, ShopSimulation};

/// Barbero dormilón: un barbero, una sala de espera con sillas y clientes que
/// llegan a intervalos aleatorios.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Sillas en la sala de espera
    #[arg(long)]
    chairs: i64,

    /// Clientes que pueden llegar a la barbería, -1 para infinitos
    #[arg(long, default_value_t = UNSPECIFIED, allow_negative_numbers = true)]
    customers: i64,

    /// Tiempo máximo de un corte en segundos, -1 para el valor por defecto
    #[arg(long, default_value_t = UNSPECIFIED, allow_negative_numbers = true)]
    haircut_secs: i64,

    /// Máximo de milisegundos entre la llegada de dos clientes
    #[arg(long, default_value_t = 4000)]
    max_arrival_ms: u64,

    /// Milisegundos que tarda en abrir la barbería
    #[arg(long, default_value_t = 2500)]
    opening_ms: u64,

    /// Muestra también los eventos de depuración
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose).expect("setting default subscriber failed");

    let shop = match ShopConfig::from_raw(args.chairs, args.haircut_secs, args.customers) {
        Ok(shop) => shop,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    let simulation = ShopSimulation {
        shop,
        max_arrival: Duration::from_millis(args.max_arrival_ms),
        opening_delay: Duration::from_millis(args.opening_ms),
    };

    match run_shop(&simulation) {
        Ok(report) => info!(
            "{} customers got a haircut, {} left without one",
            report.served.len(),
            report.rejected.len()
        ),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
