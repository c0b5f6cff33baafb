//! Runs a single-instrument replay against bucketed tick files on disk and
//! prints the resulting position and balance summary. A strategy hook can be
//! layered on by registering callbacks via `BacktestService::market_data` and
//! `BacktestService::exchange` before calling `run`.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;

use apex::prelude::*;

#[derive(Parser, Debug)]
#[command(about = None, long_about = None)]
struct Args {
    #[arg(long)]
    root: String,
    #[arg(long)]
    exchange: String,
    #[arg(long)]
    symbol: String,
    #[arg(long)]
    tick_size: f64,
    #[arg(long)]
    lot_size: f64,
    #[arg(long)]
    base: String,
    #[arg(long)]
    quote: String,
    #[arg(long)]
    from: NaiveDate,
    #[arg(long)]
    upto: NaiveDate,
    #[arg(long, default_value = "demo-strategy")]
    strategy_id: String,
    #[arg(long)]
    audit_path: Option<String>,
    #[arg(long, default_value_t = 0.0)]
    startup_position: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let exchange = ExchangeId::from_str_checked(&args.exchange)
        .with_context(|| format!("unknown exchange '{}'", args.exchange))?;
    let instrument = Instrument::new(
        exchange,
        &args.symbol,
        args.tick_size,
        args.lot_size,
        Asset::new(&args.base),
        Asset::new(&args.quote),
    );

    let sources = vec![
        ReplaySource {
            instrument: instrument.clone(),
            stream: MdStream::BookTicker,
            from: args.from,
            upto: args.upto,
        },
        ReplaySource {
            instrument: instrument.clone(),
            stream: MdStream::AggTrades,
            from: args.from,
            upto: args.upto,
        },
    ];

    let mut service = BacktestService::new(
        sources,
        &args.root,
        args.strategy_id,
        Position::new(args.startup_position),
        args.audit_path.as_deref(),
    )?;
    service.add_instrument(instrument);

    service.run()?;
    service.close_auditor()?;

    let position = service.position();
    let position = position.borrow();
    tracing::info!(
        net = position.net(),
        traded_long = position.traded_long(),
        traded_short = position.traded_short(),
        "backtest complete"
    );
    Ok(())
}
