use crate::commands::{
    run_currency_convert, run_rates_import, run_shipping_estimate, ConvertArgs, EstimateArgs,
    ImportArgs,
};
use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use portal::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Community Portal",
    about = "Run the community portal service or its pricing tools from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Shipping cost tools
    Shipping {
        #[command(subcommand)]
        command: ShippingCommand,
    },
    /// USD to local currency tools
    Currency {
        #[command(subcommand)]
        command: CurrencyCommand,
    },
    /// Exchange rate log maintenance
    Rates {
        #[command(subcommand)]
        command: RatesCommand,
    },
    /// Walk through submission, moderation and synchronized views in one process
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum ShippingCommand {
    /// Price a parcel by weight
    Estimate(EstimateArgs),
}

#[derive(Subcommand, Debug)]
enum CurrencyCommand {
    /// Convert a USD amount with a given rate
    Convert(ConvertArgs),
}

#[derive(Subcommand, Debug)]
enum RatesCommand {
    /// Validate and load a rate CSV export
    Import(ImportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Shipping {
            command: ShippingCommand::Estimate(args),
        } => run_shipping_estimate(args),
        Command::Currency {
            command: CurrencyCommand::Convert(args),
        } => run_currency_convert(args),
        Command::Rates {
            command: RatesCommand::Import(args),
        } => run_rates_import(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
