use clap::Parser;
use tally::{Config, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = tally::config::Args::parse();

    let config = Config::load(&args)?;

    // If --validate flag is set, exit successfully after config validation
    if args.validate {
        println!("Configuration is valid.");
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;

    tracing::debug!("{:?}", args);

    let Some(command) = args.command else {
        anyhow::bail!("No command given, see --help");
    };

    let result = tally::cli::run(command, &config).await;
    telemetry::shutdown_telemetry();

    match result {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<tally::Error>() {
            Some(err) if err.is_validation() => {
                eprintln!("{}", err.user_message());
                std::process::exit(2);
            }
            _ => Err(e),
        },
    }
}
