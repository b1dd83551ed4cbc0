use tracing::{error, info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use county_water_risk::config::{Calibration, Config};
use county_water_risk::{loader, output, pipeline};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with environment filter support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,county_water_risk=debug")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    info!("Starting county-month integration run with config: {:?}", config);

    let calibration = Calibration::load(config.calibration_path.as_deref(), config.read_retries).await?;
    let window = config.study_window();

    let inputs = loader::load_inputs(&config).await?;

    let run = match pipeline::run(&inputs, &calibration, &window) {
        Ok(run) => run,
        Err(e) => {
            error!(error = %e, "Run failed, no table written");
            return Err(e.into());
        }
    };

    output::write_artifacts(&config, &run).await?;
    info!(
        rows = run.rows.len(),
        issues = run.report.issues.len(),
        completeness_pct = run.report.overall_completeness_pct,
        "Run complete"
    );

    Ok(())
}
