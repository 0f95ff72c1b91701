use kvtree::config::{EngineConfig, SimulationSettings};
use kvtree::simulation::{Simulator, SimulatorConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kvtree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = match SimulationSettings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Failed to load simulation settings: {e}");
            std::process::exit(1);
        }
    };
    let engine_config = match EngineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load engine configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        seed = settings.seed,
        operations = settings.operations,
        key_space = settings.key_space,
        packed_key_limit = engine_config.packed_key_limit(),
        "starting simulation"
    );

    let config = SimulatorConfig::new(settings.seed)
        .with_key_space(settings.key_space)
        .with_engine_config(engine_config);
    let result = Simulator::new(config).run(settings.operations);

    if let Some(error) = &result.error {
        tracing::error!("simulation aborted: {error}");
    }
    for violation in &result.invariant_violations {
        tracing::error!(
            operation = violation.operation_index,
            context = %violation.context,
            "{}",
            violation.description
        );
    }
    tracing::info!(
        seed = result.seed,
        operations = result.operations_processed,
        commits = result.commits,
        aborts = result.aborts,
        keys = result.final_key_count,
        fingerprint = %format!("{:08x}", result.final_fingerprint),
        "simulation finished"
    );

    if !result.passed() {
        std::process::exit(1);
    }
}
