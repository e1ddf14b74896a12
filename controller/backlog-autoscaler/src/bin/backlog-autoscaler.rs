//! Backlog Autoscaler binary - runs one control cycle, or one per interval

use backlog_autoscaler::{
    ActuationMode, Config, ControlLoop, CycleResponse, FleetScaler, HttpMetricEmitter,
    HttpOrchestratorClient, HttpQueueInspector, LogOnlyFleetScaler, LogOnlyMetricEmitter,
    MetricEmitter, ScalingActuator,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse_config();

    // Logs go to stderr; stdout carries the cycle response
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("Starting Backlog Autoscaler");
    info!("Configuration:");
    info!("  Queue: {}", config.queue_identifier);
    info!(
        "  Fleet: {}/{}",
        config.cluster_identifier, config.service_identifier
    );
    info!(
        "  Latency bound: {}s, processing time: {}s",
        config.acceptable_latency_seconds, config.average_processing_time_seconds
    );
    info!("  Workers: [{}, {}]", config.min_workers, config.max_workers);
    info!("  Actuation: {:?}", config.actuation_mode);
    info!("  Dry-run: {}", config.dry_run);

    if let Err(e) = config.validate() {
        error!(error = %e, "Refusing to start with invalid configuration");
        print_response(&CycleResponse::error(&e))?;
        std::process::exit(1);
    }

    let control = build_control_loop(&config)?;
    match control.actuator() {
        Some(actuator) => info!(
            mode = ?control.mode(),
            scale_out_cooldown_secs = actuator.policy().scale_out.num_seconds(),
            scale_in_cooldown_secs = actuator.policy().scale_in.num_seconds(),
            "Control loop ready"
        ),
        None => info!(mode = ?control.mode(), "Control loop ready"),
    }

    match config.interval_secs {
        Some(secs) => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            };
            run_scheduled(&control, Duration::from_secs(secs), shutdown).await
        }
        None => {
            let response = CycleResponse::from_result(&control.run_cycle().await);
            print_response(&response)?;
            if !response.is_success() {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Wire the HTTP collaborators selected by configuration into a control loop
fn build_control_loop(config: &Config) -> anyhow::Result<ControlLoop> {
    let call_timeout = config.call_timeout();
    let params = config.capacity_parameters()?;

    let queue = Arc::new(HttpQueueInspector::new(
        &config.queue_endpoint,
        &config.queue_identifier,
        call_timeout,
    )?);
    let orchestrator = Arc::new(HttpOrchestratorClient::new(
        &config.orchestrator_endpoint,
        &config.cluster_identifier,
        &config.service_identifier,
        call_timeout,
    )?);

    let emitter: Arc<dyn MetricEmitter> = match &config.metrics_endpoint {
        Some(endpoint) => {
            info!("Publishing metrics to {}", endpoint);
            Arc::new(HttpMetricEmitter::new(endpoint, call_timeout)?)
        }
        None => {
            info!("No metrics endpoint configured; metrics are logged only");
            Arc::new(LogOnlyMetricEmitter)
        }
    };

    let control = ControlLoop::new(
        params,
        config.metric_target(),
        queue,
        orchestrator.clone(),
        emitter,
        call_timeout,
    );

    if config.actuation_mode == ActuationMode::ExternalPolicy {
        info!(
            target_backlog_per_worker = params.acceptable_backlog_per_worker()?,
            "Actuation delegated to external target-tracking policy"
        );
        return Ok(control);
    }

    let scaler: Arc<dyn FleetScaler> = if config.writes_to_orchestrator() {
        orchestrator
    } else {
        info!("Using log-only fleet scaler (dry-run mode)");
        Arc::new(LogOnlyFleetScaler::new(
            config.cluster_identifier.clone(),
            config.service_identifier.clone(),
        ))
    };

    Ok(control.with_actuator(ScalingActuator::new(
        scaler,
        config.cooldown_policy(),
        call_timeout,
    )))
}

/// Host the tick schedule in-process until `shutdown` resolves
async fn run_scheduled(
    control: &ControlLoop,
    interval: Duration,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    info!(interval_secs = interval.as_secs(), "Running on a fixed interval");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // One listener for the whole run so a signal during a cycle is not lost
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Backlog autoscaler shutting down");
                return Ok(());
            }
            _ = ticker.tick() => {
                let response = CycleResponse::from_result(&control.run_cycle().await);
                print_response(&response)?;
            }
        }
    }
}

fn print_response(response: &CycleResponse) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(response)?);
    Ok(())
}
