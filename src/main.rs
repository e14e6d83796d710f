use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use tokio::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use notify_service::{
    SERVICE_NAME,
    api::run_api_server,
    clients::{
        exception_manager::ExceptionManagerClient,
        notify::{NotifyClient, SenderRegistry},
        rbmq::RabbitMqClient,
        store::Store,
        uac::UacQidServiceClient,
    },
    config::Config,
    pipeline::FulfilmentPipeline,
    recovery::MessageRecoverer,
    worker::{DeliveryProcessor, QueueWorker, spawn_workers},
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = Config::load()?;

    info!(service = SERVICE_NAME, "Starting");

    let store = Arc::new(Store::connect(&config).await?);
    let rbmq = Arc::new(RabbitMqClient::connect(&config).await?);
    let uac_client = Arc::new(UacQidServiceClient::new(&config)?);
    let notify_client = Arc::new(NotifyClient::new(&config)?);
    let exception_manager = Arc::new(ExceptionManagerClient::new(&config)?);
    let sender_registry = SenderRegistry::from_config(&config)?;

    let pipeline = Arc::new(FulfilmentPipeline::new(
        store,
        uac_client,
        Arc::clone(&rbmq) as Arc<dyn notify_service::ports::EnrichedEventPublisher>,
        notify_client,
        sender_registry,
        config.sms_request_enriched_queue.clone(),
        config.email_request_enriched_queue.clone(),
    ));

    let recoverer = MessageRecoverer::new(exception_manager, config.log_stack_traces);
    let processor = DeliveryProcessor::new(
        Arc::clone(&pipeline),
        recoverer,
        config.max_delivery_attempts,
        Duration::from_millis(config.processing_delay_ms),
    );
    let worker = Arc::new(QueueWorker::new(Arc::clone(&rbmq), processor));

    let mut tasks = spawn_workers(worker, &config);
    tasks.push(tokio::spawn(run_api_server(config, pipeline)));

    // Any task ending, successfully or not, means the service can no
    // longer do its job; fail loudly and let the orchestrator restart us.
    let (result, _, _) = futures_util::future::select_all(tasks).await;

    match result {
        Ok(Ok(())) => Err(anyhow!("A service task exited unexpectedly")),
        Ok(Err(e)) => Err(e),
        Err(e) => Err(anyhow!("A service task panicked: {e}")),
    }
}
