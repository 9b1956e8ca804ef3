// ABOUTME: Runs the gateway core end to end: load connectors, bind them, dispatch one message
// ABOUTME: Works against real SMSCs from a YAML file or against scripted mock carriers

//! # Gateway demo
//!
//! Loads a gateway configuration, binds every connector, sends one message
//! through the dispatcher and prints inbound traffic until the run duration
//! elapses.
//!
//! ## Usage
//!
//! ```bash
//! # Two scripted carriers; the first drops the link so the message fails over
//! cargo run --example gateway_demo -- --mock --to +258841234567 --text "hello"
//!
//! # Real carriers from a configuration file
//! cargo run --example gateway_demo -- --config gateway.yaml \
//!   --to +258841234567 --from GATEWAY --text "hello" --tag transaction \
//!   --run-duration 60
//! ```

use argh::FromArgs;
use smsgw::inbound::{InboundListener, ReceivedSmsRequest, SmsDeliveryResponse};
use smsgw::routing::{Condition, Predicate, Subject};
use smsgw::telemetry::CounterMetrics;
use smsgw::transport::mock::{MockScript, MockTransportFactory, SubmitOutcome};
use smsgw::{
    CarrierRole, ConnectorDefinition, ConnectorManager, DispatchHandler, GatewayConfig,
    InboundTranslator, MemorySmsStore, SendSmsRequest, SmppTransportFactory, StaticRepository,
    TransportFactory,
};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Send one message through the SMS gateway core
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// path to the gateway YAML configuration
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// use scripted mock carriers instead of real SMSCs
    #[argh(switch)]
    mock: bool,

    /// the recipient telephone number
    #[argh(option, short = 't')]
    to: String,

    /// the originator (default: GATEWAY)
    #[argh(option, short = 'f')]
    from: Option<String>,

    /// the message text
    #[argh(option)]
    text: String,

    /// routing tag, may be repeated
    #[argh(option)]
    tag: Vec<String>,

    /// request id used as the idempotency key (default: demo-1)
    #[argh(option)]
    id: Option<String>,

    /// seconds to keep listening for inbound traffic (default: 0)
    #[argh(option)]
    run_duration: Option<u64>,
}

struct LoggingListener;

impl InboundListener for LoggingListener {
    fn on_sms_request(&self, request: ReceivedSmsRequest) {
        info!(
            connector = %request.connector_id,
            from = %request.from,
            to = %request.to,
            "<- message: {}", request.content
        );
    }

    fn on_sms_delivered(&self, response: SmsDeliveryResponse) {
        info!(
            connector = %response.connector_id,
            message_id = %response.message_id,
            "<- receipt: {}", response.status.as_str()
        );
    }
}

fn mock_gateway() -> (GatewayConfig, Arc<dyn TransportFactory>) {
    let connectors = vec![
        ConnectorDefinition::new("flaky", CarrierRole::Transmitter).with_alias("Flaky carrier"),
        ConnectorDefinition::new("steady", CarrierRole::Transceiver)
            .with_alias("Steady carrier")
            .with_delivery_tracking(true),
    ];
    let conditions = vec![
        Condition::new("flaky-mz", "flaky", Predicate::leaf(Subject::Destination).pattern(r"^\+258")),
        Condition::new("steady-mz", "steady", Predicate::leaf(Subject::Destination).pattern(r"^\+258")),
    ];
    let config = GatewayConfig {
        connectors,
        conditions,
        ..Default::default()
    };

    let factory = MockTransportFactory::new()
        .with_script("flaky", MockScript::default().submit(SubmitOutcome::Drop));
    (config, Arc::new(factory))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let (config, factory): (GatewayConfig, Arc<dyn TransportFactory>) = match &cli_args.config {
        Some(path) if !cli_args.mock => (GatewayConfig::load(path)?, Arc::new(SmppTransportFactory)),
        _ => mock_gateway(),
    };
    config.validate()?;

    let repository = Arc::new(StaticRepository::from_config(&config));
    let metrics = Arc::new(CounterMetrics::new());
    let translator = Arc::new(InboundTranslator::new(Arc::new(LoggingListener)).with_metrics(metrics.clone()));

    let manager = Arc::new(
        ConnectorManager::builder(repository.clone(), factory)
            .inbound(translator)
            .metrics(metrics.clone())
            .startup_timeout(config.startup_timeout)
            .build(),
    );
    manager.start().await?;

    for connector in manager.list() {
        info!("{} ({}) is {}", connector.id(), connector.alias(), connector.state());
    }

    let dispatcher = DispatchHandler::new(manager.clone(), repository, Arc::new(MemorySmsStore::new()))
        .with_metrics(metrics.clone());

    let mut request = SendSmsRequest::new(
        cli_args.id.unwrap_or_else(|| "demo-1".to_owned()),
        cli_args.to,
        cli_args.from.unwrap_or_else(|| "GATEWAY".to_owned()),
        cli_args.text,
    );
    if !cli_args.tag.is_empty() {
        request = request.with_tags(cli_args.tag);
    }

    match dispatcher.accept(&request).await {
        Ok(response) => info!("-> {:?}", response),
        Err(e) => error!("Dispatch failed: {e}"),
    }

    let run_duration = Duration::from_secs(cli_args.run_duration.unwrap_or(0));
    if !run_duration.is_zero() {
        info!("Listening for inbound traffic for {} seconds", run_duration.as_secs());
        tokio::time::sleep(run_duration).await;
    }

    manager.close().await?;
    info!("Metrics: {:?}", metrics.snapshot());
    Ok(())
}
