use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ConfirmSelectOptions, QueueDeclareOptions,
    },
    publisher_confirm::Confirmation,
    types::FieldTable,
};
use tracing::info;

use crate::config::Config;
use crate::error::ProcessingError;
use crate::models::retry::RetryConfig;
use crate::ports::EnrichedEventPublisher;
use crate::utils::retry_with_backoff;

/// RabbitMQ connection shared by the consumers and the enriched-event
/// publisher. The channel runs in confirm mode so that a publish only
/// completes once the broker has persisted the message.
pub struct RabbitMqClient {
    channel: Channel,
    retry_config: RetryConfig,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|_| anyhow!("Failed to connect to RabbitMQ"))?;

        info!("RabbitMQ connection established");

        let channel = connection
            .create_channel()
            .await
            .map_err(|_| anyhow!("RabbitMQ channel creation failed"))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to set up QoS"))?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to enable publisher confirms"))?;

        for queue in [
            &config.sms_request_queue,
            &config.email_request_queue,
            &config.sms_request_enriched_queue,
            &config.email_request_enriched_queue,
        ] {
            channel
                .queue_declare(
                    queue,
                    QueueDeclareOptions {
                        durable: true,
                        ..Default::default()
                    },
                    FieldTable::default(),
                )
                .await
                .map_err(|_| anyhow!("Failed to declare queue {queue}"))?;
        }

        info!("Queues declared");

        Ok(Self {
            channel,
            retry_config: config.retry_config(),
        })
    }

    pub async fn create_consumer(&self, queue: &str, consumer_tag: &str) -> Result<Consumer, Error> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|_| anyhow!("Failed to create consumer for queue {queue}"))?;

        info!(queue, "Consumer created");

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), Error> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|_| anyhow!("Failed to acknowledge message"))?;

        Ok(())
    }

    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|_| anyhow!("Failed to reject message"))?;

        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.channel.status().connected()
    }

    async fn publish_once(&self, queue: &str, body: &[u8]) -> Result<(), String> {
        let confirmation = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| format!("Publish failed: {e}"))?
            .await
            .map_err(|e| format!("Publish confirmation failed: {e}"))?;

        match confirmation {
            Confirmation::Ack(_) => Ok(()),
            Confirmation::Nack(_) => Err("Broker nacked the publish".to_string()),
            Confirmation::NotRequested => Err("Publisher confirms not enabled".to_string()),
        }
    }
}

#[async_trait]
impl EnrichedEventPublisher for RabbitMqClient {
    async fn publish_confirmed(&self, queue: &str, body: &[u8]) -> Result<(), ProcessingError> {
        retry_with_backoff(&self.retry_config, || self.publish_once(queue, body))
            .await
            .map_err(|reason| ProcessingError::RemoteCall {
                service: "event publisher",
                source: anyhow!(reason),
            })
    }
}
