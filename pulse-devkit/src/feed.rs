/*!
Feed simulator: stands in for the controller-side backend during
development. Connects to a real broker and publishes a coil sample on a
fixed interval, toggling the value every few ticks, plus the connection
status messages the kernel expects.
*/

use crate::{SAMPLE_TOPIC, STATUS_TOPIC};
use crate::mqtt_stub::PulseMessageBuilder;
use anyhow::Result;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tokio::time::interval;

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub broker_host: String,
    pub broker_port: u16,
    /// Cadence of published samples.
    pub sample_interval: Duration,
    /// The coil toggles after this many samples.
    pub flip_every: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".into(),
            broker_port: 1883,
            sample_interval: Duration::from_secs(1),
            flip_every: 5,
        }
    }
}

pub struct FeedSimulator {
    config: FeedConfig,
}

impl FeedSimulator {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    /// Runs until cancelled, publishing samples forever.
    pub async fn run(&self) -> Result<()> {
        let mut opts = MqttOptions::new(
            "pulse-feed-sim",
            &self.config.broker_host,
            self.config.broker_port,
        );
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 10);

        // Drive the connection in the background; the simulator only
        // publishes.
        tokio::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    log::warn!("feed eventloop error: {e:?}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        });

        self.publish_status(&client, "connected").await?;
        log::info!(
            "feed simulator publishing every {:?} to {}:{}",
            self.config.sample_interval,
            self.config.broker_host,
            self.config.broker_port
        );

        let mut ticker = interval(self.config.sample_interval);
        let mut count = 0usize;
        loop {
            ticker.tick().await;
            let value = coil_value(count, self.config.flip_every);
            let payload = serde_json::to_vec(&PulseMessageBuilder::sample_v1(value))?;
            client
                .publish(SAMPLE_TOPIC, QoS::AtLeastOnce, false, payload)
                .await?;
            count += 1;
        }
    }

    async fn publish_status(&self, client: &AsyncClient, status: &str) -> Result<()> {
        let payload = serde_json::to_vec(&PulseMessageBuilder::status_v1(status))?;
        client
            .publish(STATUS_TOPIC, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

fn coil_value(count: usize, flip_every: usize) -> bool {
    (count / flip_every.max(1)) % 2 == 0
}
