use std::{fmt, str::FromStr, time::Duration};

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    Transport,
};
use serde::{Deserialize, Serialize};
use tokio::time;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::MqttConfig,
    error::{DashboardError, Result},
};

// ---------------------------------------------------------------------------
// PumpCommand
// ---------------------------------------------------------------------------

/// Command tokens understood by the pump controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum PumpCommand {
    On,
    Off,
    Auto,
}

impl PumpCommand {
    pub const ALL: [PumpCommand; 3] = [PumpCommand::On, PumpCommand::Off, PumpCommand::Auto];

    /// Wire payload, e.g. `"ON"`.
    pub fn as_str(self) -> &'static str {
        match self {
            PumpCommand::On => "ON",
            PumpCommand::Off => "OFF",
            PumpCommand::Auto => "AUTO",
        }
    }
}

impl fmt::Display for PumpCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PumpCommand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            "AUTO" => Ok(Self::Auto),
            other => Err(format!("unknown pump command: {other:?} (expected ON, OFF or AUTO)")),
        }
    }
}

// ---------------------------------------------------------------------------
// PumpControl
// ---------------------------------------------------------------------------

/// Sends one pump command. Fire-and-forget: success means the command left
/// this process, not that the actuator acted on it.
#[async_trait]
pub trait PumpControl: Send + Sync {
    async fn publish(&self, command: PumpCommand) -> Result<()>;
}

/// Publishes each command over a fresh TLS MQTT session.
///
/// Per call: validate settings, connect, wait for CONNACK, settle, publish
/// at QoS 0, wait until the packet is handed to the socket, disconnect.
/// Nothing is retried or queued.
#[derive(Debug, Clone)]
pub struct MqttPublisher {
    config: MqttConfig,
    tls: bool,
}

impl MqttPublisher {
    pub fn new(config: MqttConfig) -> Self {
        Self { config, tls: true }
    }

    /// Plain TCP, for brokers on a trusted network and for tests.
    pub fn without_tls(config: MqttConfig) -> Self {
        Self { config, tls: false }
    }

    fn options(&self) -> MqttOptions {
        let client_id = format!("plant-dashboard-{}", Uuid::new_v4().simple());
        let mut options = MqttOptions::new(client_id, self.config.broker.trim(), self.config.port);
        options
            .set_keep_alive(self.config.keep_alive)
            .set_credentials(self.config.user.clone(), self.config.password.clone())
            .set_clean_session(true);
        if self.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }

    async fn send(&self, command: PumpCommand) -> Result<()> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), 10);

        time::timeout(self.config.handshake_timeout, wait_for_connack(&mut eventloop))
            .await
            .map_err(|_| {
                DashboardError::transport(format!(
                    "no CONNACK from {}:{} within {:?}",
                    self.config.broker, self.config.port, self.config.handshake_timeout
                ))
            })??;
        debug!(broker = %self.config.broker, "MQTT session established");

        time::sleep(self.config.settle_delay).await;

        client
            .publish(
                self.config.topic_pump_cmd.as_str(),
                QoS::AtMostOnce,
                false,
                command.as_str().as_bytes().to_vec(),
            )
            .await?;

        // QoS 0 has no PUBACK; seeing the outgoing publish means the packet was
        // written to the connection.
        time::timeout(
            HANDOFF_TIMEOUT,
            drive_until(&mut eventloop, |out| matches!(out, Outgoing::Publish(_))),
        )
        .await
        .map_err(|_| DashboardError::transport("publish was not handed to the connection in time"))??;

        client.disconnect().await?;
        // Best effort: the command is already out.
        if let Ok(Err(e)) = time::timeout(
            HANDOFF_TIMEOUT,
            drive_until(&mut eventloop, |out| matches!(out, Outgoing::Disconnect)),
        )
        .await
        {
            debug!(error = %e, "MQTT disconnect did not complete cleanly");
        }

        Ok(())
    }
}

const HANDOFF_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
impl PumpControl for MqttPublisher {
    async fn publish(&self, command: PumpCommand) -> Result<()> {
        // Checked before any network activity.
        self.config.validate()?;

        info!(
            command = %command,
            broker = %self.config.broker,
            topic = %self.config.topic_pump_cmd,
            "Publishing pump command"
        );

        match self.send(command).await {
            Ok(()) => {
                info!(command = %command, "Pump command handed to broker connection");
                Ok(())
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Pump command publish failed");
                Err(e)
            }
        }
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        if let Event::Incoming(Packet::ConnAck(ack)) = eventloop.poll().await? {
            return match ack.code {
                ConnectReturnCode::Success => Ok(()),
                code => Err(DashboardError::transport(format!(
                    "broker refused connection: {code:?}"
                ))),
            };
        }
    }
}

async fn drive_until(eventloop: &mut EventLoop, done: impl Fn(&Outgoing) -> bool) -> Result<()> {
    loop {
        if let Event::Outgoing(out) = eventloop.poll().await? {
            if done(&out) {
                return Ok(());
            }
        }
    }
}
