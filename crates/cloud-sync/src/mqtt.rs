//! MQTT transport
//!
//! The event loop is driven inline by `send_pending` rather than from a
//! spawned task, so a send completes only once the broker has taken it.
//! Between sends `idle` keeps polling it so keep-alive pings still flow.
//! After a failed send the client is rebuilt, so nothing queued for a
//! dropped message can reach the broker later.

use crate::transport::Transport;
use crate::{CloudConfig, CloudError};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Request channel capacity between client and event loop
const REQUEST_CAPACITY: usize = 10;

pub struct MqttTransport {
    options: MqttOptions,
    client: AsyncClient,
    eventloop: EventLoop,
    qos: QoS,
    send_timeout: Duration,
    /// Set on ConnAck, cleared whenever the connection fails
    connected: bool,
    /// Publishes requested but not yet written to the socket
    queued: usize,
    /// Packet ids written and waiting for the broker's acknowledgement
    awaiting: HashSet<u16>,
}

impl MqttTransport {
    /// Set up the client; the connection itself is made on the first send
    pub fn new(config: &CloudConfig) -> Self {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options.clone(), REQUEST_CAPACITY);
        info!(
            "MQTT client {} targeting {}:{}",
            config.client_id, config.broker_host, config.broker_port
        );

        Self {
            options,
            client,
            eventloop,
            qos: qos_from_level(config.qos),
            send_timeout: config.send_timeout,
            connected: false,
            queued: 0,
            awaiting: HashSet::new(),
        }
    }

    async fn drain(&mut self) -> Result<(), CloudError> {
        while self.queued > 0 || !self.awaiting.is_empty() {
            let event = self
                .eventloop
                .poll()
                .await
                .map_err(|e| CloudError::Connection(e.to_string()))?;
            self.handle(event);
        }
        Ok(())
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                self.queued = self.queued.saturating_sub(1);
                if self.qos != QoS::AtMostOnce {
                    self.awaiting.insert(pkid);
                }
            }
            Event::Incoming(Packet::PubAck(ack)) => {
                self.awaiting.remove(&ack.pkid);
            }
            Event::Incoming(Packet::PubComp(comp)) => {
                self.awaiting.remove(&comp.pkid);
            }
            Event::Incoming(Packet::ConnAck(ack)) => {
                self.connected = true;
                debug!("MQTT connected: {:?}", ack.code);
            }
            other => debug!("MQTT event: {:?}", other),
        }
    }

    /// Drop the client, its request channel and any in-flight state
    fn reset(&mut self) {
        let (client, eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        self.client = client;
        self.eventloop = eventloop;
        self.connected = false;
        self.queued = 0;
        self.awaiting.clear();
    }
}

impl Transport for MqttTransport {
    async fn enqueue(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), CloudError> {
        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|e| CloudError::Publish(e.to_string()))?;
        self.queued += 1;
        Ok(())
    }

    async fn send_pending(&mut self) -> Result<(), CloudError> {
        let limit = self.send_timeout;
        let result = match tokio::time::timeout(limit, self.drain()).await {
            Ok(result) => result,
            Err(_) => Err(CloudError::Timeout(limit)),
        };
        if result.is_err() {
            // Undelivered messages are dropped, not retried
            self.reset();
        }
        result
    }

    async fn idle(&mut self, wait: Duration) {
        let deadline = Instant::now() + wait;
        // Polling a disconnected loop would dial the broker; leave that to the next send
        while self.connected {
            match tokio::time::timeout_at(deadline, self.eventloop.poll()).await {
                Err(_) => return,
                Ok(Ok(event)) => self.handle(event),
                Ok(Err(e)) => {
                    warn!("MQTT connection lost while idle: {}", e);
                    self.reset();
                }
            }
        }
        tokio::time::sleep_until(deadline).await;
    }

    async fn close(&mut self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("MQTT disconnect request failed: {}", e);
            return;
        }
        let limit = self.send_timeout;
        let eventloop = &mut self.eventloop;
        let flush = async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(limit, flush).await.is_err() {
            warn!("MQTT disconnect not confirmed within {:?}", limit);
        }
        info!("Disconnected from MQTT broker");
    }
}

fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}
