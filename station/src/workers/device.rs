//! Device-side MQTT listener feeding the command interpreter

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rumqttc::QoS;
use tracing::{debug, error, info, warn};

use crate::device::interpreter::CommandInterpreter;
use crate::errors::StationError;
use crate::mqtt::client::{MqttClient, MqttEvent};
use crate::mqtt::topics::Topics;
use crate::utils::{calc_exp_backoff, CooldownOptions};

/// Device listener options
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Reconnect backoff
    pub cooldown: CooldownOptions,
}

/// Apply one command payload, logging why it was discarded if it was
pub fn dispatch_command(interpreter: &CommandInterpreter, payload: &[u8]) {
    match interpreter.handle_payload(payload) {
        Ok(state) => debug!("Valve state now {:?}", state),
        Err(StationError::AddressMismatch { target, .. }) => {
            debug!("Ignoring command for {}", target);
        }
        Err(StationError::UnrecognizedAction(action)) => {
            warn!("Ignoring command with unrecognized action {:?}", action);
        }
        Err(e) => warn!("Ignoring malformed command: {}", e),
    }
}

/// Run the device listener. The auto-shutoff timer runs separately, so the
/// valve closes on time even while this worker is reconnecting.
pub async fn run<S, F>(
    options: &Options,
    mut client: MqttClient,
    topics: &Topics,
    interpreter: &CommandInterpreter,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Device listener starting as {}", interpreter.identity());
    let mut attempt = 0;

    loop {
        let event = tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Device listener shutting down...");
                if let Err(e) = client.disconnect().await {
                    debug!("MQTT disconnect failed: {}", e);
                }
                return;
            }
            event = client.poll() => event,
        };

        match event {
            Ok(MqttEvent::Connected) => {
                attempt = 0;
                if let Err(e) = client.subscribe(&topics.command(), QoS::AtLeastOnce) {
                    error!("Failed to subscribe to commands: {}", e);
                }
            }
            Ok(MqttEvent::Message(msg)) if topics.is_command_topic(&msg.topic) => {
                dispatch_command(interpreter, &msg.payload);
            }
            Ok(_) => {}
            Err(e) => {
                let delay = calc_exp_backoff(&options.cooldown, attempt);
                attempt = attempt.saturating_add(1);
                warn!("MQTT link error: {}, retrying in {:?}", e, delay);

                tokio::select! {
                    _ = &mut shutdown_signal => {
                        info!("Device listener shutting down...");
                        return;
                    }
                    _ = sleep_fn(delay) => {}
                }
            }
        }
    }
}
