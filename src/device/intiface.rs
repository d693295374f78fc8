// src/device/intiface.rs

use async_trait::async_trait;
use buttplug::client::{
    device::LinearCommand, ButtplugClient, ButtplugClientDevice, ButtplugClientError,
    ButtplugClientEvent,
};
use buttplug::core::connector::new_json_ws_client_connector;
use futures::StreamExt;
use log::{error, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use super::{Device, DisconnectHandler};
use crate::error::{Error, Result};
use crate::protocol::action::Action;
use crate::protocol::funscript;

type SharedHandler = Arc<Mutex<Option<Arc<DisconnectHandler>>>>;

/// A device reached through an Intiface (buttplug.io) websocket server.
///
/// Position/speed commands are converted into linear moves: the duration
/// of each move is derived from the distance to travel and the speed.
pub struct IntifaceDevice {
    address: String,
    scan_duration: Duration,
    client: AsyncMutex<Option<ButtplugClient>>,
    commands: Mutex<Option<mpsc::UnboundedSender<Action>>>,
    on_disconnect: SharedHandler,
    // Bumped on every connect and disconnect so events of an old connection
    // are not reported.
    generation: Arc<AtomicU64>,
}

impl IntifaceDevice {
    pub fn new(address: impl Into<String>, scan_duration: Duration) -> Self {
        Self {
            address: address.into(),
            scan_duration,
            client: AsyncMutex::new(None),
            commands: Mutex::new(None),
            on_disconnect: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    fn lock_commands(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Action>>> {
        self.commands.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn connection_error(err: ButtplugClientError) -> Error {
    Error::ConnectionFailure(err.to_string())
}

#[async_trait]
impl Device for IntifaceDevice {
    async fn connect(&self) -> Result<()> {
        let mut current = self.client.lock().await;
        let current_generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(old) = current.take() {
            if let Err(e) = old.disconnect().await {
                warn!("Error closing previous Intiface connection: {}", e);
            }
        }

        let connector = new_json_ws_client_connector(&self.address);
        let client = ButtplugClient::new("Launch Control");
        client.connect(connector).await.map_err(connection_error)?;
        info!("Connected to Intiface at {}", self.address);

        let mut events = client.event_stream();

        client.start_scanning().await.map_err(connection_error)?;
        tokio::time::sleep(self.scan_duration).await;
        client.stop_scanning().await.map_err(connection_error)?;

        let device = match client.devices().into_iter().next() {
            Some(device) => device,
            None => {
                if let Err(e) = client.disconnect().await {
                    warn!("Error closing Intiface connection: {}", e);
                }
                return Err(Error::ConnectionFailure("no devices found".to_string()));
            }
        };
        info!("Using device {}", device.name());

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(command_loop(Arc::clone(&device), rx));
        *self.lock_commands() = Some(tx);

        let handler = Arc::clone(&self.on_disconnect);
        let generation = Arc::clone(&self.generation);
        let device_name = device.name().clone();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    ButtplugClientEvent::DeviceAdded(added) => {
                        info!("Device {} connected", added.name());
                    }
                    ButtplugClientEvent::DeviceRemoved(removed) => {
                        info!("Device {} removed", removed.name());
                        if *removed.name() == device_name {
                            if generation.load(Ordering::SeqCst) == current_generation {
                                notify(&handler).await;
                            }
                            break;
                        }
                    }
                    ButtplugClientEvent::ServerDisconnect => {
                        warn!("Intiface server disconnected");
                        if generation.load(Ordering::SeqCst) == current_generation {
                            notify(&handler).await;
                        }
                        break;
                    }
                    _ => {}
                }
            }
        });

        *current = Some(client);
        Ok(())
    }

    fn move_to(&self, position: u8, speed: u8) {
        match self.lock_commands().as_ref() {
            Some(commands) => {
                if commands.send(Action::new(position, speed)).is_err() {
                    warn!("Device command loop has stopped, dropping move");
                }
            }
            None => warn!("Move requested without a connected device"),
        }
    }

    async fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.lock_commands().take();
        if let Some(client) = self.client.lock().await.take() {
            if let Err(e) = client.disconnect().await {
                error!("Error disconnecting from Intiface: {}", e);
            }
        }
    }

    fn handle_disconnect(&self, handler: DisconnectHandler) {
        *self
            .on_disconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handler));
    }
}

async fn notify(handler: &SharedHandler) {
    let handler = handler
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    if let Some(handler) = handler {
        handler().await;
    }
}

/// Sends moves to the device one at a time, in the order they were queued.
async fn command_loop(
    device: Arc<ButtplugClientDevice>,
    mut commands: mpsc::UnboundedReceiver<Action>,
) {
    let mut position: u8 = 0;
    while let Some(action) = commands.recv().await {
        let distance = (action.position as i32 - position as i32).abs();
        let duration = funscript::duration(distance, action.speed as i32);
        position = action.position;

        let millis = duration.as_millis().min(u32::MAX as u128) as u32;
        let command = LinearCommand::Linear(millis, action.position as f64 / 100.0);
        if let Err(e) = device.linear(&command).await {
            error!("Error moving device: {}", e);
        }
    }
}
