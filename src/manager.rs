// src/manager.rs

//! Session orchestration: owns the device connection and the loaded player,
//! relays emitted actions to the device and to trace subscribers.

use futures::{FutureExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_stream::wrappers::ReceiverStream;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::protocol::action::{Action, TimedAction};
use crate::protocol::player::Player;

pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Queue size of a trace subscriber. A subscriber that falls this far
/// behind is dropped.
pub const TRACE_BUFFER: usize = 8;

#[derive(Default)]
struct State {
    player: Option<Arc<Player>>,
    connected: bool,
    relay: Option<JoinHandle<()>>,
}

impl State {
    fn is_playing(&self) -> bool {
        self.relay.as_ref().map_or(false, |relay| !relay.is_finished())
    }

    fn playing_player(&self) -> Result<&Player> {
        match &self.player {
            Some(player) if self.is_playing() => Ok(player.as_ref()),
            _ => Err(Error::NotPlaying),
        }
    }

    /// Stops the player and waits for the relay task to drain.
    async fn stop(&mut self) -> Result<()> {
        if let Some(player) = &self.player {
            player.stop().await?;
        }
        if let Some(relay) = self.relay.take() {
            if let Err(e) = relay.await {
                error!("Relay task failed: {}", e);
            }
        }
        Ok(())
    }

    /// Like [`State::stop`], but aborts the playback and relay tasks when
    /// the player does not respond.
    async fn force_stop(&mut self) {
        if let Err(e) = self.stop().await {
            warn!("Player did not stop ({}), aborting playback", e);
            if let Some(player) = &self.player {
                player.abort();
            }
            if let Some(relay) = self.relay.take() {
                relay.abort();
                let _ = relay.await;
            }
        }
    }
}

#[derive(Default)]
struct Tracers {
    subscribers: Mutex<Vec<mpsc::Sender<Action>>>,
}

impl Tracers {
    fn subscribe(&self) -> ReceiverStream<Action> {
        let (tx, rx) = mpsc::channel(TRACE_BUFFER);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        ReceiverStream::new(rx)
    }

    /// Offers `action` to every subscriber without blocking. Full or closed
    /// subscribers are removed.
    fn publish(&self, action: Action) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| match tx.try_send(action) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!("Dropping trace subscriber that is not keeping up");
                    false
                }
                Err(TrySendError::Closed(_)) => false,
            });
    }
}

/// Connects a [`Device`] with the currently loaded [`Player`].
pub struct Manager {
    device: Arc<dyn Device>,
    connection_timeout: Duration,
    state: AsyncMutex<State>,
    tracers: Arc<Tracers>,
}

impl Manager {
    pub fn new(device: Arc<dyn Device>) -> Arc<Self> {
        Self::with_connection_timeout(device, DEFAULT_CONNECTION_TIMEOUT)
    }

    /// Creates a manager and registers it for the device's disconnects.
    pub fn with_connection_timeout(device: Arc<dyn Device>, timeout: Duration) -> Arc<Self> {
        let manager = Arc::new(Self {
            device,
            connection_timeout: timeout,
            state: AsyncMutex::new(State::default()),
            tracers: Arc::new(Tracers::default()),
        });

        let weak = Arc::downgrade(&manager);
        manager.device.handle_disconnect(Box::new(move || {
            let weak = weak.clone();
            async move {
                if let Some(manager) = weak.upgrade() {
                    manager.disconnected().await;
                }
            }
            .boxed()
        }));

        manager
    }

    /// Replaces the loaded player, stopping the current session first.
    pub async fn set_script_player(&self, player: Player) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_playing() {
            state.stop().await?;
        }
        info!("Loaded script with {} actions", player.len());
        state.player = Some(Arc::new(player));
        Ok(())
    }

    /// Connects to the device if needed and starts playing the loaded script.
    /// Does nothing while already playing.
    pub async fn play(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.is_playing() {
            return Ok(());
        }

        if !state.connected {
            match time::timeout(self.connection_timeout, self.device.connect()).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(Error::ConnectionFailure(
                        "timed out connecting to device".to_string(),
                    ))
                }
            }
            info!("Device connected");
            state.connected = true;
        }

        match state.player.clone() {
            Some(player) => {
                let actions = player.play().await;
                state.relay = Some(tokio::spawn(relay(
                    actions,
                    Arc::clone(&self.device),
                    Arc::clone(&self.tracers),
                )));
            }
            None => debug!("Play requested without a loaded script"),
        }
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.is_playing() {
            return Ok(());
        }
        state.stop().await
    }

    pub async fn pause(&self) -> Result<()> {
        let state = self.state.lock().await;
        state.playing_player()?.pause().await
    }

    pub async fn resume(&self) -> Result<()> {
        let state = self.state.lock().await;
        state.playing_player()?.resume().await
    }

    pub async fn skip(&self, position: Duration) -> Result<()> {
        let state = self.state.lock().await;
        state.playing_player()?.skip(position).await
    }

    /// Returns the loaded script, whether playing or not.
    pub async fn dump(&self) -> Result<Vec<TimedAction>> {
        let state = self.state.lock().await;
        match &state.player {
            Some(player) => player.dump(),
            None => Err(Error::NotSupported),
        }
    }

    /// Subscribes to every action sent to the device from now on.
    pub fn trace(&self) -> ReceiverStream<Action> {
        self.tracers.subscribe()
    }

    async fn disconnected(&self) {
        warn!("Device disconnected");
        let mut state = self.state.lock().await;
        state.connected = false;
        state.force_stop().await;
    }
}

async fn relay(mut actions: ReceiverStream<Action>, device: Arc<dyn Device>, tracers: Arc<Tracers>) {
    while let Some(action) = actions.next().await {
        device.move_to(action.position, action.speed);
        tracers.publish(action);
    }
    debug!("Playback finished");
}
