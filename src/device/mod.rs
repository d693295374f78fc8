// src/device/mod.rs

//! The device the manager drives. Transports only need to provide connect,
//! move, disconnect and a disconnect notification.

pub mod intiface;
pub mod mock;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::error::Result;

pub use intiface::IntifaceDevice;
pub use mock::LoggingDevice;

/// Called by the transport when the link to the device drops. The transport
/// awaits the returned future.
pub type DisconnectHandler = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[async_trait]
pub trait Device: Send + Sync {
    /// Connects to the device. May be called again after a disconnect.
    async fn connect(&self) -> Result<()>;

    /// Moves to `position` with `speed`, both in percent. Commands are
    /// delivered in order, without waiting for them to complete.
    fn move_to(&self, position: u8, speed: u8);

    async fn disconnect(&self);

    /// Registers the handler invoked when the device disconnects.
    fn handle_disconnect(&self, handler: DisconnectHandler);
}
