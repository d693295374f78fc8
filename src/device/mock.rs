// src/device/mock.rs

use async_trait::async_trait;
use log::info;
use std::sync::{Mutex, PoisonError};

use super::{Device, DisconnectHandler};
use crate::error::Result;

/// Simulates a device by logging every call. Used when running without
/// hardware. The link never drops, so the disconnect handler is kept but
/// never invoked.
#[derive(Default)]
pub struct LoggingDevice {
    on_disconnect: Mutex<Option<DisconnectHandler>>,
}

impl LoggingDevice {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Device for LoggingDevice {
    async fn connect(&self) -> Result<()> {
        info!("Connect called");
        Ok(())
    }

    fn move_to(&self, position: u8, speed: u8) {
        info!("Move called: position={}, speed={}", position, speed);
    }

    async fn disconnect(&self) {
        info!("Disconnect called");
    }

    fn handle_disconnect(&self, handler: DisconnectHandler) {
        info!("Disconnect handler registered");
        *self
            .on_disconnect
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }
}
