use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use env_logger::Env;
use launch_control::device::{Device, IntifaceDevice, LoggingDevice};
use launch_control::manager::Manager;
use launch_control::{config, routes};
use log::info;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));
    let settings = config::init();
    info!("Launch Control: get ready for the launch");

    let device: Arc<dyn Device> = if settings.noact {
        info!("Simulating device on the console");
        Arc::new(LoggingDevice::new())
    } else {
        info!("Using Intiface server at {}", settings.buttplug_address);
        Arc::new(IntifaceDevice::new(
            settings.buttplug_address.clone(),
            settings.scan_duration,
        ))
    };
    let manager = web::Data::from(Manager::with_connection_timeout(
        Arc::clone(&device),
        settings.connect_timeout,
    ));

    info!("Listening on {}", settings.listen);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%r %s"))
            .app_data(manager.clone())
            .configure(routes::setup_routes)
    })
    .bind(&settings.listen)?
    .run()
    .await?;

    info!("Shutting down...");
    device.disconnect().await;
    Ok(())
}
