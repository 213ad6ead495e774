use bytes::Bytes;
use hafnet::{Connection, MessageHandler, RMessage};
use hearthen_log::HearthenLogger;
use log::{error, info, Level};
use std::net::SocketAddr;

pub mod config;

/// Placeholder dispatcher until the widget and cache layers land; it just
/// narrates the traffic.
struct ConsoleHandler;

impl MessageHandler for ConsoleHandler {
    fn rel(&mut self, msg: RMessage) {
        info!("Server message type {} ({} bytes)", msg.mtype, msg.payload.len());
    }

    fn mapdata(&mut self, data: Bytes) {
        info!("Map tile payload ({} bytes)", data.len());
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = HearthenLogger::init(Level::Info) {
        eprintln!("Failed to install logger: {}", err);
        std::process::exit(1);
    }

    let config = match config::handle() {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    let server: SocketAddr = match config.network.address.parse() {
        Ok(addr) => addr,
        Err(_) => {
            error!("Invalid server address: {}", config.network.address);
            std::process::exit(1);
        }
    };
    let cookie = match hex::decode(&config.account.cookie) {
        Ok(cookie) => cookie,
        Err(err) => {
            error!("Invalid cookie: {}", err);
            std::process::exit(1);
        }
    };

    info!("Connecting to {} as {}", server, config.account.username);
    let conn = match Connection::connect(
        server,
        &config.account.username,
        &cookie,
        Bytes::new(),
        Box::new(ConsoleHandler),
    )
    .await
    {
        Ok(conn) => conn,
        Err(err) => {
            error!("Connection failed: {}", err);
            std::process::exit(1);
        }
    };
    info!("Session established");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to wait for shutdown signal: {}", err);
    }
    info!("Shutting down");
    conn.close();
    match conn.join().await {
        Ok(()) => info!("Session closed"),
        Err(err) => error!("Session ended with error: {}", err),
    }
}
