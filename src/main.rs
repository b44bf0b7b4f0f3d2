use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use smtp2telegram::{
    Config, ReqwestTransport, Shutdown, SmtpServer, TelegramClient, logging,
    spawn_signal_listener,
};
use tracing::{error, info, warn};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn main() {
    if let Err(e) = run() {
        // logging may not be up yet
        eprintln!("Error: {e:#}");
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let _log_guard = logging::init(&config.config_dir, config.log_keep_days)?;

    info!("Starting smtp2telegram {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration directory: {}", config.config_dir.display());
    if !config.chat_id_looks_valid() {
        warn!(
            "CHAT_ID {:?} does not look like a numeric Telegram chat id",
            config.chat_id
        );
    }

    let transport = ReqwestTransport::new(HTTP_TIMEOUT)?;
    let client = TelegramClient::new(transport, config.api_key.as_str(), config.chat_id.as_str())
        .with_max_retries(config.max_retries);

    if !client.test_connection().is_delivered() {
        bail!("Telegram connection test failed; check API_KEY and CHAT_ID");
    }
    info!("Telegram connection test succeeded, relaying to chat {}", client.chat_id());

    let shutdown = Shutdown::new();
    spawn_signal_listener(shutdown.clone()).context("failed to install signal handlers")?;

    let addr = config.bind_addr();
    let server = SmtpServer::new(&config.server_name, Arc::new(client), shutdown);
    server
        .start(&addr)
        .with_context(|| format!("SMTP server on {addr} failed"))?;

    info!("smtp2telegram stopped");
    Ok(())
}
