use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use relay_chat::console::{self, StdoutUi};
use relay_chat::dispatch::{self, Flow};
use relay_chat::tcp::TcpServerTransport;
use relay_chat::{ChatServer, ChatUi, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    console::init_tracing("info");

    let config = ServerConfig::from_args(std::env::args().skip(1));

    let (events_tx, mut events) = mpsc::unbounded_channel();

    let ui: Arc<dyn ChatUi> = Arc::new(StdoutUi::server());

    let transport = TcpServerTransport::new(events_tx, config.send_timeout);

    let server = Arc::new(ChatServer::new(transport, config.port, ui.clone()));

    match server.start().await {
        Ok(()) => ui.display(&format!(
            "Server listening for connections on port {}",
            server.port()
        )),
        Err(err) => {
            error!(port = config.port, "initial listen failed");
            ui.display(&err.to_string());
        }
    }

    let event_server = server.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            event_server.handle_event(event);
        }
    });

    let mut input = console::stdin_lines();

    loop {
        let Some(line) = input.next_line().await.context("reading console input")? else {
            server.close().await;
            break;
        };

        let line = console::console_line(&line, &config.console_prefix);

        if dispatch::console_input(server.as_ref(), ui.as_ref(), &line).await == Flow::Quit {
            break;
        }
    }

    info!("server exiting");

    Ok(())
}
