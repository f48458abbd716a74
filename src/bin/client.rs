use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;

use relay_chat::console::{self, StdoutUi};
use relay_chat::dispatch::{self, Flow};
use relay_chat::tcp::TcpClientTransport;
use relay_chat::{ChatClient, ChatUi, ClientConfig};

#[tokio::main]
async fn main() -> Result<()> {
    console::init_tracing("warn");

    let config = ClientConfig::from_args(std::env::args().skip(1));

    let (events_tx, mut events) = mpsc::unbounded_channel();

    let client = ChatClient::new(TcpClientTransport::new(events_tx), &config);

    let ui = StdoutUi::client();

    if let Err(err) = client.connect().await {
        ui.display(&err.to_string());
    }

    let mut input = console::stdin_lines();

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line.context("reading console input")? else {
                    let _ = client.quit().await;
                    break;
                };

                if dispatch::client_input(&client, &ui, &line).await == Flow::Quit {
                    break;
                }
            }

            Some(event) = events.recv() => {
                if dispatch::client_event(&client, &ui, event).await == Flow::Quit {
                    break;
                }
            }
        }
    }

    info!("client exiting");

    Ok(())
}
