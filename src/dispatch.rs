use tracing::debug;

use crate::client::ChatClient;
use crate::error::ChatError;
use crate::protocol::{ClientCommand, ConsoleCommand, Line, parse_line};
use crate::server::ChatServer;
use crate::transport::{ChatUi, ClientEvent, ClientTransport, Listener};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub async fn client_input<T: ClientTransport>(
    client: &ChatClient<T>,
    ui: &dyn ChatUi,
    line: &str,
) -> Flow {
    if let Line::Plain(text) = parse_line(line) {
        if let Err(err) = client.send_message(text).await {
            ui.display(&err.to_string());
        }
        return Flow::Continue;
    }

    let cmd = match ClientCommand::parse(line) {
        Ok(cmd) => cmd,
        Err(err) => {
            ui.display(&ChatError::from(err).to_string());
            return Flow::Continue;
        }
    };

    debug!(?cmd, "client command");

    match run_client_command(client, ui, cmd).await {
        Ok(flow) => flow,
        Err(err) => {
            ui.display(&err.to_string());
            Flow::Continue
        }
    }
}

async fn run_client_command<T: ClientTransport>(
    client: &ChatClient<T>,
    ui: &dyn ChatUi,
    cmd: ClientCommand,
) -> Result<Flow, ChatError> {
    match cmd {
        ClientCommand::Quit => {
            if let Err(err) = client.quit().await {
                ui.display(&err.to_string());
            }
            ui.display("Quitting the program");
            return Ok(Flow::Quit);
        }

        ClientCommand::Logoff => {
            if !client.is_connected() {
                return Err(ChatError::InvalidState("Not connected to a server".into()));
            }
            ui.display("Disconnecting from the server...");
            client.disconnect().await?;
            ui.display("Disconnected successfully");
        }

        ClientCommand::SetHost(host) => {
            client.set_host(&host).await?;
            ui.display(&format!("Set host to {host}"));
        }

        ClientCommand::SetPort(port) => {
            client.set_port(port).await?;
            ui.display(&format!("Set port to {port}"));
        }

        ClientCommand::Login(username) => {
            client.login(username.as_deref()).await?;
            ui.display(&format!("Connected to {}:{}", client.host(), client.port()));
        }

        ClientCommand::GetHost => ui.display(&format!("Current host: {}", client.host())),

        ClientCommand::GetPort => ui.display(&format!("Current port: {}", client.port())),
    }

    Ok(Flow::Continue)
}

pub async fn client_event<T: ClientTransport>(
    client: &ChatClient<T>,
    ui: &dyn ChatUi,
    event: ClientEvent,
) -> Flow {
    match event {
        ClientEvent::Message(line) => {
            ui.display(&line);
            Flow::Continue
        }
        ClientEvent::ConnectionLost(cause) => {
            debug!(?cause, "transport reported connection lost");

            if client.connection_lost().await {
                ui.display("The server has shut down. Quitting.");
                Flow::Quit
            } else {
                Flow::Continue
            }
        }
    }
}

pub async fn console_input<L: Listener>(
    server: &ChatServer<L>,
    ui: &dyn ChatUi,
    line: &str,
) -> Flow {
    if let Line::Plain(text) = parse_line(line) {
        server.say(text);
        return Flow::Continue;
    }

    let cmd = match ConsoleCommand::parse(line) {
        Ok(cmd) => cmd,
        Err(err) => {
            ui.display(&ChatError::from(err).to_string());
            return Flow::Continue;
        }
    };

    debug!(?cmd, "console command");

    match run_console_command(server, ui, cmd).await {
        Ok(flow) => flow,
        Err(err) => {
            ui.display(&err.to_string());
            Flow::Continue
        }
    }
}

async fn run_console_command<L: Listener>(
    server: &ChatServer<L>,
    ui: &dyn ChatUi,
    cmd: ConsoleCommand,
) -> Result<Flow, ChatError> {
    match cmd {
        ConsoleCommand::Quit => {
            server.close().await;
            ui.display("Server shutting down");
            return Ok(Flow::Quit);
        }

        ConsoleCommand::Stop => {
            server.stop().await?;
            ui.display("Server has stopped listening for connections.");
        }

        ConsoleCommand::Close => {
            let closed = server.close().await;
            ui.display(&format!(
                "Server closed: {closed} connection(s) terminated."
            ));
        }

        ConsoleCommand::SetPort(port) => {
            server.set_port(port).await?;
            ui.display(&format!("Set port to {port}"));
        }

        ConsoleCommand::Start => {
            server.start().await?;
            ui.display(&format!(
                "Server listening for connections on port {}",
                server.port()
            ));
        }

        ConsoleCommand::GetPort => ui.display(&format!("Current port: {}", server.port())),
    }

    Ok(Flow::Continue)
}
