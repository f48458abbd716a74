use crate::error::CommandError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    Plain(&'a str),
    Command { name: &'a str, args: Vec<&'a str> },
}

pub fn parse_line(line: &str) -> Line<'_> {
    let Some(body) = line.strip_prefix('#') else {
        return Line::Plain(line);
    };

    let mut parts = body.split(' ');

    let name = parts.next().unwrap_or("");

    let args = parts.filter(|a| !a.trim().is_empty()).collect();

    Line::Command { name, args }
}

pub fn login_identity(line: &str) -> Option<&str> {
    let mut parts = line.split(' ');

    if parts.next() != Some("#login") {
        return None;
    }

    parts.find(|p| !p.trim().is_empty())
}

pub fn login_line(identity: &str) -> String {
    format!("#login {identity}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Quit,
    Logoff,
    SetHost(String),
    SetPort(u16),
    Login(Option<String>),
    GetHost,
    GetPort,
}

impl ClientCommand {
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        let Line::Command { name, args } = parse_line(raw) else {
            return Err(CommandError::Unrecognized(raw.to_string()));
        };

        match name {
            "quit" => Ok(Self::Quit),
            "logoff" => Ok(Self::Logoff),
            "sethost" => {
                let host = args.first().ok_or(CommandError::MissingArgument {
                    usage: "#sethost <host> - No host specified",
                })?;

                Ok(Self::SetHost(host.to_string()))
            }
            "setport" => Ok(Self::SetPort(port_arg(&args)?)),
            "login" => Ok(Self::Login(args.first().map(|id| id.to_string()))),
            "gethost" => Ok(Self::GetHost),
            "getport" => Ok(Self::GetPort),
            _ => Err(CommandError::Unrecognized(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Quit,
    Stop,
    Close,
    SetPort(u16),
    Start,
    GetPort,
}

impl ConsoleCommand {
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        let Line::Command { name, args } = parse_line(raw) else {
            return Err(CommandError::Unrecognized(raw.to_string()));
        };

        match name {
            "quit" => Ok(Self::Quit),
            "stop" => Ok(Self::Stop),
            "close" => Ok(Self::Close),
            "setport" => Ok(Self::SetPort(port_arg(&args)?)),
            "start" => Ok(Self::Start),
            "getport" => Ok(Self::GetPort),
            _ => Err(CommandError::Unrecognized(raw.to_string())),
        }
    }
}

fn port_arg(args: &[&str]) -> Result<u16, CommandError> {
    let port = args.first().ok_or(CommandError::MissingArgument {
        usage: "#setport <port> - No port specified",
    })?;

    port.trim()
        .parse()
        .map_err(|_| CommandError::InvalidPort(port.to_string()))
}
