use std::borrow::Cow;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

use crate::transport::ChatUi;

pub struct StdoutUi {
    prefix: &'static str,
}

impl StdoutUi {
    pub fn server() -> Self {
        Self { prefix: "> " }
    }

    pub fn client() -> Self {
        Self { prefix: "" }
    }
}

impl ChatUi for StdoutUi {
    fn display(&self, line: &str) {
        println!("{}{}", self.prefix, line);
    }
}

pub fn stdin_lines() -> Lines<BufReader<Stdin>> {
    BufReader::new(tokio::io::stdin()).lines()
}

pub fn console_line<'a>(line: &'a str, prefix: &str) -> Cow<'a, str> {
    if line.starts_with('#') || prefix.is_empty() {
        Cow::Borrowed(line)
    } else {
        Cow::Owned(format!("{prefix}{line}"))
    }
}

pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
