//! Terminal consent prompt
//!
//! Stands in for the biometric prompt on machines without one: the user
//! confirms each signature by typing `y` on the terminal.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::debug;
use ventus_core::{AuthDecision, BiometricGate};

/// Gate that asks for confirmation on a line-oriented reader
pub struct ConsoleGate<R> {
    input: Mutex<R>,
    auto_grant: bool,
}

impl ConsoleGate<BufReader<Stdin>> {
    /// Prompt on stderr and read the answer from stdin
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> ConsoleGate<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
            auto_grant: false,
        }
    }

    /// Grant every request without prompting
    pub fn auto_grant(mut self, enabled: bool) -> Self {
        self.auto_grant = enabled;
        self
    }
}

/// Decision for one line typed at the prompt
pub fn parse_answer(line: &str) -> AuthDecision {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => AuthDecision::Granted,
        _ => AuthDecision::Denied,
    }
}

#[async_trait]
impl<R> BiometricGate for ConsoleGate<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn authorize(&self, reason: &str) -> AuthDecision {
        if self.auto_grant {
            debug!("Authorization pre-approved");
            return AuthDecision::Granted;
        }

        let mut input = self.input.lock().await;
        eprint!("{reason}? [y/N] ");

        let mut line = String::new();
        match input.read_line(&mut line).await {
            // Nobody is there to answer
            Ok(0) | Err(_) => AuthDecision::Unavailable,
            Ok(_) => parse_answer(&line),
        }
    }
}
