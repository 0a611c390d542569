use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use wiremock::{MockServer, Request, Respond, ResponseTemplate};

use crate::auth::StaticToken;
use crate::client::{ArmClient, ClientConfig};
use crate::env::Environment;
use crate::lro::{Clock, PollPolicy};

pub(crate) fn client_for(base: &str, clock: Arc<dyn Clock>) -> ArmClient {
    client_with(base, clock, PollPolicy::default())
}

pub(crate) fn client_with(base: &str, clock: Arc<dyn Clock>, poll: PollPolicy) -> ArmClient {
    let config = ClientConfig::new(Environment::custom(base), "tenant", "app", "secret")
        .subscription("S")
        .debug(true)
        .poll(poll);
    ArmClient::with_token_provider(config, Box::new(StaticToken("test-token".into()))).with_clock(clock)
}

pub(crate) fn client(server: &MockServer, clock: Arc<dyn Clock>) -> ArmClient {
    client_for(&server.uri(), clock)
}

/// Replays scripted responses in order; the last one repeats forever.
pub(crate) struct Sequence {
    script: Mutex<VecDeque<ResponseTemplate>>,
}

impl Sequence {
    pub(crate) fn new(script: Vec<ResponseTemplate>) -> Self {
        Self { script: Mutex::new(script.into()) }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or_else(|| ResponseTemplate::new(500))
        }
    }
}
