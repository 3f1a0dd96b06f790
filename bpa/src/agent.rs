use super::*;
use mule_bpv7::{bundle::Bundle, eid::Eid};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum Error {
    #[error("endpoint {0} is already registered")]
    Duplicate(Eid),

    #[error("an agent connection may register at most one endpoint")]
    AlreadyRegistered,
}

/// Application agent → core.
#[derive(Debug)]
pub enum Request {
    Register { endpoint: Eid },
    Submit { bundle: Bundle },
    Shutdown,
}

/// Core → application agent.
#[derive(Debug)]
pub enum Response {
    Status { error: Option<String> },
    Delivered { bundle: Bundle },
}

/// Registered application endpoints and their delivery channels.
#[derive(Default)]
pub struct Registry {
    agents: Mutex<HashMap<Eid, mpsc::Sender<Response>>>,
}

impl Registry {
    pub fn register(&self, endpoint: Eid, tx: mpsc::Sender<Response>) -> Result<(), Error> {
        let mut agents = self.agents.lock().expect("agent registry lock poisoned");
        if agents.contains_key(&endpoint) {
            return Err(Error::Duplicate(endpoint));
        }
        info!("agent registered for {endpoint}");
        agents.insert(endpoint, tx);
        Ok(())
    }

    pub fn unregister(&self, endpoint: &Eid) {
        if self
            .agents
            .lock()
            .expect("agent registry lock poisoned")
            .remove(endpoint)
            .is_some()
        {
            info!("agent unregistered for {endpoint}");
        }
    }

    pub fn has_endpoint(&self, endpoint: &Eid) -> bool {
        self.agents
            .lock()
            .expect("agent registry lock poisoned")
            .contains_key(endpoint)
    }

    /// Hand a bundle to the agent registered for its destination.
    /// Returns false when no agent accepted it.
    pub(crate) async fn deliver(&self, bundle: &Bundle) -> bool {
        let tx = self
            .agents
            .lock()
            .expect("agent registry lock poisoned")
            .get(&bundle.primary.destination)
            .cloned();

        match tx {
            Some(tx) => tx
                .send(Response::Delivered {
                    bundle: bundle.clone(),
                })
                .await
                .is_ok(),
            None => false,
        }
    }
}
