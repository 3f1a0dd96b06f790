use super::*;
use mule_bpv7::{bundle::Bundle, eid::Eid};
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Cron(#[from] cron::Error),

    #[error(transparent)]
    Cla(#[from] cla::Error),

    #[error(transparent)]
    Codec(#[from] bpv7::Error),

    #[error("the node is shutting down")]
    Cancelled,
}

/// The node: owner of every subsystem.
///
/// Construction hands each subsystem typed capability handles (channels,
/// trait objects) instead of mutual back-pointers; subsystems communicate by
/// message.
pub struct Node {
    config: config::Config,
    store: Arc<storage::Store>,
    cron: cron::Cron,
    routing: Arc<dyn routing::Algorithm>,
    cla: Arc<cla::Manager>,
    agents: Arc<agent::Registry>,
    dispatcher: Arc<dispatcher::Dispatcher>,
    inbound: mpsc::Sender<dispatcher::Ingress>,
    tasks: TaskTracker,
}

impl Node {
    pub async fn new(config: config::Config) -> Result<Arc<Self>, Error> {
        let store = Arc::new(storage::Store::new(&config.storage_path)?);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_channel_depth);

        let cron = cron::Cron::new();
        let routing = routing::new(
            &config.routing,
            config.node_id.clone(),
            inbound_tx.clone(),
            &cron,
        )?;

        let cla = Arc::new(cla::Manager::new(
            &config.cla,
            inbound_tx.clone(),
            routing.clone(),
        ));
        let agents = Arc::new(agent::Registry::default());

        let dispatcher = dispatcher::Dispatcher::new(
            store.clone(),
            routing.clone(),
            cla.clone(),
            agents.clone(),
            config.node_id.clone(),
        );
        dispatcher.start(inbound_rx);

        {
            let d = dispatcher.clone();
            cron.register(
                "store_gc",
                config.gc_interval,
                Box::new(move || {
                    let d = d.clone();
                    async move { d.purge_expired().await }.boxed()
                }),
            )?;
        }
        {
            let d = dispatcher.clone();
            cron.register(
                "dispatch_pending",
                config.retry_interval,
                Box::new(move || {
                    let d = d.clone();
                    async move { d.dispatch_pending().await }.boxed()
                }),
            )?;
        }

        // bundles that survived a restart re-enter the pipeline
        let recovered = store.recover().await?;
        dispatcher.redispatch(recovered).await;

        info!("node {} up", config.node_id);
        Ok(Arc::new(Self {
            config,
            store,
            cron,
            routing,
            cla,
            agents,
            dispatcher,
            inbound: inbound_tx,
            tasks: TaskTracker::new(),
        }))
    }

    pub fn node_id(&self) -> &Eid {
        &self.config.node_id
    }

    pub fn store(&self) -> &Arc<storage::Store> {
        &self.store
    }

    /// Submit a locally created bundle into the pipeline.
    pub async fn submit(&self, bundle: Bundle) -> Result<(), Error> {
        self.inbound
            .send(dispatcher::Ingress::Submit { bundle })
            .await
            .map_err(|_| Error::Cancelled)
    }

    pub async fn register_sender(&self, cla: Arc<dyn cla::ConvergenceSender>) -> Result<(), Error> {
        self.cla.register_sender(cla).await.map_err(Into::into)
    }

    pub async fn register_receiver(
        &self,
        cla: Arc<dyn cla::ConvergenceReceiver>,
    ) -> Result<(), Error> {
        self.cla.register_receiver(cla).await.map_err(Into::into)
    }

    pub async fn unregister_cla(&self, address: &str) {
        self.cla.unregister(address).await
    }

    /// Translate discovered neighbours into CL registrations. Already-known
    /// addresses are ignored.
    pub async fn handle_discovery(
        &self,
        messages: Vec<discovery::Message>,
        factory: &dyn discovery::SenderFactory,
    ) {
        for message in messages {
            let Some(sender) = factory.sender(&message) else {
                debug!("no factory for discovered CLA {:?}", message.cla_type);
                continue;
            };
            match self.cla.register_sender(sender).await {
                Ok(()) => info!(
                    "discovered peer {} at {}",
                    message.endpoint,
                    message.socket_address()
                ),
                Err(cla::Error::DuplicateAddress(_)) => {}
                Err(e) => warn!(
                    "failed to register discovered CLA at {}: {e}",
                    message.socket_address()
                ),
            }
        }
    }

    /// Serve one application agent connection over a typed message channel.
    /// At most one endpoint registration per connection.
    pub fn serve_agent(
        self: &Arc<Self>,
        mut rx: mpsc::Receiver<agent::Request>,
        tx: mpsc::Sender<agent::Response>,
    ) {
        let node = self.clone();
        self.tasks.spawn(async move {
            let mut registered: Option<Eid> = None;
            while let Some(request) = rx.recv().await {
                match request {
                    agent::Request::Register { endpoint } => {
                        let error = if registered.is_some() {
                            Some(agent::Error::AlreadyRegistered.to_string())
                        } else {
                            match node.agents.register(endpoint.clone(), tx.clone()) {
                                Ok(()) => {
                                    registered = Some(endpoint);
                                    None
                                }
                                Err(e) => Some(e.to_string()),
                            }
                        };
                        if tx.send(agent::Response::Status { error }).await.is_err() {
                            break;
                        }
                    }
                    agent::Request::Submit { bundle } => {
                        let error = node.submit(bundle).await.err().map(|e| e.to_string());
                        if tx.send(agent::Response::Status { error }).await.is_err() {
                            break;
                        }
                    }
                    agent::Request::Shutdown => break,
                }
            }
            if let Some(endpoint) = registered {
                node.agents.unregister(&endpoint);
            }
        });
    }

    /// Orderly shutdown: external bundle sources first, then the scheduler,
    /// then the pipeline drains, then routing.
    pub async fn shutdown(&self) {
        self.cla.shutdown().await;
        self.cron.shutdown().await;
        self.tasks.close();
        self.tasks.wait().await;
        self.dispatcher.shutdown().await;
        self.routing.shutdown().await;
        info!("node {} down", self.config.node_id);
    }
}
