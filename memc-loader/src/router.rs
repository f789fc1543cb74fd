use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::encode::WriteJob;
use crate::error::UnknownDeviceType;
use crate::store::{KvStore, MemcacheClient};

/// One destination store, reached for exactly one device type.
#[derive(Clone)]
pub struct Target {
    pub device_type: String,
    pub address: String,
    pub client: Arc<dyn KvStore>,
}

impl Target {
    pub fn new(
        device_type: impl Into<String>,
        address: impl Into<String>,
        client: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            device_type: device_type.into(),
            address: address.into(),
            client,
        }
    }
}

/// The routing table, built once at startup and read-only afterwards.
#[derive(Clone)]
pub struct Router {
    targets: HashMap<String, Target>,
}

impl Router {
    pub fn new(targets: impl IntoIterator<Item = Target>) -> Self {
        Self {
            targets: targets
                .into_iter()
                .map(|t| (t.device_type.clone(), t))
                .collect(),
        }
    }

    /// One memcached client per configured device type.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.addresses.entries().into_iter().map(|(device_type, address)| {
            let client = MemcacheClient::new(address, config.loaders, config.write_timeout());
            Target::new(device_type, address, Arc::new(client))
        }))
    }

    pub fn route(&self, device_type: &str) -> Result<&Target, UnknownDeviceType> {
        self.targets
            .get(device_type)
            .ok_or_else(|| UnknownDeviceType(device_type.to_string()))
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    /// Allocate a fresh bounded queue for every target, for a single file run.
    pub fn open_queues(
        &self,
        capacity: usize,
    ) -> (RunRoutes, Vec<(Target, mpsc::Receiver<WriteJob>)>) {
        let mut senders = HashMap::with_capacity(self.targets.len());
        let mut receivers = Vec::with_capacity(self.targets.len());
        for target in self.targets.values() {
            let (tx, rx) = mpsc::channel(capacity);
            senders.insert(target.device_type.clone(), tx);
            receivers.push((target.clone(), rx));
        }
        (RunRoutes { senders }, receivers)
    }
}

/// The producer side of every target queue for one run. Dropping the last clone closes the queues.
#[derive(Clone)]
pub struct RunRoutes {
    senders: HashMap<String, mpsc::Sender<WriteJob>>,
}

impl RunRoutes {
    pub fn route(&self, device_type: &str) -> Result<&mpsc::Sender<WriteJob>, UnknownDeviceType> {
        self.senders
            .get(device_type)
            .ok_or_else(|| UnknownDeviceType(device_type.to_string()))
    }
}
