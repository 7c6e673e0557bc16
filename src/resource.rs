//! 内存态的资源登记表。
//!
//! 调度器不落盘，peer/任务/主机都靠注册时重建。

pub mod gc;
pub mod host;
pub mod peer;
pub mod task;

pub use gc::PeerGc;
pub use host::{Host, HostType};
pub use peer::{Peer, PeerEvent, PeerState};
pub use task::Task;

use crate::protocol::{PeerHost, UrlMeta};
use dashmap::DashMap;
use std::sync::Arc;

pub struct Resource {
    pub tasks: DashMap<String, Arc<Task>>,
    pub hosts: DashMap<String, Arc<Host>>,
    pub peers: DashMap<String, Arc<Peer>>,
}

impl Resource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tasks: DashMap::new(),
            hosts: DashMap::new(),
            peers: DashMap::new(),
        })
    }

    pub fn load_or_store_task(
        &self,
        id: impl Into<String>,
        url: impl Into<String>,
        url_meta: UrlMeta,
    ) -> Arc<Task> {
        let id = id.into();
        self.tasks
            .entry(id.clone())
            .or_insert_with(|| Task::new(id, url, url_meta))
            .clone()
    }

    pub fn load_task(&self, id: &str) -> Option<Arc<Task>> {
        self.tasks.get(id).map(|t| t.value().clone())
    }

    pub fn load_or_store_host(&self, peer_host: &PeerHost, typ: HostType) -> Arc<Host> {
        self.hosts
            .entry(peer_host.id.clone())
            .or_insert_with(|| Host::new(peer_host, typ))
            .clone()
    }

    pub fn load_host(&self, id: &str) -> Option<Arc<Host>> {
        self.hosts.get(id).map(|h| h.value().clone())
    }

    /// 登记 peer，同时挂到任务与主机上
    pub fn store_peer(&self, peer: Arc<Peer>) {
        peer.task.store_peer(peer.clone());
        peer.host.store_peer(peer.clone());
        self.peers.insert(peer.id.clone(), peer);
    }

    pub fn load_peer(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers.get(id).map(|p| p.value().clone())
    }

    /// 把 peer 从所有登记表里拿掉
    pub fn delete_peer(&self, id: &str) {
        let Some((_, peer)) = self.peers.remove(id) else {
            return;
        };

        peer.task.delete_peer(id);
        peer.host.delete_peer(id);
    }
}
