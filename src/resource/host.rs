//! 主机实体。

use crate::protocol::PeerHost;
use crate::resource::peer::{Peer, PeerEvent};
use crate::util::datetime;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// 主机类型，树的深度计算在非普通主机处截断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostType {
    Normal,
    /// 专职回源播种的主机
    SeedPeer,
}

/// 承载一个或多个 peer 的物理/逻辑节点
pub struct Host {
    pub id: String,

    pub typ: HostType,

    pub hostname: String,

    pub ip: String,

    pub port: i32,

    /// peer 之间互传数据走的端口
    pub download_port: i32,

    /// 本机上的活跃 peer
    pub peers: DashMap<String, Arc<Peer>>,

    /// 本机正在向外供数的子节点总数
    pub upload_peer_count: AtomicI32,

    pub create_at: AtomicU64,

    pub update_at: AtomicU64,
}

impl Host {
    pub fn new(peer_host: &PeerHost, typ: HostType) -> Arc<Self> {
        let now = datetime::now_millis();
        Arc::new(Self {
            id: peer_host.id.clone(),
            typ,
            hostname: peer_host.hostname.clone(),
            ip: peer_host.ip.clone(),
            port: peer_host.port,
            download_port: peer_host.download_port,
            peers: DashMap::new(),
            upload_peer_count: AtomicI32::new(0),
            create_at: AtomicU64::new(now),
            update_at: AtomicU64::new(now),
        })
    }

    pub fn store_peer(&self, peer: Arc<Peer>) {
        self.peers.insert(peer.id.clone(), peer);
        self.update_at
            .store(datetime::now_millis(), Ordering::Relaxed);
    }

    pub fn load_peer(&self, id: &str) -> Option<Arc<Peer>> {
        self.peers.get(id).map(|p| p.value().clone())
    }

    pub fn delete_peer(&self, id: &str) {
        self.peers.remove(id);
    }

    pub fn peer_count(&self) -> i32 {
        self.peers.len() as i32
    }

    /// 主机下线，驱动本机所有 peer 离场。
    /// 不在终态的 peer 无法 Leave，只记录日志等 GC 兜底。
    pub fn leave_peers(&self) {
        let peers: Vec<Arc<Peer>> = self.peers.iter().map(|p| p.value().clone()).collect();
        for peer in peers {
            if let Err(err) = peer.transit(PeerEvent::Leave) {
                info!("主机 {} 上的 peer {} 暂时无法离场: {}", self.id, peer.id, err);
            }
        }
    }
}
