//! 过期 peer 清理。
//!
//! 客户端异常退出时不会发 LeaveTask，靠这里定期兜底回收。

use crate::core::bootstrap::Service;
use crate::core::config::Config;
use crate::resource::peer::{Peer, PeerEvent, PeerState};
use crate::resource::Resource;
use crate::util::datetime;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

pub struct PeerGc {
    resource: Arc<Resource>,
    cancel_token: CancellationToken,
    config: Config,
}

impl PeerGc {
    pub fn new(resource: Arc<Resource>, cancel_token: CancellationToken, config: Config) -> Self {
        Self {
            resource,
            cancel_token,
            config,
        }
    }

    /// 扫一轮：已离场的直接回收，太久没动静的先打失败再离场
    fn sweep(&self) {
        let ttl = self.config.peer_ttl().as_millis() as u64;
        let now = datetime::now_millis();

        let peers: Vec<Arc<Peer>> = self
            .resource
            .peers
            .iter()
            .map(|p| p.value().clone())
            .collect();

        let mut reclaimed = 0;
        for peer in peers {
            let stale = now.saturating_sub(peer.update_at.load(Ordering::Relaxed)) > ttl;
            match peer.state() {
                PeerState::Leave => {
                    self.resource.delete_peer(&peer.id);
                    reclaimed += 1;
                }
                _ if stale => {
                    let _ = peer.transit(PeerEvent::DownloadFailed);
                    let _ = peer.transit(PeerEvent::Leave);
                    self.resource.delete_peer(&peer.id);
                    reclaimed += 1;
                }
                _ => {}
            }
        }

        if reclaimed > 0 {
            debug!("peer gc 回收了 {} 个 peer", reclaimed);
        }
    }
}

impl Service for PeerGc {
    fn name(&self) -> &'static str {
        "peer gc"
    }

    async fn run(self) {
        info!("{} 已启动", self.name());
        let mut ticker = tokio::time::interval(self.config.peer_gc_interval());
        loop {
            select! {
                _ = self.cancel_token.cancelled() => {
                    trace!("{} 收到关闭信号", self.name());
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }
        info!("{} 已关闭", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{PeerHost, UrlMeta};
    use crate::resource::host::HostType;
    use crate::resource::peer::Peer;

    fn make_resources() -> (Arc<Resource>, Arc<Peer>) {
        let resource = Resource::new();
        let task = resource.load_or_store_task("task-0001", "http://example.com/a", UrlMeta::default());
        let host = resource.load_or_store_host(
            &PeerHost {
                id: "host-1".to_string(),
                ip: "127.0.0.1".to_string(),
                ..Default::default()
            },
            HostType::Normal,
        );
        let peer = Peer::new("peer-1", task, host);
        resource.store_peer(peer.clone());
        (resource, peer)
    }

    #[test]
    fn test_sweep_reclaims_left_peer() {
        let (resource, peer) = make_resources();
        peer.transit(PeerEvent::DownloadFailed).unwrap();
        peer.transit(PeerEvent::Leave).unwrap();

        let gc = PeerGc::new(resource.clone(), CancellationToken::new(), Config::new());
        gc.sweep();

        assert!(resource.load_peer("peer-1").is_none());
        assert!(resource.load_task("task-0001").unwrap().load_peer("peer-1").is_none());
    }

    #[test]
    fn test_sweep_reclaims_stale_peer() {
        let (resource, peer) = make_resources();
        // 把活动时间拨回很久之前
        peer.update_at.store(0, Ordering::Relaxed);

        let gc = PeerGc::new(resource.clone(), CancellationToken::new(), Config::new());
        gc.sweep();

        assert!(resource.load_peer("peer-1").is_none());
    }

    #[test]
    fn test_sweep_keeps_active_peer() {
        let (resource, peer) = make_resources();
        peer.transit(PeerEvent::RegisterNormal).unwrap();

        let gc = PeerGc::new(resource.clone(), CancellationToken::new(), Config::new());
        gc.sweep();

        assert!(resource.load_peer("peer-1").is_some());
    }
}
