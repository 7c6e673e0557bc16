//! 任务实体。

use crate::protocol::{PieceInfo, SizeScope, UrlMeta, TINY_FILE_SIZE};
use crate::resource::peer::{Peer, PeerState};
use crate::util::datetime;
use crate::util::safe_set::SafeSet;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// 一个内容对象的下载任务，可以被任意多个 peer 共享
pub struct Task {
    /// 任务 id，由 URL + 元信息推导
    pub id: String,

    /// 资源地址
    pub url: String,

    /// 资源元信息
    pub url_meta: UrlMeta,

    /// 内容长度，-1 表示未知
    content_length: AtomicI64,

    /// 分块总数
    total_piece_count: AtomicI32,

    /// 分块元信息，由宣告或种子回报填充
    pub pieces: DashMap<i32, PieceInfo>,

    /// 正在回源的 peer id
    pub back_to_source_peers: SafeSet<String>,

    /// 连续回源失败的次数
    pub peer_failed_count: AtomicI32,

    /// 参与本任务的 peer
    pub peers: DashMap<String, Arc<Peer>>,

    /// 创建时间（毫秒）
    pub create_at: AtomicU64,

    /// 最近一次活动时间（毫秒）
    pub update_at: AtomicU64,
}

impl Task {
    pub fn new(id: impl Into<String>, url: impl Into<String>, url_meta: UrlMeta) -> Arc<Self> {
        let now = datetime::now_millis();
        Arc::new(Self {
            id: id.into(),
            url: url.into(),
            url_meta,
            content_length: AtomicI64::new(-1),
            total_piece_count: AtomicI32::new(0),
            pieces: DashMap::new(),
            back_to_source_peers: SafeSet::new(),
            peer_failed_count: AtomicI32::new(0),
            peers: DashMap::new(),
            create_at: AtomicU64::new(now),
            update_at: AtomicU64::new(now),
        })
    }

    pub fn content_length(&self) -> i64 {
        self.content_length.load(Ordering::Relaxed)
    }

    pub fn set_content_length(&self, content_length: i64) {
        self.content_length.store(content_length, Ordering::Relaxed);
    }

    pub fn total_piece_count(&self) -> i32 {
        self.total_piece_count.load(Ordering::Relaxed)
    }

    pub fn set_total_piece_count(&self, total_piece_count: i32) {
        self.total_piece_count
            .store(total_piece_count, Ordering::Relaxed);
    }

    /// 按内容长度与分块数划分任务体量。长度未知时按 Normal 处理。
    pub fn size_scope(&self) -> SizeScope {
        let content_length = self.content_length();
        if content_length < 0 {
            return SizeScope::Normal;
        }

        if content_length <= TINY_FILE_SIZE {
            SizeScope::Tiny
        } else if self.total_piece_count() == 1 {
            SizeScope::Small
        } else {
            SizeScope::Normal
        }
    }

    pub fn store_piece(&self, piece: PieceInfo) {
        self.pieces.insert(piece.piece_num, piece);
    }

    pub fn load_piece(&self, piece_num: i32) -> Option<PieceInfo> {
        self.pieces.get(&piece_num).map(|p| p.value().clone())
    }

    pub fn store_peer(&self, peer: Arc<Peer>) {
        self.peers.insert(peer.id.clone(), peer);
        self.touch();
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

    /// 是否还有能被调度的 peer
    pub fn has_available_peer(&self) -> bool {
        self.peers.iter().any(|peer| {
            !matches!(
                peer.value().state(),
                PeerState::Failed | PeerState::Leave
            )
        })
    }

    pub fn touch(&self) {
        self.update_at
            .store(datetime::now_millis(), Ordering::Relaxed);
    }
}
