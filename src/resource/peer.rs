//! Peer 实体与生命周期。
//!
//! 每个 peer 隶属一个任务、落在一台主机上，彼此之间通过父子边
//! 组成供数树。生命周期由内置状态机驱动，进入回源、成功、失败、
//! 离场这些状态时会顺带把自己从树和主机上摘下来。

pub mod error;


use crate::core::alias::PeerPacketSender;
use crate::resource::host::{Host, HostType};
use crate::resource::peer::error::{Error, Result};
use crate::resource::task::Task;
use crate::util::bitmap::Bitmap;
use crate::util::collection;
use crate::util::datetime;
use crate::util::safe_set::SafeSet;
use crate::util::sync::{MutexExt, RwLockExt};
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::{error, info};

/// tag 的默认值。拼写沿用线上协议，不要修正。
pub const DEFAULT_TAG: &str = "unknow";

/// 小文件回源下载的超时时间
const DOWNLOAD_TINY_FILE_TIMEOUT: Duration = Duration::from_secs(30);

/// Peer 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    /// 已创建，还没开始跑
    Pending,

    /// 注册成 tiny 体量
    ReceivedTiny,

    /// 注册成 small 体量
    ReceivedSmall,

    /// 注册成 normal 体量
    ReceivedNormal,

    /// 正在从其他 peer 下载
    Running,

    /// 正在回源下载
    BackToSource,

    /// 下载成功
    Succeeded,

    /// 下载失败
    Failed,

    /// 已离场（终态）
    Leave,
}

/// 生命周期事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    RegisterTiny,
    RegisterSmall,
    RegisterNormal,
    Download,
    DownloadFromBackToSource,
    DownloadSucceeded,
    DownloadFailed,
    Leave,
}

impl PeerEvent {
    /// 事件允许的来源状态。
    ///
    /// ReportPeerResult 和 ReportPieceResult 的到达顺序没有保证，
    /// 所以 DownloadSucceeded 放宽到所有活跃状态，DownloadFailed
    /// 还允许覆盖掉已经成功的结果。
    fn valid_sources(&self) -> &'static [PeerState] {
        use PeerState::*;

        match self {
            PeerEvent::RegisterTiny | PeerEvent::RegisterSmall | PeerEvent::RegisterNormal => {
                &[Pending]
            }
            PeerEvent::Download => &[ReceivedTiny, ReceivedSmall, ReceivedNormal],
            PeerEvent::DownloadFromBackToSource => {
                &[ReceivedTiny, ReceivedSmall, ReceivedNormal, Running]
            }
            PeerEvent::DownloadSucceeded => {
                &[ReceivedTiny, ReceivedSmall, ReceivedNormal, Running, BackToSource]
            }
            PeerEvent::DownloadFailed => &[
                Pending,
                ReceivedTiny,
                ReceivedSmall,
                ReceivedNormal,
                Running,
                BackToSource,
                Succeeded,
            ],
            PeerEvent::Leave => &[Failed, Succeeded],
        }
    }

    fn destination(&self) -> PeerState {
        match self {
            PeerEvent::RegisterTiny => PeerState::ReceivedTiny,
            PeerEvent::RegisterSmall => PeerState::ReceivedSmall,
            PeerEvent::RegisterNormal => PeerState::ReceivedNormal,
            PeerEvent::Download => PeerState::Running,
            PeerEvent::DownloadFromBackToSource => PeerState::BackToSource,
            PeerEvent::DownloadSucceeded => PeerState::Succeeded,
            PeerEvent::DownloadFailed => PeerState::Failed,
            PeerEvent::Leave => PeerState::Leave,
        }
    }
}

pub struct Peer {
    /// peer id
    pub id: String,

    /// 业务方的分类标签
    pub tag: String,

    /// 已持有的分块位图
    pub pieces: Mutex<Bitmap>,

    /// 每个分块的下载耗时（纳秒），只追加
    piece_costs: Mutex<Vec<i64>>,

    /// 调度器向客户端下发指派的通道
    stream: Mutex<Option<PeerPacketSender>>,

    /// 状态机的当前状态，锁兼作状态机锁
    state: Mutex<PeerState>,

    /// 所属任务
    pub task: Arc<Task>,

    /// 所在主机
    pub host: Arc<Host>,

    /// 父节点，整体读、整体换，不做部分更新
    parent: Mutex<Option<Arc<Peer>>>,

    /// 子节点
    pub children: DashMap<String, Arc<Peer>>,

    /// 子节点计数，与 children 同步维护
    pub child_count: AtomicI32,

    /// 被自己抢过分块的 peer id
    pub steal_peers: SafeSet<String>,

    /// 不再调度给自己的 peer id
    pub block_peers: SafeSet<String>,

    /// 注册时种子被禁用，需要回源
    pub need_back_to_source: AtomicBool,

    /// 已经转为回源下载
    pub is_back_to_source: AtomicBool,

    /// 创建时间（毫秒）
    pub create_at: AtomicU64,

    /// 最近一次活动时间（毫秒）
    pub update_at: AtomicU64,

    /// 边操作锁。跨两个端点的修改先拿它，遍历时共享持有。
    mu: RwLock<()>,
}

impl Peer {
    pub fn new(id: impl Into<String>, task: Arc<Task>, host: Arc<Host>) -> Arc<Self> {
        Self::with_tag(id, DEFAULT_TAG, task, host)
    }

    pub fn with_tag(
        id: impl Into<String>,
        tag: impl Into<String>,
        task: Arc<Task>,
        host: Arc<Host>,
    ) -> Arc<Self> {
        let now = datetime::now_millis();
        Arc::new(Self {
            id: id.into(),
            tag: tag.into(),
            pieces: Mutex::new(Bitmap::new()),
            piece_costs: Mutex::new(Vec::new()),
            stream: Mutex::new(None),
            state: Mutex::new(PeerState::Pending),
            task,
            host,
            parent: Mutex::new(None),
            children: DashMap::new(),
            child_count: AtomicI32::new(0),
            steal_peers: SafeSet::new(),
            block_peers: SafeSet::new(),
            need_back_to_source: AtomicBool::new(false),
            is_back_to_source: AtomicBool::new(false),
            create_at: AtomicU64::new(now),
            update_at: AtomicU64::new(now),
            mu: RwLock::new(()),
        })
    }

    pub fn state(&self) -> PeerState {
        *self.state.lock_pe()
    }

    /// 驱动状态机。
    ///
    /// 进入动作在状态机临界区内执行，先拿状态机锁再拿边锁，
    /// 这个顺序在所有调用点都不能反，否则会和 delete_parent 死锁。
    pub fn transit(self: &Arc<Self>, event: PeerEvent) -> Result<()> {
        let mut state = self.state.lock_pe();
        if !collection::contains(event.valid_sources(), &*state) {
            return Err(Error::InvalidTransition(event, *state));
        }

        let src = *state;
        *state = event.destination();

        match event {
            PeerEvent::DownloadFromBackToSource => {
                self.is_back_to_source.store(true, Ordering::Relaxed);
                self.task.back_to_source_peers.add(self.id.clone());
                self.delete_parent();
                self.host.delete_peer(&self.id);
            }
            PeerEvent::DownloadSucceeded => {
                if src == PeerState::BackToSource {
                    self.task.back_to_source_peers.delete(&self.id);
                }

                self.delete_parent();
                self.host.delete_peer(&self.id);
                self.task.peer_failed_count.store(0, Ordering::Relaxed);
            }
            PeerEvent::DownloadFailed => {
                if src == PeerState::BackToSource {
                    self.task.peer_failed_count.fetch_add(1, Ordering::Relaxed);
                    self.task.back_to_source_peers.delete(&self.id);
                }

                self.delete_parent();
                self.host.delete_peer(&self.id);
            }
            PeerEvent::Leave => {
                self.delete_parent();
                self.host.delete_peer(&self.id);
            }
            _ => {}
        }

        self.update_at
            .store(datetime::now_millis(), Ordering::Relaxed);
        info!("peer {} 状态变为 {:?}", self.id, *state);
        Ok(())
    }

    pub fn touch(&self) {
        self.update_at
            .store(datetime::now_millis(), Ordering::Relaxed);
    }
}

/// 父子边维护
impl Peer {
    pub fn load_parent(&self) -> Option<Arc<Peer>> {
        self.parent.lock_pe().clone()
    }

    pub fn load_child(&self, key: &str) -> Option<Arc<Peer>> {
        self.children.get(key).map(|c| c.value().clone())
    }

    /// 把 parent 设为自己的父节点，双向登记。
    /// 首次插入才会推动对端的计数，重复调用是幂等的。
    pub fn store_parent(self: &Arc<Self>, parent: &Arc<Peer>) {
        let _guard = self.mu.write_pe();

        *self.parent.lock_pe() = Some(parent.clone());
        if parent
            .children
            .insert(self.id.clone(), self.clone())
            .is_none()
        {
            parent.child_count.fetch_add(1, Ordering::Relaxed);
            parent
                .host
                .upload_peer_count
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// 把 child 挂成自己的子节点，双向登记
    pub fn store_child(self: &Arc<Self>, child: &Arc<Peer>) {
        let _guard = self.mu.write_pe();

        if self
            .children
            .insert(child.id.clone(), child.clone())
            .is_none()
        {
            self.child_count.fetch_add(1, Ordering::Relaxed);
            self.host.upload_peer_count.fetch_add(1, Ordering::Relaxed);
        }
        *child.parent.lock_pe() = Some(self.clone());
    }

    /// 摘掉父边，没有父节点时静默返回
    pub fn delete_parent(&self) {
        let _guard = self.mu.write_pe();

        let parent = self.parent.lock_pe().take();
        let Some(parent) = parent else {
            return;
        };

        if parent.children.remove(&self.id).is_some() {
            parent.child_count.fetch_sub(1, Ordering::Relaxed);
            parent
                .host
                .upload_peer_count
                .fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// 摘掉指定子边
    pub fn delete_child(&self, key: &str) {
        let _guard = self.mu.write_pe();

        let Some(child) = self.load_child(key) else {
            return;
        };

        if self.children.remove(key).is_some() {
            self.child_count.fetch_sub(1, Ordering::Relaxed);
            self.host.upload_peer_count.fetch_sub(1, Ordering::Relaxed);
        }
        *child.parent.lock_pe() = None;
    }

    /// 换父节点。先摘再挂，两步之间外部会短暂观察到无父状态，
    /// 调度侧对此是容忍的。
    pub fn replace_parent(self: &Arc<Self>, parent: &Arc<Peer>) {
        self.delete_parent();
        self.store_parent(parent);
    }
}

/// 树遍历。
/// 父指针按约定不会成环，但回报乱序时短暂的不一致是可能的，
/// 所以每条遍历都带重复检测兜底，发现环就记错误日志并截断。
impl Peer {
    /// 自底向上收集 id，第一个元素是自己
    pub fn ancestors(&self) -> Vec<String> {
        let _guard = self.mu.read_pe();

        let mut ancestors = vec![self.id.clone()];
        let mut node = self.load_parent();
        while let Some(cur) = node {
            ancestors.push(cur.id.clone());
            if collection::find_duplicate(&ancestors).is_some() {
                error!("peer {} 的树结构出现了环", self.id);
                break;
            }

            node = cur.load_parent();
        }

        ancestors
    }

    /// 所在树的深度，遇到非普通主机就截断
    pub fn depth(&self) -> usize {
        let _guard = self.mu.read_pe();

        let mut ancestors = vec![self.id.clone()];
        if self.host.typ != HostType::Normal {
            return ancestors.len();
        }

        let mut node = self.load_parent();
        while let Some(cur) = node {
            ancestors.push(cur.id.clone());
            if collection::find_duplicate(&ancestors).is_some() {
                error!("peer {} 的树结构出现了环", self.id);
                break;
            }
            if cur.host.typ != HostType::Normal {
                break;
            }

            node = cur.load_parent();
        }

        ancestors.len()
    }

    /// 自己是否为 descendant 的祖先
    pub fn is_ancestor(&self, descendant: &Arc<Peer>) -> bool {
        self.search_in_ancestors(descendant)
    }

    /// 自己是否为 ancestor 的后代
    pub fn is_descendant(self: &Arc<Self>, ancestor: &Peer) -> bool {
        ancestor.search_in_ancestors(self)
    }

    fn search_in_ancestors(&self, descendant: &Arc<Peer>) -> bool {
        let _guard = self.mu.read_pe();

        let mut ancestors = vec![descendant.id.clone()];
        let mut node = descendant.load_parent();
        while let Some(cur) = node {
            if cur.id == self.id {
                return true;
            }

            ancestors.push(cur.id.clone());
            if collection::find_duplicate(&ancestors).is_some() {
                error!("peer {} 的树结构出现了环", self.id);
                break;
            }

            node = cur.load_parent();
        }

        false
    }
}

/// 下载进度与流
impl Peer {
    /// 登记一个已完成的分块
    pub fn store_piece(&self, piece_num: i32) {
        if piece_num < 0 {
            return;
        }
        self.pieces.lock_pe().set(piece_num as u32);
    }

    pub fn finished_piece_count(&self) -> u32 {
        self.pieces.lock_pe().count()
    }

    pub fn append_piece_cost(&self, cost: i64) {
        self.piece_costs.lock_pe().push(cost);
    }

    pub fn piece_costs(&self) -> Vec<i64> {
        self.piece_costs.lock_pe().clone()
    }

    pub fn store_stream(&self, stream: PeerPacketSender) {
        *self.stream.lock_pe() = Some(stream);
    }

    pub fn load_stream(&self) -> Option<PeerPacketSender> {
        self.stream.lock_pe().clone()
    }

    pub fn delete_stream(&self) {
        *self.stream.lock_pe() = None;
    }

    /// 直接从 peer 所在主机拉小文件内容。
    ///
    /// 地址格式：`http://{ip}:{download_port}/download/{任务 id 前 3 位}/{任务 id}?peerId={peer id}`，
    /// 带 Range 头取整个内容，2xx 之外的响应都算失败。
    pub async fn download_tiny_file(&self) -> anyhow::Result<Bytes> {
        let target_url = format!(
            "http://{}:{}/download/{}/{}?peerId={}",
            self.host.ip,
            self.host.download_port,
            &self.task.id[..3],
            self.task.id,
            self.id
        );

        info!("下载小文件: {}", target_url);
        let resp = reqwest::Client::new()
            .get(&target_url)
            .header(
                reqwest::header::RANGE,
                format!("bytes=0-{}", self.task.content_length() - 1),
            )
            .timeout(DOWNLOAD_TINY_FILE_TIMEOUT)
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("bad response status {}", resp.status());
        }

        Ok(resp.bytes().await?)
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("state", &self.state())
            .finish()
    }
}
