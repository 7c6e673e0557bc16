//! 种子 peer 的流式同步。
//!
//! 客户端以种子身份打开一条服务端流，这边随着回源下载的推进，把
//! 分块可用性按序推给调度器，最后以一条 done 记录收尾。任务本体
//! 由外部的任务管理器驱动，这里只消费它的完成/失败/进度信号。

pub mod error;

use crate::core::alias::{PiecePacketSender, PieceSeedSender, PieceTaskRequestReceiver};
use crate::metrics;
use crate::protocol::{
    ExtendAttribute, PeerHost, PieceInfo, PiecePacket, PieceTaskRequest, SeedRequest, Status,
    UrlMeta, BEGIN_OF_PIECE,
};
use crate::seeder::error::{Error, Result};
use crate::util::datetime;
use crate::util::http::{self, Range};
use crate::util::id;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Span};

/// 补发剩余分块时的分页大小
const REMINDING_PIECE_LIMIT: u32 = 16;

/// 分块进度通知
#[derive(Debug, Clone, Copy)]
pub struct PieceUpdate {
    /// 本次完成的分块号
    pub num: i32,

    /// 连续就绪的最大分块号
    pub ordered_num: i32,

    /// 任务是否已经全部完成
    pub finished: bool,
}

/// 任务失败原因的惰性取值。结构化的 [`Status`] 可以塞在
/// `anyhow::Error` 里原样带出来。
pub type FailReason = Box<dyn Fn() -> anyhow::Error + Send + Sync>;

/// 由 [`SeedRequest`] 加工出来的种子任务请求
#[derive(Debug, Clone)]
pub struct SeedTaskRequest {
    pub url: String,
    pub url_meta: UrlMeta,
    /// 复用已有任务时会被任务管理器替换
    pub peer_id: String,
    pub peer_host: PeerHost,
    pub range: Option<Range>,
}

/// 订阅一次种子任务得到的结果
pub struct SeedTaskResponse {
    pub task_id: String,
    pub peer_id: String,

    /// 任务完成信号
    pub success: mpsc::Receiver<()>,

    /// 任务失败信号，原因从 fail_reason 取
    pub fail: mpsc::Receiver<()>,

    /// 有序分块进度
    pub piece_info: mpsc::Receiver<PieceUpdate>,

    pub fail_reason: FailReason,

    /// 分块元信息后端，缺失说明订阅结果不完整
    pub storage: Option<Arc<dyn PieceStorage>>,

    /// 本次任务的追踪 span，需要带 success 字段
    pub span: Span,
}

/// 种子任务的驱动方
#[async_trait]
pub trait SeedTaskManager: Send + Sync {
    /// 启动（或复用）种子任务，返回订阅结果和是否为复用
    async fn start_seed_task(
        &self,
        request: &SeedTaskRequest,
    ) -> anyhow::Result<(SeedTaskResponse, bool)>;

    /// 按任务 id 取分块存储
    fn load_storage(&self, task_id: &str) -> Option<Arc<dyn PieceStorage>>;
}

/// 分块元信息后端
#[async_trait]
pub trait PieceStorage: Send + Sync {
    /// 从 start_num 起最多取 limit 个分块
    async fn get_pieces(&self, request: &PieceTaskRequest) -> anyhow::Result<PiecePacket>;

    /// 透传给下载方的扩展属性
    async fn get_extend_attribute(&self) -> anyhow::Result<Option<ExtendAttribute>>;
}

pub struct SeederService {
    task_manager: Arc<dyn SeedTaskManager>,
    peer_host: PeerHost,
}

impl SeederService {
    pub fn new(task_manager: Arc<dyn SeedTaskManager>, peer_host: PeerHost) -> Self {
        Self {
            task_manager,
            peer_host,
        }
    }

    /// 打开种子流，分块按序推给 sender，结束时恰好有一条 done 记录。
    /// 出错时以结构化状态收尾，见 [`Error::to_status`]。
    pub async fn obtain_seeds(
        &self,
        request: SeedRequest,
        sender: PieceSeedSender,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        metrics::inc_seed_peer_concurrent_download_gauge();
        metrics::inc_seed_peer_download_count();

        let result = self.obtain_seeds_inner(request, sender, cancel_token).await;

        metrics::dec_seed_peer_concurrent_download_gauge();
        if result.is_err() {
            metrics::inc_seed_peer_download_failure_count();
        }
        result
    }

    async fn obtain_seeds_inner(
        &self,
        request: SeedRequest,
        sender: PieceSeedSender,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        let range = if request.url_meta.range.is_empty() {
            None
        } else {
            match http::parse_range(&request.url_meta.range, u64::MAX) {
                Ok(range) => Some(range),
                Err(err) => {
                    error!("解析 range {} 失败: {}", request.url_meta.range, err);
                    return Err(Error::InvalidRange(request.url_meta.range));
                }
            }
        };

        let seed_task_request = SeedTaskRequest {
            url: request.url,
            url_meta: request.url_meta,
            peer_id: id::seed_peer_id(&self.peer_host.ip),
            peer_host: self.peer_host.clone(),
            range,
        };

        let (response, reuse) = self
            .task_manager
            .start_seed_task(&seed_task_request)
            .await
            .map_err(|err| {
                error!("启动种子任务失败: {}", err);
                Error::StartSeedTaskFailed(err)
            })?;

        let SeedTaskResponse {
            task_id,
            peer_id,
            success,
            fail,
            piece_info,
            fail_reason,
            storage,
            span,
        } = response;

        let Some(storage) = storage else {
            return Err(Error::BadSubscribeResponse("storage is missing"));
        };

        info!("种子任务 {} 已启动, peer: {}", task_id, peer_id);

        // 先发一条问候记录，向客户端确认流可用
        sender
            .send(crate::protocol::PieceSeed {
                peer_id: peer_id.clone(),
                host_id: self.peer_host.id.clone(),
                piece_info: Some(PieceInfo {
                    piece_num: BEGIN_OF_PIECE,
                    ..Default::default()
                }),
                done: false,
                ..Default::default()
            })
            .await
            .map_err(|_| {
                error!("发送问候记录失败");
                Error::StreamSendFailed
            })?;

        let mut synchronizer = SeedSynchronizer {
            task_id,
            peer_id,
            host_id: self.peer_host.id.clone(),
            storage,
            sender,
            span,
            start_nanos: datetime::now_nanos(),
            attribute_sent: false,
        };
        synchronizer
            .send_piece_seeds(success, fail, piece_info, fail_reason, reuse, cancel_token)
            .await
    }

    /// 一次性拉取一段分块元信息
    pub async fn get_piece_tasks(&self, request: PieceTaskRequest) -> Result<PiecePacket> {
        let storage = self
            .task_manager
            .load_storage(&request.task_id)
            .ok_or_else(|| Error::TaskNotFound(request.task_id.clone()))?;

        storage
            .get_pieces(&request)
            .await
            .map_err(Error::StorageReadFailed)
    }

    /// 双向流变体：每收到一个请求就回一包分块元信息，
    /// 客户端关闭发送端即结束。
    pub async fn sync_piece_tasks(
        &self,
        mut requests: PieceTaskRequestReceiver,
        packets: PiecePacketSender,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        loop {
            select! {
                _ = cancel_token.cancelled() => {
                    return Err(Error::Canceled);
                }
                request = requests.recv() => {
                    let Some(request) = request else {
                        return Ok(());
                    };

                    let packet = self.get_piece_tasks(request).await?;
                    packets.send(packet).await.map_err(|_| Error::StreamSendFailed)?;
                }
            }
        }
    }
}

/// 单条种子流的发送状态
struct SeedSynchronizer {
    task_id: String,
    peer_id: String,
    host_id: String,
    storage: Arc<dyn PieceStorage>,
    sender: PieceSeedSender,
    span: Span,
    start_nanos: u64,
    /// 扩展属性整条流只发一次
    attribute_sent: bool,
}

impl SeedSynchronizer {
    /// 主事件循环：取消、任务完成、任务失败、分块进度四路信号
    async fn send_piece_seeds(
        &mut self,
        mut success: mpsc::Receiver<()>,
        mut fail: mpsc::Receiver<()>,
        mut piece_info: mpsc::Receiver<PieceUpdate>,
        fail_reason: FailReason,
        reuse: bool,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        let span = self.span.clone();
        let mut desired: i32 = 0;

        loop {
            select! {
                _ = cancel_token.cancelled() => {
                    error!(parent: &span, "种子流被取消");
                    span.record("success", false);
                    return Err(Error::Canceled);
                }
                _ = success.recv() => {
                    info!(parent: &span, "种子任务完成，补发剩余分块");
                    return match self.send_reminding_piece_seeds(desired, reuse).await {
                        Ok(()) => {
                            span.record("success", true);
                            Ok(())
                        }
                        Err(err) => {
                            error!(parent: &span, "补发剩余分块失败: {}", err);
                            span.record("success", false);
                            Err(err)
                        }
                    };
                }
                _ = fail.recv() => {
                    let reason = fail_reason();
                    error!(parent: &span, "种子任务失败: {}", reason);
                    span.record("success", false);
                    return match reason.downcast::<Status>() {
                        Ok(status) => Err(Error::RemoteFail(status)),
                        Err(reason) => Err(Error::RemoteFail(Status::internal(format!(
                            "seed task failed: {}",
                            reason
                        )))),
                    };
                }
                update = piece_info.recv() => {
                    let Some(update) = update else {
                        span.record("success", false);
                        return Err(Error::BadSubscribeResponse("piece info channel closed"));
                    };

                    debug!(
                        parent: &span,
                        "收到分块进度, num: {}, ordered: {}, finished: {}",
                        update.num, update.ordered_num, update.finished
                    );
                    let content_length = match self
                        .send_ordered_piece_seeds(&mut desired, update.ordered_num, update.finished)
                        .await
                    {
                        Ok(content_length) => content_length,
                        Err(err) => {
                            span.record("success", false);
                            return Err(err);
                        }
                    };

                    if update.finished {
                        debug!(parent: &span, "分块全部发送完成");
                        span.record("success", true);
                        metrics::add_seed_peer_download_traffic(reuse, content_length);
                        return Ok(());
                    }
                }
            }
        }
    }

    /// 把 [desired, ordered_num] 区间内的分块逐个发出去，
    /// 返回内容长度并把 desired 推进到 ordered_num + 1
    async fn send_ordered_piece_seeds(
        &mut self,
        desired: &mut i32,
        ordered_num: i32,
        finished: bool,
    ) -> Result<i64> {
        let mut content_length: i64 = -1;
        while *desired <= ordered_num {
            let cur = *desired;
            let mut packet = self.get_pieces(cur as u32, 1).await?;
            if packet.piece_infos.is_empty() {
                error!("期望的分块 {} 不存在", cur);
                return Err(Error::PieceNotFound(cur));
            }
            self.attach_extend_attribute(&mut packet).await?;

            let piece = packet.piece_infos[0].clone();
            let mut piece_seed = self.composite_piece_seed(&mut packet, Some(piece));
            if cur == ordered_num && finished {
                piece_seed.done = true;
                piece_seed.end_time = datetime::now_nanos();
                info!(
                    "种子任务开始: {}, 结束: {}, 耗时: {}ms",
                    piece_seed.begin_time,
                    piece_seed.end_time,
                    (piece_seed.end_time - piece_seed.begin_time) / 1_000_000
                );
            }

            self.sender.send(piece_seed).await.map_err(|_| {
                error!("发送分块 {} 失败", cur);
                Error::StreamSendFailed
            })?;
            debug!("分块 {} 已发送", cur);

            content_length = packet.content_length;
            *desired += 1;
        }

        Ok(content_length)
    }

    /// 任务已经完成，把客户端还没拿到的分块按页补发。
    /// 存储里一个分块都没有（空任务）时也要发一条 done 记录，
    /// 调度器才能观察到任务完成。
    async fn send_reminding_piece_seeds(&mut self, mut desired: i32, reuse: bool) -> Result<()> {
        loop {
            let mut packet = self
                .get_pieces(desired as u32, REMINDING_PIECE_LIMIT)
                .await?;
            self.attach_extend_attribute(&mut packet).await?;

            if packet.piece_infos.is_empty() {
                let mut piece_seed = self.composite_piece_seed(&mut packet, None);
                piece_seed.done = true;
                piece_seed.end_time = datetime::now_nanos();
                info!(
                    "种子任务开始: {}, 结束: {}, 耗时: {}ms",
                    piece_seed.begin_time,
                    piece_seed.end_time,
                    (piece_seed.end_time - piece_seed.begin_time) / 1_000_000
                );
                self.sender
                    .send(piece_seed)
                    .await
                    .map_err(|_| Error::StreamSendFailed)?;
            }

            let piece_infos = std::mem::take(&mut packet.piece_infos);
            for piece in piece_infos {
                if piece.piece_num != desired {
                    error!("期望的分块 {} 不存在", desired);
                    return Err(Error::PieceNotFound(desired));
                }

                let done = piece.piece_num == packet.total_piece - 1;
                let mut piece_seed = self.composite_piece_seed(&mut packet, Some(piece));
                if done {
                    piece_seed.done = true;
                    piece_seed.end_time = datetime::now_nanos();
                    info!(
                        "种子任务开始: {}, 结束: {}, 耗时: {}ms",
                        piece_seed.begin_time,
                        piece_seed.end_time,
                        (piece_seed.end_time - piece_seed.begin_time) / 1_000_000
                    );
                }

                self.sender
                    .send(piece_seed)
                    .await
                    .map_err(|_| Error::StreamSendFailed)?;
                debug!("分块 {} 已补发", desired);
                desired += 1;
            }

            if desired == packet.total_piece {
                metrics::add_seed_peer_download_traffic(reuse, packet.content_length);
                debug!("剩余分块补发完成");
                return Ok(());
            }
        }
    }

    async fn get_pieces(&self, start_num: u32, limit: u32) -> Result<PiecePacket> {
        self.storage
            .get_pieces(&PieceTaskRequest {
                task_id: self.task_id.clone(),
                start_num,
                limit,
            })
            .await
            .map_err(|err| {
                error!("读取分块元信息失败, start: {}: {}", start_num, err);
                Error::StorageReadFailed(err)
            })
    }

    /// 扩展属性挂到当前这包上，之后的包不再携带
    async fn attach_extend_attribute(&mut self, packet: &mut PiecePacket) -> Result<()> {
        if self.attribute_sent {
            return Ok(());
        }

        packet.extend_attribute = self
            .storage
            .get_extend_attribute()
            .await
            .map_err(Error::StorageReadFailed)?;
        self.attribute_sent = true;
        Ok(())
    }

    fn composite_piece_seed(
        &self,
        packet: &mut PiecePacket,
        piece_info: Option<PieceInfo>,
    ) -> crate::protocol::PieceSeed {
        crate::protocol::PieceSeed {
            peer_id: self.peer_id.clone(),
            host_id: self.host_id.clone(),
            piece_info,
            content_length: packet.content_length,
            total_piece_count: packet.total_piece,
            begin_time: self.start_nanos,
            end_time: datetime::now_nanos(),
            done: false,
            extend_attribute: packet.extend_attribute.take(),
        }
    }
}
