//! 调度器对外的 RPC 服务面。
//!
//! 把注册、回报、查询这些调用分发到资源登记表与 peer 状态机上。
//! 传输层在外部适配，这里的流直接用 channel 建模。

use crate::core::alias::{PeerPacketSender, PieceResultReceiver};
use crate::core::config::Config;
use crate::metrics;
use crate::protocol::{
    AnnounceTaskRequest, Code, DirectPiece, PeerPacket, PeerResult, PeerTarget, PeerTaskRequest,
    PieceResult, RegisterResult, SizeScope, StatTaskRequest, Status, TaskInfo, BEGIN_OF_PIECE,
    END_OF_PIECE,
};
use crate::resource::host::HostType;
use crate::resource::peer::{Peer, PeerEvent, PeerState, DEFAULT_TAG};
use crate::resource::Resource;
use crate::util::id;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, Status>;

pub struct SchedulerService {
    resource: Arc<Resource>,
    config: Config,
}

impl SchedulerService {
    pub fn new(resource: Arc<Resource>, config: Config) -> Self {
        Self { resource, config }
    }

    pub fn resource(&self) -> Arc<Resource> {
        self.resource.clone()
    }

    /// 注册 peer 任务。task_id 为空时由 URL + 元信息推导。
    pub async fn register_peer_task(&self, mut request: PeerTaskRequest) -> Result<RegisterResult> {
        if request.task_id.is_empty() {
            request.task_id = id::task_id(&request.url, &request.url_meta);
        }

        metrics::inc_register_peer_task_count();
        match self.register(request).await {
            Ok(result) => {
                metrics::inc_peer_task_count();
                Ok(result)
            }
            Err(status) => {
                metrics::inc_register_peer_task_failure_count();
                Err(status)
            }
        }
    }

    async fn register(&self, request: PeerTaskRequest) -> Result<RegisterResult> {
        let tag = if request.url_meta.tag.is_empty() {
            DEFAULT_TAG.to_string()
        } else {
            request.url_meta.tag.clone()
        };

        let task = self.resource.load_or_store_task(
            request.task_id.clone(),
            request.url.clone(),
            request.url_meta.clone(),
        );
        let host = self
            .resource
            .load_or_store_host(&request.peer_host, HostType::Normal);

        // 同一任务上不允许重复注册同名 peer
        if task.load_peer(&request.peer_id).is_some() {
            return Err(Status::already_exists(format!(
                "peer {} already registered in task {}",
                request.peer_id, task.id
            )));
        }

        let peer = Peer::with_tag(request.peer_id.clone(), tag, task.clone(), host);
        self.resource.store_peer(peer.clone());

        // 种子被禁用时新任务只能回源
        if !self.config.seed_peer_enabled() {
            peer.need_back_to_source.store(true, Ordering::Relaxed);
        }

        info!("register peer {} for task {}", peer.id, task.id);
        match task.size_scope() {
            SizeScope::Tiny => {
                peer.transit(PeerEvent::RegisterTiny)
                    .map_err(|err| Status::internal(err.to_string()))?;

                // 内容直接带回注册结果；拉不到就退化成普通下载
                match peer.download_tiny_file().await {
                    Ok(content) if content.len() as i64 == task.content_length() => {
                        Ok(RegisterResult {
                            task_id: task.id.clone(),
                            size_scope: SizeScope::Tiny,
                            direct_piece: Some(DirectPiece::Tiny(content)),
                        })
                    }
                    Ok(content) => {
                        warn!(
                            "小文件长度不符, 期望 {} 实际 {}, 退化为普通下载",
                            task.content_length(),
                            content.len()
                        );
                        Ok(RegisterResult {
                            task_id: task.id.clone(),
                            size_scope: SizeScope::Normal,
                            direct_piece: None,
                        })
                    }
                    Err(err) => {
                        warn!("下载小文件失败: {}, 退化为普通下载", err);
                        Ok(RegisterResult {
                            task_id: task.id.clone(),
                            size_scope: SizeScope::Normal,
                            direct_piece: None,
                        })
                    }
                }
            }
            SizeScope::Small => {
                peer.transit(PeerEvent::RegisterSmall)
                    .map_err(|err| Status::internal(err.to_string()))?;

                // 单分块任务把分块信息一并带回，元信息还没就绪就算普通注册
                match task.load_piece(0) {
                    Some(piece) => Ok(RegisterResult {
                        task_id: task.id.clone(),
                        size_scope: SizeScope::Small,
                        direct_piece: Some(DirectPiece::Single(piece)),
                    }),
                    None => Ok(RegisterResult {
                        task_id: task.id.clone(),
                        size_scope: SizeScope::Normal,
                        direct_piece: None,
                    }),
                }
            }
            SizeScope::Normal => {
                peer.transit(PeerEvent::RegisterNormal)
                    .map_err(|err| Status::internal(err.to_string()))?;

                Ok(RegisterResult {
                    task_id: task.id.clone(),
                    size_scope: SizeScope::Normal,
                    direct_piece: None,
                })
            }
        }
    }

    /// 消费客户端的分块回报流。
    ///
    /// 第一条回报用来定位 peer 并把下发通道装到它身上，之后的回报
    /// 驱动状态机和下载簿记，客户端断开时拆掉通道。
    pub async fn report_piece_result(
        &self,
        mut results: PieceResultReceiver,
        packets: PeerPacketSender,
    ) -> Result<()> {
        metrics::inc_concurrent_schedule_gauge();
        let result = self.handle_piece_results(&mut results, packets).await;
        metrics::dec_concurrent_schedule_gauge();
        result
    }

    async fn handle_piece_results(
        &self,
        results: &mut PieceResultReceiver,
        packets: PeerPacketSender,
    ) -> Result<()> {
        let Some(first) = results.recv().await else {
            return Ok(());
        };

        let peer = self
            .resource
            .load_peer(&first.src_pid)
            .ok_or_else(|| Status::not_found(format!("peer {} not found", first.src_pid)))?;
        peer.store_stream(packets);

        self.handle_piece_result(&peer, first);
        while let Some(piece_result) = results.recv().await {
            self.handle_piece_result(&peer, piece_result);
        }

        peer.delete_stream();
        Ok(())
    }

    fn handle_piece_result(&self, peer: &Arc<Peer>, piece_result: PieceResult) {
        peer.touch();

        if let Some(piece_info) = &piece_result.piece_info {
            // 起始哨兵：客户端开始下载
            if piece_info.piece_num == BEGIN_OF_PIECE {
                let event = if peer.need_back_to_source.load(Ordering::Relaxed) {
                    PeerEvent::DownloadFromBackToSource
                } else {
                    PeerEvent::Download
                };
                if let Err(err) = peer.transit(event) {
                    debug!("peer {} 忽略下载事件: {}", peer.id, err);
                }
                return;
            }

            if piece_info.piece_num == END_OF_PIECE {
                return;
            }
        }

        if piece_result.success {
            if let Some(piece_info) = &piece_result.piece_info {
                peer.store_piece(piece_info.piece_num);
                peer.task.store_piece(piece_info.clone());
            }
            // 从非父节点拿到的分块，来源记为偷取对象
            if !piece_result.dst_pid.is_empty()
                && peer
                    .load_parent()
                    .is_none_or(|parent| parent.id != piece_result.dst_pid)
            {
                peer.steal_peers.add(piece_result.dst_pid.clone());
            }
            peer.append_piece_cost(
                piece_result.end_time.saturating_sub(piece_result.begin_time) as i64,
            );
            return;
        }

        warn!(
            "peer {} 分块下载失败, code: {:?}, 来源: {}",
            peer.id, piece_result.code, piece_result.dst_pid
        );
        // 失败来源记入黑名单，之后不再调度给它
        if !piece_result.dst_pid.is_empty() {
            peer.block_peers.add(piece_result.dst_pid.clone());
        }
    }

    /// 接收 peer 的终态回报
    pub async fn report_peer_result(&self, request: PeerResult) -> Result<()> {
        let peer = self
            .resource
            .load_peer(&request.peer_id)
            .ok_or_else(|| Status::not_found(format!("peer {} not found", request.peer_id)))?;

        if request.success {
            if request.content_length > 0 {
                peer.task.set_content_length(request.content_length);
            }
            if request.total_piece_count > 0 {
                peer.task.set_total_piece_count(request.total_piece_count);
            }
            peer.transit(PeerEvent::DownloadSucceeded)
                .map_err(|err| Status::internal(err.to_string()))?;
        } else {
            peer.transit(PeerEvent::DownloadFailed)
                .map_err(|err| Status::internal(err.to_string()))?;
        }

        Ok(())
    }

    /// 查询任务是否存在
    pub async fn stat_task(&self, request: StatTaskRequest) -> Result<TaskInfo> {
        metrics::inc_stat_task_count();

        let Some(task) = self.resource.load_task(&request.task_id) else {
            metrics::inc_stat_task_failure_count();
            return Err(Status::not_found(format!(
                "task {} not found",
                request.task_id
            )));
        };

        Ok(TaskInfo {
            id: task.id.clone(),
            content_length: task.content_length(),
            total_piece_count: task.total_piece_count(),
            peer_count: task.peer_count(),
            has_available_peer: task.has_available_peer(),
        })
    }

    /// 客户端宣告自己已持有完整任务，用于把外部下载的内容并入 P2P 网络
    pub async fn announce_task(&self, request: AnnounceTaskRequest) -> Result<()> {
        metrics::inc_announce_task_count();
        match self.announce(request).await {
            Ok(()) => Ok(()),
            Err(status) => {
                metrics::inc_announce_task_failure_count();
                Err(status)
            }
        }
    }

    async fn announce(&self, request: AnnounceTaskRequest) -> Result<()> {
        let task = self.resource.load_or_store_task(
            request.task_id.clone(),
            request.url.clone(),
            request.url_meta.clone(),
        );
        task.set_content_length(request.piece_packet.content_length);
        task.set_total_piece_count(request.piece_packet.total_piece);
        for piece in &request.piece_packet.piece_infos {
            task.store_piece(piece.clone());
        }

        let host = self
            .resource
            .load_or_store_host(&request.peer_host, HostType::Normal);
        let peer = match task.load_peer(&request.peer_id) {
            Some(peer) => peer,
            None => {
                let peer = Peer::new(request.peer_id.clone(), task.clone(), host);
                self.resource.store_peer(peer.clone());
                peer
            }
        };

        // 宣告方已持有全部内容，直接推进到 Succeeded
        if peer.state() == PeerState::Pending {
            let register = match task.size_scope() {
                SizeScope::Tiny => PeerEvent::RegisterTiny,
                SizeScope::Small => PeerEvent::RegisterSmall,
                SizeScope::Normal => PeerEvent::RegisterNormal,
            };
            peer.transit(register)
                .map_err(|err| Status::internal(err.to_string()))?;
        }
        for piece in &request.piece_packet.piece_infos {
            peer.store_piece(piece.piece_num);
        }

        if peer.state() != PeerState::Succeeded {
            peer.transit(PeerEvent::DownloadSucceeded)
                .map_err(|err| Status::internal(err.to_string()))?;
        }

        Ok(())
    }

    /// peer 离场，不再参与调度
    pub async fn leave_task(&self, request: PeerTarget) -> Result<()> {
        let peer = self
            .resource
            .load_peer(&request.peer_id)
            .ok_or_else(|| Status::not_found(format!("peer {} not found", request.peer_id)))?;

        peer.transit(PeerEvent::Leave)
            .map_err(|err| Status::new(Code::Internal, err.to_string()))?;

        // 孩子们摘掉父指针，并通知它们重新请求调度
        let children: Vec<Arc<Peer>> = peer.children.iter().map(|c| c.value().clone()).collect();
        for child in children {
            child.delete_parent();
            if let Some(stream) = child.load_stream() {
                let _ = stream
                    .send(PeerPacket {
                        task_id: request.task_id.clone(),
                        src_pid: child.id.clone(),
                        ..Default::default()
                    })
                    .await;
            }
        }

        self.resource.delete_peer(&peer.id);
        Ok(())
    }
}
