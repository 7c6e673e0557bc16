//! 调度面与种子面的报文定义。
//!
//! 这里只描述消息本身，编解码与传输由外层适配，所有类型都带
//! serde 派生方便接到任意编解码器上。

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The sentinel piece number sent before any concrete piece.
pub const BEGIN_OF_PIECE: i32 = -1;

/// The sentinel piece number marking the logical end of a stream.
pub const END_OF_PIECE: i32 = -2;

/// 小文件任务的判定上限（字节），这类任务直接在注册结果里带回内容
pub const TINY_FILE_SIZE: i64 = 128;

/// gRPC 风格的状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Code {
    Ok,
    Canceled,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    ResourceExhausted,
    Internal,
    Unavailable,
}

/// 携带状态码的结构化错误，客户端看到的终态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(Code::Canceled, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for Status {}

/// 资源的附加元信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlMeta {
    /// 内容摘要，形如 `md5:xxx` / `sha256:xxx`
    pub digest: String,

    /// 业务方的分类标签
    pub tag: String,

    /// HTTP 风格的字节区间，如 `0-1023`
    pub range: String,

    /// 计算任务 id 时要剔除的查询参数，逗号分隔
    pub filter: String,

    /// 回源时携带的请求头
    pub header: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PieceStyle {
    #[default]
    Plain,
}

/// 单个分块的元信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PieceInfo {
    pub piece_num: i32,
    pub range_start: u64,
    pub range_size: u32,
    pub piece_md5: String,
    pub piece_offset: u64,
    pub piece_style: PieceStyle,
}

/// 存储侧透传给下载方的扩展属性（响应头等）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendAttribute {
    pub header: HashMap<String, String>,
}

/// 一批分块元信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PiecePacket {
    pub task_id: String,
    pub piece_infos: Vec<PieceInfo>,
    pub content_length: i64,
    pub total_piece: i32,
    pub extend_attribute: Option<ExtendAttribute>,
}

/// 种子流上的一条进度记录
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PieceSeed {
    pub peer_id: String,
    pub host_id: String,
    pub piece_info: Option<PieceInfo>,
    pub content_length: i64,
    pub total_piece_count: i32,
    pub begin_time: u64,
    pub end_time: u64,
    pub done: bool,
    pub extend_attribute: Option<ExtendAttribute>,
}

/// 发起请求的主机信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerHost {
    pub id: String,
    pub ip: String,
    pub hostname: String,
    pub port: i32,
    /// peer 之间互传数据走的端口
    pub download_port: i32,
}

/// 注册 peer 任务
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTaskRequest {
    /// 为空时由调度器按 url + url_meta 推导
    pub task_id: String,
    pub url: String,
    pub url_meta: UrlMeta,
    pub peer_id: String,
    pub peer_host: PeerHost,
    pub is_migrating: bool,
}

/// 任务的体量分级，决定注册后的下载路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeScope {
    /// 内容直接放进注册结果
    Tiny,
    /// 单分块，注册结果里带上分块信息
    Small,
    Normal,
}

/// 小任务在注册结果里直接回带的内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DirectPiece {
    Tiny(Bytes),
    Single(PieceInfo),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterResult {
    pub task_id: String,
    pub size_scope: SizeScope,
    pub direct_piece: Option<DirectPiece>,
}

/// 客户端对单个分块的下载回报
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PieceResult {
    pub task_id: String,
    pub src_pid: String,
    pub dst_pid: String,
    pub piece_info: Option<PieceInfo>,
    pub begin_time: u64,
    pub end_time: u64,
    pub success: bool,
    pub code: Option<Code>,
    pub finished_count: i32,
}

/// 调度器下发的父 peer 指派
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerPacket {
    pub task_id: String,
    pub src_pid: String,
    pub parallel_count: i32,
    pub main_peer: Option<DestPeer>,
    pub candidate_peers: Vec<DestPeer>,
    pub code: Option<Code>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestPeer {
    pub ip: String,
    pub rpc_port: i32,
    pub peer_id: String,
}

/// 客户端对整个任务的终态回报
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeerResult {
    pub task_id: String,
    pub peer_id: String,
    pub success: bool,
    pub code: Option<Code>,
    pub content_length: i64,
    pub total_piece_count: i32,
    pub traffic: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTarget {
    pub task_id: String,
    pub peer_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatTaskRequest {
    pub task_id: String,
}

/// StatTask 的响应快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub content_length: i64,
    pub total_piece_count: i32,
    pub peer_count: i32,
    pub has_available_peer: bool,
}

/// 客户端宣告自己已持有完整任务
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnounceTaskRequest {
    pub task_id: String,
    pub url: String,
    pub url_meta: UrlMeta,
    pub peer_host: PeerHost,
    pub peer_id: String,
    pub piece_packet: PiecePacket,
}

/// 请求种子流
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedRequest {
    pub task_id: String,
    pub url: String,
    pub url_meta: UrlMeta,
}

/// 拉取一段分块元信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceTaskRequest {
    pub task_id: String,
    pub start_num: u32,
    pub limit: u32,
}
