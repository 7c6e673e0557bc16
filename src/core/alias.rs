//! 流相关的 channel 类型别名。

use crate::protocol::{PeerPacket, PiecePacket, PieceResult, PieceSeed, PieceTaskRequest};
use tokio::sync::mpsc::{Receiver, Sender};

/// 种子流的发送端
pub type PieceSeedSender = Sender<PieceSeed>;

/// 种子流的接收端
pub type PieceSeedReceiver = Receiver<PieceSeed>;

/// 客户端分块回报的接收端
pub type PieceResultReceiver = Receiver<PieceResult>;

/// 调度器下发指派的发送端
pub type PeerPacketSender = Sender<PeerPacket>;

/// 分块元信息同步流的请求端
pub type PieceTaskRequestReceiver = Receiver<PieceTaskRequest>;

/// 分块元信息同步流的响应端
pub type PiecePacketSender = Sender<PiecePacket>;
