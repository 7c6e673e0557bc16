use crate::protocol::Status;

pub type Result<T> = std::result::Result<T, Error>;

/// 错误类型
#[derive(Debug)]
pub enum Error {
    /// 流被取消
    Canceled,
    /// 任务不存在
    TaskNotFound(String),
    /// 期望的分块不存在
    PieceNotFound(i32),
    /// 订阅结果不完整
    BadSubscribeResponse(&'static str),
    /// 区间参数非法
    InvalidRange(String),
    /// 启动种子任务失败
    StartSeedTaskFailed(anyhow::Error),
    /// 存储读取失败
    StorageReadFailed(anyhow::Error),
    /// 对端流已关闭
    StreamSendFailed,
    /// 下载侧报告的失败
    RemoteFail(Status),
}

impl Error {
    /// 转成客户端可见的终态状态。下载侧带来的结构化状态原样透传。
    pub fn to_status(&self) -> Status {
        match self {
            Error::Canceled => Status::canceled("seed stream canceled"),
            Error::TaskNotFound(task_id) => {
                Status::not_found(format!("task {} not found", task_id))
            }
            Error::PieceNotFound(piece_num) => {
                Status::internal(format!("seed task piece {} not found", piece_num))
            }
            Error::BadSubscribeResponse(reason) => {
                Status::internal(format!("bad subscribe response: {}", reason))
            }
            Error::InvalidRange(range) => {
                Status::invalid_argument(format!("invalid range: {}", range))
            }
            Error::StartSeedTaskFailed(err) => {
                Status::internal(format!("start seed task failed: {}", err))
            }
            Error::StorageReadFailed(err) => {
                Status::internal(format!("read storage failed: {}", err))
            }
            Error::StreamSendFailed => Status::unavailable("send piece seed failed"),
            Error::RemoteFail(status) => status.clone(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Canceled => write!(f, "seed stream canceled"),
            Error::TaskNotFound(task_id) => write!(f, "task {} not found", task_id),
            Error::PieceNotFound(piece_num) => write!(f, "seed piece {} not found", piece_num),
            Error::BadSubscribeResponse(reason) => write!(f, "bad subscribe response: {}", reason),
            Error::InvalidRange(range) => write!(f, "invalid range: {}", range),
            Error::StartSeedTaskFailed(err) => write!(f, "start seed task failed: {}", err),
            Error::StorageReadFailed(err) => write!(f, "read storage failed: {}", err),
            Error::StreamSendFailed => write!(f, "send piece seed failed"),
            Error::RemoteFail(status) => write!(f, "seed task failed: {}", status),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::StartSeedTaskFailed(err) | Error::StorageReadFailed(err) => {
                Some(err.as_ref())
            }
            Error::RemoteFail(status) => Some(status),
            _ => None,
        }
    }
}
