use crate::resource::peer::{PeerEvent, PeerState};

pub type Result<T> = std::result::Result<T, Error>;

/// 错误类型
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// 当前状态下不允许该事件
    InvalidTransition(PeerEvent, PeerState),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::InvalidTransition(event, state) => {
                write!(f, "event {:?} inappropriate in current state {:?}", event, state)
            }
        }
    }
}

impl std::error::Error for Error {}
