use crate::default_logger;
use tracing::Level;

// 整个 crate 的单元测试共用这一次注册，各测试模块里不要再调 default_logger。
// DEBUG 级别足够定位用例失败，TRACE 会被状态机和 gc 的日志刷屏。
default_logger!(Level::DEBUG);
