//! 日志注册。

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// 注册控制台日志。重复注册时静默忽略，单元测试里到处调用也没关系。
pub fn register_console_logger(level: Level) {
    let console = fmt::layer()
        .with_line_number(true)
        .with_thread_names(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr.with_max_level(level));

    let _ = tracing_subscriber::registry().with(console).try_init();
}

/// 注册文件 + 控制台日志，文件按天滚动。
///
/// 返回的 `WorkerGuard` 要持有到进程退出，否则异步写入线程会提前
/// 结束导致日志丢失。
pub fn register_logger(
    dir: &str,
    file_prefix: &str,
    level: Level,
) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(dir)?;

    let appender = tracing_appender::rolling::daily(dir, format!("{file_prefix}.log"));
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let out_file = fmt::layer()
        .with_line_number(true)
        .with_thread_names(true)
        .with_thread_ids(true)
        .with_ansi(false)
        .with_writer(non_blocking.with_max_level(level));

    let console = fmt::layer()
        .with_line_number(true)
        .with_thread_names(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr.with_max_level(level));

    tracing_subscriber::registry()
        .with(out_file)
        .with(console)
        .init();

    Ok(guard)
}

/// 在 main 或测试入口注册默认的控制台 logger
#[macro_export]
macro_rules! default_logger {
    ($level:expr) => {
        #[ctor::ctor]
        fn __default_logger() {
            $crate::util::log::register_console_logger($level);
        }
    };
}
