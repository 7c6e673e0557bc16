//! 进程装配。

use crate::core::config::Config;
use crate::resource::{PeerGc, Resource};
use crate::scheduler::SchedulerService;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

/// 由 Bootstrap 托管的后台服务。
/// 实现方拿着取消令牌自己收尾，run 返回即视为退出完成。
pub trait Service {
    /// 服务名，启动与关闭日志用
    fn name(&self) -> &'static str;

    /// 一直运行到收到取消信号
    fn run(self) -> impl Future<Output = ()> + Send;
}

pub struct Bootstrap {
    config: Config,
    cancel_token: CancellationToken,
    resource: Arc<Resource>,
    scheduler: Arc<SchedulerService>,
}

impl Bootstrap {
    pub fn new(config: Config) -> Self {
        let resource = Resource::new();
        let scheduler = Arc::new(SchedulerService::new(resource.clone(), config.clone()));
        Self {
            config,
            cancel_token: CancellationToken::new(),
            resource,
            scheduler,
        }
    }

    /// 调度服务句柄，传输层适配时从这里拿
    pub fn scheduler(&self) -> Arc<SchedulerService> {
        self.scheduler.clone()
    }

    pub fn resource(&self) -> Arc<Resource> {
        self.resource.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 运行到收到退出信号
    pub async fn run(self) {
        info!("tonbo 启动中, 监听地址 {}", self.config.listen_addr());

        let gc = PeerGc::new(
            self.resource.clone(),
            self.cancel_token.clone(),
            self.config.clone(),
        );
        trace!("启动 {}", gc.name());
        let gc_handle = tokio::spawn(gc.run());

        tokio::signal::ctrl_c().await.ok();
        info!("收到退出信号，等待资源关闭中...");
        self.cancel_token.cancel();
        gc_handle.await.unwrap();

        info!("资源已安全关闭，程序退出");
    }
}
