/// 单元测试的全局注册
#[cfg(test)]
mod test_global_register;

pub mod core;
pub mod metrics;
pub mod protocol;
pub mod resource;
pub mod scheduler;
pub mod seeder;
pub mod util;

pub use crate::core::bootstrap::Bootstrap;
pub use crate::core::config::Config;
pub use crate::resource::{Host, HostType, Peer, PeerEvent, PeerState, Resource, Task};
pub use crate::scheduler::SchedulerService;
pub use crate::seeder::{PieceStorage, SeedTaskManager, SeederService};
