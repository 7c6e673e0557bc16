//! 进程级指标。
//!
//! 外层的指标采集器直接读这里的快照，核心代码只做累加。

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::warn;

static REGISTER_PEER_TASK_COUNT: AtomicU64 = AtomicU64::new(0);
static REGISTER_PEER_TASK_FAILURE_COUNT: AtomicU64 = AtomicU64::new(0);
static PEER_TASK_COUNT: AtomicU64 = AtomicU64::new(0);
static CONCURRENT_SCHEDULE_GAUGE: AtomicI64 = AtomicI64::new(0);
static STAT_TASK_COUNT: AtomicU64 = AtomicU64::new(0);
static STAT_TASK_FAILURE_COUNT: AtomicU64 = AtomicU64::new(0);
static ANNOUNCE_TASK_COUNT: AtomicU64 = AtomicU64::new(0);
static ANNOUNCE_TASK_FAILURE_COUNT: AtomicU64 = AtomicU64::new(0);
static SEED_PEER_DOWNLOAD_COUNT: AtomicU64 = AtomicU64::new(0);
static SEED_PEER_DOWNLOAD_FAILURE_COUNT: AtomicU64 = AtomicU64::new(0);
static SEED_PEER_CONCURRENT_DOWNLOAD_GAUGE: AtomicI64 = AtomicI64::new(0);
static SEED_PEER_DOWNLOAD_TRAFFIC_BACK_TO_SOURCE: AtomicU64 = AtomicU64::new(0);
static SEED_PEER_DOWNLOAD_TRAFFIC_P2P: AtomicU64 = AtomicU64::new(0);

pub fn inc_register_peer_task_count() {
    REGISTER_PEER_TASK_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_register_peer_task_failure_count() {
    REGISTER_PEER_TASK_FAILURE_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_peer_task_count() {
    PEER_TASK_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_concurrent_schedule_gauge() {
    CONCURRENT_SCHEDULE_GAUGE.fetch_add(1, Ordering::Relaxed);
}

pub fn dec_concurrent_schedule_gauge() {
    CONCURRENT_SCHEDULE_GAUGE.fetch_sub(1, Ordering::Relaxed);
}

pub fn inc_stat_task_count() {
    STAT_TASK_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_stat_task_failure_count() {
    STAT_TASK_FAILURE_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_announce_task_count() {
    ANNOUNCE_TASK_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_announce_task_failure_count() {
    ANNOUNCE_TASK_FAILURE_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_seed_peer_download_count() {
    SEED_PEER_DOWNLOAD_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_seed_peer_download_failure_count() {
    SEED_PEER_DOWNLOAD_FAILURE_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn inc_seed_peer_concurrent_download_gauge() {
    SEED_PEER_CONCURRENT_DOWNLOAD_GAUGE.fetch_add(1, Ordering::Relaxed);
}

pub fn dec_seed_peer_concurrent_download_gauge() {
    SEED_PEER_CONCURRENT_DOWNLOAD_GAUGE.fetch_sub(1, Ordering::Relaxed);
}

/// 累加种子流量，按是否复用已有任务分开记
pub fn add_seed_peer_download_traffic(reuse: bool, content_length: i64) {
    if content_length < 0 {
        warn!("种子任务内容长度未知，跳过流量统计");
        return;
    }

    let counter = if reuse {
        &SEED_PEER_DOWNLOAD_TRAFFIC_P2P
    } else {
        &SEED_PEER_DOWNLOAD_TRAFFIC_BACK_TO_SOURCE
    };
    counter.fetch_add(content_length as u64, Ordering::Relaxed);
}

/// 当前所有计数器的快照
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub register_peer_task_count: u64,
    pub register_peer_task_failure_count: u64,
    pub peer_task_count: u64,
    pub concurrent_schedule_gauge: i64,
    pub stat_task_count: u64,
    pub stat_task_failure_count: u64,
    pub announce_task_count: u64,
    pub announce_task_failure_count: u64,
    pub seed_peer_download_count: u64,
    pub seed_peer_download_failure_count: u64,
    pub seed_peer_concurrent_download_gauge: i64,
    pub seed_peer_download_traffic_back_to_source: u64,
    pub seed_peer_download_traffic_p2p: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        register_peer_task_count: REGISTER_PEER_TASK_COUNT.load(Ordering::Relaxed),
        register_peer_task_failure_count: REGISTER_PEER_TASK_FAILURE_COUNT.load(Ordering::Relaxed),
        peer_task_count: PEER_TASK_COUNT.load(Ordering::Relaxed),
        concurrent_schedule_gauge: CONCURRENT_SCHEDULE_GAUGE.load(Ordering::Relaxed),
        stat_task_count: STAT_TASK_COUNT.load(Ordering::Relaxed),
        stat_task_failure_count: STAT_TASK_FAILURE_COUNT.load(Ordering::Relaxed),
        announce_task_count: ANNOUNCE_TASK_COUNT.load(Ordering::Relaxed),
        announce_task_failure_count: ANNOUNCE_TASK_FAILURE_COUNT.load(Ordering::Relaxed),
        seed_peer_download_count: SEED_PEER_DOWNLOAD_COUNT.load(Ordering::Relaxed),
        seed_peer_download_failure_count: SEED_PEER_DOWNLOAD_FAILURE_COUNT.load(Ordering::Relaxed),
        seed_peer_concurrent_download_gauge: SEED_PEER_CONCURRENT_DOWNLOAD_GAUGE
            .load(Ordering::Relaxed),
        seed_peer_download_traffic_back_to_source: SEED_PEER_DOWNLOAD_TRAFFIC_BACK_TO_SOURCE
            .load(Ordering::Relaxed),
        seed_peer_download_traffic_p2p: SEED_PEER_DOWNLOAD_TRAFFIC_P2P.load(Ordering::Relaxed),
    }
}
