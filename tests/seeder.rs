//! 种子流的端到端验证。
//!
//! 任务管理器和分块存储都用内存实现打桩，驱动信号后观察流上
//! 吐出来的记录序列。

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonbo::protocol::{
    Code, ExtendAttribute, PeerHost, PieceInfo, PiecePacket, PieceSeed, PieceTaskRequest,
    SeedRequest, Status, BEGIN_OF_PIECE,
};
use tonbo::seeder::error::Error;
use tonbo::seeder::{
    FailReason, PieceStorage, PieceUpdate, SeedTaskManager, SeedTaskRequest, SeedTaskResponse,
    SeederService,
};

const TASK_ID: &str = "task-seed-0001";

/// 内存分块存储
struct MemoryStorage {
    pieces: Vec<PieceInfo>,
    content_length: i64,
    attribute: Option<ExtendAttribute>,
}

impl MemoryStorage {
    fn new(piece_count: u32, piece_size: u32) -> Self {
        let pieces = (0..piece_count)
            .map(|num| PieceInfo {
                piece_num: num as i32,
                range_start: (num * piece_size) as u64,
                range_size: piece_size,
                piece_md5: format!("md5-{num}"),
                piece_offset: (num * piece_size) as u64,
                ..Default::default()
            })
            .collect();

        let mut header = std::collections::HashMap::new();
        header.insert("content-type".to_string(), "application/octet-stream".to_string());
        Self {
            pieces,
            content_length: (piece_count * piece_size) as i64,
            attribute: Some(ExtendAttribute { header }),
        }
    }
}

#[async_trait]
impl PieceStorage for MemoryStorage {
    async fn get_pieces(&self, request: &PieceTaskRequest) -> anyhow::Result<PiecePacket> {
        let piece_infos: Vec<PieceInfo> = self
            .pieces
            .iter()
            .skip(request.start_num as usize)
            .take(request.limit as usize)
            .cloned()
            .collect();

        Ok(PiecePacket {
            task_id: request.task_id.clone(),
            piece_infos,
            content_length: self.content_length,
            total_piece: self.pieces.len() as i32,
            extend_attribute: None,
        })
    }

    async fn get_extend_attribute(&self) -> anyhow::Result<Option<ExtendAttribute>> {
        Ok(self.attribute.clone())
    }
}

type ResponseChannels = (
    mpsc::Receiver<()>,
    mpsc::Receiver<()>,
    mpsc::Receiver<PieceUpdate>,
);

/// 测试用的种子任务管理器，信号通道由测试侧驱动
struct MockSeedTaskManager {
    storage: Option<Arc<dyn PieceStorage>>,
    channels: Mutex<Option<ResponseChannels>>,
    fail_status: Option<Status>,
}

struct SeedDriver {
    success: mpsc::Sender<()>,
    fail: mpsc::Sender<()>,
    piece_info: mpsc::Sender<PieceUpdate>,
}

impl MockSeedTaskManager {
    fn new(
        storage: Option<Arc<dyn PieceStorage>>,
        fail_status: Option<Status>,
    ) -> (Arc<Self>, SeedDriver) {
        let (success_tx, success_rx) = mpsc::channel(1);
        let (fail_tx, fail_rx) = mpsc::channel(1);
        let (piece_tx, piece_rx) = mpsc::channel(16);

        let manager = Arc::new(Self {
            storage,
            channels: Mutex::new(Some((success_rx, fail_rx, piece_rx))),
            fail_status,
        });
        let driver = SeedDriver {
            success: success_tx,
            fail: fail_tx,
            piece_info: piece_tx,
        };
        (manager, driver)
    }
}

#[async_trait]
impl SeedTaskManager for MockSeedTaskManager {
    async fn start_seed_task(
        &self,
        request: &SeedTaskRequest,
    ) -> anyhow::Result<(SeedTaskResponse, bool)> {
        let (success, fail, piece_info) = self
            .channels
            .lock()
            .unwrap()
            .take()
            .expect("start_seed_task 只会被调用一次");

        let fail_status = self.fail_status.clone();
        let fail_reason: FailReason = Box::new(move || match &fail_status {
            Some(status) => anyhow::Error::new(status.clone()),
            None => anyhow::anyhow!("origin unreachable"),
        });

        Ok((
            SeedTaskResponse {
                task_id: TASK_ID.to_string(),
                peer_id: request.peer_id.clone(),
                success,
                fail,
                piece_info,
                fail_reason,
                storage: self.storage.clone(),
                span: tracing::info_span!("seed_task", success = tracing::field::Empty),
            },
            false,
        ))
    }

    fn load_storage(&self, task_id: &str) -> Option<Arc<dyn PieceStorage>> {
        if task_id == TASK_ID {
            self.storage.clone()
        } else {
            None
        }
    }
}

fn make_service(manager: Arc<MockSeedTaskManager>) -> SeederService {
    SeederService::new(
        manager,
        PeerHost {
            id: "seed-host".to_string(),
            ip: "127.0.0.1".to_string(),
            hostname: "seed-host".to_string(),
            port: 8002,
            download_port: 8001,
        },
    )
}

fn seed_request() -> SeedRequest {
    SeedRequest {
        task_id: TASK_ID.to_string(),
        url: "http://example.com/data".to_string(),
        ..Default::default()
    }
}

async fn drain(mut rx: mpsc::Receiver<PieceSeed>) -> Vec<PieceSeed> {
    let mut records = Vec::new();
    while let Some(record) = rx.recv().await {
        records.push(record);
    }
    records
}

/// 流级别的不变量：首条是问候记录，分块号严格递增，
/// 恰好一条 done，恰好一条记录携带扩展属性
fn assert_stream_invariants(records: &[PieceSeed]) {
    let hello = &records[0];
    assert_eq!(hello.piece_info.as_ref().unwrap().piece_num, BEGIN_OF_PIECE);
    assert!(!hello.done);

    let nums: Vec<i32> = records[1..]
        .iter()
        .filter_map(|r| r.piece_info.as_ref())
        .map(|p| p.piece_num)
        .collect();
    assert!(nums.windows(2).all(|w| w[0] < w[1]), "分块号必须严格递增: {nums:?}");

    assert_eq!(records.iter().filter(|r| r.done).count(), 1);
    assert!(records.last().unwrap().done);
    assert_eq!(
        records.iter().filter(|r| r.extend_attribute.is_some()).count(),
        1
    );
}

/// 3 个分块按序就绪后任务完成：hello + 0 + 1 + 2(done)
#[tokio::test]
async fn test_obtain_seeds_ordered_pieces() {
    let storage = Arc::new(MemoryStorage::new(3, 1024));
    let (manager, driver) = MockSeedTaskManager::new(Some(storage), None);
    let service = make_service(manager);

    for num in 0..3 {
        driver
            .piece_info
            .send(PieceUpdate {
                num,
                ordered_num: num,
                finished: num == 2,
            })
            .await
            .unwrap();
    }

    let (tx, rx) = mpsc::channel(16);
    service
        .obtain_seeds(seed_request(), tx, CancellationToken::new())
        .await
        .unwrap();

    let records = drain(rx).await;
    assert_eq!(records.len(), 4);
    assert_stream_invariants(&records);
    assert_eq!(records[1].piece_info.as_ref().unwrap().piece_num, 0);
    assert_eq!(records[3].piece_info.as_ref().unwrap().piece_num, 2);
    assert!(records[3].done);
    assert_eq!(records[1].total_piece_count, 3);
    assert_eq!(records[1].content_length, 3 * 1024);
}

/// 任务先完成，剩余分块走补发路径
#[tokio::test]
async fn test_obtain_seeds_reminding_after_success() {
    let storage = Arc::new(MemoryStorage::new(20, 1024));
    let (manager, driver) = MockSeedTaskManager::new(Some(storage), None);
    let service = make_service(manager);

    // 前两个分块走有序路径，其余靠补发
    driver
        .piece_info
        .send(PieceUpdate {
            num: 1,
            ordered_num: 1,
            finished: false,
        })
        .await
        .unwrap();
    driver.success.send(()).await.unwrap();

    let (tx, rx) = mpsc::channel(32);
    service
        .obtain_seeds(seed_request(), tx, CancellationToken::new())
        .await
        .unwrap();

    let records = drain(rx).await;
    // hello + 20 个分块
    assert_eq!(records.len(), 21);
    assert_stream_invariants(&records);
}

/// 空任务也要给调度器一条 done 记录
#[tokio::test]
async fn test_obtain_seeds_empty_task() {
    let storage = Arc::new(MemoryStorage::new(0, 0));
    let (manager, driver) = MockSeedTaskManager::new(Some(storage), None);
    let service = make_service(manager);

    driver.success.send(()).await.unwrap();

    let (tx, rx) = mpsc::channel(16);
    service
        .obtain_seeds(seed_request(), tx, CancellationToken::new())
        .await
        .unwrap();

    let records = drain(rx).await;
    assert_eq!(records.len(), 2);
    let done = &records[1];
    assert!(done.done);
    assert!(done.piece_info.is_none());
}

/// 失败信号携带的结构化状态要原样透传
#[tokio::test]
async fn test_obtain_seeds_fail_with_structured_status() {
    let storage = Arc::new(MemoryStorage::new(3, 1024));
    let (manager, driver) =
        MockSeedTaskManager::new(Some(storage), Some(Status::unavailable("origin down")));
    let service = make_service(manager);

    driver.fail.send(()).await.unwrap();

    let (tx, _rx) = mpsc::channel(16);
    let err = service
        .obtain_seeds(seed_request(), tx, CancellationToken::new())
        .await
        .unwrap_err();

    let status = err.to_status();
    assert_eq!(status.code, Code::Unavailable);
    assert_eq!(status.message, "origin down");
}

/// 非结构化的失败原因包装成 internal
#[tokio::test]
async fn test_obtain_seeds_fail_with_opaque_reason() {
    let storage = Arc::new(MemoryStorage::new(3, 1024));
    let (manager, driver) = MockSeedTaskManager::new(Some(storage), None);
    let service = make_service(manager);

    driver.fail.send(()).await.unwrap();

    let (tx, _rx) = mpsc::channel(16);
    let err = service
        .obtain_seeds(seed_request(), tx, CancellationToken::new())
        .await
        .unwrap_err();

    let status = err.to_status();
    assert_eq!(status.code, Code::Internal);
    assert!(status.message.contains("origin unreachable"));
}

/// 取消令牌触发后流以 Canceled 收尾
#[tokio::test]
async fn test_obtain_seeds_canceled() {
    let storage = Arc::new(MemoryStorage::new(3, 1024));
    let (manager, _driver) = MockSeedTaskManager::new(Some(storage), None);
    let service = make_service(manager);

    let cancel_token = CancellationToken::new();
    cancel_token.cancel();

    let (tx, _rx) = mpsc::channel(16);
    let err = service
        .obtain_seeds(seed_request(), tx, cancel_token)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Canceled));
    assert_eq!(err.to_status().code, Code::Canceled);
}

/// 订阅结果缺存储算协议错误
#[tokio::test]
async fn test_obtain_seeds_missing_storage() {
    let (manager, _driver) = MockSeedTaskManager::new(None, None);
    let service = make_service(manager);

    let (tx, _rx) = mpsc::channel(16);
    let err = service
        .obtain_seeds(seed_request(), tx, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadSubscribeResponse(_)));
}

/// range 参数非法直接拒绝
#[tokio::test]
async fn test_obtain_seeds_invalid_range() {
    let storage = Arc::new(MemoryStorage::new(3, 1024));
    let (manager, _driver) = MockSeedTaskManager::new(Some(storage), None);
    let service = make_service(manager);

    let mut request = seed_request();
    request.url_meta.range = "abc".to_string();

    let (tx, _rx) = mpsc::channel(16);
    let err = service
        .obtain_seeds(request, tx, CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_status().code, Code::InvalidArgument);
}

/// 一次性的分块元信息查询
#[tokio::test]
async fn test_get_piece_tasks() {
    let storage = Arc::new(MemoryStorage::new(5, 1024));
    let (manager, _driver) = MockSeedTaskManager::new(Some(storage), None);
    let service = make_service(manager);

    let packet = service
        .get_piece_tasks(PieceTaskRequest {
            task_id: TASK_ID.to_string(),
            start_num: 2,
            limit: 2,
        })
        .await
        .unwrap();
    assert_eq!(packet.total_piece, 5);
    assert_eq!(packet.piece_infos.len(), 2);
    assert_eq!(packet.piece_infos[0].piece_num, 2);

    let err = service
        .get_piece_tasks(PieceTaskRequest {
            task_id: "unknown".to_string(),
            start_num: 0,
            limit: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TaskNotFound(_)));
}

/// 双向流变体：请求多少答多少，客户端收工即结束
#[tokio::test]
async fn test_sync_piece_tasks() {
    let storage = Arc::new(MemoryStorage::new(4, 1024));
    let (manager, _driver) = MockSeedTaskManager::new(Some(storage), None);
    let service = make_service(manager);

    let (request_tx, request_rx) = mpsc::channel(4);
    let (packet_tx, mut packet_rx) = mpsc::channel(4);

    for start_num in [0u32, 2] {
        request_tx
            .send(PieceTaskRequest {
                task_id: TASK_ID.to_string(),
                start_num,
                limit: 2,
            })
            .await
            .unwrap();
    }
    drop(request_tx);

    service
        .sync_piece_tasks(request_rx, packet_tx, CancellationToken::new())
        .await
        .unwrap();

    let first = packet_rx.recv().await.unwrap();
    let second = packet_rx.recv().await.unwrap();
    assert_eq!(first.piece_infos[0].piece_num, 0);
    assert_eq!(second.piece_infos[0].piece_num, 2);
    assert!(packet_rx.recv().await.is_none());
}
