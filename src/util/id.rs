//! 标识生成。

use crate::protocol::UrlMeta;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// 种子 peer id 的固定后缀
const SEED_PEER_SUFFIX: &str = "_Seed";

/// 由 URL + 元信息推导任务 id。
///
/// filter 字段列出的查询参数不参与哈希，保证带易变参数
/// （签名、时间戳等）的同一资源算出同一个任务 id。
pub fn task_id(url: &str, url_meta: &UrlMeta) -> String {
    let filters: Vec<&str> = url_meta
        .filter
        .split(',')
        .filter(|f| !f.is_empty())
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(filter_query(url, &filters));
    if !url_meta.digest.is_empty() {
        hasher.update(&url_meta.digest);
    }
    if !url_meta.tag.is_empty() {
        hasher.update(&url_meta.tag);
    }
    if !url_meta.range.is_empty() {
        hasher.update(&url_meta.range);
    }

    hex::encode(hasher.finalize())
}

/// 生成种子 peer 的 id
pub fn seed_peer_id(ip: &str) -> String {
    format!(
        "{}-{}-{:08x}{}",
        ip,
        std::process::id(),
        rand::rng().next_u32(),
        SEED_PEER_SUFFIX
    )
}

/// 去掉 URL 查询串中被过滤的参数
fn filter_query(url: &str, filters: &[&str]) -> String {
    if filters.is_empty() {
        return url.to_string();
    }

    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or(pair);
            !filters.contains(&key)
        })
        .collect();

    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, kept.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_stable() {
        let meta = UrlMeta::default();
        let a = task_id("http://example.com/data", &meta);
        let b = task_id("http://example.com/data", &meta);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_task_id_filter_strips_volatile_params() {
        let meta = UrlMeta {
            filter: "sign,ts".to_string(),
            ..Default::default()
        };
        let a = task_id("http://example.com/data?sign=aaa&ts=1", &meta);
        let b = task_id("http://example.com/data?sign=bbb&ts=2", &meta);
        assert_eq!(a, b);

        let c = task_id("http://example.com/data?other=1&sign=aaa", &meta);
        let d = task_id("http://example.com/data?other=2&sign=aaa", &meta);
        assert_ne!(c, d);
    }

    #[test]
    fn test_task_id_meta_changes_id() {
        let plain = UrlMeta::default();
        let ranged = UrlMeta {
            range: "0-1023".to_string(),
            ..Default::default()
        };
        assert_ne!(
            task_id("http://example.com/data", &plain),
            task_id("http://example.com/data", &ranged)
        );
    }

    #[test]
    fn test_seed_peer_id() {
        let id = seed_peer_id("192.168.1.1");
        assert!(id.starts_with("192.168.1.1-"));
        assert!(id.ends_with("_Seed"));
    }
}
