use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub struct Config {
    inner: Arc<ConfigInner>,
}

struct ConfigInner {
    channel_buffer: usize,
    listen_addr: SocketAddr,
    seed_peer_enabled: bool,
    peer_gc_interval: Duration,
    peer_ttl: Duration,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ConfigInner {
                channel_buffer: 100,
                listen_addr: "127.0.0.1:8002".parse().unwrap(),
                seed_peer_enabled: true,
                peer_gc_interval: Duration::from_secs(60),
                peer_ttl: Duration::from_secs(24 * 60 * 60),
            }),
        }
    }

    pub fn set_channel_buffer(mut self, channel_buffer: usize) -> Self {
        assert!(channel_buffer > 0, "channel buffer must be greater than 0");
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.channel_buffer = channel_buffer;
        }
        self
    }

    pub fn set_listen_addr(mut self, listen_addr: SocketAddr) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.listen_addr = listen_addr;
        }
        self
    }

    pub fn set_seed_peer_enabled(mut self, seed_peer_enabled: bool) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.seed_peer_enabled = seed_peer_enabled;
        }
        self
    }

    pub fn set_peer_gc_interval(mut self, peer_gc_interval: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.peer_gc_interval = peer_gc_interval;
        }
        self
    }

    pub fn set_peer_ttl(mut self, peer_ttl: Duration) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.peer_ttl = peer_ttl;
        }
        self
    }

    pub fn channel_buffer(&self) -> usize {
        self.inner.channel_buffer
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.inner.listen_addr
    }

    pub fn seed_peer_enabled(&self) -> bool {
        self.inner.seed_peer_enabled
    }

    pub fn peer_gc_interval(&self) -> Duration {
        self.inner.peer_gc_interval
    }

    pub fn peer_ttl(&self) -> Duration {
        self.inner.peer_ttl
    }
}
