//! Redis 解析器：定时列举并对比

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{error, info};

use super::RedisRegistry;
use crate::error::Result;
use crate::naming::address::{Address, AddressSet, addr_from_key};
use crate::naming::resolver::{
    BuildOptions, ClientConn, Resolver, ResolverBuilder, Target, WatchResolver,
};
use crate::naming::{MAX_TTL_SECS, PREFIX, ShutdownSignal, TaskHandle, push_state, service_prefix};

/// 轮询间隔下限
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[async_trait]
impl ResolverBuilder for RedisRegistry {
    async fn build(
        &self,
        target: Target,
        cc: Arc<dyn ClientConn>,
        opts: BuildOptions,
    ) -> Result<Box<dyn Resolver>> {
        let prefix = service_prefix(&target.scheme, &target.endpoint);
        let interval = opts
            .poll_interval
            .unwrap_or(self.poll_interval)
            .clamp(MIN_POLL_INTERVAL, Duration::from_secs(MAX_TTL_SECS));
        info!(
            scheme = %target.scheme,
            endpoint = %target.endpoint,
            redis = %self.addr,
            interval = ?interval,
            "building redis resolver"
        );

        let mut conn = self.conn.clone();
        let mut set = AddressSet::new();
        // 初次列举失败仍然推送空集合，不阻塞拨号
        match list(&mut conn, &prefix).await {
            Ok(addrs) => {
                set.reconcile(addrs);
            }
            Err(e) => error!(prefix = %prefix, error = %e, "cannot get address list"),
        }
        push_state(cc.as_ref(), &set, &prefix).await;

        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let poll = Poll {
            conn,
            prefix: prefix.clone(),
            set,
            cc,
            refresh_rx,
        };
        let task = TaskHandle::spawn(format!("redis-poll:{prefix}"), move |shutdown| {
            poll.run(interval, shutdown)
        });

        Ok(Box::new(WatchResolver::new(prefix, task, refresh_tx)))
    }

    fn scheme(&self) -> &str {
        PREFIX
    }
}

/// 转义 glob 特殊字符，使前缀在 KEYS 模式中按字面匹配
pub fn escape_pattern(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

async fn list(conn: &mut ConnectionManager, prefix: &str) -> Result<Vec<Address>> {
    let pattern = format!("{}*", escape_pattern(prefix));
    let keys: Vec<String> = conn.keys(pattern).await?;
    Ok(keys
        .iter()
        .filter_map(|key| addr_from_key(key, prefix))
        .map(Address::from)
        .collect())
}

/// 轮询任务状态
struct Poll {
    conn: ConnectionManager,
    prefix: String,
    set: AddressSet,
    cc: Arc<dyn ClientConn>,
    refresh_rx: mpsc::Receiver<()>,
}

impl Poll {
    async fn run(mut self, interval: Duration, mut shutdown: ShutdownSignal) {
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let stopped = tokio::select! {
                _ = shutdown.recv() => true,
                _ = ticker.tick() => shutdown.guard(self.resync()).await.is_none(),
                Some(()) = self.refresh_rx.recv() => shutdown.guard(self.resync()).await.is_none(),
            };
            if stopped {
                info!(prefix = %self.prefix, "poll task stopped");
                return;
            }
        }
    }

    /// 重新列举，只在集合发生变化时推送
    async fn resync(&mut self) {
        match list(&mut self.conn, &self.prefix).await {
            Ok(addrs) => {
                if self.set.reconcile(addrs) {
                    push_state(self.cc.as_ref(), &self.set, &self.prefix).await;
                }
            }
            Err(e) => error!(prefix = %self.prefix, error = %e, "cannot get address list"),
        }
    }
}
