//! Redis 服务注册与续期

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use super::RedisRegistry;
use crate::error::Result;
use crate::naming::{Registrar, ShutdownSignal, TaskHandle, service_key, validate_registration};

/// 刷新注册：key 存在则把过期时间延长到 2 × TTL，不存在则重新写入
async fn touch(conn: &mut ConnectionManager, key: &str, addr: &str, ttl: u64) -> Result<()> {
    let expiry = ttl.saturating_mul(2);
    let exists: bool = conn.exists(key).await?;
    if exists {
        let seconds = i64::try_from(expiry).unwrap_or(i64::MAX);
        let extended: bool = conn.expire(key, seconds).await?;
        if extended {
            return Ok(());
        }
        // EXISTS 与 EXPIRE 之间 key 刚好过期
        debug!(key = %key, "registration expired while extending, writing again");
    }
    let _: () = conn.set_ex(key, addr, expiry).await?;
    Ok(())
}

#[async_trait]
impl Registrar for RedisRegistry {
    /// 写入服务地址并启动续期任务
    ///
    /// 首次写入失败只记录日志，续期任务会在下一个周期重新写入
    async fn register(&self, addr: &str, ttl: u64) -> Result<()> {
        validate_registration(addr, ttl)?;
        let key = service_key(&self.service_name, addr);
        info!(key = %key, redis = %self.addr, "register service with registry");

        let mut conn = self.conn.clone();
        match touch(&mut conn, &key, addr, ttl).await {
            Ok(()) => info!(key = %key, ttl, "service registered"),
            Err(e) => error!(key = %key, error = %e, "failed to register service, will retry"),
        }

        let key_owned = key.clone();
        let addr_owned = addr.to_string();
        let handle = TaskHandle::spawn(format!("redis-renew:{key}"), move |shutdown| {
            renew(conn, key_owned, addr_owned, ttl, shutdown)
        });
        self.registrations.insert(addr, handle).await;
        Ok(())
    }

    /// 停止续期任务，然后同步删除 key
    async fn unregister(&self, addr: &str) -> Result<()> {
        let key = service_key(&self.service_name, addr);
        match self.registrations.take(addr).await {
            Some(task) => task.shutdown().await,
            None => warn!(key = %key, "address was not registered by this registry"),
        }

        let mut conn = self.conn.clone();
        let _: () = conn.del(&key).await?;
        info!(key = %key, "service unregistered");
        Ok(())
    }
}

async fn renew(
    mut conn: ConnectionManager,
    key: String,
    addr: String,
    ttl: u64,
    mut shutdown: ShutdownSignal,
) {
    let period = Duration::from_secs(ttl);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => match shutdown.guard(touch(&mut conn, &key, &addr, ttl)).await {
                Some(Ok(())) => debug!(key = %key, "registration refreshed"),
                Some(Err(e)) => error!(key = %key, error = %e, "failed to refresh registration"),
                None => break,
            },
        }
    }
    info!(key = %key, "renewal task stopped");
}
