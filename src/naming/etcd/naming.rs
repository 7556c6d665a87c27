//! etcd 服务注册与续期

use async_trait::async_trait;
use etcd_client::{Client, LeaseKeepAliveStream, LeaseKeeper, PutOptions};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use super::EtcdRegistry;
use crate::error::{NamingError, Result};
use crate::naming::{Registrar, ShutdownSignal, TaskHandle, service_key, validate_registration};

/// 停止续期时撤销租约的最长等待时间
const RELEASE_TIMEOUT: Duration = Duration::from_secs(3);

/// 一个已经写入 key 的租约及其 keep-alive 通道
struct Lease {
    id: i64,
    keeper: LeaseKeeper,
    stream: LeaseKeepAliveStream,
}

impl Lease {
    /// 申请租约，写入 `key -> addr` 并打开 keep-alive 通道
    async fn claim(client: &mut Client, key: &str, addr: &str, ttl: u64) -> Result<Self> {
        let ttl = i64::try_from(ttl).unwrap_or(i64::MAX);
        let grant = client.lease_grant(ttl, None).await?;
        let id = grant.id();
        client
            .put(key, addr, Some(PutOptions::new().with_lease(id)))
            .await?;
        Self::open(client, id).await
    }

    /// 为已有租约重新打开 keep-alive 通道
    async fn open(client: &mut Client, id: i64) -> Result<Self> {
        let (keeper, stream) = client.lease_keep_alive(id).await?;
        Ok(Self { id, keeper, stream })
    }

    /// 发送一次 keep-alive 并等待应答
    async fn keep_alive(&mut self) -> Result<()> {
        self.keeper.keep_alive().await?;
        match self.stream.message().await? {
            Some(resp) if resp.ttl() > 0 => Ok(()),
            Some(_) => Err(NamingError::LeaseExpired(self.id)),
            None => Err(NamingError::WatchClosed(format!(
                "keep-alive stream for lease {} closed",
                self.id
            ))),
        }
    }
}

#[async_trait]
impl Registrar for EtcdRegistry {
    /// 写入服务地址并启动续期任务
    ///
    /// 首次写入失败只记录日志，续期任务会在下一个周期重新写入
    async fn register(&self, addr: &str, ttl: u64) -> Result<()> {
        validate_registration(addr, ttl)?;
        let key = service_key(&self.service_name, addr);
        info!(key = %key, etcd = %self.endpoints, "register service with registry");

        let mut client = self.client.clone();
        let lease = match Lease::claim(&mut client, &key, addr, ttl).await {
            Ok(lease) => {
                info!(key = %key, lease_id = lease.id, ttl, "service registered");
                Some(lease)
            }
            Err(e) => {
                error!(key = %key, error = %e, "failed to register service, will retry");
                None
            }
        };

        let renewal = Renewal {
            client,
            key: key.clone(),
            addr: addr.to_string(),
            ttl,
            lease,
        };
        let handle = TaskHandle::spawn(format!("etcd-renew:{key}"), move |shutdown| {
            renewal.run(shutdown)
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

        let mut client = self.client.clone();
        client.delete(key.as_str(), None).await?;
        info!(key = %key, "service unregistered");
        Ok(())
    }
}

/// 续期任务状态
struct Renewal {
    client: Client,
    key: String,
    addr: String,
    ttl: u64,
    lease: Option<Lease>,
}

impl Renewal {
    async fn run(mut self, mut shutdown: ShutdownSignal) {
        let period = Duration::from_secs(self.ttl);
        let mut recheck = interval_at(Instant::now() + period, period);
        recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // keep-alive 至少在 TTL 内发送三次
        let keep_alive_period = Duration::from_secs((self.ttl / 3).max(1));
        let mut keep_alive = interval_at(Instant::now() + keep_alive_period, keep_alive_period);
        keep_alive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // 正在进行的存储请求也会被关闭信号打断
            let stopped = tokio::select! {
                _ = shutdown.recv() => true,
                _ = recheck.tick() => shutdown.guard(self.recheck()).await.is_none(),
                _ = keep_alive.tick(), if self.lease.is_some() => {
                    shutdown.guard(self.keep_alive()).await.is_none()
                }
            };
            if stopped {
                self.release().await;
                info!(key = %self.key, "renewal task stopped");
                return;
            }
        }
    }

    /// 回读 key，不存在时重新申请租约并写入
    async fn recheck(&mut self) {
        match self.client.get(self.key.as_str(), None).await {
            Ok(resp) if resp.kvs().is_empty() => {
                warn!(key = %self.key, "registration missing from etcd, registering again");
                self.reclaim().await;
            }
            Ok(_) => debug!(key = %self.key, "registration present"),
            Err(e) => error!(key = %self.key, error = %e, "failed to read back registration"),
        }
    }

    async fn keep_alive(&mut self) {
        let result = match self.lease.as_mut() {
            Some(lease) => lease.keep_alive().await,
            None => return,
        };
        let Err(e) = result else {
            return;
        };

        warn!(key = %self.key, error = %e, "lease keep-alive failed");
        let Some(old) = self.lease.take() else {
            return;
        };
        match e {
            NamingError::LeaseExpired(_) => self.reclaim().await,
            _ => match Lease::open(&mut self.client, old.id).await {
                Ok(lease) => self.lease = Some(lease),
                // 交给下一次回读修复
                Err(e) => error!(key = %self.key, error = %e, "failed to reopen lease keep-alive"),
            },
        }
    }

    async fn reclaim(&mut self) {
        match Lease::claim(&mut self.client, &self.key, &self.addr, self.ttl).await {
            Ok(lease) => {
                info!(key = %self.key, lease_id = lease.id, "service registered again");
                self.lease = Some(lease);
            }
            Err(e) => {
                error!(key = %self.key, error = %e, "failed to register service, will retry");
                self.lease = None;
            }
        }
    }

    /// 撤销租约，etcd 会一并删除绑定的 key
    async fn release(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        let revoke = self.client.lease_revoke(lease.id);
        match tokio::time::timeout(RELEASE_TIMEOUT, revoke).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                debug!(key = %self.key, lease_id = lease.id, error = %e, "failed to revoke lease")
            }
            Err(_) => debug!(key = %self.key, lease_id = lease.id, "lease revoke timed out"),
        }
    }
}
