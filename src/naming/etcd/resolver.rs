//! etcd 解析器：前缀 watch

use async_trait::async_trait;
use etcd_client::{Client, Event, EventType, GetOptions, WatchOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::EtcdRegistry;
use crate::error::Result;
use crate::naming::address::{Address, addr_from_key};
use crate::naming::resolver::{
    BuildOptions, ClientConn, Resolver, ResolverBuilder, Target, WatchResolver,
};
use crate::naming::{
    EventKind, PREFIX, RevisionedSet, ShutdownSignal, TaskHandle, push_state, service_prefix,
};

/// watch 断开或列举失败后重试前的等待时间
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

#[async_trait]
impl ResolverBuilder for EtcdRegistry {
    async fn build(
        &self,
        target: Target,
        cc: Arc<dyn ClientConn>,
        _opts: BuildOptions,
    ) -> Result<Box<dyn Resolver>> {
        let prefix = service_prefix(&target.scheme, &target.endpoint);
        info!(
            scheme = %target.scheme,
            endpoint = %target.endpoint,
            etcd = %self.endpoints,
            "building etcd resolver"
        );

        let mut client = self.client.clone();
        let mut view = RevisionedSet::new(prefix.clone());
        // 初次列举失败仍然推送空集合，不阻塞拨号；监听任务订阅前会重新列举
        match list(&mut client, &prefix).await {
            Ok((addrs, revision)) => {
                view.apply_listing(addrs, revision);
            }
            Err(e) => error!(prefix = %prefix, error = %e, "failed to list service addresses"),
        }
        push_state(cc.as_ref(), view.set(), &prefix).await;

        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let watch = Watch {
            client,
            prefix: prefix.clone(),
            view,
            cc,
            refresh_rx,
        };
        let task = TaskHandle::spawn(format!("etcd-watch:{prefix}"), move |shutdown| {
            watch.run(shutdown)
        });

        Ok(Box::new(WatchResolver::new(prefix, task, refresh_tx)))
    }

    fn scheme(&self) -> &str {
        PREFIX
    }
}

/// 列举前缀下所有地址，同时返回列举时的存储版本
async fn list(client: &mut Client, prefix: &str) -> Result<(Vec<Address>, i64)> {
    let resp = client
        .get(prefix, Some(GetOptions::new().with_prefix()))
        .await?;
    let revision = resp.header().map(|h| h.revision()).unwrap_or_default();
    let addrs = resp
        .kvs()
        .iter()
        .filter_map(|kv| kv.key_str().ok())
        .filter_map(|key| addr_from_key(key, prefix))
        .map(Address::from)
        .collect();
    Ok((addrs, revision))
}

/// watch 任务状态
struct Watch {
    client: Client,
    prefix: String,
    view: RevisionedSet,
    cc: Arc<dyn ClientConn>,
    refresh_rx: mpsc::Receiver<()>,
}

impl Watch {
    async fn run(mut self, mut shutdown: ShutdownSignal) {
        loop {
            // 没有成功列举过就订阅会漏掉已经存在的地址
            if !self.view.is_listed() && !self.list_until_ok(&mut shutdown).await {
                break;
            }

            let mut opts = WatchOptions::new().with_prefix();
            if let Some(revision) = self.view.start_revision() {
                opts = opts.with_start_revision(revision);
            }

            let subscribed = self.client.watch(self.prefix.as_str(), Some(opts));
            match shutdown.guard(subscribed).await {
                None => break,
                Some(Ok((_watcher, mut stream))) => {
                    debug!(
                        prefix = %self.prefix,
                        revision = ?self.view.revision(),
                        "watch subscribed"
                    );
                    loop {
                        let stopped = tokio::select! {
                            _ = shutdown.recv() => true,
                            Some(()) = self.refresh_rx.recv() => {
                                shutdown.guard(self.resync()).await.is_none()
                            }
                            message = stream.message() => match message {
                                Ok(Some(resp)) if resp.canceled() => {
                                    warn!(
                                        prefix = %self.prefix,
                                        compact_revision = resp.compact_revision(),
                                        "watch canceled by etcd"
                                    );
                                    break;
                                }
                                Ok(Some(resp)) => {
                                    shutdown.guard(self.apply_all(resp.events())).await.is_none()
                                }
                                Ok(None) => {
                                    warn!(prefix = %self.prefix, "watch stream closed");
                                    break;
                                }
                                Err(e) => {
                                    error!(prefix = %self.prefix, error = %e, "watch stream error");
                                    break;
                                }
                            },
                        };
                        if stopped {
                            info!(prefix = %self.prefix, "watch task stopped");
                            return;
                        }
                    }
                }
                Some(Err(e)) => {
                    error!(prefix = %self.prefix, error = %e, "failed to watch service prefix")
                }
            }

            if shutdown.guard(tokio::time::sleep(RESUBSCRIBE_DELAY)).await.is_none() {
                break;
            }
            // 断开期间的变化可能丢失，重新订阅前先完整对齐一次
            if shutdown.guard(self.resync()).await.is_none() {
                break;
            }
        }
        info!(prefix = %self.prefix, "watch task stopped");
    }

    /// 反复列举直到成功，收到关闭信号时返回 `false`
    async fn list_until_ok(&mut self, shutdown: &mut ShutdownSignal) -> bool {
        let client = self.client.clone();
        let prefix = self.prefix.clone();
        let listed = shutdown
            .retry(RESUBSCRIBE_DELAY, || {
                let mut client = client.clone();
                let prefix = prefix.clone();
                async move {
                    list(&mut client, &prefix).await.inspect_err(|e| {
                        error!(prefix = %prefix, error = %e, "failed to list service addresses")
                    })
                }
            })
            .await;
        let Some((addrs, revision)) = listed else {
            return false;
        };
        info!(prefix = %self.prefix, revision, "service addresses listed");
        if self.view.apply_listing(addrs, revision) {
            push_state(self.cc.as_ref(), self.view.set(), &self.prefix).await;
        }
        true
    }

    async fn apply_all(&mut self, events: &[Event]) {
        let mut changed = false;
        for event in events {
            let Some(kv) = event.kv() else {
                continue;
            };
            let Ok(key) = kv.key_str() else {
                continue;
            };
            let kind = match event.event_type() {
                EventType::Put => EventKind::Put,
                EventType::Delete => EventKind::Delete,
            };
            if self.view.apply_event(kind, key, kv.mod_revision()) {
                debug!(prefix = %self.prefix, key = %key, kind = ?kind, "address change");
                changed = true;
            }
        }
        if changed {
            push_state(self.cc.as_ref(), self.view.set(), &self.prefix).await;
        }
    }

    /// 完整列举并对齐地址集合，有变化时推送
    async fn resync(&mut self) {
        match list(&mut self.client, &self.prefix).await {
            Ok((addrs, revision)) => {
                if self.view.apply_listing(addrs, revision) {
                    push_state(self.cc.as_ref(), self.view.set(), &self.prefix).await;
                }
            }
            Err(e) => error!(prefix = %self.prefix, error = %e, "failed to list service addresses"),
        }
    }
}
