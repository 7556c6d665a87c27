//! Tower Discover 实现
//!
//! 把解析器推送的完整地址快照转换为 `Change::Insert` / `Change::Remove`，
//! 驱动 `tower::balance::p2c::Balance`。

use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tonic::transport::{Channel, Endpoint};
use tower::discover::Change;
use tower::{Service, ServiceExt};
use tracing::{debug, warn};

use crate::error::{NamingError, Result};
use crate::naming::Address;
use crate::naming::resolver::{ClientConn, State};

/// Channel 服务包装器
///
/// 每个地址对应一个缓存的 Channel，调用时直接返回该 Channel
#[derive(Clone)]
pub struct ChannelService {
    channel: Channel,
}

impl ChannelService {
    pub fn new(channel: Channel) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

impl<Req> Service<Req> for ChannelService
where
    Req: Send + 'static,
{
    type Response = Channel;
    type Error = tower::BoxError;
    type Future = futures::future::Ready<std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Req) -> Self::Future {
        futures::future::ready(Ok(self.channel.clone()))
    }
}

/// 所有实例负载相同，由 p2c 随机挑选
impl tower::load::Load for ChannelService {
    type Metric = u32;

    fn load(&self) -> Self::Metric {
        0
    }
}

/// 地址变化流，实现 `tower::discover::Discover`
pub struct AddressDiscover {
    rx: mpsc::UnboundedReceiver<Change<Address, ChannelService>>,
}

impl Stream for AddressDiscover {
    type Item = std::result::Result<Change<Address, ChannelService>, std::convert::Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|change| change.map(Ok))
    }
}

/// 解析器的接收端：对比前后两次快照，发送增量变化
///
/// 变化通道不限容量，均衡器未被轮询时也不会阻塞监听任务
pub struct DiscoverConn {
    target: String,
    connect_timeout: Duration,
    tx: mpsc::UnboundedSender<Change<Address, ChannelService>>,
    current: Mutex<HashMap<Address, ChannelService>>,
}

impl DiscoverConn {
    pub fn new(target: impl Into<String>, connect_timeout: Duration) -> (Self, AddressDiscover) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = Self {
            target: target.into(),
            connect_timeout,
            tx,
            current: Mutex::new(HashMap::new()),
        };
        (conn, AddressDiscover { rx })
    }

    /// 当前地址快照
    pub async fn addresses(&self) -> Vec<Address> {
        let mut addrs: Vec<Address> = self.current.lock().await.keys().cloned().collect();
        addrs.sort();
        addrs
    }

    fn closed(&self) -> NamingError {
        NamingError::WatchClosed(format!("balancer for {} dropped", self.target))
    }
}

#[async_trait]
impl ClientConn for DiscoverConn {
    async fn update_state(&self, state: State) -> Result<()> {
        let mut current = self.current.lock().await;

        // 先算出完整的增量，再一次性应用
        let removed: Vec<Address> = current
            .keys()
            .filter(|addr| !state.addresses.contains(addr))
            .cloned()
            .collect();
        let mut added: Vec<(Address, ChannelService)> = Vec::new();
        for addr in state.addresses {
            if current.contains_key(&addr) || added.iter().any(|(a, _)| *a == addr) {
                continue;
            }
            let endpoint = match Endpoint::from_shared(addr.to_grpc_uri()) {
                Ok(endpoint) => endpoint.connect_timeout(self.connect_timeout),
                Err(e) => {
                    warn!(
                        dial_target = %self.target,
                        address = %addr,
                        error = %e,
                        "skipping invalid address"
                    );
                    continue;
                }
            };
            added.push((addr, ChannelService::new(endpoint.connect_lazy())));
        }

        if self.tx.is_closed() {
            return Err(self.closed());
        }

        let mut changes = Vec::with_capacity(removed.len() + added.len());
        for addr in removed {
            current.remove(&addr);
            debug!(dial_target = %self.target, address = %addr, "address removed from balancer");
            changes.push(Change::Remove(addr));
        }
        for (addr, service) in added {
            current.insert(addr.clone(), service.clone());
            debug!(dial_target = %self.target, address = %addr, "address added to balancer");
            changes.push(Change::Insert(addr, service));
        }
        for change in changes {
            self.tx.send(change).map_err(|_| self.closed())?;
        }
        Ok(())
    }
}

/// P2C 负载均衡器
///
/// 没有可用地址时等待，超过 `pick_timeout` 返回 `NoAvailableAddress`
pub struct P2cBalancer {
    target: String,
    balancer: tower::balance::p2c::Balance<Pin<Box<AddressDiscover>>, ()>,
    pick_timeout: Duration,
}

impl P2cBalancer {
    pub fn new(
        target: impl Into<String>,
        discover: AddressDiscover,
        pick_timeout: Duration,
    ) -> Self {
        Self {
            target: target.into(),
            balancer: tower::balance::p2c::Balance::new(Box::pin(discover)),
            pick_timeout,
        }
    }

    /// 选择一个通道
    pub async fn channel(&mut self) -> Result<Channel> {
        let ready = tokio::time::timeout(self.pick_timeout, self.balancer.ready()).await;
        let balancer = match ready {
            Ok(ready) => ready?,
            Err(_) => return Err(NamingError::NoAvailableAddress(self.target.clone())),
        };
        Ok(balancer.call(()).await?)
    }
}
