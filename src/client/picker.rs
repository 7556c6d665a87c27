//! 基于地址快照的通道选择器
//!
//! 每次推送整体替换地址列表，为每个地址缓存一个延迟连接的 `Channel`，
//! 按 `round_robin` 或 `pick_first` 选择。

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, warn};

use super::LoadBalancingPolicy;
use crate::error::{NamingError, Result};
use crate::naming::Address;
use crate::naming::resolver::{ClientConn, State};

#[derive(Default)]
struct PickerState {
    addresses: Vec<Address>,
    channels: HashMap<Address, Channel>,
}

/// 通道选择器
pub struct Picker {
    policy: LoadBalancingPolicy,
    target: String,
    connect_timeout: Duration,
    request_timeout: Option<Duration>,
    state: RwLock<PickerState>,
    next: AtomicUsize,
}

impl Picker {
    pub fn new(
        policy: LoadBalancingPolicy,
        target: impl Into<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            policy,
            target: target.into(),
            connect_timeout,
            request_timeout: None,
            state: RwLock::new(PickerState::default()),
            next: AtomicUsize::new(0),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn policy(&self) -> LoadBalancingPolicy {
        self.policy
    }

    /// 当前地址快照
    pub fn addresses(&self) -> Vec<Address> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .addresses
            .clone()
    }

    /// 选择一个地址及其通道
    pub fn pick(&self) -> Result<(Address, Channel)> {
        let state = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.addresses.is_empty() {
            return Err(NamingError::NoAvailableAddress(self.target.clone()));
        }

        let index = match self.policy {
            LoadBalancingPolicy::PickFirst => 0,
            _ => self.next.fetch_add(1, Ordering::Relaxed) % state.addresses.len(),
        };
        let addr = &state.addresses[index];
        let channel = state
            .channels
            .get(addr)
            .cloned()
            .ok_or_else(|| NamingError::NoAvailableAddress(self.target.clone()))?;
        Ok((addr.clone(), channel))
    }

    fn connect(&self, addr: &Address) -> Result<Channel> {
        let mut endpoint =
            Endpoint::from_shared(addr.to_grpc_uri())?.connect_timeout(self.connect_timeout);
        if let Some(timeout) = self.request_timeout {
            endpoint = endpoint.timeout(timeout);
        }
        Ok(endpoint.connect_lazy())
    }
}

#[async_trait]
impl ClientConn for Picker {
    async fn update_state(&self, state: State) -> Result<()> {
        let previous = {
            let guard = self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.channels.clone()
        };

        let mut next = PickerState::default();
        for addr in state.addresses {
            if next.channels.contains_key(&addr) {
                continue;
            }
            let channel = match previous.get(&addr) {
                Some(channel) => channel.clone(),
                None => match self.connect(&addr) {
                    Ok(channel) => channel,
                    Err(e) => {
                        warn!(
                            dial_target = %self.target,
                            address = %addr,
                            error = %e,
                            "skipping invalid address"
                        );
                        continue;
                    }
                },
            };
            next.channels.insert(addr.clone(), channel);
            next.addresses.push(addr);
        }

        debug!(
            dial_target = %self.target,
            addresses = next.addresses.len(),
            "picker state updated"
        );
        *self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = next;
        Ok(())
    }
}
