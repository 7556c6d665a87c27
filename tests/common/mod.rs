//! 测试公共工具

#![allow(dead_code)]

use async_trait::async_trait;
use denny_naming::naming::resolver::{
    BuildOptions, ClientConn, ResolveNowOptions, Resolver, ResolverBuilder, State, Target,
};
use denny_naming::{Address, Result};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::time::{Duration, Instant};

/// 记录每一次推送的连接端
#[derive(Default)]
pub struct RecordingConn {
    states: Mutex<Vec<State>>,
    notify: Notify,
}

impl RecordingConn {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pushes(&self) -> Vec<State> {
        self.states.lock().unwrap().clone()
    }

    pub fn push_count(&self) -> usize {
        self.states.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<BTreeSet<String>> {
        self.states.lock().unwrap().last().map(|s| to_set(&s.addresses))
    }

    /// 等待最近一次推送等于期望集合
    pub async fn wait_for(&self, expected: &[&str], timeout: Duration) -> bool {
        let expected: BTreeSet<String> = expected.iter().map(|s| s.to_string()).collect();
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if self.last().as_ref() == Some(&expected) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.last().as_ref() == Some(&expected);
            }
        }
    }
}

#[async_trait]
impl ClientConn for RecordingConn {
    async fn update_state(&self, state: State) -> Result<()> {
        self.states.lock().unwrap().push(state);
        self.notify.notify_waiters();
        Ok(())
    }
}

pub fn to_set(addrs: &[Address]) -> BTreeSet<String> {
    addrs.iter().map(|a| a.addr.clone()).collect()
}

/// 推送固定地址的构建器，测试可以通过 `push` 模拟后续变化
pub struct StaticBuilder {
    scheme: String,
    addrs: Vec<String>,
    conns: Mutex<Vec<Arc<dyn ClientConn>>>,
    pub refreshes: Arc<AtomicUsize>,
}

impl StaticBuilder {
    pub fn new(scheme: &str, addrs: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            scheme: scheme.to_string(),
            addrs: addrs.iter().map(|s| s.to_string()).collect(),
            conns: Mutex::new(Vec::new()),
            refreshes: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub async fn push(&self, addrs: &[&str]) {
        let conns = self.conns.lock().unwrap().clone();
        for conn in conns {
            let state = State::new(addrs.iter().map(|a| Address::from(*a)).collect());
            conn.update_state(state).await.unwrap();
        }
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResolverBuilder for StaticBuilder {
    async fn build(
        &self,
        _target: Target,
        cc: Arc<dyn ClientConn>,
        _opts: BuildOptions,
    ) -> Result<Box<dyn Resolver>> {
        let state = State::new(self.addrs.iter().map(|a| Address::from(a.as_str())).collect());
        cc.update_state(state).await?;
        self.conns.lock().unwrap().push(cc);
        Ok(Box::new(StaticResolver {
            refreshes: self.refreshes.clone(),
        }))
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }
}

pub struct StaticResolver {
    refreshes: Arc<AtomicUsize>,
}

#[async_trait]
impl Resolver for StaticResolver {
    fn resolve_now(&self, _opts: ResolveNowOptions) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&mut self) {}
}
