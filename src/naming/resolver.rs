//! 名字解析抽象
//!
//! 定义解析器的构建器、解析器本身以及接收地址更新的连接端，
//! 并提供进程级的 scheme -> 构建器 注册表。

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{NamingError, Result};
use crate::naming::address::Address;
use crate::naming::task::TaskHandle;

/// 拨号目标，格式为 `scheme://authority/endpoint`
///
/// 本库生成的目标 authority 为空，例如 `_DENNY_:///demo.svc`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub scheme: String,
    pub authority: String,
    pub endpoint: String,
}

impl Target {
    pub fn new(scheme: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            authority: String::new(),
            endpoint: endpoint.into(),
        }
    }

    /// 解析拨号目标字符串
    pub fn parse(target: &str) -> Result<Self> {
        let (scheme, rest) = target
            .split_once("://")
            .ok_or_else(|| NamingError::invalid_target(target, "missing \"://\" separator"))?;
        if scheme.is_empty() {
            return Err(NamingError::invalid_target(target, "empty scheme"));
        }

        let (authority, endpoint) = rest
            .split_once('/')
            .ok_or_else(|| NamingError::invalid_target(target, "missing endpoint"))?;
        if endpoint.is_empty() {
            return Err(NamingError::invalid_target(target, "empty endpoint"));
        }

        Ok(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.authority, self.endpoint)
    }
}

/// 推送给连接端的解析状态
///
/// 每次推送都是完整的地址集合，连接端必须整体替换而不是合并
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub addresses: Vec<Address>,
}

impl State {
    pub fn new(addresses: Vec<Address>) -> Self {
        Self { addresses }
    }
}

/// 构建解析器的选项
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// 轮询间隔（仅对没有变更通知的后端生效，例如 Redis），默认 5 秒
    pub poll_interval: Option<Duration>,
}

impl BuildOptions {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
}

/// 立即解析的选项
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveNowOptions;

/// 地址更新的接收端（通常是 RPC 客户端的负载均衡器）
#[async_trait]
pub trait ClientConn: Send + Sync {
    /// 接收最新的完整地址集合
    async fn update_state(&self, state: State) -> Result<()>;
}

/// 解析器
#[async_trait]
pub trait Resolver: Send + Sync {
    /// 请求立即刷新地址列表（尽力而为，多次请求会合并）
    fn resolve_now(&self, opts: ResolveNowOptions);

    /// 关闭解析器，停止后台监听并等待其退出
    async fn close(&mut self);
}

/// 解析器构建器
#[async_trait]
pub trait ResolverBuilder: Send + Sync {
    /// 构建解析器
    ///
    /// 返回前已经完成一次完整列举并推送初始状态
    async fn build(
        &self,
        target: Target,
        cc: Arc<dyn ClientConn>,
        opts: BuildOptions,
    ) -> Result<Box<dyn Resolver>>;

    /// 构建器负责的 scheme
    fn scheme(&self) -> &str;
}

type BuilderTable = HashMap<String, Arc<dyn ResolverBuilder>>;

static RESOLVERS: LazyLock<RwLock<BuilderTable>> = LazyLock::new(|| RwLock::new(HashMap::new()));

/// 将构建器注册到进程级注册表
///
/// 同一 scheme 重复注册时以最后一次为准，返回被替换的构建器
pub fn register(builder: Arc<dyn ResolverBuilder>) -> Option<Arc<dyn ResolverBuilder>> {
    let scheme = builder.scheme().to_string();
    let previous = RESOLVERS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(scheme.clone(), builder);

    if previous.is_some() {
        warn!(scheme = %scheme, "resolver builder replaced");
    } else {
        info!(scheme = %scheme, "resolver builder registered");
    }
    previous
}

/// 查找 scheme 对应的构建器
pub fn get(scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
    RESOLVERS
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(scheme)
        .cloned()
}

/// 从注册表中移除 scheme
pub fn unregister(scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
    RESOLVERS
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .remove(scheme)
}

/// 由后台监听任务驱动的解析器，两种后端共用
///
/// `resolve_now` 通过容量为 1 的通道通知监听任务重新列举，
/// 未处理的刷新请求会被合并。
pub struct WatchResolver {
    prefix: String,
    task: Option<TaskHandle>,
    refresh_tx: mpsc::Sender<()>,
}

impl WatchResolver {
    pub(crate) fn new(prefix: String, task: TaskHandle, refresh_tx: mpsc::Sender<()>) -> Self {
        Self {
            prefix,
            task: Some(task),
            refresh_tx,
        }
    }
}

#[async_trait]
impl Resolver for WatchResolver {
    fn resolve_now(&self, _opts: ResolveNowOptions) {
        // 已有未处理的刷新请求时直接合并
        let _ = self.refresh_tx.try_send(());
    }

    async fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.shutdown().await;
            info!(prefix = %self.prefix, "resolver closed");
        }
    }
}
