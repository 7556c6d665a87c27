//! gRPC 客户端模块
//!
//! 通过已注册的解析器拨号 `scheme:///service`，按负载均衡策略选择通道

pub mod discover;
pub mod picker;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tonic::transport::Channel;
use tracing::info;

use crate::error::{NamingError, Result};
use crate::naming::resolver::{self, BuildOptions, ClientConn, ResolveNowOptions, Resolver, Target};
use crate::naming::Address;

pub use discover::{AddressDiscover, ChannelService, DiscoverConn, P2cBalancer};
pub use picker::Picker;

/// 默认负载均衡策略（gRPC service config JSON）
pub const DEFAULT_BALANCING_POLICY: &str = r#"{"loadBalancingPolicy":"round_robin"}"#;

/// 负载均衡策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum LoadBalancingPolicy {
    /// 轮询
    #[default]
    #[serde(rename = "round_robin")]
    RoundRobin,
    /// 总是选择第一个地址
    #[serde(rename = "pick_first")]
    PickFirst,
    /// Power of Two Choices
    #[serde(rename = "p2c")]
    P2c,
}

/// gRPC service config 中与负载均衡相关的部分
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    #[serde(rename = "loadBalancingPolicy", default)]
    pub load_balancing_policy: LoadBalancingPolicy,
}

impl ServiceConfig {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// 默认负载均衡配置
pub fn default_balance_policy() -> ServiceConfig {
    ServiceConfig::parse(DEFAULT_BALANCING_POLICY).unwrap_or_default()
}

/// 拨号选项
#[derive(Debug, Clone)]
pub struct DialOptions {
    pub service_config: ServiceConfig,
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
    /// p2c 策略下等待可用地址的最长时间
    pub pick_timeout: Duration,
    pub build: BuildOptions,
}

impl Default for DialOptions {
    fn default() -> Self {
        Self {
            service_config: default_balance_policy(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: None,
            pick_timeout: Duration::from_secs(3),
            build: BuildOptions::default(),
        }
    }
}

impl DialOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 使用 JSON 形式的 service config
    pub fn with_service_config_json(mut self, json: &str) -> Result<Self> {
        self.service_config = ServiceConfig::parse(json)?;
        Ok(self)
    }

    pub fn with_policy(mut self, policy: LoadBalancingPolicy) -> Self {
        self.service_config.load_balancing_policy = policy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_pick_timeout(mut self, timeout: Duration) -> Self {
        self.pick_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.build = self.build.with_poll_interval(interval);
        self
    }
}

enum Balancer {
    Picker(Arc<Picker>),
    P2c {
        conn: Arc<DiscoverConn>,
        balancer: Mutex<P2cBalancer>,
    },
}

/// 通过命名服务拨号得到的客户端
pub struct NamingClient {
    target: Target,
    policy: LoadBalancingPolicy,
    resolver: Box<dyn Resolver>,
    balancer: Balancer,
}

impl NamingClient {
    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn policy(&self) -> LoadBalancingPolicy {
        self.policy
    }

    /// 按负载均衡策略选择一个通道
    pub async fn channel(&self) -> Result<Channel> {
        match &self.balancer {
            Balancer::Picker(picker) => picker.pick().map(|(_, channel)| channel),
            Balancer::P2c { balancer, .. } => balancer.lock().await.channel().await,
        }
    }

    /// 当前地址快照
    pub async fn addresses(&self) -> Vec<Address> {
        match &self.balancer {
            Balancer::Picker(picker) => picker.addresses(),
            Balancer::P2c { conn, .. } => conn.addresses().await,
        }
    }

    /// 请求解析器立即刷新
    pub fn resolve_now(&self) {
        self.resolver.resolve_now(ResolveNowOptions);
    }

    /// 关闭解析器
    pub async fn close(mut self) {
        self.resolver.close().await;
        info!(dial_target = %self.target, "naming client closed");
    }
}

/// 拨号 `scheme:///service`
///
/// scheme 必须已经通过 `resolver::register` 注册；返回前已完成首次解析
pub async fn dial(target: &str, opts: DialOptions) -> Result<NamingClient> {
    let target = Target::parse(target)?;
    let builder = resolver::get(&target.scheme)
        .ok_or_else(|| NamingError::UnknownScheme(target.scheme.clone()))?;
    let policy = opts.service_config.load_balancing_policy;
    let target_str = target.to_string();

    let (conn, balancer): (Arc<dyn ClientConn>, Balancer) = match policy {
        LoadBalancingPolicy::RoundRobin | LoadBalancingPolicy::PickFirst => {
            let picker = Arc::new(
                Picker::new(policy, target_str.clone(), opts.connect_timeout)
                    .with_request_timeout(opts.request_timeout),
            );
            (picker.clone(), Balancer::Picker(picker))
        }
        LoadBalancingPolicy::P2c => {
            let (conn, discover) = DiscoverConn::new(target_str.clone(), opts.connect_timeout);
            let conn = Arc::new(conn);
            let balancer = P2cBalancer::new(target_str.clone(), discover, opts.pick_timeout);
            (
                conn.clone(),
                Balancer::P2c {
                    conn,
                    balancer: Mutex::new(balancer),
                },
            )
        }
    };

    let resolver = builder.build(target.clone(), conn, opts.build).await?;
    info!(dial_target = %target_str, policy = ?policy, "dialed service");

    Ok(NamingClient {
        target,
        policy,
        resolver,
        balancer,
    })
}
