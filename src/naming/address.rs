//! 服务地址与地址集合
//!
//! 地址集合是解析器对某个服务当前存活实例的物化视图，
//! 只由对应的监听循环修改，消费者只能拿到快照。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 服务地址（`host:port`），唯一标识一个运行中的服务实例
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    pub addr: String,
}

impl Address {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.addr
    }

    /// 转换为 gRPC URI
    pub fn to_grpc_uri(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr)
    }
}

impl From<String> for Address {
    fn from(addr: String) -> Self {
        Self { addr }
    }
}

impl From<&str> for Address {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

/// 检查地址是否已存在于地址列表中
pub fn exist(list: &[Address], addr: &str) -> bool {
    list.iter().any(|a| a.addr == addr)
}

/// 从地址列表中移除地址（不保证顺序），返回是否移除成功
pub fn remove(list: &mut Vec<Address>, addr: &str) -> bool {
    match list.iter().position(|a| a.addr == addr) {
        Some(index) => {
            list.swap_remove(index);
            true
        }
        None => false,
    }
}

/// 从存储 key 中截取服务地址
///
/// key 不在前缀之下，或者截取后为空时返回 `None`
pub fn addr_from_key<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix).filter(|addr| !addr.is_empty())
}

/// 单个地址变化事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressChange {
    /// 地址被创建或更新
    Added(Address),
    /// 地址被删除或过期
    Removed(Address),
}

/// 地址集合
///
/// 集合语义：重复的新增和删除都是空操作。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSet {
    addrs: Vec<Address>,
}

impl AddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn contains(&self, addr: &str) -> bool {
        exist(&self.addrs, addr)
    }

    /// 插入地址，已存在时返回 `false`
    pub fn insert(&mut self, addr: impl Into<Address>) -> bool {
        let addr = addr.into();
        if self.contains(&addr.addr) {
            return false;
        }
        self.addrs.push(addr);
        true
    }

    /// 移除地址，不存在时返回 `false`
    pub fn remove(&mut self, addr: &str) -> bool {
        remove(&mut self.addrs, addr)
    }

    /// 应用单个变化事件，返回集合是否发生变化
    pub fn apply(&mut self, change: AddressChange) -> bool {
        match change {
            AddressChange::Added(addr) => self.insert(addr),
            AddressChange::Removed(addr) => self.remove(&addr.addr),
        }
    }

    /// 用一次完整的列举结果对齐集合
    ///
    /// 新列表中有而当前没有的地址加入，当前有而新列表没有的地址移除。
    /// 返回集合是否发生变化。
    pub fn reconcile<I>(&mut self, listing: I) -> bool
    where
        I: IntoIterator,
        I::Item: Into<Address>,
    {
        let mut latest = AddressSet::new();
        for addr in listing {
            latest.insert(addr);
        }

        let mut changed = false;
        for addr in &latest.addrs {
            if !self.contains(&addr.addr) {
                self.addrs.push(addr.clone());
                changed = true;
            }
        }

        let before = self.addrs.len();
        self.addrs.retain(|addr| latest.contains(&addr.addr));
        changed || before != self.addrs.len()
    }

    /// 当前集合的快照
    pub fn snapshot(&self) -> Vec<Address> {
        self.addrs.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.addrs.iter()
    }
}

impl<A: Into<Address>> FromIterator<A> for AddressSet {
    fn from_iter<T: IntoIterator<Item = A>>(iter: T) -> Self {
        let mut set = AddressSet::new();
        for addr in iter {
            set.insert(addr);
        }
        set
    }
}
