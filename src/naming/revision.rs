//! 带存储版本号的地址集合
//!
//! 监听类后端先完整列举前缀得到版本 R，再从 R+1 订阅变更事件。
//! 这里只记录版本与集合状态，不涉及存储访问。

use super::address::{Address, AddressChange, AddressSet, addr_from_key};

/// 变更事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

/// 按版本号对齐的地址集合
#[derive(Debug, Clone)]
pub struct RevisionedSet {
    prefix: String,
    set: AddressSet,
    /// 已处理到的存储版本；`None` 表示还没有成功列举过
    revision: Option<i64>,
    /// 最近一次完整列举的版本，不晚于它的事件已经体现在集合中
    listed_revision: i64,
}

impl RevisionedSet {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            set: AddressSet::new(),
            revision: None,
            listed_revision: 0,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn set(&self) -> &AddressSet {
        &self.set
    }

    /// 是否已经有过一次成功的完整列举
    pub fn is_listed(&self) -> bool {
        self.revision.is_some()
    }

    pub fn revision(&self) -> Option<i64> {
        self.revision
    }

    /// 订阅变更的起始版本
    pub fn start_revision(&self) -> Option<i64> {
        self.revision.map(|revision| revision + 1)
    }

    /// 用一次完整列举替换集合，集合发生变化时返回 `true`
    pub fn apply_listing<I>(&mut self, listing: I, revision: i64) -> bool
    where
        I: IntoIterator<Item = Address>,
    {
        self.revision = Some(revision);
        self.listed_revision = revision;
        self.set.reconcile(listing)
    }

    /// 应用一个变更事件，集合发生变化时返回 `true`
    ///
    /// 版本不晚于最近一次列举的事件、以及前缀之外的 key 都被忽略
    pub fn apply_event(&mut self, kind: EventKind, key: &str, mod_revision: i64) -> bool {
        if mod_revision <= self.listed_revision {
            return false;
        }
        self.revision = Some(self.revision.map_or(mod_revision, |r| r.max(mod_revision)));

        let Some(addr) = addr_from_key(key, &self.prefix) else {
            return false;
        };
        let addr = Address::from(addr);
        let change = match kind {
            EventKind::Put => AddressChange::Added(addr),
            EventKind::Delete => AddressChange::Removed(addr),
        };
        self.set.apply(change)
    }
}
