//! # location 模块说明
//!
//! ## 角色定位（Why）
//! - 位置集是脚本当前提议的呼叫目标列表，LOOKUP/LOCATION 写入，REMOVE_LOCATION 删除，
//!   REDIRECT/PROXY/默认动作消费；
//! - 其顺序直接决定 Contact 头的排列与分叉顺序，因此插入比较器必须稳定可预测。
//!
//! ## 排序契约（What）
//! - 从表头到表尾优先级单调不增；
//! - 优先级相同的条目保持插入顺序，新条目排在同优先级段的末尾。

use std::collections::VecDeque;
use std::sync::Arc;

/// 位置集中的一个候选目标。
///
/// - `priority` 为 q 值乘以 10 后的整数，取值 `0..=10`；
/// - `owned` 标记 URI 是否由解释器自行持有（LOOKUP/重定向产生），
///   为 `false` 时表示取自脚本本身，仅影响诊断输出；
/// - `nated` 来自注册表的 NAT 标记，原样交给事务层。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationEntry {
    pub uri: Arc<str>,
    pub received: Option<Arc<str>>,
    pub priority: u8,
    pub owned: bool,
    pub nated: bool,
}

impl LocationEntry {
    pub fn new(uri: impl Into<Arc<str>>, priority: u8) -> Self {
        Self {
            uri: uri.into(),
            received: None,
            priority,
            owned: false,
            nated: false,
        }
    }

    /// 以 `D.D` 形式渲染 q 值，优先级 10 渲染为 `1.0`。
    #[must_use]
    pub fn q_value(&self) -> String {
        let whole = if self.priority >= 10 { 1 } else { 0 };
        format!("{whole}.{}", self.priority % 10)
    }
}

/// 有序候选目标集合。
///
/// # 教案式说明
/// - **意图 (Why)**：以 `VecDeque` 取代单链表，头部弹出与顺序遍历都保持 O(1)/O(n)；
/// - **执行逻辑 (How)**：`insert` 从表头扫描，越过所有优先级不低于新条目的元素后插入；
/// - **设计权衡 (Trade-offs)**：插入为 O(n)，位置集规模通常只有个位数，线性扫描足够。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationSet {
    entries: VecDeque<LocationEntry>,
}

impl LocationSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: LocationEntry) {
        let at = self
            .entries
            .iter()
            .position(|existing| existing.priority < entry.priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, entry);
    }

    pub fn remove_first(&mut self) -> Option<LocationEntry> {
        self.entries.pop_front()
    }

    /// 按 URI 删除首个匹配条目（大小写不敏感）；不存在时什么也不做。
    pub fn remove_by_uri(&mut self, uri: &str) -> Option<LocationEntry> {
        let at = self
            .entries
            .iter()
            .position(|entry| entry.uri.eq_ignore_ascii_case(uri))?;
        self.entries.remove(at)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocationEntry> {
        self.entries.iter()
    }

    /// 取出全部条目并清空集合，保持现有顺序。
    pub fn drain_all(&mut self) -> Vec<LocationEntry> {
        self.entries.drain(..).collect()
    }
}
