use std::sync::Arc;

use dashmap::DashMap;

use crate::context::{Contact, UserLocationApi};
use crate::error::CollaboratorError;

/// `MemoryLocationService` 充当内存中的注册表，供 LOOKUP 节点查询。
///
/// # 教案式解读
/// - **意图（Why）**：
///   - LOOKUP 只依赖 [`UserLocationApi`]，测试与单机部署需要一个无外部依赖的实现；
///   - 以 `(domain, aor)` 为键，与外部注册表“按域分表”的组织方式保持一致。
/// - **实现策略（How）**：
///   - 内部持有 `Arc<DashMap<(String, String), Vec<Contact>>>`，克隆后多个会话共享同一张表；
///   - 同一 AOR 的联系地址按注册顺序保存，LOOKUP 依此顺序追加到位置集。
///
/// # 契约说明
/// - **前置条件**：AOR 需与脚本归属用户的构造方式一致（见 [`crate::invoke::build_user_aor`]）。
/// - **后置条件**：
///   - `register` 对相同 URI（大小写不敏感）原位覆盖，否则追加到末尾；
///   - `lookup` 返回克隆，不暴露内部引用。
/// - **风险提示**：过期条目不会主动清理，由 LOOKUP 按请求到达时刻过滤。
#[derive(Debug, Clone, Default)]
pub struct MemoryLocationService {
    inner: Arc<DashMap<(String, String), Vec<Contact>>>,
}

impl MemoryLocationService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册或刷新一个联系地址；返回被替换的旧记录。
    pub fn register(&self, domain: &str, aor: &str, contact: Contact) -> Option<Contact> {
        let mut contacts = self
            .inner
            .entry((domain.to_owned(), aor.to_owned()))
            .or_default();
        match contacts
            .iter_mut()
            .find(|existing| existing.uri.eq_ignore_ascii_case(&contact.uri))
        {
            Some(existing) => Some(core::mem::replace(existing, contact)),
            None => {
                contacts.push(contact);
                None
            }
        }
    }

    /// 注销一个联系地址；最后一个地址注销后整条记录被删除。
    pub fn unregister(&self, domain: &str, aor: &str, uri: &str) -> Option<Contact> {
        let key = (domain.to_owned(), aor.to_owned());
        let removed = {
            let mut contacts = self.inner.get_mut(&key)?;
            let at = contacts
                .iter()
                .position(|existing| existing.uri.eq_ignore_ascii_case(uri))?;
            contacts.remove(at)
        };
        self.inner.remove_if(&key, |_, contacts| contacts.is_empty());
        Some(removed)
    }
}

impl UserLocationApi for MemoryLocationService {
    fn lookup(&self, domain: &str, aor: &str) -> Result<Option<Vec<Contact>>, CollaboratorError> {
        let key = (domain.to_owned(), aor.to_owned());
        Ok(self.inner.get(&key).map(|entry| entry.value().clone()))
    }
}
