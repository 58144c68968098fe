//! 报文头惰性缓存。
//!
//! ## 契约（What）
//! - 每个头域槽位处于三态之一：尚未读取、已读取但缺失、已读取并持有副本；
//! - 第一次进入 PROXY 前调用 [`HeaderCache::detach`]：把所有尚未读取的头域一次性复制出来，
//!   并释放对原始报文的引用，此后异步回调恢复执行时不再访问报文对象。

use std::sync::Arc;

use crate::context::{HeaderKind, MessageContext};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    Pending,
    Missing,
    Present(Arc<str>),
}

pub struct HeaderCache {
    message: Option<Arc<dyn MessageContext>>,
    slots: [Slot; HeaderKind::ALL.len()],
}

impl core::fmt::Debug for HeaderCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HeaderCache")
            .field("detached", &self.is_detached())
            .field("slots", &self.slots)
            .finish()
    }
}

impl HeaderCache {
    pub fn new(message: Arc<dyn MessageContext>) -> Self {
        Self {
            message: Some(message),
            slots: core::array::from_fn(|_| Slot::Pending),
        }
    }

    /// 读取头域，首次访问时从报文复制并缓存。
    pub fn get(&mut self, kind: HeaderKind) -> Option<Arc<str>> {
        self.fill(kind);
        match &self.slots[kind.index()] {
            Slot::Present(value) => Some(Arc::clone(value)),
            Slot::Pending | Slot::Missing => None,
        }
    }

    /// 槽位仍为待读取时从报文复制一次；已断开时记为缺失。
    fn fill(&mut self, kind: HeaderKind) {
        let slot = &mut self.slots[kind.index()];
        if *slot == Slot::Pending {
            *slot = match self.message.as_ref().and_then(|m| m.header(kind)) {
                Some(value) => Slot::Present(Arc::from(value)),
                None => Slot::Missing,
            };
        }
    }

    /// 复制全部剩余头域并断开与报文的关联；重复调用无副作用。
    pub fn detach(&mut self) {
        if self.message.is_none() {
            return;
        }
        for kind in HeaderKind::ALL {
            self.fill(kind);
        }
        self.message = None;
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.message.is_none()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingMessage {
        reads: AtomicUsize,
    }

    impl MessageContext for CountingMessage {
        fn header(&self, kind: HeaderKind) -> Option<&str> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match kind {
                HeaderKind::Subject => Some("urgent: call back"),
                _ => None,
            }
        }
    }

    #[test]
    fn caches_values_and_absence() {
        let message = Arc::new(CountingMessage {
            reads: AtomicUsize::new(0),
        });
        let mut cache = HeaderCache::new(message.clone());
        assert_eq!(cache.get(HeaderKind::Subject).as_deref(), Some("urgent: call back"));
        assert_eq!(cache.get(HeaderKind::Subject).as_deref(), Some("urgent: call back"));
        assert_eq!(cache.get(HeaderKind::Priority), None);
        assert_eq!(cache.get(HeaderKind::Priority), None);
        assert_eq!(message.reads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn detach_snapshots_and_drops_message() {
        let message = Arc::new(CountingMessage {
            reads: AtomicUsize::new(0),
        });
        let mut cache = HeaderCache::new(message.clone());
        cache.detach();
        assert!(cache.is_detached());
        assert_eq!(Arc::strong_count(&message), 1);
        assert_eq!(message.reads.load(Ordering::SeqCst), HeaderKind::ALL.len());
        assert_eq!(cache.get(HeaderKind::Subject).as_deref(), Some("urgent: call back"));
    }

    #[test]
    fn detach_copies_only_unread_slots() {
        let message = Arc::new(CountingMessage {
            reads: AtomicUsize::new(0),
        });
        let mut cache = HeaderCache::new(message.clone());
        assert!(cache.get(HeaderKind::Subject).is_some());
        cache.detach();
        cache.detach();
        assert_eq!(message.reads.load(Ordering::SeqCst), HeaderKind::ALL.len());
        assert_eq!(cache.get(HeaderKind::Priority), None);
    }
}
