//! # binary 模块说明
//!
//! ## 角色定位（Why）
//! - 编译后的 CPL 脚本是一段不自描述的字节树，解释器对它的每一次读取都必须先做边界校验；
//! - 本模块把所有偏移运算集中到 [`BinaryScript`] 的访问器中，求值器无法绕过校验直接索引字节。
//!
//! ## 布局（What）
//! ```text
//! node  := type:u8 kids:u8 attrs:u8 reserved:u8 kid_offset:u16be[kids] attr*
//! attr  := code:u16be (value:u16be | len:u16be bytes[len] pad?)
//! ```
//! - `kid_offset` 相对节点自身起点；
//! - 字符串长度为奇数时追加一个填充字节，使下一个属性落在偶数偏移；
//! - 属性值是数值还是字符串由求值器决定，格式本身不携带标签。
//!
//! ## 失败语义（Trade-offs）
//! - 任何越界读取都返回 [`CplError::OutOfBounds`]，绝不 panic、绝不读取 `buffer[len]` 之后的字节。

use std::sync::Arc;

use crate::error::{CplError, Result};
use crate::script::tree::NodeKind;

/// 简单节点头部长度（不含子节点偏移表）。
pub const NODE_HEADER_LEN: usize = 4;

/// 只读的已编译脚本。
///
/// # 教案式说明
/// - **意图 (Why)**：脚本一旦加载便不再修改，可被多个会话并发读取；
/// - **契约 (What)**：内部持有 `Arc<[u8]>`，克隆只增加引用计数；
/// - **执行逻辑 (How)**：所有访问器都经由 [`BinaryScript::slice`] 检查 `[offset, offset+len)`
///   是否落在缓冲区内，溢出加法同样视为越界。
#[derive(Clone, PartialEq, Eq)]
pub struct BinaryScript {
    bytes: Arc<[u8]>,
}

impl core::fmt::Debug for BinaryScript {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BinaryScript")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl BinaryScript {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 取出 `[offset, offset + len)` 区间，任何越界或溢出均返回错误。
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset.checked_add(len).ok_or(CplError::OutOfBounds {
            offset,
            len,
            limit: self.bytes.len(),
        })?;
        self.bytes.get(offset..end).ok_or(CplError::OutOfBounds {
            offset,
            len,
            limit: self.bytes.len(),
        })
    }

    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    /// 读取网络序 16 位整数。
    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        let raw = self.slice(offset, 2)?;
        Ok(u16::from_be_bytes([raw[0], raw[1]]))
    }

    pub fn node_type(&self, offset: usize) -> Result<u8> {
        self.read_u8(offset)
    }

    pub fn kid_count(&self, offset: usize) -> Result<u8> {
        self.read_u8(offset.saturating_add(1))
    }

    pub fn attr_count(&self, offset: usize) -> Result<u8> {
        self.read_u8(offset.saturating_add(2))
    }

    /// 读取第 `index` 个子节点的相对偏移。
    ///
    /// 调用方通常已校验 `index < kid_count`，这里仍再次校验以保持失败闭合。
    pub fn kid_offset(&self, offset: usize, index: usize) -> Result<u16> {
        let kids = usize::from(self.kid_count(offset)?);
        if index >= kids {
            return Err(CplError::OutOfBounds {
                offset,
                len: index,
                limit: kids,
            });
        }
        self.read_u16(offset + NODE_HEADER_LEN + 2 * index)
    }

    /// 子节点的绝对偏移；结果必须仍落在缓冲区内。
    pub fn child_node_offset(&self, offset: usize, index: usize) -> Result<usize> {
        let child = offset + usize::from(self.kid_offset(offset, index)?);
        if child >= self.bytes.len() {
            return Err(CplError::OutOfBounds {
                offset: child,
                len: 1,
                limit: self.bytes.len(),
            });
        }
        Ok(child)
    }

    pub fn simple_node_size(&self, offset: usize) -> Result<usize> {
        Ok(NODE_HEADER_LEN + 2 * usize::from(self.kid_count(offset)?))
    }

    pub fn attr_block_offset(&self, offset: usize) -> Result<usize> {
        Ok(offset + self.simple_node_size(offset)?)
    }

    /// 调度前的廉价损坏检查：节点头与子节点偏移表必须完整落在缓冲区内。
    pub fn check_simple_node(&self, offset: usize) -> Result<()> {
        let size = self.simple_node_size(offset)?;
        self.slice(offset, size).map(|_| ())
    }

    /// 在 `offset` 处解码一个节点视图。
    ///
    /// - **前置条件**：无；
    /// - **后置条件**：返回的 [`Node`] 头部已校验完整，类型已识别。
    pub fn node(&self, offset: usize) -> Result<Node<'_>> {
        self.check_simple_node(offset)?;
        let raw = self.node_type(offset)?;
        let kind = NodeKind::from_u8(raw).ok_or(CplError::UnknownNode {
            node_type: raw,
            offset,
        })?;
        Ok(Node {
            script: self,
            offset,
            kind,
            kids: self.kid_count(offset)?,
            attrs: self.attr_count(offset)?,
        })
    }
}

/// 已校验头部的节点视图。
#[derive(Debug, Clone, Copy)]
pub struct Node<'s> {
    script: &'s BinaryScript,
    offset: usize,
    kind: NodeKind,
    kids: u8,
    attrs: u8,
}

impl<'s> Node<'s> {
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[must_use]
    pub fn kid_count(&self) -> usize {
        usize::from(self.kids)
    }

    #[must_use]
    pub fn attr_count(&self) -> usize {
        usize::from(self.attrs)
    }

    #[must_use]
    pub fn script(&self) -> &'s BinaryScript {
        self.script
    }

    /// 第 `index` 个子节点的绝对偏移。
    pub fn child(&self, index: usize) -> Result<usize> {
        self.script.child_node_offset(self.offset, index)
    }

    /// 第 `index` 个子节点的视图。
    pub fn child_node(&self, index: usize) -> Result<Node<'s>> {
        self.script.node(self.child(index)?)
    }

    /// 首个子节点；叶子节点返回 `None`。
    pub fn first_child(&self) -> Result<Option<usize>> {
        if self.kids == 0 {
            Ok(None)
        } else {
            self.child(0).map(Some)
        }
    }

    /// 属性游标，从属性块起点开始。
    pub fn attrs(&self) -> AttrCursor<'s> {
        AttrCursor {
            script: self.script,
            node: self.kind.name(),
            node_offset: self.offset,
            pos: self.offset + NODE_HEADER_LEN + 2 * usize::from(self.kids),
            remaining: self.attrs,
        }
    }

    /// 以本节点为上下文构造格式错误。
    pub fn malformed(&self, detail: impl Into<String>) -> CplError {
        CplError::malformed(self.kind.name(), self.offset, detail)
    }

    /// 子节点数量必须位于 `[min, max]`。
    pub fn expect_kids(&self, min: usize, max: usize) -> Result<()> {
        let kids = self.kid_count();
        if kids < min || kids > max {
            return Err(self.malformed(format!(
                "expected between {min} and {max} children, found {kids}"
            )));
        }
        Ok(())
    }
}

/// 属性值的解码形态，由求值器根据属性码决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrShape {
    Numeric,
    /// `fixup` 为尾部需要剔除的字节数（编译器写入的 NUL 终止符）。
    String { fixup: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrValue<'s> {
    Numeric(u16),
    Bytes(&'s [u8]),
}

/// 顺序读取节点属性块的游标。
///
/// # 教案式说明
/// - **契约 (What)**：`next_code` 只会返回 `attr_count` 个属性码；
///   `read_basic` 读取不计入属性总数的附加 16 位值（PRIORITY 节点的 PRIOSTR 即如此编码）；
/// - **执行逻辑 (How)**：字符串读取先取长度，校验 `len > fixup`，
///   再按奇偶补齐推进游标，返回剔除 `fixup` 后的切片。
#[derive(Debug, Clone)]
pub struct AttrCursor<'s> {
    script: &'s BinaryScript,
    node: &'static str,
    node_offset: usize,
    pos: usize,
    remaining: u8,
}

impl<'s> AttrCursor<'s> {
    /// 尚未消费的计数属性数量。
    #[must_use]
    pub fn remaining(&self) -> usize {
        usize::from(self.remaining)
    }

    /// 当前游标位置（绝对偏移）。
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// 读取下一个计数属性的属性码；属性耗尽时返回 `None`。
    pub fn next_code(&mut self) -> Result<Option<u16>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        let code = self.read_basic()?;
        self.remaining -= 1;
        Ok(Some(code))
    }

    /// 读取一个不计数的 16 位值并推进游标。
    pub fn read_basic(&mut self) -> Result<u16> {
        let value = self.script.read_u16(self.pos)?;
        self.pos += 2;
        Ok(value)
    }

    pub fn take_num(&mut self) -> Result<u16> {
        self.read_basic()
    }

    /// 读取长度前缀字节串，剔除尾部 `fixup` 字节。
    pub fn take_bytes(&mut self, fixup: usize) -> Result<&'s [u8]> {
        let len = usize::from(self.read_basic()?);
        if len <= fixup {
            return Err(CplError::malformed(
                self.node,
                self.node_offset,
                format!("empty string attribute at offset {}", self.pos - 2),
            ));
        }
        let raw = self.script.slice(self.pos, len)?;
        self.pos += len + (len & 1);
        Ok(&raw[..len - fixup])
    }

    /// 读取字符串属性，并要求其为合法 UTF-8。
    pub fn take_str(&mut self, fixup: usize) -> Result<&'s str> {
        let at = self.pos;
        let raw = self.take_bytes(fixup)?;
        core::str::from_utf8(raw).map_err(|_| {
            CplError::malformed(
                self.node,
                self.node_offset,
                format!("string attribute at offset {at} is not valid UTF-8"),
            )
        })
    }

    /// 按给定形态读取一个完整属性。
    pub fn read_attr(&mut self, shape: AttrShape) -> Result<Option<(u16, AttrValue<'s>)>> {
        let Some(code) = self.next_code()? else {
            return Ok(None);
        };
        let value = match shape {
            AttrShape::Numeric => AttrValue::Numeric(self.take_num()?),
            AttrShape::String { fixup } => AttrValue::Bytes(self.take_bytes(fixup)?),
        };
        Ok(Some((code, value)))
    }

    /// 以当前节点为上下文构造格式错误。
    pub fn malformed(&self, detail: impl Into<String>) -> CplError {
        CplError::malformed(self.node, self.node_offset, detail)
    }
}
