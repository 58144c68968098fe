//! 二进制脚本构造器。
//!
//! ## 定位（Why）
//! - 解释器只消费编译产物，但测试与运维工具需要一种不依赖 XML 编译器的方式来拼装脚本；
//! - [`NodeSpec`] 以树形构造器描述节点，[`NodeSpec::encode`] 产出与解码器完全对称的字节布局。
//!
//! ## 编码规则（What）
//! - 节点按先序深度优先排布，子节点紧跟在父节点属性块之后；
//! - [`NodeSpec::string`] 写入带 NUL 终止符的字符串（解码时 fixup 为 1），
//!   [`NodeSpec::raw_string`] 原样写入（fixup 为 0）；
//! - SUB 节点的 REF 以标签引用 SUBACTION，编码完成后回填为向后偏移。

use std::collections::HashMap;

use crate::error::{CplError, Result};
use crate::script::binary::BinaryScript;
use crate::script::tree::{NodeKind, sub};

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrSpec {
    Numeric { code: u16, value: u16, counted: bool },
    Str { code: u16, bytes: Vec<u8>, counted: bool },
    SubRef { label: String },
}

/// 节点构造描述。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    kind: NodeKind,
    label: Option<String>,
    attrs: Vec<AttrSpec>,
    children: Vec<NodeSpec>,
}

struct PendingRef {
    at: usize,
    sub_offset: usize,
    label: String,
}

impl NodeSpec {
    #[must_use]
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            label: None,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// 带标签的 SUBACTION 节点，供 [`NodeSpec::sub`] 引用。
    #[must_use]
    pub fn subaction(label: impl Into<String>) -> Self {
        let mut node = Self::new(NodeKind::Subaction);
        node.label = Some(label.into());
        node
    }

    /// 跳转到指定标签 SUBACTION 的 SUB 节点。
    #[must_use]
    pub fn sub(label: impl Into<String>) -> Self {
        let mut node = Self::new(NodeKind::Sub);
        node.attrs.push(AttrSpec::SubRef {
            label: label.into(),
        });
        node
    }

    /// 为任意节点附加标签（用于构造指向非 SUBACTION 的非法引用）。
    #[must_use]
    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn numeric(mut self, code: u16, value: u16) -> Self {
        self.attrs.push(AttrSpec::Numeric {
            code,
            value,
            counted: true,
        });
        self
    }

    /// 带 NUL 终止符的字符串属性。
    #[must_use]
    pub fn string(mut self, code: u16, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.attrs.push(AttrSpec::Str {
            code,
            bytes,
            counted: true,
        });
        self
    }

    /// 原样写入的字节串属性。
    #[must_use]
    pub fn raw_string(mut self, code: u16, value: &[u8]) -> Self {
        self.attrs.push(AttrSpec::Str {
            code,
            bytes: value.to_vec(),
            counted: true,
        });
        self
    }

    /// 不计入属性总数的带 NUL 字符串，PRIORITY 节点用它携带 UNKNOWN 的字面值。
    #[must_use]
    pub fn uncounted_string(mut self, code: u16, value: &str) -> Self {
        let mut bytes = value.as_bytes().to_vec();
        bytes.push(0);
        self.attrs.push(AttrSpec::Str {
            code,
            bytes,
            counted: false,
        });
        self
    }

    #[must_use]
    pub fn child(mut self, child: NodeSpec) -> Self {
        self.children.push(child);
        self
    }

    /// 编码为字节序列。
    ///
    /// - **错误**：子节点偏移、字符串长度、SUB 回填偏移超出 16 位，
    ///   属性或子节点数超出 8 位，或 SUB 引用了不存在/位于其后的标签。
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut labels = HashMap::new();
        let mut pending = Vec::new();
        self.write(&mut out, &mut labels, &mut pending)?;
        for PendingRef {
            at,
            sub_offset,
            label,
        } in pending
        {
            let target = *labels.get(&label).ok_or_else(|| CplError::Encode {
                detail: format!("unknown subaction label `{label}`"),
            })?;
            let back = sub_offset
                .checked_sub(target)
                .ok_or_else(|| CplError::Encode {
                    detail: format!("subaction `{label}` must precede its reference"),
                })?;
            patch_u16(&mut out, at, to_u16(back, "sub reference")?);
        }
        Ok(out)
    }

    /// 编码并包装为 [`BinaryScript`]。
    pub fn script(&self) -> Result<BinaryScript> {
        self.encode().map(BinaryScript::new)
    }

    fn write(
        &self,
        out: &mut Vec<u8>,
        labels: &mut HashMap<String, usize>,
        pending: &mut Vec<PendingRef>,
    ) -> Result<()> {
        let start = out.len();
        if let Some(label) = &self.label {
            labels.insert(label.clone(), start);
        }
        let counted = self
            .attrs
            .iter()
            .filter(|attr| match attr {
                AttrSpec::Numeric { counted, .. } | AttrSpec::Str { counted, .. } => *counted,
                AttrSpec::SubRef { .. } => true,
            })
            .count();
        out.push(self.kind.as_u8());
        out.push(to_u8(self.children.len(), "child count")?);
        out.push(to_u8(counted, "attribute count")?);
        out.push(0);
        let table = out.len();
        out.resize(table + 2 * self.children.len(), 0);

        for attr in &self.attrs {
            match attr {
                AttrSpec::Numeric { code, value, .. } => {
                    out.extend_from_slice(&code.to_be_bytes());
                    out.extend_from_slice(&value.to_be_bytes());
                }
                AttrSpec::Str { code, bytes, .. } => {
                    out.extend_from_slice(&code.to_be_bytes());
                    out.extend_from_slice(&to_u16(bytes.len(), "string length")?.to_be_bytes());
                    out.extend_from_slice(bytes);
                    if bytes.len() % 2 == 1 {
                        out.push(0);
                    }
                }
                AttrSpec::SubRef { label } => {
                    out.extend_from_slice(&sub::REF.to_be_bytes());
                    pending.push(PendingRef {
                        at: out.len(),
                        sub_offset: start,
                        label: label.clone(),
                    });
                    out.extend_from_slice(&[0, 0]);
                }
            }
        }

        for (index, child) in self.children.iter().enumerate() {
            let relative = to_u16(out.len() - start, "child offset")?;
            patch_u16(out, table + 2 * index, relative);
            child.write(out, labels, pending)?;
        }
        Ok(())
    }
}

fn to_u8(value: usize, what: &str) -> Result<u8> {
    u8::try_from(value).map_err(|_| CplError::Encode {
        detail: format!("{what} {value} exceeds 255"),
    })
}

fn to_u16(value: usize, what: &str) -> Result<u16> {
    u16::try_from(value).map_err(|_| CplError::Encode {
        detail: format!("{what} {value} exceeds 65535"),
    })
}

fn patch_u16(out: &mut [u8], at: usize, value: u16) {
    out[at..at + 2].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::tree::reject;

    #[test]
    fn layout_matches_hand_encoded_reject() {
        let bytes = NodeSpec::new(NodeKind::Reject)
            .numeric(reject::STATUS, 486)
            .string(reject::REASON, "Busy")
            .encode()
            .expect("编码应成功");
        assert_eq!(
            bytes,
            vec![22, 0, 2, 0, 0, 0, 0x01, 0xE6, 0, 1, 0, 5, b'B', b'u', b's', b'y', 0, 0]
        );
    }

    #[test]
    fn sub_reference_is_backfilled_as_backward_offset() {
        let spec = NodeSpec::new(NodeKind::Cpl)
            .child(NodeSpec::subaction("s").child(NodeSpec::new(NodeKind::Reject).numeric(0, 603)))
            .child(NodeSpec::new(NodeKind::Incoming).child(NodeSpec::sub("s")));
        let script = spec.script().expect("编码应成功");
        let incoming = script.node(0).and_then(|n| n.child_node(1)).expect("INCOMING");
        let sub = incoming.child_node(0).expect("SUB");
        let mut attrs = sub.attrs();
        assert_eq!(attrs.next_code(), Ok(Some(sub::REF)));
        let back = usize::from(attrs.take_num().expect("REF"));
        let target = script.node(sub.offset() - back).expect("SUBACTION");
        assert_eq!(target.kind(), NodeKind::Subaction);
    }

    #[test]
    fn forward_sub_reference_is_rejected() {
        let spec = NodeSpec::new(NodeKind::Cpl)
            .child(NodeSpec::new(NodeKind::Incoming).child(NodeSpec::sub("later")))
            .child(NodeSpec::subaction("later"));
        assert!(matches!(spec.encode(), Err(CplError::Encode { .. })));
    }
}
