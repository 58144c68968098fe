//! 解释器核心不变量的性质测试
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：脚本来自不受信的编译产物，位置集顺序直接决定分叉与 Contact 排列，
//!   这些性质无法靠少量样例覆盖，因此以 Proptest 生成输入验证：
//!   1. 任意插入序列下位置集优先级单调不增，且同优先级保持插入顺序；
//!   2. 任意字节串交给解码器与解释器都不会 panic，越界全部折叠为错误；
//!   3. 构造器写入的属性能被游标按原样读回；
//!   4. 优先级比较与“按紧急程度排序”的影子模型一致。
//!
//! # 合同与边界 (What)
//!
//! - 性质 2 只断言“不 panic 且结果落在既定枚举内”，不关心具体去向；
//! - 性质 4 的影子模型独立实现，不复用生产代码的任何分支。

mod support;

use proptest::prelude::*;
use proptest::sample::select;
use spark_cpl::eval::{PriorityLevel, PriorityOp, compare_priority};
use spark_cpl::interpreter::{Direction, Interpreter, ScriptOutcome};
use spark_cpl::location::{LocationEntry, LocationSet};
use spark_cpl::script::{BinaryScript, NodeKind, NodeSpec};
use support::{FakeMessage, Harness};

/// 紧急程度的影子排序：数值越小越紧急，`Unknown` 在不等比较中视为 normal。
fn urgency(level: PriorityLevel) -> u8 {
    match level {
        PriorityLevel::Emergency => 0,
        PriorityLevel::Urgent => 1,
        PriorityLevel::Normal | PriorityLevel::Unknown => 2,
        PriorityLevel::NonUrgent => 3,
    }
}

fn model(op: PriorityOp, wanted: PriorityLevel, message: PriorityLevel) -> bool {
    match (op, wanted) {
        (PriorityOp::Equal, _) => message == wanted,
        (_, PriorityLevel::Unknown) => false,
        (PriorityOp::Less, _) => urgency(message) > urgency(wanted),
        (PriorityOp::Greater, _) => urgency(message) < urgency(wanted),
    }
}

fn levels() -> impl Strategy<Value = PriorityLevel> {
    select(vec![
        PriorityLevel::Emergency,
        PriorityLevel::Urgent,
        PriorityLevel::Normal,
        PriorityLevel::NonUrgent,
        PriorityLevel::Unknown,
    ])
}

fn ops() -> impl Strategy<Value = PriorityOp> {
    select(vec![PriorityOp::Less, PriorityOp::Greater, PriorityOp::Equal])
}

proptest! {
    #[test]
    fn prop_location_set_orders_by_priority_then_insertion(priorities in prop::collection::vec(0u8..=10, 0..32)) {
        let mut set = LocationSet::new();
        for (index, priority) in priorities.iter().enumerate() {
            set.insert(LocationEntry::new(format!("sip:u{index}@h"), *priority));
        }
        prop_assert_eq!(set.len(), priorities.len());

        let entries: Vec<_> = set.iter().collect();
        for pair in entries.windows(2) {
            prop_assert!(pair[0].priority >= pair[1].priority);
            if pair[0].priority == pair[1].priority {
                let index = |entry: &LocationEntry| -> usize {
                    entry.uri[5..entry.uri.len() - 2].parse().expect("测试 URI 含序号")
                };
                prop_assert!(index(pair[0]) < index(pair[1]));
            }
        }
    }

    #[test]
    fn prop_decoder_never_reads_out_of_bounds(bytes in prop::collection::vec(any::<u8>(), 0..96), offset in 0usize..128) {
        let script = BinaryScript::new(bytes.clone());
        if let Ok(node) = script.node(offset) {
            prop_assert!(offset + 4 <= bytes.len());
            for index in 0..node.kid_count() {
                if let Ok(child) = node.child(index) {
                    prop_assert!(child >= offset && child < bytes.len());
                }
            }
            let mut attrs = node.attrs();
            while let Ok(Some(_)) = attrs.next_code() {
                if attrs.take_bytes(0).is_err() {
                    break;
                }
            }
        }
    }

    #[test]
    fn prop_interpreter_survives_arbitrary_bodies(body in prop::collection::vec(any::<u8>(), 0..128)) {
        let mut bytes = vec![NodeKind::Cpl.as_u8(), 1, 0, 0, 0, 6];
        bytes.extend_from_slice(&body);
        let harness = Harness::new();
        let interpreter = Interpreter::new(
            FakeMessage::new().shared(),
            BinaryScript::new(bytes),
            Direction::Incoming,
            "alice",
            harness.context(),
        );
        let mut interpreter = interpreter.expect("根节点为 CPL");
        let outcome = interpreter.run();
        prop_assert!(matches!(
            outcome,
            ScriptOutcome::Default
                | ScriptOutcome::End
                | ScriptOutcome::Suspended
                | ScriptOutcome::RunError(_)
                | ScriptOutcome::FormatError(_)
        ));
        if outcome == ScriptOutcome::Suspended {
            prop_assert!(!harness.transactions.forks().is_empty());
        }
    }

    #[test]
    fn prop_string_attributes_read_back(values in prop::collection::vec("[ -~]{1,40}", 1..6), number in any::<u16>()) {
        let mut spec = NodeSpec::new(NodeKind::Log).numeric(9, number);
        for (code, value) in values.iter().enumerate() {
            let code = u16::try_from(code).expect("属性数很小");
            spec = spec.string(code, value);
        }
        let script = spec.script().expect("构造器可编码");
        let node = script.node(0).expect("根节点可解码");
        prop_assert_eq!(node.attr_count(), values.len() + 1);

        let mut attrs = node.attrs();
        prop_assert_eq!(attrs.next_code().expect("数值属性"), Some(9));
        prop_assert_eq!(attrs.take_num().expect("数值属性"), number);
        for (code, value) in values.iter().enumerate() {
            prop_assert_eq!(attrs.next_code().expect("字符串属性"), Some(code as u16));
            prop_assert_eq!(attrs.take_str(1).expect("字符串属性"), value.as_str());
        }
        prop_assert_eq!(attrs.next_code().expect("属性已读完"), None);
    }

    #[test]
    fn prop_priority_comparison_follows_urgency(op in ops(), wanted in levels(), message in levels()) {
        let literal = (wanted == PriorityLevel::Unknown).then_some("whenever");
        let text = if message == PriorityLevel::Unknown { "whenever" } else { "ignored" };
        prop_assert_eq!(compare_priority(op, wanted, literal, message, text), model(op, wanted, message));
    }
}
