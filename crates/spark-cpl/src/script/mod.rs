//! 已编译 CPL 脚本的表示层：类型常量、受边界保护的解码器与测试用构造器。

pub mod binary;
pub mod encode;
pub mod tree;

pub use binary::{AttrCursor, AttrShape, AttrValue, BinaryScript, Node};
pub use encode::NodeSpec;
pub use tree::NodeKind;
