// SPDX-License-Identifier: MIT OR Apache-2.0
//! Math node kinds for Nodescape.
//!
//! Provides constant sources (float and 2/3/4-component vectors), the four
//! basic arithmetic operations and linear interpolation, all built on the
//! [`nodescape_graph`] kind contract. Call [`register_math_nodes`] to make
//! them available to a graph's registry.

pub mod arithmetic;
pub mod constants;

pub use arithmetic::{BinaryOp, BinaryOpNode, LerpNode};
pub use constants::ConstNode;

use nodescape_graph::NodeRegistry;

/// Register every math node kind with the given registry.
pub fn register_math_nodes(registry: &mut NodeRegistry) {
    registry.register(|| Box::new(ConstNode::float()));
    registry.register(|| Box::new(ConstNode::vector2()));
    registry.register(|| Box::new(ConstNode::vector3()));
    registry.register(|| Box::new(ConstNode::vector4()));
    registry.register(|| Box::new(BinaryOpNode::new(BinaryOp::Add)));
    registry.register(|| Box::new(BinaryOpNode::new(BinaryOp::Subtract)));
    registry.register(|| Box::new(BinaryOpNode::new(BinaryOp::Multiply)));
    registry.register(|| Box::new(BinaryOpNode::new(BinaryOp::Divide)));
    registry.register(|| Box::new(LerpNode));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_all_kinds() {
        let mut registry = NodeRegistry::new();
        register_math_nodes(&mut registry);

        for type_name in [
            "nodescape_math::ConstFloat",
            "nodescape_math::ConstVector2",
            "nodescape_math::ConstVector3",
            "nodescape_math::ConstVector4",
            "nodescape_math::Add",
            "nodescape_math::Subtract",
            "nodescape_math::Multiply",
            "nodescape_math::Divide",
            "nodescape_math::Lerp",
        ] {
            assert!(registry.contains(type_name), "missing {type_name}");
        }
    }
}
