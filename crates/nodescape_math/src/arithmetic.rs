// SPDX-License-Identifier: MIT OR Apache-2.0
//! Binary arithmetic and interpolation nodes.
//!
//! These operate on whatever numeric type flows in: operands are declared
//! with the wildcard type and the result connector is retyped from the
//! connected sources, so a downstream compatibility check sees the actual
//! type rather than the wildcard.

use nodescape_graph::{DataType, InputConnector, InputSources, KindContext, NodeKind, OutputConnector};

// Float widens to vec2/3/4 through broadcasting; the result takes the
// widest connected operand type.
const WIDENING: [DataType; 4] = [DataType::FLOAT, DataType::VEC2, DataType::VEC3, DataType::VEC4];

fn rank(ty: &DataType) -> Option<usize> {
    WIDENING.iter().position(|t| t == ty)
}

/// The operation performed by a [`BinaryOpNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Component-wise addition.
    Add,
    /// Component-wise subtraction.
    Subtract,
    /// Component-wise multiplication.
    Multiply,
    /// Component-wise or scalar division.
    Divide,
}

impl BinaryOp {
    /// Infix symbol, for labels.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
        }
    }
}

/// A two-operand arithmetic node.
///
/// Both operands accept any type; once both are fed, the result is retyped
/// to the widest connected operand type. Division additionally flags the
/// node invalid when the divisor type neither matches the dividend nor is
/// a plain float.
#[derive(Debug, Clone)]
pub struct BinaryOpNode {
    op: BinaryOp,
}

impl BinaryOpNode {
    /// Create a node for the given operation.
    pub fn new(op: BinaryOp) -> Self {
        Self { op }
    }

    /// The operation this node performs.
    pub fn op(&self) -> BinaryOp {
        self.op
    }
}

impl NodeKind for BinaryOpNode {
    fn type_name(&self) -> &'static str {
        match self.op {
            BinaryOp::Add => "nodescape_math::Add",
            BinaryOp::Subtract => "nodescape_math::Subtract",
            BinaryOp::Multiply => "nodescape_math::Multiply",
            BinaryOp::Divide => "nodescape_math::Divide",
        }
    }

    fn display_name(&self) -> &'static str {
        match self.op {
            BinaryOp::Add => "Add",
            BinaryOp::Subtract => "Subtract",
            BinaryOp::Multiply => "Multiply",
            BinaryOp::Divide => "Divide",
        }
    }

    fn connectors(&self) -> (Vec<InputConnector>, Vec<OutputConnector>) {
        (
            vec![
                InputConnector::new(DataType::ANY),
                InputConnector::new(DataType::ANY),
            ],
            vec![OutputConnector::new(DataType::ANY)],
        )
    }

    fn inputs_changed(&mut self, ctx: &mut KindContext<'_>, sources: &InputSources) {
        if sources.is_connected(0) && sources.is_connected(1) {
            let widest = [sources.first(0), sources.first(1)]
                .into_iter()
                .flatten()
                .filter_map(rank)
                .max();
            if let Some(widest) = widest {
                ctx.outputs[0].data_type = WIDENING[widest].clone();
            }
        }

        if self.op == BinaryOp::Divide {
            let mismatched = match (sources.first(0), sources.first(1)) {
                (Some(dividend), Some(divisor)) => {
                    dividend != divisor && *divisor != DataType::FLOAT
                }
                _ => false,
            };
            *ctx.valid = !mismatched;
        }
    }
}

/// Linear interpolation between two same-typed operands by a float alpha.
///
/// The node is flagged invalid while `A` and `B` carry different types;
/// the result is retyped to `A`'s source type.
#[derive(Debug, Clone, Default)]
pub struct LerpNode;

impl NodeKind for LerpNode {
    fn type_name(&self) -> &'static str {
        "nodescape_math::Lerp"
    }

    fn display_name(&self) -> &'static str {
        "Linear Interpolation"
    }

    fn connectors(&self) -> (Vec<InputConnector>, Vec<OutputConnector>) {
        (
            vec![
                InputConnector::new(DataType::ANY),
                InputConnector::new(DataType::ANY),
                InputConnector::new(DataType::FLOAT),
            ],
            vec![OutputConnector::new(DataType::ANY)],
        )
    }

    fn inputs_changed(&mut self, ctx: &mut KindContext<'_>, sources: &InputSources) {
        if let (Some(a), Some(b)) = (sources.first(0), sources.first(1)) {
            *ctx.valid = a == b;
            ctx.outputs[0].data_type = a.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(
        inputs: &'a [InputConnector],
        outputs: &'a mut [OutputConnector],
        valid: &'a mut bool,
    ) -> KindContext<'a> {
        KindContext {
            inputs,
            outputs,
            valid,
        }
    }

    fn sources(types: &[Option<DataType>]) -> InputSources {
        InputSources {
            types: types
                .iter()
                .map(|t| t.clone().into_iter().collect())
                .collect(),
        }
    }

    #[test]
    fn test_result_takes_the_widest_operand_type() {
        let mut kind = BinaryOpNode::new(BinaryOp::Add);
        let (inputs, mut outputs) = kind.connectors();
        let mut valid = true;

        let feeds = sources(&[Some(DataType::FLOAT), Some(DataType::VEC3)]);
        kind.inputs_changed(&mut context(&inputs, &mut outputs, &mut valid), &feeds);
        assert_eq!(outputs[0].data_type, DataType::VEC3);
        assert!(valid);
    }

    #[test]
    fn test_result_keeps_its_type_until_both_operands_are_fed() {
        let mut kind = BinaryOpNode::new(BinaryOp::Multiply);
        let (inputs, mut outputs) = kind.connectors();
        let mut valid = true;

        let feeds = sources(&[Some(DataType::VEC2), None]);
        kind.inputs_changed(&mut context(&inputs, &mut outputs, &mut valid), &feeds);
        assert_eq!(outputs[0].data_type, DataType::ANY);
    }

    #[test]
    fn test_divide_rejects_mismatched_non_float_divisor() {
        let mut kind = BinaryOpNode::new(BinaryOp::Divide);
        let (inputs, mut outputs) = kind.connectors();
        let mut valid = true;

        let feeds = sources(&[Some(DataType::VEC3), Some(DataType::VEC2)]);
        kind.inputs_changed(&mut context(&inputs, &mut outputs, &mut valid), &feeds);
        assert!(!valid);

        // A float divisor scales any dividend.
        let feeds = sources(&[Some(DataType::VEC3), Some(DataType::FLOAT)]);
        kind.inputs_changed(&mut context(&inputs, &mut outputs, &mut valid), &feeds);
        assert!(valid);

        // Disconnecting an operand clears the flag.
        let feeds = sources(&[Some(DataType::VEC3), None]);
        kind.inputs_changed(&mut context(&inputs, &mut outputs, &mut valid), &feeds);
        assert!(valid);
    }

    #[test]
    fn test_lerp_requires_matching_operands() {
        let mut kind = LerpNode;
        let (inputs, mut outputs) = kind.connectors();
        let mut valid = true;

        let feeds = sources(&[Some(DataType::VEC2), Some(DataType::VEC3), None]);
        kind.inputs_changed(&mut context(&inputs, &mut outputs, &mut valid), &feeds);
        assert!(!valid);
        assert_eq!(outputs[0].data_type, DataType::VEC2);

        let feeds = sources(&[Some(DataType::VEC3), Some(DataType::VEC3), Some(DataType::FLOAT)]);
        kind.inputs_changed(&mut context(&inputs, &mut outputs, &mut valid), &feeds);
        assert!(valid);
        assert_eq!(outputs[0].data_type, DataType::VEC3);
    }
}
