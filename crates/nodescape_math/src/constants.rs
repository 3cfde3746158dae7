// SPDX-License-Identifier: MIT OR Apache-2.0
//! Constant-value source nodes: a float and 2/3/4-component vectors.

use nodescape_graph::{
    Attributes, DataType, InputConnector, KindContext, NodeKind, OutputConnector, Value,
};

const AXES: [&str; 4] = ["X", "Y", "Z", "W"];

/// A source node emitting a constant float or vector.
///
/// The component fields are the persisted form; the live value sits on the
/// output connector and wins over the fields when both exist, so edits made
/// through the graph survive a save.
#[derive(Debug, Clone)]
pub struct ConstNode {
    components: [f32; 4],
    dims: usize,
}

impl ConstNode {
    /// Constant float source.
    pub fn float() -> Self {
        Self {
            components: [0.0; 4],
            dims: 1,
        }
    }

    /// Constant 2D vector source.
    pub fn vector2() -> Self {
        Self {
            components: [0.0; 4],
            dims: 2,
        }
    }

    /// Constant 3D vector source.
    pub fn vector3() -> Self {
        Self {
            components: [0.0; 4],
            dims: 3,
        }
    }

    /// Constant 4D vector source.
    pub fn vector4() -> Self {
        Self {
            components: [0.0; 4],
            dims: 4,
        }
    }

    fn output_type(&self) -> DataType {
        match self.dims {
            1 => DataType::FLOAT,
            2 => DataType::VEC2,
            3 => DataType::VEC3,
            _ => DataType::VEC4,
        }
    }

    fn value_from(&self, c: [f32; 4]) -> Value {
        match self.dims {
            1 => Value::Float(c[0]),
            2 => Value::Vec2([c[0], c[1]]),
            3 => Value::Vec3([c[0], c[1], c[2]]),
            _ => Value::Vec4(c),
        }
    }

    // Components of the live output value, falling back to the stored
    // fields for axes the value does not carry.
    fn current_components(&self, outputs: &[OutputConnector]) -> [f32; 4] {
        let mut c = self.components;
        match outputs.first().and_then(|o| o.value.as_ref()) {
            Some(Value::Float(x)) => c[0] = *x,
            Some(Value::Vec2(v)) => c[..2].copy_from_slice(v),
            Some(Value::Vec3(v)) => c[..3].copy_from_slice(v),
            Some(Value::Vec4(v)) => c = *v,
            _ => {}
        }
        c
    }
}

impl NodeKind for ConstNode {
    fn type_name(&self) -> &'static str {
        match self.dims {
            1 => "nodescape_math::ConstFloat",
            2 => "nodescape_math::ConstVector2",
            3 => "nodescape_math::ConstVector3",
            _ => "nodescape_math::ConstVector4",
        }
    }

    fn display_name(&self) -> &'static str {
        match self.dims {
            1 => "Constant",
            2 => "2D Vector",
            3 => "3D Vector",
            _ => "4D Vector",
        }
    }

    fn connectors(&self) -> (Vec<InputConnector>, Vec<OutputConnector>) {
        let mut output = OutputConnector::new(self.output_type());
        output.value = Some(self.value_from(self.components));
        (vec![], vec![output])
    }

    fn write_attributes(&self, outputs: &[OutputConnector], attrs: &mut Vec<(String, String)>) {
        let components = self.current_components(outputs);
        for (axis, component) in AXES.iter().zip(components).take(self.dims) {
            attrs.push(((*axis).to_string(), component.to_string()));
        }
    }

    fn read_attributes(&mut self, ctx: &mut KindContext<'_>, attrs: &Attributes) {
        for (index, axis) in AXES.iter().enumerate().take(self.dims) {
            match attrs.get(*axis).map(|raw| raw.parse::<f32>()) {
                Some(Ok(component)) => self.components[index] = component,
                _ => tracing::warn!(axis, "bad or missing constant component"),
            }
        }
        if let Some(output) = ctx.outputs.first_mut() {
            output.value = Some(self.value_from(self.components));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodescape_graph::NodeRegistry;

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register(|| Box::new(ConstNode::float()));
        registry.register(|| Box::new(ConstNode::vector3()));
        registry
    }

    #[test]
    fn test_fresh_constant_carries_a_zero_value() {
        let registry = registry();
        let node = registry.create("nodescape_math::ConstFloat").unwrap();
        assert_eq!(node.name, "Constant");
        assert!(node.inputs.is_empty());
        assert_eq!(node.outputs[0].data_type, DataType::FLOAT);
        assert_eq!(node.outputs[0].value, Some(Value::Float(0.0)));

        let vector = registry.create("nodescape_math::ConstVector3").unwrap();
        assert_eq!(vector.outputs[0].data_type, DataType::VEC3);
        assert_eq!(vector.outputs[0].value, Some(Value::Vec3([0.0; 3])));
    }

    #[test]
    fn test_attributes_roundtrip_through_fields() {
        let mut kind = ConstNode::vector3();
        let (inputs, mut outputs) = kind.connectors();
        let mut valid = true;

        let mut attrs = Attributes::new();
        attrs.insert("X".into(), "1.5".into());
        attrs.insert("Y".into(), "-2".into());
        attrs.insert("Z".into(), "0.25".into());
        let mut ctx = KindContext {
            inputs: &inputs,
            outputs: &mut outputs,
            valid: &mut valid,
        };
        kind.read_attributes(&mut ctx, &attrs);
        assert_eq!(outputs[0].value, Some(Value::Vec3([1.5, -2.0, 0.25])));

        let mut written = Vec::new();
        kind.write_attributes(&outputs, &mut written);
        assert_eq!(
            written,
            vec![
                ("X".to_string(), "1.5".to_string()),
                ("Y".to_string(), "-2".to_string()),
                ("Z".to_string(), "0.25".to_string()),
            ]
        );
    }

    #[test]
    fn test_bad_component_keeps_default() {
        let mut kind = ConstNode::float();
        let (inputs, mut outputs) = kind.connectors();
        let mut valid = true;

        let mut attrs = Attributes::new();
        attrs.insert("X".into(), "not-a-float".into());
        let mut ctx = KindContext {
            inputs: &inputs,
            outputs: &mut outputs,
            valid: &mut valid,
        };
        kind.read_attributes(&mut ctx, &attrs);
        assert_eq!(outputs[0].value, Some(Value::Float(0.0)));
    }

    #[test]
    fn test_live_output_value_wins_over_fields_on_save() {
        let kind = ConstNode::float();
        let (_, mut outputs) = kind.connectors();
        outputs[0].value = Some(Value::Float(7.0));

        let mut written = Vec::new();
        kind.write_attributes(&outputs, &mut written);
        assert_eq!(written, vec![("X".to_string(), "7".to_string())]);
    }
}
