//! Translations of shape manipulation and reduction operators.

use dragon_onnx_proto::helper::{make_node, NodeProtoExt};

use super::{export_op, ExportContext, ExportOp, TranslateError, Translation};

export_op!(Shape);

export_op!(Concat, |ctx: &ExportContext| {
    let axis = ctx.op().get_int("axis")?.copied().unwrap_or(1);
    Ok(ctx.node("Concat").with_attr("axis", axis).into())
});

export_op!(Transpose, |ctx: &ExportContext| {
    let mut node = ctx.node("Transpose");
    // Without `perm`, axes are reversed.
    if let Some(perm) = ctx.op().get_ints("perm")? {
        node = node.with_attr("perm", perm.clone());
    }
    Ok(node.into())
});

export_op!(Flatten, |ctx: &ExportContext| {
    let op = ctx.op();
    let axis = op.get_int("axis")?.copied().unwrap_or(0);
    let num_axes = op.get_int("num_axes")?.copied().unwrap_or(-1);
    if num_axes != -1 {
        return Err(TranslateError::attr_error("num_axes", "must be -1"));
    }
    if op.get_int("keep_axes")?.is_some() {
        return Err(TranslateError::attr_error("keep_axes", "not supported"));
    }
    // ONNX Flatten always produces a 2D output, which matches Dragon only
    // when the leading axis is kept.
    if axis != 1 {
        return Err(TranslateError::attr_error("axis", "must be 1"));
    }
    Ok(ctx.node("Flatten").with_attr("axis", axis).into())
});

export_op!(Reshape, |ctx: &ExportContext| {
    let op = ctx.op();
    // The target shape may be given as a second input instead of an
    // argument.
    if op.input.len() >= 2 {
        return Ok(ctx.node("Reshape").into());
    }

    let dims = op
        .get_ints("dims")?
        .or(op.get_ints("shape")?)
        .ok_or_else(|| TranslateError::attr_error("dims", "required argument missing"))?;

    let shape_name = format!("{}/shape", ctx.output(0)?);
    let node = make_node(
        "Reshape",
        [ctx.input(0)?, shape_name.as_str()],
        [ctx.output(0)?],
    )
    .with_name(&op.name);
    let shape = ctx.int64_constant(&shape_name, dims.clone());

    Ok(Translation::Nodes {
        nodes: vec![node],
        constants: vec![shape],
    })
});

export_op!(Squeeze, |ctx: &ExportContext| {
    let mut node = ctx.node("Squeeze");
    // Without an axis, all size-1 dims are removed.
    if let Some(axis) = ctx.op().get_int("axis")? {
        node = node.with_attr("axes", vec![*axis]);
    }
    Ok(node.into())
});

export_op!(ExpandDims, |ctx: &ExportContext| {
    let axis = ctx.op().get_int("axis")?.copied().unwrap_or(0);
    Ok(ctx.node("Unsqueeze").with_attr("axes", vec![axis]).into())
});

export_op!(Reduce, |ctx: &ExportContext| {
    let op = ctx.op();
    let operation = op.get_string("operation")?.map(|s| s.as_str()).unwrap_or("SUM");
    let onnx_op = match operation {
        "SUM" => "ReduceSum",
        "MEAN" => "ReduceMean",
        "MAX" => "ReduceMax",
        "MIN" => "ReduceMin",
        _ => return Err(TranslateError::attr_error("operation", "unsupported value")),
    };
    let keep_dims = op.get_int("keep_dims")?.copied().unwrap_or(0);

    let mut node = ctx.node(onnx_op);
    // Without `axes`, all axes are reduced.
    if let Some(axes) = op.get_ints("axes")? {
        node = node.with_attr("axes", axes.clone());
    }
    Ok(node.with_attr("keepdims", keep_dims).into())
});

export_op!(ArgReduce, |ctx: &ExportContext| {
    let op = ctx.op();
    let onnx_op = match op.get_string("operation")?.map(|s| s.as_str()) {
        Some("ARGMAX") => "ArgMax",
        Some("ARGMIN") => "ArgMin",
        _ => return Err(TranslateError::attr_error("operation", "unsupported value")),
    };
    let top_k = op.get_int("top_k")?.copied().unwrap_or(1);
    if top_k != 1 {
        return Err(TranslateError::attr_error("top_k", "must be 1"));
    }
    let axis = op.get_int("axis")?.copied().unwrap_or(0);
    let keep_dims = op.get_int("keep_dims")?.copied().unwrap_or(0);

    // Dragon can also output the max/min values. ONNX only outputs indices.
    let node = make_node(onnx_op, [ctx.input(0)?], [ctx.output(0)?])
        .with_name(&op.name)
        .with_attr("axis", axis)
        .with_attr("keepdims", keep_dims);
    Ok(node.into())
});

#[cfg(test)]
mod tests {
    use dragon_onnx_proto::helper::make_attribute;
    use dragon_onnx_proto::onnx;
    use dragon_onnx_testing::TestCases;

    use crate::graph_def::OperatorDef;
    use crate::node_registry::tests::{export, export_nodes};
    use crate::node_registry::TranslateError;

    #[test]
    fn test_export_array_ops() {
        #[derive(Debug)]
        struct Case {
            op: OperatorDef,
            onnx_op: &'static str,
            attrs: Vec<onnx::AttributeProto>,
        }

        let cases = [
            Case {
                op: OperatorDef::new("Concat").with_arg("axis", 0i64),
                onnx_op: "Concat",
                attrs: vec![make_attribute("axis", 0i64)],
            },
            Case {
                op: OperatorDef::new("Transpose").with_arg("perm", vec![0i64, 2, 1]),
                onnx_op: "Transpose",
                attrs: vec![make_attribute("perm", vec![0i64, 2, 1])],
            },
            Case {
                op: OperatorDef::new("Transpose"),
                onnx_op: "Transpose",
                attrs: vec![],
            },
            Case {
                op: OperatorDef::new("Flatten").with_arg("axis", 1i64),
                onnx_op: "Flatten",
                attrs: vec![make_attribute("axis", 1i64)],
            },
            Case {
                op: OperatorDef::new("Squeeze").with_arg("axis", 1i64),
                onnx_op: "Squeeze",
                attrs: vec![make_attribute("axes", vec![1i64])],
            },
            Case {
                op: OperatorDef::new("ExpandDims").with_arg("axis", -1i64),
                onnx_op: "Unsqueeze",
                attrs: vec![make_attribute("axes", vec![-1i64])],
            },
            Case {
                op: OperatorDef::new("Shape"),
                onnx_op: "Shape",
                attrs: vec![],
            },
            Case {
                op: OperatorDef::new("Reduce")
                    .with_arg("operation", "MEAN")
                    .with_arg("axes", vec![2i64, 3])
                    .with_arg("keep_dims", 1i64),
                onnx_op: "ReduceMean",
                attrs: vec![
                    make_attribute("axes", vec![2i64, 3]),
                    make_attribute("keepdims", 1i64),
                ],
            },
            Case {
                op: OperatorDef::new("Reduce"),
                onnx_op: "ReduceSum",
                attrs: vec![make_attribute("keepdims", 0i64)],
            },
            Case {
                op: OperatorDef::new("ArgReduce")
                    .with_arg("operation", "ARGMIN")
                    .with_arg("axis", 1i64),
                onnx_op: "ArgMin",
                attrs: vec![
                    make_attribute("axis", 1i64),
                    make_attribute("keepdims", 0i64),
                ],
            },
        ];

        cases.test_each(|case| {
            let op = case.op.clone().with_input("x").with_output("y");
            let (nodes, constants) = export_nodes(&op, &[]);
            assert!(constants.is_empty());
            assert_eq!(nodes.len(), 1);
            assert_eq!(nodes[0].op_type.as_deref(), Some(case.onnx_op));
            assert_eq!(nodes[0].input, ["x"]);
            assert_eq!(nodes[0].output, ["y"]);
            assert_eq!(nodes[0].attribute, case.attrs);
        })
    }

    #[test]
    fn test_export_reshape() {
        let op = OperatorDef::new("Reshape")
            .with_name("reshape")
            .with_arg("dims", vec![0i64, -1])
            .with_input("x")
            .with_output("y/Version_1");
        let (nodes, constants) = export_nodes(&op, &[]);

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].op_type.as_deref(), Some("Reshape"));
        assert_eq!(nodes[0].name.as_deref(), Some("reshape"));
        assert_eq!(nodes[0].input, ["x", "y/Version_1/shape"]);
        assert_eq!(nodes[0].output, ["y/Version_1"]);

        assert_eq!(constants.len(), 1);
        let shape = &constants[0];
        assert_eq!(shape.name.as_deref(), Some("y/Version_1/shape"));
        assert_eq!(shape.data_type, Some(onnx::DataType::INT64));
        assert_eq!(shape.dims, [2]);
        assert_eq!(
            shape.raw_data.as_deref(),
            Some(
                [0u8, 0, 0, 0, 0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
                    .as_slice()
            )
        );

        // Shape passed as an input.
        let op = OperatorDef::new("Reshape")
            .with_inputs(&["x", "s"])
            .with_output("y");
        let (nodes, constants) = export_nodes(&op, &[]);
        assert_eq!(nodes[0].input, ["x", "s"]);
        assert!(constants.is_empty());
    }

    #[test]
    fn test_export_array_op_errors() {
        #[derive(Debug)]
        struct Case {
            op: OperatorDef,
            expected: TranslateError,
        }

        let cases = [
            Case {
                op: OperatorDef::new("Flatten")
                    .with_arg("axis", 1i64)
                    .with_arg("num_axes", 2i64),
                expected: TranslateError::attr_error("num_axes", "must be -1"),
            },
            Case {
                op: OperatorDef::new("Flatten"),
                expected: TranslateError::attr_error("axis", "must be 1"),
            },
            Case {
                op: OperatorDef::new("Reshape"),
                expected: TranslateError::attr_error("dims", "required argument missing"),
            },
            Case {
                op: OperatorDef::new("Reduce").with_arg("operation", "PROD"),
                expected: TranslateError::attr_error("operation", "unsupported value"),
            },
            Case {
                op: OperatorDef::new("ArgReduce")
                    .with_arg("operation", "ARGMAX")
                    .with_arg("top_k", 5i64),
                expected: TranslateError::attr_error("top_k", "must be 1"),
            },
        ];

        cases.test_each(|case| {
            let op = case.op.clone().with_input("x").with_output("y");
            assert_eq!(export(&op, &[]), Some(Err(case.expected.clone())));
        })
    }
}
