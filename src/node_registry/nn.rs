//! Translations of neural network layers.

use dragon_onnx_proto::helper::{make_node, NodeProtoExt};
use dragon_onnx_proto::onnx;

use super::{export_op, ExportContext, ExportOp, TranslateError, Translation};
use crate::value::{DataType, Tensor};

/// Number of spatial axes of 2D convolution and pooling inputs.
const SPATIAL_AXES: usize = 2;

/// Convert Dragon `pads` to ONNX `[x1_begin, x2_begin, ..., x1_end, x2_end]`
/// form.
///
/// Dragon accepts one value for all sides, one value per spatial axis, or
/// separate begin and end values.
fn onnx_pads(pads: &[i64]) -> Result<Vec<i64>, TranslateError> {
    match pads.len() {
        1 => Ok(vec![pads[0]; 2 * SPATIAL_AXES]),
        SPATIAL_AXES => Ok(pads.iter().chain(pads.iter()).copied().collect()),
        n if n == 2 * SPATIAL_AXES => Ok(pads.to_vec()),
        _ => Err(TranslateError::attr_error("pads", "wrong number of values")),
    }
}

/// Create a 1D constant with `len` copies of `value`, with the element type of
/// `like` if that is known and f32 otherwise.
fn filled_constant(
    ctx: &ExportContext,
    like: &str,
    name: &str,
    len: usize,
    value: f32,
) -> onnx::TensorProto {
    let dtype = ctx.dtype(like).unwrap_or(DataType::Float);
    Tensor::from_simple_fn(&[len], dtype, || value).to_proto(name)
}

/// Add the attributes shared by convolution and pooling nodes.
fn with_window_attrs(
    ctx: &ExportContext,
    mut node: onnx::NodeProto,
) -> Result<onnx::NodeProto, TranslateError> {
    let op = ctx.op();

    let data_format = op.get_string("data_format")?.map(|s| s.as_str());
    if !matches!(data_format, None | Some("NCHW")) {
        return Err(TranslateError::attr_error("data_format", "must be NCHW"));
    }

    for name in ["kernel_shape", "strides", "dilations"] {
        if let Some(values) = op.get_ints(name)? {
            node = node.with_attr(name, values.clone());
        }
    }

    match op.get_string("padding")?.map(|s| s.as_str()) {
        Some("SAME") => {
            node = node.with_attr("auto_pad", "SAME_UPPER");
        }
        None | Some("VALID") => {
            if let Some(pads) = op.get_ints("pads")? {
                node = node.with_attr("pads", onnx_pads(pads)?);
            }
        }
        Some(_) => return Err(TranslateError::attr_error("padding", "unsupported value")),
    }
    Ok(node)
}

export_op!(Matmul, |ctx: &ExportContext| {
    for name in ["transA", "transB"] {
        if ctx.op().get_int(name)?.is_some_and(|&t| t != 0) {
            return Err(TranslateError::attr_error(
                name,
                "transposed inputs are not supported",
            ));
        }
    }
    Ok(ctx.node("MatMul").into())
});

/// Translate a fully connected layer into `Gemm`.
///
/// Inputs with more than two dimensions are first flattened at `axis`, and a
/// zero bias is added if the layer has none, since `Gemm` requires it in
/// opset 9.
fn export_gemm(ctx: &ExportContext) -> Result<Translation, TranslateError> {
    let op = ctx.op();
    let trans_w = op.get_int("transW")?.copied().unwrap_or(1);
    let axis = op.get_int("axis")?.copied().unwrap_or(1);
    let x = ctx.input(0)?;
    let w = ctx.input(1)?;
    let y = ctx.output(0)?;

    let mut nodes = Vec::new();
    let mut constants = Vec::new();

    let is_matrix = ctx.shape(x).is_some_and(|shape| shape.len() == 2) && axis == 1;
    let gemm_input = if is_matrix {
        x.to_string()
    } else {
        let flat = format!("{}/flatten", y);
        nodes.push(make_node("Flatten", [x], [flat.as_str()]).with_attr("axis", axis));
        flat
    };

    let bias = if let Some(bias) = op.input.get(2) {
        bias.clone()
    } else {
        let bias = format!("{}/bias", y);
        constants.push(filled_constant(ctx, x, &bias, 1, 0.));
        bias
    };

    nodes.push(
        make_node("Gemm", [gemm_input.as_str(), w, bias.as_str()], [y])
            .with_name(&op.name)
            .with_attr("transB", trans_w),
    );

    Ok(Translation::Nodes { nodes, constants })
}

export_op!(FullyConnected, export_gemm);
export_op!(InnerProduct, export_gemm);

export_op!(Conv2d, |ctx: &ExportContext| {
    let group = ctx.op().get_int("group")?.copied().unwrap_or(1);
    let node = with_window_attrs(ctx, ctx.node("Conv"))?.with_attr("group", group);
    Ok(node.into())
});

export_op!(Pool2d, |ctx: &ExportContext| {
    let op = ctx.op();
    let global = op.get_int("global_pooling")?.is_some_and(|&g| g != 0);
    let onnx_op = match (op.get_string("mode")?.map(|s| s.as_str()), global) {
        (None | Some("MAX"), false) => "MaxPool",
        (None | Some("MAX"), true) => "GlobalMaxPool",
        (Some("AVG"), false) => "AveragePool",
        (Some("AVG"), true) => "GlobalAveragePool",
        _ => return Err(TranslateError::attr_error("mode", "unsupported value")),
    };

    if global {
        return Ok(ctx.node(onnx_op).into());
    }
    if op.get_ints("kernel_shape")?.is_none() {
        return Err(TranslateError::attr_error(
            "kernel_shape",
            "required argument missing",
        ));
    }
    Ok(with_window_attrs(ctx, ctx.node(onnx_op))?.into())
});

fn batch_norm_attrs(
    ctx: &ExportContext,
    node: onnx::NodeProto,
) -> Result<onnx::NodeProto, TranslateError> {
    let epsilon = ctx.op().get_float("eps")?.copied().unwrap_or(1e-5);
    let momentum = ctx.op().get_float("momentum")?.copied().unwrap_or(0.9);
    Ok(node
        .with_name(&ctx.op().name)
        .with_attr("epsilon", epsilon)
        .with_attr("momentum", momentum))
}

// Inputs are `[x, mean, var, stats]`. ONNX requires a scale and bias, so
// these are added as constants with one value per channel.
export_op!(BatchNorm, |ctx: &ExportContext| {
    let (x, mean, var) = (ctx.input(0)?, ctx.input(1)?, ctx.input(2)?);
    let y = ctx.output(0)?;
    let channels = ctx
        .shape(mean)
        .and_then(|shape| match shape {
            [dim] => dim.fixed(),
            _ => None,
        })
        .ok_or_else(|| TranslateError::attr_error(mean, "channel count is unknown"))?;

    let scale = format!("{}/scale", y);
    let bias = format!("{}/bias", y);
    let constants = vec![
        filled_constant(ctx, x, &scale, channels, 1.),
        filled_constant(ctx, x, &bias, channels, 0.),
    ];
    let node = make_node(
        "BatchNormalization",
        [x, scale.as_str(), bias.as_str(), mean, var],
        [y],
    );
    Ok(Translation::Nodes {
        nodes: vec![batch_norm_attrs(ctx, node)?],
        constants,
    })
});

// Inputs are `[x, mean, var, scale, bias]`.
export_op!(FusedBatchNorm, |ctx: &ExportContext| {
    let inputs = [
        ctx.input(0)?,
        ctx.input(3)?,
        ctx.input(4)?,
        ctx.input(1)?,
        ctx.input(2)?,
    ];
    let node = make_node("BatchNormalization", inputs, [ctx.output(0)?]);
    Ok(batch_norm_attrs(ctx, node)?.into())
});
