//! Translations of element-wise and activation operators.

use dragon_onnx_proto::helper::NodeProtoExt;

use super::{export_op, ExportContext, ExportOp, TranslateError, Translation};

export_op!(Add);
export_op!(Sub);
export_op!(Mul);
export_op!(Div);
export_op!(Pow);
export_op!(Maximum => "Max");
export_op!(Minimum => "Min");

export_op!(Sigmoid);
export_op!(Tanh);
export_op!(Exp);
export_op!(Log);
export_op!(Sqrt);
export_op!(Abs);
export_op!(Copy => "Identity");

export_op!(Relu, |ctx: &ExportContext| {
    let slope = ctx.op().get_float("slope")?.copied().unwrap_or(0.);
    let node = if slope != 0. {
        ctx.node("LeakyRelu").with_attr("alpha", slope)
    } else {
        ctx.node("Relu")
    };
    Ok(node.into())
});

export_op!(Elu, |ctx: &ExportContext| {
    let alpha = ctx.op().get_float("alpha")?.copied().unwrap_or(1.);
    Ok(ctx.node("Elu").with_attr("alpha", alpha).into())
});

export_op!(Softmax, |ctx: &ExportContext| {
    let axis = ctx.op().get_int("axis")?.copied().unwrap_or(1);
    Ok(ctx.node("Softmax").with_attr("axis", axis).into())
});

export_op!(Dropout, |ctx: &ExportContext| {
    let ratio = ctx.op().get_float("prob")?.copied().unwrap_or(0.5);
    if !(0. ..1.).contains(&ratio) {
        return Err(TranslateError::attr_error("prob", "must be in [0, 1)"));
    }
    Ok(ctx.node("Dropout").with_attr("ratio", ratio).into())
});

export_op!(Clip, |ctx: &ExportContext| {
    let op = ctx.op();
    let mut node = ctx.node("Clip");
    if let Some(low) = op.get_float("low")? {
        node = node.with_attr("min", *low);
    }
    if let Some(high) = op.get_float("high")? {
        node = node.with_attr("max", *high);
    }
    Ok(node.into())
});
