use std::collections::VecDeque;
use std::error::Error;
use std::fs;
use std::io::BufWriter;

use dragon_onnx::{EmptyWorkspace, ExportOptions, GraphDef, ValueInfo};
use dragon_onnx_proto::protobuf::EncodeMessage;

struct Args {
    /// JSON graph definition to convert.
    graph: String,

    /// Path of the `.onnx` file to write.
    output: String,

    /// Value info, as inline JSON or the path of a JSON file.
    value_info: Option<String>,

    /// Name for the exported graph.
    name: Option<String>,

    /// Print the exported graph.
    verbose: bool,
}

fn parse_args() -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut values = VecDeque::new();
    let mut value_info = None;
    let mut name = None;
    let mut verbose = false;

    let mut parser = lexopt::Parser::from_env();
    while let Some(arg) = parser.next()? {
        match arg {
            Value(val) => values.push_back(val.string()?),
            Long("value-info") => value_info = Some(parser.value()?.string()?),
            Long("name") => name = Some(parser.value()?.string()?),
            Short('v') | Long("verbose") => verbose = true,
            Short('h') | Long("help") => {
                println!(
                    "Convert Dragon graph definitions to ONNX models.

Usage: {bin_name} [OPTIONS] <graph> <output>

  <graph>   JSON graph definition
  <output>  Path of ONNX model to write

Options:
  --value-info <json>  Types and shapes of graph inputs, as a JSON object
                       `{{\"name\": [elem_type, [dims...]]}}` or the path of a
                       file containing one
  --name <name>        Name of the exported graph
  -v, --verbose        Print the exported graph
  -h, --help           Print help
",
                    bin_name = parser.bin_name().unwrap_or("dragon2onnx")
                );
                std::process::exit(0);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    let graph = values.pop_front().ok_or("missing `<graph>` arg")?;
    let output = values.pop_front().ok_or("missing `<output>` arg")?;

    Ok(Args {
        graph,
        output,
        value_info,
        name,
        verbose,
    })
}

/// Parse the `--value-info` argument, which is either inline JSON or the
/// path of a JSON file.
fn read_value_info(arg: &str) -> Result<ValueInfo, Box<dyn Error>> {
    let json = if matches!(arg.trim_start().chars().next(), Some('{' | '[')) {
        arg.to_string()
    } else {
        fs::read_to_string(arg)?
    };
    let value: serde_json::Value = serde_json::from_str(&json)?;
    Ok(ValueInfo::from_json(&value)?)
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = parse_args()?;

    let default_filter = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let graph_json = fs::read_to_string(&args.graph)?;
    let graph: GraphDef = serde_json::from_str(&graph_json)?;
    let value_info = match &args.value_info {
        Some(arg) => read_value_info(arg)?,
        None => ValueInfo::new(),
    };
    log::debug!(
        "Loaded graph \"{}\" with {} operators",
        graph.name,
        graph.op.len()
    );

    let mut opts = ExportOptions::with_all_ops();
    opts.value_info(value_info).verbose(args.verbose);
    if let Some(name) = &args.name {
        opts.graph_name(name);
    }

    // There is no engine available here, so the value info must cover every
    // tensor in the graph.
    let model = opts.export_model(&graph, &mut EmptyWorkspace)?;

    let file = fs::File::create(&args.output)?;
    model.write_to(BufWriter::new(file))?;

    if let Some(onnx_graph) = &model.graph {
        println!(
            "Wrote {}: {} nodes, {} inputs, {} outputs",
            args.output,
            onnx_graph.node.len(),
            onnx_graph.input.len(),
            onnx_graph.output.len(),
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use dragon_onnx::{DataType, Dimension};
    use dragon_onnx_testing::TestCases;

    use super::read_value_info;

    #[test]
    fn test_read_inline_value_info() {
        let info = read_value_info(r#"{"x": [1, ["batch", 3]]}"#).unwrap();
        let x = info.get("x").unwrap();
        assert_eq!(x.dtype, DataType::Float);
        assert_eq!(
            x.shape,
            [Dimension::Symbolic("batch".into()), Dimension::Fixed(3)]
        );
    }

    #[test]
    fn test_read_invalid_value_info() {
        #[derive(Debug)]
        struct Case {
            arg: &'static str,
        }

        let cases = [
            // Not valid JSON.
            Case { arg: "{\"x\": [1," },
            // A list rather than a mapping.
            Case { arg: " [1, [2, 3]]" },
            // Missing file.
            Case {
                arg: "/nonexistent/value_info.json",
            },
        ];

        cases.test_each(|case| {
            assert!(read_value_info(case.arg).is_err());
        })
    }
}
