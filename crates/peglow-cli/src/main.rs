//! Demo driver: compiles a built-in calculator grammar and evaluates the
//! expression given on the command line. The grammar AST is constructed
//! programmatically; a textual grammar syntax is out of scope here.

use std::env::args;
use std::rc::Rc;
use std::str::FromStr;

use anyhow::{anyhow, Context};

use peglow_backend::ast::{Expression, Grammar, Rule};
use peglow_backend::{compile, CompileOptions};
use peglow_runtime::combinator::ActionFn;
use peglow_runtime::Value;

fn main() -> anyhow::Result<()> {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_owned());
    let level = log::LevelFilter::from_str(&level).unwrap();

    simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    )
    .unwrap();

    let mut args = args().skip(1).collect::<Vec<_>>();

    let mut do_trace = false;
    let mut do_cache = true;
    let mut do_dump = false;

    args.retain(|arg| {
        match arg.as_str() {
            "--trace" => do_trace = true,
            "--no-cache" => do_cache = false,
            "--dump" => do_dump = true,
            _ => return true,
        }
        false
    });

    match args.len() {
        0 => {
            eprintln!("No expression provided");
            std::process::exit(1);
        }
        1 => {}
        _ => {
            eprintln!("Only one expression may be provided");
            std::process::exit(1);
        }
    }
    let input = args.pop().unwrap();

    let options = CompileOptions {
        trace: do_trace,
        cache: do_cache,
        ..CompileOptions::default()
    };
    let program = compile(&calculator(), &options).map_err(|errors| {
        let list = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        anyhow!("grammar failed to compile: {list}")
    })?;

    if do_dump {
        let mut buf = String::new();
        program.display_into(&mut buf).unwrap();
        print!("{buf}");
    }

    let value = program
        .parse(&input)
        .with_context(|| format!("cannot parse `{input}`"))?;

    match value {
        Value::Int(total) => println!("{total}"),
        other => println!("{other:?}"),
    }

    Ok(())
}

/// `Expr = head:Term (("+" / "-") Term)*` and so on down to parenthesized
/// factors and integer literals, folded left-to-right by the actions.
fn calculator() -> Grammar {
    let fold: ActionFn = Rc::new(|args: &[Value]| {
        let mut total = args[0].as_int().unwrap_or(0);
        for pair in args[1].as_list().unwrap_or(&[]) {
            let pair: Option<&[Value; 2]> = pair.as_list().and_then(|p| p.try_into().ok());
            let Some([op, rhs]) = pair else {
                continue;
            };
            let rhs = rhs.as_int().unwrap_or(0);
            total = match op.as_str() {
                Some("+") => total.wrapping_add(rhs),
                Some("-") => total.wrapping_sub(rhs),
                Some("*") => total.wrapping_mul(rhs),
                Some("/") => total.checked_div(rhs).unwrap_or(0),
                _ => total,
            };
        }
        Value::Int(total)
    });

    let to_int: ActionFn = Rc::new(|args: &[Value]| {
        let digits = args[0].as_str().unwrap_or("");
        Value::Int(digits.parse().unwrap_or(0))
    });

    let binary = |name: &str, low: &str, high: &str, operand: &str, fold: ActionFn| {
        Rule::new(
            name,
            Expression::seq(vec![
                Expression::rule_ref(operand).labeled("head"),
                Expression::seq(vec![
                    Expression::choice(vec![Expression::literal(low), Expression::literal(high)]),
                    Expression::rule_ref(operand),
                ])
                .group()
                .zero_or_more()
                .labeled("tail"),
            ])
            .action(fold),
        )
    };

    Grammar::new(vec![
        binary("Expr", "+", "-", "Term", fold.clone()),
        binary("Term", "*", "/", "Factor", fold),
        Rule::new(
            "Factor",
            Expression::choice(vec![
                Expression::seq(vec![
                    Expression::literal("("),
                    Expression::rule_ref("Expr").picked(),
                    Expression::literal(")"),
                ]),
                Expression::rule_ref("Number"),
            ]),
        ),
        Rule::new(
            "Number",
            Expression::class_range('0', '9')
                .one_or_more()
                .text()
                .labeled("digits")
                .action(to_int),
        ),
    ])
}

#[test]
fn test_calculator() {
    let program = compile(&calculator(), &CompileOptions::default()).unwrap();

    assert_eq!(program.parse("2+3*4"), Ok(Value::Int(14)));
    assert_eq!(program.parse("(2+3)*4"), Ok(Value::Int(20)));
    assert_eq!(program.parse("10/2-1"), Ok(Value::Int(4)));
    assert!(program.parse("2+").is_err());
    assert!(program.parse("").is_err());
}
