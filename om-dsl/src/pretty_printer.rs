//! Pretty printer for Om programs
//!
//! Produces canonical source: four-space indentation, positional wave
//! arguments where possible, and only the parentheses the grammar needs.
//! Printing a parsed program and parsing the result yields the same tree
//! up to source locations.

use crate::parser::ast::*;
use crate::parser::parse;
use om_core::Diagnostic;

/// Pretty-print a program back to Om source code.
pub fn pretty_print(program: &Program) -> String {
    let mut output = String::new();
    for (i, statement) in program.statements.iter().enumerate() {
        if i > 0 && is_declaration(statement) {
            output.push('\n');
        }
        output.push_str(&pretty_print_statement(statement, 0));
    }
    output
}

/// Parse and pretty-print Om source code (for round-trip testing).
pub fn round_trip(source: &str) -> Result<String, Vec<Diagnostic>> {
    let program = parse(source)?;
    Ok(pretty_print(&program))
}

fn is_declaration(statement: &Statement) -> bool {
    matches!(
        statement.kind,
        StatementKind::Pattern(_) | StatementKind::Field(_) | StatementKind::Function(_)
    ) || statement.doc.is_some()
}

fn pretty_print_statement(statement: &Statement, indent: usize) -> String {
    let ind = indent_str(indent);
    let mut result = String::new();

    if let Some(doc) = &statement.doc {
        if doc.contains('\n') {
            result.push_str(&format!("{}/**\n", ind));
            for line in doc.lines() {
                result.push_str(&format!("{} * {}\n", ind, line));
            }
            result.push_str(&format!("{} */\n", ind));
        } else {
            result.push_str(&format!("{}/** {} */\n", ind, doc));
        }
    }

    for annotation in &statement.annotations {
        match &annotation.argument {
            Some(argument) => result.push_str(&format!(
                "{}@{}({})\n",
                ind,
                annotation.name,
                quote(argument)
            )),
            None => result.push_str(&format!("{}@{}\n", ind, annotation.name)),
        }
    }

    result.push_str(&ind);
    match &statement.kind {
        StatementKind::Wave(decl) => {
            let keyword = match decl.mutability {
                Mutability::Const => "const",
                Mutability::Let => "let",
            };
            result.push_str(&format!("{} {}", keyword, decl.name));
            if let Some(annotation) = &decl.annotation {
                result.push_str(&format!(": {}", pretty_print_type(annotation)));
            }
            if let Some(value) = &decl.value {
                result.push_str(&format!(" = {}", pretty_print_expr(value)));
            }
            result.push_str(";\n");
        }
        StatementKind::Pattern(decl) => {
            result.push_str(&format!("pattern {}: {}", decl.name, decl.relationship));
            if let Some(arrangement) = &decl.arrangement {
                result.push_str(&format!("({}, {})", arrangement.rows, arrangement.cols));
            }
            result.push_str(&format!(" = [{}];\n", pretty_print_list(&decl.members)));
        }
        StatementKind::Field(decl) => {
            let inner_ind = indent_str(indent + 1);
            result.push_str(&format!("field {}", decl.name));
            if let Some(rank) = decl.rank {
                result.push_str(&format!("({})", rank));
            }
            result.push_str(" {\n");
            if let Some(dimensions) = &decl.dimensions {
                result.push_str(&format!(
                    "{}dimensions: {},\n",
                    inner_ind,
                    pretty_print_expr(dimensions)
                ));
            }
            if let Some(waves) = &decl.waves {
                result.push_str(&format!("{}waves: {},\n", inner_ind, pretty_print_expr(waves)));
            }
            if let Some(boundary) = &decl.boundary {
                result.push_str(&format!("{}boundary: {},\n", inner_ind, boundary));
            }
            if let Some(interference) = &decl.interference {
                result.push_str(&format!("{}interference: {},\n", inner_ind, interference));
            }
            result.push_str(&format!("{}}}\n", ind));
        }
        StatementKind::Type(decl) => {
            result.push_str(&format!(
                "type {} = {};\n",
                decl.name,
                pretty_print_type(&decl.target)
            ));
        }
        StatementKind::Function(func) => {
            if func.is_async {
                result.push_str("async ");
            }
            let params: Vec<String> = func
                .params
                .iter()
                .map(|p| match &p.annotation {
                    Some(annotation) => format!("{}: {}", p.name, pretty_print_type(annotation)),
                    None => p.name.to_string(),
                })
                .collect();
            result.push_str(&format!("fn {}({})", func.name, params.join(", ")));
            if let Some(ret) = &func.return_type {
                result.push_str(&format!(" -> {}", pretty_print_type(ret)));
            }
            result.push(' ');
            result.push_str(&pretty_print_block(&func.body, indent));
            result.push('\n');
        }
        StatementKind::Expression(expr) => {
            result.push_str(&format!("{};\n", pretty_print_expr(expr)));
        }
        StatementKind::Try(stmt) => {
            result.push_str("try ");
            result.push_str(&pretty_print_block(&stmt.body, indent));
            result.push_str(" catch ");
            if let Some(binding) = &stmt.binding {
                result.push_str(&format!("{} ", binding));
            }
            result.push_str(&pretty_print_block(&stmt.handler, indent));
            result.push('\n');
        }
        StatementKind::Return(value) => match value {
            Some(expr) => result.push_str(&format!("return {};\n", pretty_print_expr(expr))),
            None => result.push_str("return;\n"),
        },
    }
    result
}

fn pretty_print_block(block: &Block, indent: usize) -> String {
    if block.statements.is_empty() {
        return "{}".to_string();
    }
    let mut result = String::from("{\n");
    for statement in &block.statements {
        result.push_str(&pretty_print_statement(statement, indent + 1));
    }
    result.push_str(&format!("{}}}", indent_str(indent)));
    result
}

fn pretty_print_type(ty: &TypeExpr) -> String {
    let mut result = ty.name.clone();
    if ty.wave_marker {
        result.push('~');
    }
    if !ty.args.is_empty() {
        let args: Vec<String> = ty
            .args
            .iter()
            .map(|arg| match arg {
                TypeArg::Number(n) => n.to_string(),
                TypeArg::Type(inner) => pretty_print_type(inner),
            })
            .collect();
        result.push_str(&format!("<{}>", args.join(", ")));
    }
    result
}

// ============================================================================
// EXPRESSIONS
// ============================================================================

/// Binding strength, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Assign,
    Pipe,
    Range,
    Additive,
    Multiplicative,
    Unary,
    Postfix,
    Primary,
}

fn precedence(expr: &Expr) -> Prec {
    match &expr.kind {
        ExprKind::Assign { .. } => Prec::Assign,
        ExprKind::Pipe(_) => Prec::Pipe,
        ExprKind::Range { .. } => Prec::Range,
        ExprKind::Binary {
            op: BinaryOp::Add | BinaryOp::Sub,
            ..
        } => Prec::Additive,
        ExprKind::Binary { .. } => Prec::Multiplicative,
        ExprKind::Neg(_) => Prec::Unary,
        ExprKind::Call { .. } | ExprKind::Member { .. } => Prec::Postfix,
        _ => Prec::Primary,
    }
}

pub fn pretty_print_expr(expr: &Expr) -> String {
    print_at(expr, Prec::Assign)
}

/// Print `expr` where the context requires at least `min` binding strength.
fn print_at(expr: &Expr, min: Prec) -> String {
    let text = print_bare(expr);
    if precedence(expr) < min {
        format!("({})", text)
    } else {
        text
    }
}

fn print_bare(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Number { value, unit } => match unit {
            Some(unit) => format!("{}{}", value, unit),
            None => value.to_string(),
        },
        ExprKind::Str(s) => quote(s),
        ExprKind::Bool(b) => b.to_string(),
        ExprKind::Identifier { name, wave_marker } => {
            if *wave_marker {
                format!("{}~", name)
            } else {
                name.clone()
            }
        }
        ExprKind::Wave(wave) => pretty_print_wave(wave),
        ExprKind::Pipe(pipe) => {
            let input = print_at(&pipe.input, Prec::Pipe);
            if pipe.args.is_empty() {
                format!("{} | {}", input, pipe.stage)
            } else {
                format!("{} | {}({})", input, pipe.stage, pretty_print_list(&pipe.args))
            }
        }
        ExprKind::Vector(elements) => {
            let elements: Vec<String> = elements.iter().map(print_vector_element).collect();
            format!("<{}>", elements.join(", "))
        }
        ExprKind::Pattern(members) => format!("[{}]", pretty_print_list(members)),
        ExprKind::Binary { op, left, right } => {
            let (left_min, right_min) = match op {
                BinaryOp::Add | BinaryOp::Sub => (Prec::Additive, Prec::Multiplicative),
                BinaryOp::Mul | BinaryOp::Div => (Prec::Multiplicative, Prec::Unary),
            };
            format!(
                "{} {} {}",
                print_at(left, left_min),
                op.symbol(),
                print_at(right, right_min)
            )
        }
        ExprKind::Range { start, end } => format!(
            "{}..{}",
            print_at(start, Prec::Additive),
            print_at(end, Prec::Additive)
        ),
        ExprKind::Neg(operand) => format!("-{}", print_at(operand, Prec::Postfix)),
        ExprKind::Call { callee, args } => {
            format!("{}({})", print_at(callee, Prec::Postfix), pretty_print_list(args))
        }
        ExprKind::Member { object, member } => {
            format!("{}.{}", print_at(object, Prec::Postfix), member)
        }
        ExprKind::Assign { target, value } => {
            format!("{} = {}", target, print_at(value, Prec::Assign))
        }
    }
}

/// Vector elements take no parentheses, so negation is printed bare.
fn print_vector_element(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::Neg(operand) => format!("-{}", print_vector_element(operand)),
        _ => print_bare(expr),
    }
}

/// Positional arguments, switching to named ones when phase is omitted.
fn pretty_print_wave(wave: &WaveExpression) -> String {
    let frequency = pretty_print_expr(&wave.frequency);
    match (&wave.phase, &wave.amplitude) {
        (None, None) => format!("wave({})", frequency),
        (Some(phase), None) => format!("wave({}, {})", frequency, pretty_print_expr(phase)),
        (Some(phase), Some(amplitude)) => format!(
            "wave({}, {}, {})",
            frequency,
            pretty_print_expr(phase),
            pretty_print_expr(amplitude)
        ),
        (None, Some(amplitude)) => format!(
            "wave({}, amplitude: {})",
            frequency,
            pretty_print_expr(amplitude)
        ),
    }
}

fn pretty_print_list(exprs: &[Expr]) -> String {
    exprs
        .iter()
        .map(pretty_print_expr)
        .collect::<Vec<_>>()
        .join(", ")
}

fn quote(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\t' => result.push_str("\\t"),
            c => result.push(c),
        }
    }
    result.push('"');
    result
}

fn indent_str(level: usize) -> String {
    "    ".repeat(level)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Printing is a fixed point after one pass.
    fn assert_stable(source: &str) -> String {
        let printed = round_trip(source).expect("source parses");
        let reprinted = round_trip(&printed).expect("printed source parses");
        assert_eq!(printed, reprinted);
        printed
    }

    #[test]
    fn test_pretty_print_binding() {
        let printed = assert_stable("const   carrier~ : Wave=wave(41.5kHz)|phase(45deg)|amplitude(0.8);");
        assert_eq!(
            printed,
            "const carrier~: Wave = wave(41.5kHz) | phase(45deg) | amplitude(0.8);\n"
        );
    }

    #[test]
    fn test_pretty_print_keeps_needed_parentheses() {
        let printed = assert_stable("let x = (1Hz + 2Hz) * 3;\nlet y = 1 - (2 - 3);\nlet z = -(-x);");
        assert!(printed.contains("(1Hz + 2Hz) * 3"));
        assert!(printed.contains("1 - (2 - 3)"));
        assert!(printed.contains("-(-x)"));

        let printed = assert_stable("let x = 1 + 2 * 3;");
        assert_eq!(printed, "let x = 1 + 2 * 3;\n");
    }

    #[test]
    fn test_pretty_print_declarations() {
        let source = r#"
            /** Two tones. */
            @context("medical")
            pattern chord: parallel = [a, b];
            pattern grid: matrix(2, 1) = [a, b];
            field room(2) { dimensions: <8, 8>, boundary: periodic }
            type Carrier = Wave;
            async fn shift(w: Wave, by: Phase) -> Wave { return w | phase(by); }
            try { risky(); } catch e { log(e); }
        "#;
        let printed = assert_stable(source);
        assert!(printed.contains("/** Two tones. */\n@context(\"medical\")\npattern chord: parallel = [a, b];"));
        assert!(printed.contains("pattern grid: matrix(2, 1) = [a, b];"));
        assert!(printed.contains("field room(2) {\n    dimensions: <8, 8>,\n    boundary: periodic,\n}"));
        assert!(printed.contains("async fn shift(w: Wave, by: Phase) -> Wave {\n    return w | phase(by);\n}"));
        assert!(printed.contains("try {\n    risky();\n} catch e {\n    log(e);\n}"));
    }

    #[test]
    fn test_pretty_print_named_wave_arguments() {
        let printed = assert_stable("const w = wave(amplitude: 0.5, frequency: 1Hz);");
        assert_eq!(printed, "const w = wave(1Hz, amplitude: 0.5);\n");
    }

    #[test]
    fn test_pretty_print_escapes_strings() {
        let printed = assert_stable(r#"log("say \"hi\"\n");"#);
        assert_eq!(printed, "log(\"say \\\"hi\\\"\\n\");\n");
    }

    #[test]
    fn test_round_trip_preserves_tree() {
        let source = "let band = 20Hz..20kHz;\nlet v = <1, -2, x>;\nf = g(1).h;";
        let first = parse(source).expect("parses");
        let second = parse(&pretty_print(&first)).expect("reparses");
        assert_eq!(first.statements.len(), second.statements.len());
        for (a, b) in first.statements.iter().zip(&second.statements) {
            assert_eq!(
                std::mem::discriminant(&a.kind),
                std::mem::discriminant(&b.kind)
            );
        }
    }

    #[test]
    fn test_extreme_numbers_print_exactly() {
        let source = format!("const big = {}Hz;\nconst tiny = 0.000000000001;", f64::MAX);
        let printed = assert_stable(&source);
        assert!(!printed.contains("inf"));
        assert!(printed.contains(&format!("{}Hz", f64::MAX)));
        assert!(printed.contains("0.000000000001;"));
    }
}
