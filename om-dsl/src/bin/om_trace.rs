/// Om Front-End Tracer - Shows the flow through Lexer → Parser → Checker → Validator
///
/// Usage: cargo run --bin om-trace -- <file.om> [--rules <rules.toml>] [--json]
///
/// Log verbosity follows `RUST_LOG` (default `om_dsl=info`).
use om_core::{FrontEndOptions, RuleSetConfig};
use om_dsl::lexer::Lexer;
use om_dsl::{pretty_print, FrontEnd};
use std::fs;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct Args {
    path: String,
    rules: Option<String>,
    json: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut path = None;
    let mut rules = None;
    let mut json = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--json" => json = true,
            "--rules" => {
                rules = Some(args.next().ok_or("--rules needs a file path")?);
            }
            other if other.starts_with("--") => return Err(format!("Unknown flag {}", other)),
            other => path = Some(other.to_string()),
        }
    }

    Ok(Args {
        path: path.ok_or("Missing source file")?,
        rules,
        json,
    })
}

fn init_tracing(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("om_dsl=info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("Failed to init subscriber: {}", e);
    }
}

fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: cargo run --bin om-trace -- <file.om> [--rules <rules.toml>] [--json]");
            std::process::exit(2);
        }
    };
    init_tracing(args.json);

    let source = match fs::read_to_string(&args.path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("❌ Failed to read {}: {}", args.path, e);
            std::process::exit(1);
        }
    };

    let rules = match &args.rules {
        Some(path) => {
            let loaded = fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|text| RuleSetConfig::from_toml_str(&text).map_err(|e| e.to_string()));
            match loaded {
                Ok(rules) => rules,
                Err(e) => {
                    eprintln!("❌ Failed to load rule-sets from {}: {}", path, e);
                    std::process::exit(1);
                }
            }
        }
        None => RuleSetConfig::new(),
    };

    println!("╔═══════════════════════════════════════════════════════════════");
    println!("║ OM FRONT-END TRACER");
    println!("╚═══════════════════════════════════════════════════════════════\n");

    println!("📝 INPUT ({}):", args.path);
    println!("{}", source);
    println!();

    println!("🔤 TOKENS:");
    println!("─────────────────────────────────────────────────────────────");
    match Lexer::new(&source).tokenize() {
        Ok(stream) => {
            for token in &stream.tokens {
                println!(
                    "{:>4}:{:<3} {:<14} {}",
                    token.location.line,
                    token.location.column,
                    token.kind.to_string(),
                    token.text
                );
            }
        }
        Err(e) => println!("❌ {}", e),
    }
    println!();

    let outcome = FrontEnd::new(&rules)
        .with_options(FrontEndOptions::from_env())
        .run(&source);

    if let Some(program) = &outcome.program {
        println!("🌳 AST (JSON):");
        println!("─────────────────────────────────────────────────────────────");
        match serde_json::to_string_pretty(program) {
            Ok(json) => println!("{}", json),
            Err(e) => println!("❌ Failed to serialize AST: {}", e),
        }
        println!();

        println!("🔄 ROUND-TRIP:");
        println!("─────────────────────────────────────────────────────────────");
        println!("{}", pretty_print(program));
    }

    println!("🩺 DIAGNOSTICS (stopped after {}):", outcome.stage);
    println!("─────────────────────────────────────────────────────────────");
    for diagnostic in &outcome.diagnostics {
        println!("{}", diagnostic);
        for suggestion in &diagnostic.suggestions {
            println!("    help: {}", suggestion);
        }
    }
    println!();
    println!("Source hash: {}", outcome.source_hash);

    if outcome.is_success() {
        println!("✅ Compiled cleanly");
    } else {
        println!("❌ {} error(s)", outcome.errors().count());
        std::process::exit(1);
    }
}
