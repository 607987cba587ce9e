//! twoway — render two-way SQL templates from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Render with a context
//! twoway render "select * from emp where id = /*id*/0" --context '{"id": 7}'
//!
//! # Show the parsed template
//! twoway explain "select * from emp /*%if id != null*/where id = /*id*/0/*%end*/"
//!
//! # Evaluate a directive expression
//! twoway eval 'name.startsWith("A")' --context '{"name": "Anna"}'
//! ```

use std::fs;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use qail_twoway::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "twoway")]
#[command(version)]
#[command(about = "Two-way SQL templates: plain SQL in, bound statements out", long_about = None)]
#[command(after_help = "EXAMPLES:
    twoway render \"select * from emp where id = /*id*/0\" --context '{\"id\": 7}'
    twoway page @query.sql --limit 10 --offset 20
    twoway eval 'name.startsWith(\"A\")' --context '{\"name\": \"Anna\"}'")]
struct Cli {
    /// SQL dialect (defaults to twoway.toml, then postgres)
    #[arg(short, long, global = true, env = "TWOWAY_DIALECT")]
    dialect: Option<Dialect>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(clap::Args)]
struct TemplateArgs {
    /// Template text, or @path to read it from a file
    template: String,

    /// Context as a JSON object
    #[arg(short, long)]
    context: Option<String>,

    /// Columns written by /*%expand*/
    #[arg(long, value_delimiter = ',')]
    columns: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template into SQL and bind values
    Render(TemplateArgs),
    /// Render the counting variant of a template
    Count(TemplateArgs),
    /// Render a template with limit and offset
    Page {
        #[command(flatten)]
        args: TemplateArgs,
        #[arg(long)]
        limit: Option<u64>,
        #[arg(long)]
        offset: Option<u64>,
    },
    /// Print the parsed template tree as JSON
    Explain {
        /// Template text, or @path
        template: String,
    },
    /// Evaluate a directive expression
    Eval {
        expression: String,
        #[arg(short, long)]
        context: Option<String>,
    },
    /// List supported dialects
    Dialects,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = Config::load().context("loading configuration")?;
    if let Some(dialect) = cli.dialect {
        config.dialect = dialect;
    }
    let engine = TemplateEngine::from_config(&config);

    match &cli.command {
        Commands::Render(args) => {
            let sql = template_query(&engine, args)?.render()?;
            print_sql(&sql, cli.format)
        }
        Commands::Count(args) => {
            let sql = template_query(&engine, args)?.render_count()?;
            print_sql(&sql, cli.format)
        }
        Commands::Page { args, limit, offset } => {
            let sql = template_query(&engine, args)?.render_paginated(*limit, *offset)?;
            print_sql(&sql, cli.format)
        }
        Commands::Explain { template } => {
            let ast = engine.parse(&read_template(template)?)?;
            println!("{}", serde_json::to_string_pretty(&*ast)?);
            Ok(())
        }
        Commands::Eval { expression, context } => {
            let ctx = parse_context(context.as_deref())?;
            let result = engine.evaluator().evaluate_str(expression, &ctx)?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                OutputFormat::Text => println!(
                    "{} {}",
                    engine.dialect().format_value(&result).white(),
                    format!("({:?})", result.data_type).dimmed()
                ),
            }
            Ok(())
        }
        Commands::Dialects => {
            for dialect in Dialect::ALL {
                let marker = if dialect == config.dialect { "✓".green() } else { " ".normal() };
                println!(
                    "{} {:10} {}",
                    marker,
                    dialect.name().cyan(),
                    format!("upsert: {:?}", dialect.upsert_style()).dimmed()
                );
            }
            Ok(())
        }
    }
}

fn template_query<'e>(engine: &'e TemplateEngine, args: &TemplateArgs) -> Result<TemplateQuery<'e>> {
    let template = read_template(&args.template)?;
    let query = engine
        .query(&template)
        .context(parse_context(args.context.as_deref())?);
    Ok(if args.columns.is_empty() {
        query
    } else {
        query.columns(args.columns.iter().cloned())
    })
}

fn read_template(arg: &str) -> Result<String> {
    match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path).with_context(|| format!("reading template {}", path)),
        None => Ok(arg.to_string()),
    }
}

fn parse_context(json: Option<&str>) -> Result<ExprContext> {
    let Some(json) = json else {
        return Ok(ExprContext::new());
    };
    let value: serde_json::Value = serde_json::from_str(json).context("parsing --context")?;
    match value {
        serde_json::Value::Object(fields) => Ok(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
        _ => bail!("--context must be a JSON object"),
    }
}

fn print_sql(sql: &BoundSql, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(sql)?),
        OutputFormat::Text => {
            println!("{}", "SQL:".green().bold());
            println!("  {}", sql.text.white());
            if !sql.values.is_empty() {
                println!();
                println!("{}", "Bindings:".cyan());
                for (i, v) in sql.values.iter().enumerate() {
                    println!("  {} = {} {}", i + 1, v.value.to_plain_string().yellow(), format!("({:?})", v.data_type).dimmed());
                }
            }
            println!();
            println!("{}", "Log:".green().bold());
            println!("  {}", sql.log.dimmed());
        }
    }
    Ok(())
}
