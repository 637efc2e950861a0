//! `semsql` - a smoke-test harness for the compiler library, not a server.
//!
//! HTTP transport and YAML/config ingestion of the semantic model are out
//! of scope for the core compiler and live upstream in a real
//! deployment. This binary instead registers a small fixture registry
//! in-process (`Employees`/`Productivity` cubes wired together by a
//! `hasMany` join) and compiles a [`SemanticQuery`] read as JSON from a
//! file or stdin, printing `{sql, params, annotation}` to stdout.
//!
//! ```text
//! semsql compile query.json --dialect postgres
//! semsql explain query.json --dialect duckdb
//! echo '{"measures":["Employees.count"]}' | semsql compile -
//! ```

use std::io::Read as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use semsql::model::dimension::column_resolver;
use semsql::model::join::JoinKeyPair;
use semsql::model::{AggregateType, Cube, CubeJoin, CubeRegistry, CubeRelation, DataType, Dimension, Measure, Relationship};
use semsql::query::context::{QueryContext, SecurityContext};
use semsql::query::semantic_query::{DateRangeInput, FilterCondition, FilterNode, FilterOperator, OrderDirection, SemanticQuery, TimeDimensionRequest};
use semsql::sql::select::TableRef;
use semsql::sql::Dialect;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "semsql")]
#[command(about = "Semantic query compiler - compiles a SemanticQuery to dialect-aware SQL")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a query (JSON file, or `-` for stdin) to SQL.
    Compile {
        file: PathBuf,
        #[arg(short, long, default_value = "postgres")]
        dialect: DialectArg,
        /// Database name threaded into `QueryContext`.
        #[arg(long, default_value = "db")]
        db: String,
        /// JSON security-context payload threaded into every cube's `sql(ctx)`.
        #[arg(long)]
        security: Option<String>,
    },
    /// Identical to `compile` - this crate never executes a query, so
    /// there is no separate "dry run" step to skip.
    Explain {
        file: PathBuf,
        #[arg(short, long, default_value = "postgres")]
        dialect: DialectArg,
        #[arg(long, default_value = "db")]
        db: String,
        #[arg(long)]
        security: Option<String>,
    },
    /// List the cubes, dimensions, and measures in the fixture registry.
    ListCubes,
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Postgres,
    Mysql,
    Sqlite,
    Duckdb,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
            DialectArg::Sqlite => Dialect::Sqlite,
            DialectArg::Duckdb => Dialect::DuckDb,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compile { file, dialect, db, security } => run(file, dialect, db, security, false),
        Commands::Explain { file, dialect, db, security } => run(file, dialect, db, security, true),
        Commands::ListCubes => cmd_list_cubes(),
    }
}

fn run(file: PathBuf, dialect: DialectArg, db: String, security: Option<String>, explain: bool) -> ExitCode {
    let source = match read_input(&file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error reading '{}': {}", file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let raw: Value = match serde_json::from_str(&source) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("invalid JSON query: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let query = match parse_query(&raw) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("invalid query shape: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let security_value = match &security {
        Some(raw) => match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("invalid --security JSON: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Value::Null,
    };
    let ctx = QueryContext::new(db, SecurityContext::new(security_value));

    let registry = fixture_registry();
    let result = if explain {
        semsql::compile::explain(&registry, &query, &ctx, dialect.into())
    } else {
        semsql::compile::compile(&registry, &query, &ctx, dialect.into())
    };

    match result {
        Ok(output) => {
            let payload = serde_json::json!({
                "sql": output.sql,
                "params": output.params,
                "annotation": output.annotation,
                "warnings": output.warnings,
            });
            println!("{}", serde_json::to_string_pretty(&payload).unwrap());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("compile error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn read_input(file: &PathBuf) -> std::io::Result<String> {
    if file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read_to_string(file)
    }
}

fn cmd_list_cubes() -> ExitCode {
    let registry = fixture_registry();
    for cube in registry.iter() {
        println!("{}:", cube.name);
        let mut dims: Vec<_> = cube.dimensions.keys().collect();
        dims.sort();
        for d in dims {
            println!("  dimension {}", d);
        }
        let mut measures: Vec<_> = cube.measures.keys().collect();
        measures.sort();
        for m in measures {
            println!("  measure   {}", m);
        }
        for join in &cube.joins {
            println!("  join -> {} ({:?})", join.target_cube, join.relationship);
        }
    }
    ExitCode::SUCCESS
}

// ============================================================================
// Query JSON -> SemanticQuery
// ============================================================================

fn parse_query(raw: &Value) -> Result<SemanticQuery, String> {
    let mut query = SemanticQuery::new();

    if let Some(measures) = raw.get("measures").and_then(Value::as_array) {
        for m in measures {
            query.measures.push(as_str(m)?.to_string());
        }
    }
    if let Some(dims) = raw.get("dimensions").and_then(Value::as_array) {
        for d in dims {
            query.dimensions.push(as_str(d)?.to_string());
        }
    }
    if let Some(tds) = raw.get("timeDimensions").and_then(Value::as_array) {
        for td in tds {
            query.time_dimensions.push(parse_time_dimension(td)?);
        }
    }
    if let Some(filters) = raw.get("filters").and_then(Value::as_array) {
        for f in filters {
            query.filters.push(parse_filter_node(f)?);
        }
    }
    if let Some(order) = raw.get("order").and_then(Value::as_object) {
        for (field, dir) in order {
            let direction = match as_str(dir)? {
                "desc" | "DESC" => OrderDirection::Desc,
                _ => OrderDirection::Asc,
            };
            query.order.push((field.clone(), direction));
        }
    }
    if let Some(limit) = raw.get("limit").and_then(Value::as_i64) {
        query.limit = Some(limit);
    }
    if let Some(offset) = raw.get("offset").and_then(Value::as_i64) {
        query.offset = Some(offset);
    }

    Ok(query)
}

fn parse_time_dimension(v: &Value) -> Result<TimeDimensionRequest, String> {
    let dimension = v.get("dimension").and_then(Value::as_str).ok_or("timeDimensions[].dimension is required")?.to_string();
    let granularity = match v.get("granularity").and_then(Value::as_str) {
        Some(g) => Some(parse_granularity(g)?),
        None => None,
    };
    let date_range = match v.get("dateRange") {
        Some(Value::String(s)) => Some(DateRangeInput::Relative(s.clone())),
        Some(Value::Array(arr)) if arr.len() == 2 => Some(DateRangeInput::Absolute(
            as_str(&arr[0])?.to_string(),
            as_str(&arr[1])?.to_string(),
        )),
        Some(_) => return Err("dateRange must be a string or a two-element array".to_string()),
        None => None,
    };
    Ok(TimeDimensionRequest { dimension, granularity, date_range })
}

fn parse_granularity(s: &str) -> Result<semsql::model::Granularity, String> {
    use semsql::model::Granularity::*;
    Ok(match s {
        "second" => Second,
        "minute" => Minute,
        "hour" => Hour,
        "day" => Day,
        "week" => Week,
        "month" => Month,
        "quarter" => Quarter,
        "year" => Year,
        other => return Err(format!("unknown granularity '{}'", other)),
    })
}

fn parse_filter_node(v: &Value) -> Result<FilterNode, String> {
    if let Some(and) = v.get("and").and_then(Value::as_array) {
        let children = and.iter().map(parse_filter_node).collect::<Result<Vec<_>, _>>()?;
        return Ok(FilterNode::And(children));
    }
    if let Some(or) = v.get("or").and_then(Value::as_array) {
        let children = or.iter().map(parse_filter_node).collect::<Result<Vec<_>, _>>()?;
        return Ok(FilterNode::Or(children));
    }

    let member = v.get("member").and_then(Value::as_str).ok_or("filter condition requires 'member'")?.to_string();
    let operator = parse_operator(v.get("operator").and_then(Value::as_str).ok_or("filter condition requires 'operator'")?)?;
    let values = v.get("values").and_then(Value::as_array).cloned().unwrap_or_default();
    let mut condition = FilterCondition::new(member, operator, values);
    condition.date_range = match v.get("dateRange") {
        Some(Value::String(s)) => Some(DateRangeInput::Relative(s.clone())),
        Some(Value::Array(arr)) if arr.len() == 2 => {
            Some(DateRangeInput::Absolute(as_str(&arr[0])?.to_string(), as_str(&arr[1])?.to_string()))
        }
        _ => None,
    };
    Ok(FilterNode::Condition(condition))
}

fn parse_operator(s: &str) -> Result<FilterOperator, String> {
    use FilterOperator::*;
    Ok(match s {
        "equals" => Equals,
        "notEquals" => NotEquals,
        "contains" => Contains,
        "notContains" => NotContains,
        "startsWith" => StartsWith,
        "endsWith" => EndsWith,
        "like" => Like,
        "notLike" => NotLike,
        "ilike" => ILike,
        "regex" => Regex,
        "notRegex" => NotRegex,
        "gt" => Gt,
        "gte" => Gte,
        "lt" => Lt,
        "lte" => Lte,
        "set" => Set,
        "notSet" => NotSet,
        "inDateRange" => InDateRange,
        "beforeDate" => BeforeDate,
        "afterDate" => AfterDate,
        "between" => Between,
        "notBetween" => NotBetween,
        "in" => In,
        "notIn" => NotIn,
        "isEmpty" => IsEmpty,
        "isNotEmpty" => IsNotEmpty,
        "arrayContains" => ArrayContains,
        "arrayContained" => ArrayContained,
        "arrayOverlaps" => ArrayOverlaps,
        other => return Err(format!("unknown operator '{}'", other)),
    })
}

fn as_str(v: &Value) -> Result<&str, String> {
    v.as_str().ok_or_else(|| format!("expected a string, got {}", v))
}

// ============================================================================
// Fixture registry - Employees/Productivity
// ============================================================================

fn fixture_registry() -> CubeRegistry {
    let mut registry = CubeRegistry::new();

    let employees = Cube::new(
        "Employees",
        Arc::new(|_ctx| CubeRelation {
            from: TableRef::new("employees", None),
            where_: None,
        }),
    )
    .with_dimension(Dimension::new("id", DataType::Number, column_resolver("employees", "id")).primary_key(true))
    .with_dimension(Dimension::new(
        "organisationId",
        DataType::Number,
        column_resolver("employees", "organisation_id"),
    ))
    .with_dimension(Dimension::new(
        "departmentId",
        DataType::Number,
        column_resolver("employees", "department_id"),
    ))
    .with_measure("count", Measure::aggregate(AggregateType::Count, column_resolver("employees", "id")))
    .with_join(CubeJoin::new(
        "Productivity",
        Relationship::HasMany,
        vec![JoinKeyPair {
            source_col: "id".into(),
            target_col: "employee_id".into(),
        }],
    ));

    let productivity = Cube::new(
        "Productivity",
        Arc::new(|_ctx| CubeRelation {
            from: TableRef::new("productivity", None),
            where_: None,
        }),
    )
    .with_dimension(Dimension::new(
        "createdAt",
        DataType::Time,
        column_resolver("productivity", "created_at"),
    ))
    .with_measure(
        "totalLines",
        Measure::aggregate(AggregateType::Sum, column_resolver("productivity", "lines")),
    );

    registry.register(employees);
    registry.register(productivity);
    registry
}
