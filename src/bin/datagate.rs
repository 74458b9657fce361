use datagate::config::{self, GatewayConfig};
use datagate::{ConnectionDescriptor, DataTable, Gateway, GatewayError, Parameter, Result, StatementRequest};
use serde_json::{json, Map, Value as Json};
use std::process::ExitCode;
use tracing::info;

const USAGE: &str = "usage: datagate <connection-string> <command> [sql] [name=value ...]

commands:
  probe             check that the database can be opened
  count <sql>       print the first cell as an integer
  scalar <sql>      print the first cell
  exec <sql>        run a mutation and print the affected row count
  query <sql>       print all rows as JSON
  schema <sql>      print the result columns as JSON";

fn main() -> ExitCode {
    // Initialize the logging system using tracing subscriber
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    }

    match run(&args) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &[String]) -> Result<String> {
    let gateway = Gateway::new(load_config()?);
    let descriptor: ConnectionDescriptor = args[0].parse()?;
    let command = args[1].as_str();
    info!(%descriptor, command, "starting datagate");

    if command == "probe" {
        gateway.probe(&descriptor)?;
        return Ok(format!("ok: {}", descriptor.host()));
    }

    let request = build_request(&args[2..])?;
    match command {
        "count" => Ok(gateway.get_count(&descriptor, &request)?.to_string()),
        "scalar" => Ok(gateway
            .execute_scalar(&descriptor, &request)?
            .map(|v| v.to_string())
            .unwrap_or_else(|| "NULL".to_string())),
        "exec" => Ok(gateway.execute_non_query(&descriptor, &request)?.to_string()),
        "query" => {
            let mut table = DataTable::new();
            gateway.fill(&descriptor, &mut table, &request)?;
            Ok(serde_json::to_string_pretty(&rows_as_json(&table))?)
        }
        "schema" => {
            let mut table = DataTable::new();
            gateway.fill_schema(&descriptor, &mut table, &request)?;
            Ok(serde_json::to_string_pretty(table.columns())?)
        }
        other => Err(GatewayError::Config(format!("unknown command '{}'\n\n{}", other, USAGE))),
    }
}

/// Reads the configuration named by `DATAGATE_CONFIG`, else the per-user one.
fn load_config() -> Result<GatewayConfig> {
    match std::env::var_os("DATAGATE_CONFIG") {
        Some(path) => config::load_config(path),
        None => config::load_default_config(),
    }
}

fn build_request(args: &[String]) -> Result<StatementRequest> {
    let (sql, params) = args
        .split_first()
        .ok_or_else(|| GatewayError::Config(format!("missing SQL statement\n\n{}", USAGE)))?;

    params.iter().try_fold(StatementRequest::new(sql.as_str()), |request, arg| {
        let (name, value) = arg
            .split_once('=')
            .ok_or_else(|| GatewayError::Config(format!("expected name=value, found '{}'", arg)))?;
        let value = match value.parse::<i64>() {
            Ok(i) => datagate::Value::Integer(i),
            Err(_) => datagate::Value::from(value),
        };
        Ok(request.param(Parameter::input(name, value)))
    })
}

fn rows_as_json(table: &DataTable) -> Json {
    let names = table.column_names();
    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let object: Map<String, Json> = names
                .iter()
                .cloned()
                .zip(row.values().iter().map(|v| json!(v)))
                .collect();
            Json::Object(object)
        })
        .collect();
    Json::Array(rows)
}
