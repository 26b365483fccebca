use clap::{Parser, Subcommand, ValueEnum};
use folderdb::{Database, DatabaseConfig, Direction, DirectoryMigrationSource, MigrationRunner};
use std::path::PathBuf;
use std::process;

/// folderdb CLI: query and edit a folder-backed database from the command line
#[derive(Parser)]
#[command(name = "folderdb", version, about)]
struct Cli {
    /// Storage root holding database directories
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Database name (a directory under the root)
    #[arg(long, default_value = "db")]
    database: String,

    /// Directory of migration definitions (overrides FOLDERDB_MIGRATIONS_DIR)
    #[arg(long)]
    migrations_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending migrations and list the ones applied
    Migrate,

    /// Show a table's schema
    Schema {
        /// Table name
        table: String,
    },

    /// Query records in a table
    Get {
        /// Table name
        table: String,
        /// Predicate as "column op value" (e.g. --where "age > 18")
        #[arg(long = "where", value_parser = parse_predicate)]
        predicates: Vec<(String, String, String)>,
        /// Sort column with optional direction (e.g. --order-by name:desc)
        #[arg(long, value_parser = parse_order)]
        order_by: Option<(String, Direction)>,
        /// Maximum number of rows
        #[arg(long)]
        limit: Option<usize>,
        /// Columns to keep (e.g. --columns id,name)
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Join another table, via a foreign-key column or the link table
        /// (e.g. --join roles:roleId or --join roles)
        #[arg(long = "join", value_parser = parse_join)]
        joins: Vec<(String, Option<String>)>,
    },

    /// Insert a new record
    Insert {
        /// Table name
        table: String,
        /// Record id (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Field values (e.g. --field name="Alice Chen")
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
        /// Fill omitted columns from schema defaults
        #[arg(long)]
        defaults: bool,
    },

    /// Update an existing record
    Update {
        /// Table name
        table: String,
        /// Record id
        id: String,
        /// Field values to update (e.g. --field age=31)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete a record
    Delete {
        /// Table name
        table: String,
        /// Record id
        id: String,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_predicate(s: &str) -> Result<(String, String, String), String> {
    let mut parts = s.trim().splitn(3, char::is_whitespace);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(column), Some(op), Some(value)) if !column.is_empty() => Ok((
            column.to_string(),
            op.to_string(),
            value.trim().to_string(),
        )),
        _ => Err(format!("Invalid predicate '{s}': expected \"column op value\"")),
    }
}

fn parse_order(s: &str) -> Result<(String, Direction), String> {
    match s.split_once(':') {
        Some((column, direction)) => Ok((column.to_string(), direction.parse()?)),
        None => Ok((s.to_string(), Direction::Asc)),
    }
}

fn parse_join(s: &str) -> Result<(String, Option<String>), String> {
    match s.split_once(':') {
        Some((table, column)) if !column.is_empty() => {
            Ok((table.to_string(), Some(column.to_string())))
        }
        Some((table, _)) => Ok((table.to_string(), None)),
        None => Ok((s.to_string(), None)),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = DatabaseConfig::from_env();
    if let Some(dir) = cli.migrations_dir {
        config = config.with_migrations_dir(dir);
    }

    match cli.command {
        Command::Migrate => {
            let db = Database::attach(&cli.database, &cli.root, config)?;
            let source = DirectoryMigrationSource::new(&db.config().migrations_dir);
            let report = MigrationRunner::new(&db, &source).run()?;
            print_output(
                &serde_json::json!({ "ok": true, "applied": report.applied }),
                &cli.format,
            )?;
        }

        Command::Schema { table } => {
            let db = Database::open_with(&cli.database, &cli.root, config)?;
            let schema = db.schemas().read(&table)?;
            print_output(&serde_json::to_value(&schema)?, &cli.format)?;
        }

        Command::Get {
            table,
            predicates,
            order_by,
            limit,
            columns,
            joins,
        } => {
            let db = Database::open_with(&cli.database, &cli.root, config)?;
            let mut query = db.for_read(&table);
            for (column, op, value) in predicates {
                query.filter(column, op.as_str(), parse_value(&value));
            }
            if let Some((column, direction)) = order_by {
                query.order_by(column, direction);
            }
            if let Some(n) = limit {
                query.limit(n);
            }
            query.columns(columns);
            for (target, column) in &joins {
                query.join(target.as_str(), column.as_deref());
            }

            let rows = query.get()?;
            log::debug!("{} rows from '{}'", rows.len(), table);
            print_output(&serde_json::to_value(&rows)?, &cli.format)?;
        }

        Command::Insert {
            table,
            id,
            fields,
            defaults,
        } => {
            let db = Database::open_with(&cli.database, &cli.root, config)?;
            let mut data = fields_to_record(&fields);
            if let Some(id) = id {
                data.insert("_id".to_string(), serde_json::Value::String(id));
            }

            let mut creator = db.for_create(&table);
            if defaults {
                creator.with_defaults();
            }
            let record = creator.create(data)?;
            print_output(&serde_json::Value::Object(record), &cli.format)?;
        }

        Command::Update { table, id, fields } => {
            let db = Database::open_with(&cli.database, &cli.root, config)?;
            let record = db.for_update(&table).update(&id, fields_to_record(&fields))?;
            print_output(&serde_json::Value::Object(record), &cli.format)?;
        }

        Command::Delete { table, id } => {
            let db = Database::open_with(&cli.database, &cli.root, config)?;
            db.for_delete(&table).delete(&id)?;
            print_output(&serde_json::json!({ "ok": true, "deleted": id }), &cli.format)?;
        }
    }

    Ok(())
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Numbers, booleans, arrays and objects parse as JSON; anything else is a string.
fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn fields_to_record(fields: &[(String, String)]) -> folderdb::Record {
    fields
        .iter()
        .map(|(key, val)| (key.clone(), parse_value(val)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_predicate() {
        assert_eq!(
            parse_predicate("age > 18").unwrap(),
            ("age".to_string(), ">".to_string(), "18".to_string())
        );
        assert_eq!(
            parse_predicate("name = John Doe").unwrap().2,
            "John Doe".to_string()
        );
        assert!(parse_predicate("age").is_err());
    }

    #[test]
    fn test_parse_order_and_join() {
        assert_eq!(
            parse_order("date:desc").unwrap(),
            ("date".to_string(), Direction::Desc)
        );
        assert_eq!(parse_order("name").unwrap().1, Direction::Asc);
        assert!(parse_order("name:sideways").is_err());

        assert_eq!(
            parse_join("roles:roleId").unwrap(),
            ("roles".to_string(), Some("roleId".to_string()))
        );
        assert_eq!(parse_join("roles").unwrap(), ("roles".to_string(), None));
    }

    #[test]
    fn test_fields_to_record() {
        let record = fields_to_record(&[
            ("name".to_string(), "Alice".to_string()),
            ("age".to_string(), "30".to_string()),
            ("active".to_string(), "true".to_string()),
        ]);
        assert_eq!(
            serde_json::Value::Object(record),
            json!({ "name": "Alice", "age": 30, "active": true })
        );
    }
}
