//! polydb - Main entry point.
//!
//! Connects to the backend named by `--url`, runs one command and disconnects.

use clap::Parser;
use mongodb::bson::{Bson, Document};
use polydb::config::{BackendKind, Command, Config};
use polydb::db::{AnyStore, DataOperation, DbInterface, MongoStore};
use polydb::error::{DbError, DbResult};
use polydb::models::{Row, row_from_json, row_to_json};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    let (kind, backend) = config.backend()?;
    info!(backend = %kind, "Starting polydb v{}", env!("CARGO_PKG_VERSION"));

    let mut store = AnyStore::new(kind, Arc::new(backend)).with_max_retries(config.max_retries);

    // Ctrl-C cancels reconnect backoff and ends watches
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    if let Err(e) = store.connect().await {
        warn!(backend = %kind, error = %e, "Initial connect failed, retrying");
        store.reconnect(&cancel).await?;
    }

    let result = run(&store, config.command, cancel).await;
    store.disconnect().await?;

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        if let Some(hint) = e.suggestion() {
            eprintln!("hint: {}", hint);
        }
        return Err(e.into());
    }
    Ok(())
}

async fn run(store: &AnyStore, command: Command, cancel: CancellationToken) -> DbResult<()> {
    if let Command::Ping = command {
        store.ping().await?;
        println!("{} is reachable", store.backend());
        return Ok(());
    }

    match store {
        AnyStore::Redis(redis) => match command {
            Command::Get { key } => println!("{}", redis.get(&key).await?),
            Command::Set {
                key,
                value,
                ttl_secs,
            } => {
                let ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs));
                redis.set(&key, &value, ttl).await?;
                println!("OK");
            }
            Command::Del { key } => println!("{}", redis.delete(&key).await?),
            Command::Exists { key } => println!("{}", redis.exists(&key).await?),
            other => return Err(unsupported(&other, BackendKind::Redis)),
        },
        AnyStore::Etcd(etcd) => match command {
            Command::Get { key } => println!("{}", etcd.get_string(&key).await?),
            Command::Set { key, value, .. } => {
                etcd.put(&key, value).await?;
                println!("OK");
            }
            Command::Del { key } => println!("{}", etcd.delete(&key).await?),
            Command::Watch { key } => {
                let mut watch = etcd.watch(&key, cancel).await?;
                while let Some(event) = watch.next_event().await? {
                    println!("{}", serde_json::json!({
                        "kind": event.kind,
                        "key": event.key_str(),
                        "value": event.value_str(),
                        "revision": event.revision,
                    }));
                }
            }
            other => return Err(unsupported(&other, BackendKind::Etcd)),
        },
        AnyStore::MongoDB(mongo) => run_document(mongo, command).await?,
        AnyStore::SqlServer(sql) => run_relational(sql, command).await?,
        AnyStore::PostgreSQL(sql) => run_relational(sql, command).await?,
    }
    Ok(())
}

async fn run_document(store: &MongoStore, command: Command) -> DbResult<()> {
    match command {
        Command::Insert { collection, data } => {
            store.create(&collection, &parse_document("data", &data)?).await?;
            println!("OK");
        }
        Command::Read { collection, filter } => {
            let document = store.read(&collection, &parse_document("filter", &filter)?).await?;
            println!("{:#}", document_to_json(document));
        }
        Command::List { collection, filter } => {
            let documents = store.list(&collection, &parse_document("filter", &filter)?).await?;
            let json: Vec<_> = documents.into_iter().map(document_to_json).collect();
            println!("{:#}", JsonValue::Array(json));
        }
        Command::Update {
            collection,
            filter,
            set,
        } => {
            let filter = parse_document("filter", &filter)?;
            let update = parse_document("set", &set)?;
            println!("{}", store.update(&collection, &filter, &update).await?);
        }
        Command::Delete { collection, filter } => {
            let filter = parse_document("filter", &filter)?;
            println!("{}", store.delete(&collection, &filter).await?);
        }
        other => return Err(unsupported(&other, BackendKind::MongoDB)),
    }
    Ok(())
}

async fn run_relational<S>(store: &S, command: Command) -> DbResult<()>
where
    S: DataOperation<Record = Row, Filter = Row, Update = Row>,
{
    match command {
        Command::Insert { collection, data } => {
            store.create(&collection, &parse_row("data", &data)?).await?;
            println!("OK");
        }
        Command::Read { collection, filter } => {
            let row = store.read(&collection, &parse_row("filter", &filter)?).await?;
            println!("{:#}", row_to_json(&row));
        }
        Command::List { collection, filter } => {
            let rows = store.list(&collection, &parse_row("filter", &filter)?).await?;
            let json: Vec<_> = rows.iter().map(row_to_json).collect();
            println!("{:#}", JsonValue::Array(json));
        }
        Command::Update {
            collection,
            filter,
            set,
        } => {
            let filter = parse_row("filter", &filter)?;
            let changes = parse_row("set", &set)?;
            println!("{}", store.update(&collection, &filter, &changes).await?);
        }
        Command::Delete { collection, filter } => {
            let filter = parse_row("filter", &filter)?;
            println!("{}", store.delete(&collection, &filter).await?);
        }
        other => return Err(unsupported(&other, store.backend())),
    }
    Ok(())
}

fn parse_json(label: &str, raw: &str) -> DbResult<JsonValue> {
    serde_json::from_str(raw)
        .map_err(|e| DbError::invalid_input(format!("--{} is not valid JSON: {}", label, e)))
}

fn parse_row(label: &str, raw: &str) -> DbResult<Row> {
    row_from_json(parse_json(label, raw)?)
}

fn parse_document(label: &str, raw: &str) -> DbResult<Document> {
    mongodb::bson::to_document(&parse_json(label, raw)?)
        .map_err(|e| DbError::invalid_input(format!("--{} is not a JSON object: {}", label, e)))
}

fn document_to_json(document: Document) -> JsonValue {
    Bson::Document(document).into_relaxed_extjson()
}

fn unsupported(command: &Command, backend: BackendKind) -> DbError {
    DbError::invalid_input(format!("{:?} is not supported by {}", command, backend))
}
