use clap::{Parser, Subcommand};
use hooklog_store::app_state::AppState;
use hooklog_store::config::Config;
use hooklog_store::enums::Operation;
use hooklog_store::errors::Error;
use hooklog_store::models::log_message::LogMessage;
use hooklog_store::utils::filters::document_from_json;
use hooklog_store::utils::tracing::init_standard_tracing;
use mongodb::bson::{Bson, Document, doc};

#[derive(Debug, Parser)]
#[command(name = "hooklog", about = "Inspect and maintain the webhook event store")]
struct Cli {
    #[command(flatten)]
    config: Config,

    /// Collection to operate on; defaults to the log collection.
    #[arg(long, short, global = true)]
    collection: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect and ping the server
    Ping,
    /// Print every document, or those matching --filter
    List {
        #[arg(long)]
        filter: Option<String>,
    },
    Count {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Case-insensitive prefix search on the `name` field
    Search { text: String },
    Insert { document: String },
    Delete { id: String },
    DeleteAll,
    DeleteWhere { filter: String },
    Update { id: String, update: String },
    /// Record a webhook event
    Record {
        #[arg(long)]
        org: String,
        #[arg(long)]
        pusher_name: String,
        #[arg(long)]
        pusher_link: String,
        #[arg(long)]
        action_hook: String,
        #[arg(long)]
        repos: String,
    },
}

impl Command {
    fn operation(&self) -> Operation {
        match self {
            Command::Ping => Operation::Ping,
            Command::List { filter: None } => Operation::ListAll,
            Command::List { filter: Some(_) } => Operation::ListFiltered,
            Command::Count { .. } => Operation::Count,
            Command::Search { .. } => Operation::SearchByNamePrefix,
            Command::Insert { .. } | Command::Record { .. } => Operation::Insert,
            Command::Delete { .. } => Operation::DeleteOne,
            Command::DeleteAll => Operation::DeleteAll,
            Command::DeleteWhere { .. } => Operation::DeleteMany,
            Command::Update { .. } => Operation::UpdateOne,
        }
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_standard_tracing(env!("CARGO_CRATE_NAME"), &cli.config.log_level);

    let state = AppState::init(&cli.config);
    let collection = cli
        .collection
        .clone()
        .unwrap_or_else(|| state.log_collection.clone());
    let operation = cli.command.operation();

    if let Err(e) = run(&state, &collection, cli.command).await {
        if e.is_unrecoverable(operation) {
            tracing::error!("{operation} on {collection} failed and cannot be retried: error={e}");
        }
        return Err(e.into());
    }

    Ok(())
}

async fn run(state: &AppState, collection: &str, command: Command) -> Result<(), Error> {
    let ops = &state.ops;

    match command {
        Command::Ping => {
            ops.ping().await?;
            println!("ok");
        }
        Command::List { filter } => {
            let documents = match filter {
                Some(filter) => {
                    ops.list_filtered(collection, document_from_json(&filter)?)
                        .await?
                }
                None => ops.list_all(collection).await?,
            };
            print_documents(documents)?;
        }
        Command::Count { filter } => {
            let filter = filter
                .as_deref()
                .map(document_from_json)
                .transpose()?
                .unwrap_or_default();
            println!("{}", ops.count(collection, filter).await?);
        }
        Command::Search { text } => {
            print_documents(ops.search_by_name_prefix(collection, &text).await?)?;
        }
        Command::Insert { document } => {
            let id = ops.insert(collection, &document_from_json(&document)?).await?;
            print_json(&doc! { "insertedId": id })?;
        }
        Command::Delete { id } => {
            let result = ops.delete_one(collection, &id).await?;
            print_json(&doc! { "deletedCount": result.deleted_count as i64 })?;
        }
        Command::DeleteAll => {
            let result = ops.delete_all(collection).await?;
            print_json(&doc! { "deletedCount": result.deleted_count as i64 })?;
        }
        Command::DeleteWhere { filter } => {
            let result = ops
                .delete_many(collection, document_from_json(&filter)?)
                .await?;
            print_json(&doc! { "deletedCount": result.deleted_count as i64 })?;
        }
        Command::Update { id, update } => {
            let result = ops
                .update_one(collection, &id, document_from_json(&update)?)
                .await?;
            print_json(&doc! {
                "matchedCount": result.matched_count as i64,
                "modifiedCount": result.modified_count as i64,
            })?;
        }
        Command::Record {
            org,
            pusher_name,
            pusher_link,
            action_hook,
            repos,
        } => {
            let message = LogMessage::new(org, pusher_name, pusher_link, action_hook, repos);
            let id = LogMessage::record(ops, collection, &message).await?;
            print_json(&doc! { "insertedId": id })?;
        }
    }

    Ok(())
}

fn print_documents(documents: Vec<Document>) -> Result<(), Error> {
    for document in documents {
        print_json(&document)?;
    }
    Ok(())
}

fn print_json(document: &Document) -> Result<(), Error> {
    let value = Bson::Document(document.clone()).into_relaxed_extjson();
    let line = serde_json::to_string(&value)
        .map_err(|e| Error::internal_err(&format!("Failed to render document: {e}")))?;
    println!("{line}");
    Ok(())
}
