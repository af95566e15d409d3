#![warn(clippy::all, clippy::pedantic, clippy::cargo, clippy::nursery)]

mod logging;

use anyhow::{Context as _, Result as AnyResult};
use dotenv::dotenv;
use kv_store::{Field, Query};
use order_store::{database, Database, MiniHeaderField, OrderField};
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use structopt::StructOpt;
use tokio::runtime;
use tracing::info;

use self::logging::LogOptions;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\n",
    env!("COMMIT_SHA"),
    " ",
    env!("COMMIT_DATE"),
    "\n",
    env!("TARGET"),
    " ",
    env!("BUILD_DATE"),
    "\n",
    env!("CARGO_PKG_AUTHORS"),
    "\n",
    env!("CARGO_PKG_DESCRIPTION"),
);

#[derive(StructOpt)]
struct Options {
    #[structopt(flatten)]
    log:      LogOptions,
    #[structopt(flatten)]
    database: database::Options,
    #[structopt(subcommand)]
    command:  Command,
}

#[derive(Clone, PartialEq, Eq, Debug, StructOpt)]
enum Command {
    /// Print record counts and the stored metadata.
    Stats,
    /// Print the orders matching a JSON query.
    FindOrders {
        #[structopt(long, default_value = "{}")]
        query: String,
    },
    /// Print the block headers matching a JSON query.
    FindMiniHeaders {
        #[structopt(long, default_value = "{}")]
        query: String,
    },
    /// Delete the orders matching a JSON query and print them.
    DeleteOrders {
        #[structopt(long)]
        query: String,
    },
}

async fn run(database: &Database, command: Command) -> AnyResult<JsonValue> {
    Ok(match command {
        Command::Stats => {
            let metadata = match database.get_metadata().await {
                Ok(metadata) => Some(metadata),
                Err(database::Error::NotFound) => None,
                Err(error) => return Err(error).context("Error reading metadata"),
            };
            json!({
                "orders": database.count_orders(Query::new()).await?,
                "miniHeaders": database.count_mini_headers(Query::new()).await?,
                "metadata": metadata,
            })
        }
        Command::FindOrders { query } => {
            let query = parse_query::<OrderField>(&query)?;
            serde_json::to_value(database.find_orders(query).await?)?
        }
        Command::FindMiniHeaders { query } => {
            let query = parse_query::<MiniHeaderField>(&query)?;
            serde_json::to_value(database.find_mini_headers(query).await?)?
        }
        Command::DeleteOrders { query } => {
            let query = parse_query::<OrderField>(&query)?;
            let deleted = database.delete_orders(query).await?;
            info!(count = deleted.len(), "Deleted orders");
            serde_json::to_value(deleted)?
        }
    })
}

fn parse_query<F: Field + DeserializeOwned>(json: &str) -> AnyResult<Query<F>> {
    serde_json::from_str(json).with_context(|| format!("Invalid query: {}", json))
}

fn main() -> AnyResult<()> {
    dotenv().ok();
    // Parse CLI and handle help and version (which will stop the application).
    let matches = Options::clap().long_version(VERSION).get_matches();
    let options = Options::from_clap(&matches);

    options.log.init()?;

    runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Error creating Tokio runtime")?
        .block_on(async {
            let database = Database::open(options.database)
                .await
                .context("Error opening database")?;
            let output = run(&database, options.command).await?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok::<_, anyhow::Error>(())
        })?;

    info!("program terminating normally");
    Ok(())
}
