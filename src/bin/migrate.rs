use anyhow::Result;
use ico_ingest::config::Config;
use ico_ingest::repository::Database;

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let database_url = Config::database_url();

    println!("Running migrations on database: {database_url}");

    let _db = Database::new(&database_url)?;

    println!("Migrations completed successfully!");

    Ok(())
}
