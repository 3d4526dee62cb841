//! Add a time stamped line to a file in the temp directory and print all stored lines.
//!
//! Run with `RUST_LOG=debug` to see every line being indexed, added and retrieved.

use std::time::{SystemTime, UNIX_EPOCH};

use async_std::path::PathBuf;
use line_file::LineFile;

#[async_std::main]
async fn main() -> line_file::Result<()> {
    env_logger::init();

    let path = PathBuf::from(std::env::temp_dir().join("Test.txt"));
    let file = LineFile::open(&path).await?;
    println!(
        "{} ({}, {:?} line breaks)",
        path.display(),
        file.options().encoding,
        file.options().terminator
    );

    // Index the existing lines
    file.initialize().await?;

    // Only one line per second of the minute, all others are duplicates
    let second = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() % 60)
        .unwrap_or_default();
    let added = file.add_distinct(&format!("TIME Now {}", second)).await?;
    println!("added: {}", added);

    for line in file.retrieve_in_file_order().await? {
        println!("{}", line);
    }

    Ok(())
}
