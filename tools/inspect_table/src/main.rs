// tools/inspect_table
//
// Dumps a serialized phrase table image: metadata, syllabary and a sample of
// single-syllable entries per head node. Handy when checking what a build
// pipeline actually produced.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use libjyutping_core::{SyllableId, Table};

#[derive(Parser)]
#[command(about = "Inspect a phrase table image")]
struct Args {
    /// Path to the table image
    table: PathBuf,

    /// Entries to print per syllable
    #[arg(long, default_value_t = 3)]
    sample: usize,

    /// Also list the whole syllabary
    #[arg(long)]
    syllabary: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let table = Table::load(&args.table)?;

    let meta = table.metadata();
    println!("format:        {}", meta.format);
    println!("checksum:      {:#010x}", meta.dict_checksum);
    println!("syllables:     {}", meta.num_syllables);
    println!("entries:       {}", meta.num_entries);

    if args.syllabary {
        for (id, spelling) in table.syllabary().iter().enumerate() {
            println!("  [{id}] {spelling}");
        }
    }

    for (id, spelling) in table.syllabary().iter().enumerate() {
        let mut accessor = table.query_words(id as SyllableId);
        if accessor.exhausted() {
            continue;
        }
        print!("{spelling}:");
        let mut printed = 0;
        while let Some(entry) = accessor.entry(&table) {
            if printed == args.sample {
                print!(" …");
                break;
            }
            print!(" {} ({:.3})", entry.text, entry.weight);
            printed += 1;
            if !accessor.next() {
                break;
            }
        }
        println!();
    }

    Ok(())
}
