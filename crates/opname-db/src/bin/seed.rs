//! # Seed Data Generator
//!
//! Populates the database with a library catalog for development.
//!
//! ## Usage
//! ```bash
//! # Generate 500 entries (default)
//! cargo run -p opname-db --bin seed
//!
//! # Custom amount, a third of them pre-tagged
//! cargo run -p opname-db --bin seed -- --count 2000 --tagged-every 3
//!
//! # Specify database path
//! cargo run -p opname-db --bin seed -- --db ./data/opname.db
//!
//! # Replace an existing catalog
//! cargo run -p opname-db --bin seed -- --clear
//! ```
//!
//! ## Generated Entries
//! - Item code: `{COLLECTION}-{NNNNN}` (e.g. `FIC-00042`)
//! - Title drawn from the collection's list, with a volume suffix on repeats
//! - Location: `{Room} / Shelf {letter}{n}`
//! - Every Nth entry carries the EPC derived from its item code

use clap::Parser;
use opname_core::epc::derive_target_epc;
use opname_core::CatalogEntry;
use opname_db::{Database, DbConfig};

/// Collections with realistic titles.
const COLLECTIONS: &[(&str, &[&str])] = &[
    (
        "FIC",
        &[
            "Pride and Prejudice",
            "Emma",
            "Persuasion",
            "Middlemarch",
            "Great Expectations",
            "Jane Eyre",
            "Wuthering Heights",
            "Moby-Dick",
            "War and Peace",
            "Anna Karenina",
            "The Brothers Karamazov",
            "Madame Bovary",
            "Les Miserables",
            "Don Quixote",
            "Bumi Manusia",
            "Laskar Pelangi",
        ],
    ),
    (
        "SCI",
        &[
            "A Brief History of Time",
            "The Selfish Gene",
            "Cosmos",
            "The Origin of Species",
            "The Double Helix",
            "Silent Spring",
            "The Structure of Scientific Revolutions",
            "Godel, Escher, Bach",
            "The Feynman Lectures on Physics",
            "What Is Life?",
        ],
    ),
    (
        "HIS",
        &[
            "The Guns of August",
            "SPQR",
            "The Histories",
            "The Decline and Fall of the Roman Empire",
            "Guns, Germs, and Steel",
            "The Rise and Fall of the Third Reich",
            "A People's History of the United States",
            "Nusantara",
        ],
    ),
    (
        "REF",
        &[
            "Oxford English Dictionary",
            "Kamus Besar Bahasa Indonesia",
            "World Atlas",
            "Encyclopaedia Britannica",
            "Chicago Manual of Style",
            "Roget's Thesaurus",
        ],
    ),
];

const ROOMS: &[&str] = &["Main Hall", "Reading Room", "Reference", "Archive"];

#[derive(Debug, Parser)]
#[command(name = "seed", about = "Opname seed data generator")]
struct Args {
    /// Number of catalog entries to generate
    #[arg(short, long, default_value_t = 500)]
    count: usize,

    /// Database file path
    #[arg(short, long, default_value = "./opname_dev.db")]
    db: String,

    /// Pre-tag every Nth entry (0 = none)
    #[arg(short, long, default_value_t = 4)]
    tagged_every: usize,

    /// Delete the existing catalog first
    #[arg(long)]
    clear: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("Opname Seed Data Generator");
    println!("==========================");
    println!("Database: {}", args.db);
    println!("Entries:  {}", args.count);
    println!();

    let db = Database::new(DbConfig::new(&args.db)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if args.clear {
        let removed = db.catalog().clear().await?;
        println!("✓ Cleared {} existing entries", removed);
    }

    let existing = db.catalog().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} catalog entries", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Run with --clear to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating catalog...");

    let start = std::time::Instant::now();
    let mut generated = 0;
    let mut tagged = 0;

    for index in 0..args.count {
        let entry = generate_entry(index, args.tagged_every);
        let is_tagged = entry.is_tagged();

        if let Err(e) = db.catalog().insert(&entry).await {
            eprintln!("Failed to insert {}: {}", entry.item_code, e);
            continue;
        }

        generated += 1;
        if is_tagged {
            tagged += 1;
        }
        if generated % 100 == 0 {
            println!("  Generated {} entries...", generated);
        }
    }

    let elapsed = start.elapsed();
    println!();
    println!("✓ Generated {} entries ({} tagged) in {:?}", generated, tagged, elapsed);

    println!();
    println!("Verifying search...");
    let results = db.catalog().search("emma", 10).await?;
    println!("  Search 'emma': {} results", results.len());
    let results = db.catalog().search("FIC", 10).await?;
    println!("  Search 'FIC': {} results", results.len());

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Builds the `index`-th entry deterministically.
fn generate_entry(index: usize, tagged_every: usize) -> CatalogEntry {
    let (collection, titles) = COLLECTIONS[index % COLLECTIONS.len()];
    let round = index / COLLECTIONS.len();
    let base_title = titles[round % titles.len()];
    let volume = round / titles.len();

    let title = if volume == 0 {
        base_title.to_string()
    } else {
        format!("{} (copy {})", base_title, volume + 1)
    };

    let room = ROOMS[index % ROOMS.len()];
    let shelf = (b'A' + (round % 8) as u8) as char;
    let location = format!("{} / Shelf {}{}", room, shelf, 1 + index % 5);

    // Short codes keep derived EPCs unique (12 bytes fit a 96-bit EPC).
    let item_code = format!("{}-{:05}", collection, index);
    let entry = CatalogEntry::new(item_code, title, location);

    if tagged_every > 0 && index % tagged_every == 0 {
        match derive_target_epc(&entry.item_code) {
            Ok(epc) => entry.with_tag(epc),
            Err(_) => entry,
        }
    } else {
        entry
    }
}
