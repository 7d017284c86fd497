//! # Seed Data Generator
//!
//! Populates a database with demo storefront data for development.
//!
//! ## Usage
//! ```bash
//! cargo run -p mercato-db --bin seed
//!
//! # Specify database path
//! cargo run -p mercato-db --bin seed -- --db ./data/mercato.db
//!
//! # Also queue a few test mails for the mail worker
//! cargo run -p mercato-db --bin seed -- --mails 25
//! ```
//!
//! ## Generated Data
//! - Languages: English (default), Deutsch, Français (unpublished)
//! - Countries: Germany, France, Switzerland, United States
//! - One default tax address (Berlin)
//! - Checkout attribute "Gift wrapping"
//! - Slugs for catalog entities in every published language, each with one
//!   retired slug so redirects can be tried out
//! - A local SMTP account (localhost:25) and optional queued mails

use chrono::Utc;
use mercato_core::messaging::{EmailAccount, QueuedEmail};
use mercato_core::seo::slugify;
use mercato_core::{Address, CheckoutAttribute, Country, Language};
use mercato_db::{Database, DbConfig};
use std::env;

/// (code, name, culture, published)
const LANGUAGES: &[(&str, &str, &str, bool)] = &[
    ("en", "English", "en-US", true),
    ("de", "Deutsch", "de-DE", true),
    ("fr", "Français", "fr-FR", false),
];

/// (name, iso, subject_to_vat)
const COUNTRIES: &[(&str, &str, bool)] = &[
    ("Germany", "DE", true),
    ("France", "FR", true),
    ("Switzerland", "CH", false),
    ("United States", "US", false),
];

/// (entity, id, english name, german name)
const CATALOG: &[(&str, i64, &str, &str)] = &[
    ("Category", 1, "Coffee Machines", "Kaffeemaschinen"),
    ("Category", 2, "Grinders", "Mühlen"),
    ("Manufacturer", 1, "Bellaroma", "Bellaroma"),
    ("Product", 1, "Espresso Maker Pro", "Espressomaschine Pro"),
    ("Product", 2, "Burr Grinder & Scale", "Kegelmahlwerk & Waage"),
    ("Product", 3, "Milk Frother", "Milchaufschäumer"),
    ("Topic", 1, "Shipping Info", "Versandinformationen"),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut db_path = String::from("./mercato_dev.db");
    let mut mails: usize = 0;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--mails" | "-m" => {
                if i + 1 < args.len() {
                    mails = args[i + 1].parse().unwrap_or(0);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Mercato Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./mercato_dev.db)");
                println!("  -m, --mails <N>    Number of test mails to queue (default: 0)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Mercato Seed Data Generator");
    println!("==============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if !db.languages().list_published().await?.is_empty() {
        println!("⚠ Database already has languages");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Languages
    let mut languages = Vec::new();
    for (order, (code, name, culture, published)) in LANGUAGES.iter().enumerate() {
        let language = db
            .languages()
            .insert(&Language {
                id: 0,
                name: name.to_string(),
                language_culture: culture.to_string(),
                unique_seo_code: code.to_string(),
                published: *published,
                display_order: order as i32,
            })
            .await?;
        languages.push(language);
    }
    println!("✓ {} languages", languages.len());

    // Countries and the default tax address
    let mut germany = None;
    for (name, iso, subject_to_vat) in COUNTRIES {
        let country = db
            .addresses()
            .insert_country(&Country {
                id: 0,
                name: name.to_string(),
                two_letter_iso_code: iso.to_string(),
                subject_to_vat: *subject_to_vat,
            })
            .await?;
        if *iso == "DE" {
            germany = Some(country);
        }
    }

    let tax_address = db
        .addresses()
        .insert_address(&Address {
            company: Some("Mercato GmbH".into()),
            city: Some("Berlin".into()),
            country: germany,
            ..Default::default()
        })
        .await?;
    println!("✓ {} countries, default tax address #{}", COUNTRIES.len(), tax_address.id);

    db.checkout_attributes()
        .insert(&CheckoutAttribute {
            id: 0,
            name: "Gift wrapping".into(),
            is_tax_exempt: false,
            tax_category_id: 1,
        })
        .await?;

    // Slugs: retired slug first, then the current one
    let mut slugs = 0;
    for (entity, id, english, german) in CATALOG {
        for language in languages.iter().filter(|l| l.published) {
            let name = if language.unique_seo_code == "de" { german } else { english };
            let slug = slugify(name, false);

            db.url_records()
                .save_slug(*id, entity, &format!("{slug}-old"), language.id)
                .await?;
            db.url_records().save_slug(*id, entity, &slug, language.id).await?;
            slugs += 2;
        }
    }
    println!("✓ {} slugs (half of them retired)", slugs);

    // Mail
    let account = db
        .email_accounts()
        .insert(&EmailAccount {
            id: 0,
            email: "shop@mercato.local".into(),
            display_name: Some("Mercato Shop".into()),
            host: "localhost".into(),
            port: 25,
            username: None,
            password: None,
            enable_ssl: false,
        })
        .await?;

    for n in 0..mails {
        db.queued_emails()
            .insert(&QueuedEmail {
                id: 0,
                priority: (n % 3) as i32,
                from: "Mercato Shop <shop@mercato.local>".into(),
                to: format!("customer{n}@example.com"),
                reply_to: None,
                cc: None,
                bcc: None,
                subject: format!("Order #{} confirmation", 1000 + n),
                body: format!("<p>Thank you for order #{}.</p>", 1000 + n),
                created_on_utc: Utc::now(),
                sent_tries: 0,
                sent_on_utc: None,
                email_account_id: account.id,
                send_manually: false,
                attachments: Vec::new(),
            })
            .await?;
    }
    println!("✓ SMTP account #{}, {} queued mails", account.id, mails);

    println!();
    println!("✓ Seed complete!");

    Ok(())
}
