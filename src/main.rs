mod config;
mod db;
mod describe;
mod discover;
mod error;
mod fetch;
mod money;
mod parser;
mod pipeline;
mod shopify;
mod transform;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};

use config::Settings;
use pipeline::{Pipeline, RunOptions};
use shopify::{catalog, AdminClient};
use transform::UploadOptions;

#[derive(Parser)]
#[command(name = "shop_mirror", about = "Copy products from a Shopify storefront into your own store")]
struct Cli {
    /// Settings file (default: ./shop_mirror.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the target store's manual collections and existing tags
    Collections,
    /// Scrape and print the product payloads without uploading
    Scrape {
        /// Product, collection or sitemap URL
        url: String,
        /// Max products to scrape
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Scrape, transform and upload products
    Upload {
        /// Product, collection or sitemap URL
        url: String,
        /// Product type (one of the configured product_types)
        #[arg(long)]
        product_type: String,
        /// Tag to apply (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Manual collection title or gid to add products to (repeatable)
        #[arg(long = "collection")]
        collections: Vec<String>,
        /// Price markup in percent (overrides price_markup_percent)
        #[arg(long)]
        markup: Option<u32>,
        /// Append a random suffix to every handle
        #[arg(long)]
        handle_suffix: bool,
        /// Rewrite descriptions with the configured AI service
        #[arg(long)]
        enhance: bool,
        /// Upload even if the ledger shows the product was uploaded before
        #[arg(long)]
        force: bool,
        /// Max products to upload
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show upload ledger totals
    Stats,
    /// Recent uploads table
    History {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let result = match cli.command {
        Commands::Collections => {
            let client = AdminClient::new(&settings)?;
            let catalog = catalog::fetch_collections_and_tags(&client).await?;

            println!("{:>3} | {:<32} | {}", "#", "Collection", "ID");
            println!("{}", "-".repeat(80));
            for (i, c) in catalog.collections.iter().enumerate() {
                println!("{:>3} | {:<32} | {}", i + 1, truncate(&c.title, 32), c.id);
            }
            if !catalog.tags.is_empty() {
                println!("\n--- Tags ---");
                println!("  {}", catalog.tags.join(", "));
            }
            println!("\n{} manual collections, {} tags", catalog.collections.len(), catalog.tags.len());
            Ok(())
        }
        Commands::Scrape { url, limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let pipeline = Pipeline::new(&settings, &conn)?;
            let opts = RunOptions {
                upload: UploadOptions {
                    product_type: String::new(),
                    markup_percent: settings.price_markup_percent,
                    handle_suffix: settings.handle_suffix,
                    metafields: settings.metafields.clone(),
                    ..Default::default()
                },
                limit,
                dry_run: true,
                ..Default::default()
            };
            let stats = pipeline.run(&url, &opts).await?;
            stats.print();
            Ok(())
        }
        Commands::Upload {
            url,
            product_type,
            tags,
            collections,
            markup,
            handle_suffix,
            enhance,
            force,
            limit,
        } => {
            let product_type = settings.validate_product_type(&product_type)?;

            let collection_ids = if collections.is_empty() {
                Vec::new()
            } else {
                let client = AdminClient::new(&settings)?;
                let catalog = catalog::fetch_collections_and_tags(&client).await?;
                catalog.resolve_collections(&collections)?
            };

            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let pipeline = Pipeline::new(&settings, &conn)?;
            let opts = RunOptions {
                upload: UploadOptions {
                    product_type,
                    tags,
                    markup_percent: markup.unwrap_or(settings.price_markup_percent),
                    handle_suffix: handle_suffix || settings.handle_suffix,
                    metafields: settings.metafields.clone(),
                },
                collection_ids,
                limit,
                dry_run: false,
                force,
                enhance,
            };

            let t_run = Instant::now();
            let stats = pipeline.run(&url, &opts).await?;
            println!(
                "Processed {} products in {:.1}s",
                stats.total,
                t_run.elapsed().as_secs_f64()
            );
            stats.print();
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:         {}", s.runs);
            println!("Products:     {}", s.total);
            println!("Uploaded:     {}", s.uploaded);
            println!("Partial:      {}", s.partial);
            println!("Failed:       {}", s.failed);
            println!("Skipped:      {}", s.skipped);
            println!("Failed steps: {}", s.failed_steps);
            Ok(())
        }
        Commands::History { limit } => {
            let conn = db::connect(&settings.db_path)?;
            db::init_schema(&conn)?;
            let rows = db::recent_uploads(&conn, limit)?;
            if rows.is_empty() {
                println!("No uploads yet. Run 'upload' first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<19} | {:<8} | {:<28} | {:<30} | {:>5}",
                "#", "When", "Status", "Handle", "Product", "Fails"
            );
            println!("{}", "-".repeat(108));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<19} | {:<8} | {:<28} | {:<30} | {:>5}",
                    i + 1,
                    truncate(&r.created_at, 19),
                    r.status,
                    truncate(&r.handle, 28),
                    truncate(&r.product_id, 30),
                    r.failed_steps
                );
            }

            let failed: Vec<_> = rows.iter().filter(|r| r.status == "failed").collect();
            if !failed.is_empty() {
                println!("\n--- Failed sources ---");
                for r in &failed {
                    println!("  {}", r.source_url);
                }
            }

            println!("\n{} uploads", rows.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
