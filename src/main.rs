use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info, warn};

use outfit_studio::OutfitStudio;
use outfit_studio::config::Config;
use outfit_studio::database::SqliteQuotaStore;
use outfit_studio::encoder::{HttpFetcher, ImageEncoder};
use outfit_studio::gemini::{self, GeminiClient};
use outfit_studio::models::{ClothingItem, GenerationState, ImageSource, Slot, Wardrobe};
use outfit_studio::presets::AssetLibrary;
use outfit_studio::quota::{MemoryQuotaStore, QuotaTracker};
use outfit_studio::traits::QuotaStore;

#[derive(Parser)]
#[command(name = "outfit-studio", version, about = "Compose an outfit and render it with Gemini")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one outfit image
    Generate(GenerateArgs),
    /// Show how many generations are left today
    Quota {
        /// Use an in-memory quota instead of the database
        #[arg(long)]
        ephemeral: bool,
    },
    /// Print a random outfit from the preset library
    Presets {
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Images are file paths or http(s) URLs
#[derive(Args)]
struct GenerateArgs {
    #[arg(long)]
    profile: Option<String>,
    #[arg(long)]
    headwear: Vec<String>,
    #[arg(long)]
    upper_body: Vec<String>,
    #[arg(long)]
    lower_body: Vec<String>,
    #[arg(long)]
    footwear: Vec<String>,
    #[arg(long = "accessory")]
    accessories: Vec<String>,
    /// Start from a random preset outfit; explicit images replace the preset in their slot
    #[arg(long)]
    random: bool,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, short, default_value = "outfit.png")]
    output: PathBuf,
    /// Use an in-memory quota instead of the database
    #[arg(long)]
    ephemeral: bool,
}

impl GenerateArgs {
    fn slot_args(&self, slot: Slot) -> &[String] {
        match slot {
            Slot::Headwear => &self.headwear,
            Slot::UpperBody => &self.upper_body,
            Slot::LowerBody => &self.lower_body,
            Slot::Footwear => &self.footwear,
            Slot::Accessories => &self.accessories,
        }
    }
}

fn rng(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
}

async fn quota_store(config: &Config, ephemeral: bool) -> Result<Arc<dyn QuotaStore>> {
    if ephemeral {
        Ok(Arc::new(MemoryQuotaStore::default()))
    } else {
        Ok(Arc::new(SqliteQuotaStore::connect(&config.database_url).await?))
    }
}

async fn build_outfit(args: &GenerateArgs) -> Result<(Option<ImageSource>, Wardrobe)> {
    let (mut profile, mut wardrobe) = if args.random {
        AssetLibrary::default().randomize(&mut rng(args.seed))
    } else {
        (None, Wardrobe::default())
    };

    if let Some(arg) = &args.profile {
        profile = Some(ImageSource::parse(arg).await?);
    }

    for slot in Slot::ALL {
        let slot_args = args.slot_args(slot);
        if slot_args.is_empty() {
            continue;
        }

        wardrobe.clear(slot);
        for arg in slot_args {
            if wardrobe.items(slot).len() >= slot.capacity() {
                warn!(
                    "{} holds at most {} item(s), ignoring {}",
                    slot.label(),
                    slot.capacity(),
                    arg
                );
                continue;
            }
            wardrobe.add(slot, ClothingItem::new(ImageSource::parse(arg).await?));
        }
    }

    Ok((profile, wardrobe))
}

async fn generate(config: &Config, args: GenerateArgs) -> Result<()> {
    let (profile, wardrobe) = build_outfit(&args).await?;
    if wardrobe.is_empty() {
        info!("Wardrobe is empty - the model will pick every item");
    }

    let quota = QuotaTracker::new(quota_store(config, args.ephemeral).await?);
    let encoder = ImageEncoder::new(Arc::new(HttpFetcher::new()?));
    let studio = OutfitStudio::new(encoder, Arc::new(GeminiClient::new(config)?), quota);

    let mut progress = studio.subscribe();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            if let GenerationState::InFlight { remaining_secs } = *progress.borrow_and_update() {
                info!("Processing ({}s)", remaining_secs);
            }
        }
    });

    let outcome = studio.start(profile.as_ref(), &wardrobe).await;
    reporter.abort();

    match outcome {
        Ok(image_data_url) => {
            let (_, bytes) = gemini::decode_data_url(&image_data_url)?;
            tokio::fs::write(&args.output, bytes).await?;
            info!("Saved outfit to {}", args.output.display());

            let (used, limit) = studio.quota().peek().await?;
            println!("{}", args.output.display());
            println!("{} / {} runs left", limit.saturating_sub(used), limit);
            Ok(())
        }
        Err(e) => {
            error!("Generation error: {}", e);
            eprintln!("{}", e.user_message());
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Generate(args) => generate(&config, args).await?,
        Command::Quota { ephemeral } => {
            let quota = QuotaTracker::new(quota_store(&config, ephemeral).await?);
            let (used, limit) = quota.peek().await?;
            println!("{} / {} runs left", limit.saturating_sub(used), limit);
        }
        Command::Presets { seed } => {
            let (profile, wardrobe) = AssetLibrary::default().randomize(&mut rng(seed));
            if let Some(profile) = profile {
                println!("profile: {}", profile.describe());
            }
            for slot in Slot::ALL {
                for item in wardrobe.items(slot) {
                    println!("{}: {}", slot.label(), item.source.describe());
                }
            }
        }
    }

    Ok(())
}
