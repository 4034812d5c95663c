use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use realm_store::{Environment, RealmData, StoreConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("realm-store")
        .version(realm_store::VERSION)
        .about("Succubus Realm data store maintenance")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("env")
                .long("env")
                .global(true)
                .default_value("development")
                .value_parser(value_parser!(Environment))
                .help("Environment preset used when no config file is given"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Override the data directory"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("check")
                .about("Initialize the likes file and run the integrity check"),
        )
        .subcommand(Command::new("stats").about("Show like totals"))
        .subcommand(
            Command::new("like")
                .about("Add a like to a character")
                .arg(
                    Arg::new("id")
                        .required(true)
                        .value_parser(value_parser!(u64).range(1..))
                        .help("Character id"),
                ),
        )
        .subcommand(
            Command::new("ranking")
                .about("List characters by popularity")
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(value_parser!(usize))
                        .help("Show at most this many characters"),
                ),
        )
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<StoreConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let env = matches
                .get_one::<Environment>("env")
                .copied()
                .unwrap_or_default();
            StoreConfig::for_environment(env)
        }
    };
    if let Some(dir) = matches.get_one::<PathBuf>("data-dir") {
        config = config.with_data_dir(dir);
    }
    Ok(config)
}

async fn run(matches: ArgMatches) -> anyhow::Result<ExitCode> {
    let config = load_config(&matches)?;
    let json = matches.get_flag("json");
    let realm = RealmData::new(config);

    match matches.subcommand() {
        Some(("check", _)) => {
            realm.likes().initialize_if_missing().await;
            let report = realm.reconciler().run().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Seeded counters:  {}", report.seeded.len());
                println!("Removed counters: {}", report.removed.len());
                println!("Rewritten:        {}", report.written);
                for issue in &report.issues {
                    println!("  - {issue}");
                }
            }
        }
        Some(("stats", _)) => {
            let stats = realm.likes().statistics().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Characters: {}", stats.total_characters);
                println!("Total likes: {}", stats.total_likes);
                println!("Average likes: {:.2}", stats.average_likes);
            }
        }
        Some(("like", args)) => {
            let Some(&id) = args.get_one::<u64>("id") else {
                bail!("character id is required");
            };
            let Some(character) = realm.characters().get_by_id(id).await else {
                eprintln!("character {id} not found");
                return Ok(ExitCode::FAILURE);
            };
            let total = realm.likes().increment(id).await?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "characterId": id, "characterName": character.name, "totalLikes": total })
                );
            } else {
                println!("{} now has {total} likes", character.name);
            }
        }
        Some(("ranking", args)) => {
            let limit = args.get_one::<usize>("limit").copied();
            let ranked = realm.characters().ranking(limit).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&ranked)?);
            } else {
                for (place, entry) in ranked.iter().enumerate() {
                    println!(
                        "{:>3}. {:<24} {:>6}",
                        place + 1,
                        entry.character.name,
                        entry.like_count
                    );
                }
            }
        }
        _ => unreachable!("subcommand is required"),
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(cli().get_matches()).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
