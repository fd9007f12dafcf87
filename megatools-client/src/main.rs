use anyhow::Context;
use clap::{Parser, Subcommand};
use megatools_core::{OptionSet, OptionValue};
use megatools_runner::{install, FetchRequest, Megatools, MegatoolsConfig, Progress};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "mega")]
#[command(about = "Download files from mega.nz through megatools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the megatools executable
    #[arg(long, global = true)]
    executable: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a file or folder
    Dl {
        /// A mega.nz download url
        url: String,

        /// Local directory or file name to save data to
        #[arg(short, long)]
        path: Option<String>,

        /// Limit transfer speed (KiB/s)
        #[arg(long)]
        limit_speed: Option<u32>,

        /// Extra option passed through to megatools (e.g. -o reload, -o proxy=socks5://host)
        #[arg(short = 'o', long = "option", value_name = "NAME[=VALUE]")]
        options: Vec<String>,

        /// Do not print progress output
        #[arg(long)]
        silent: bool,

        /// Print the execution record as JSON once finished
        #[arg(long)]
        json: bool,
    },

    /// Show the megatools version
    Version,

    /// Print the name of the file behind a url
    Filename {
        /// A mega.nz url
        url: String,
    },

    /// Locate or download the megatools executable
    Install,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if let Err(e) = run(cli.command, &config).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }

    Ok(())
}

async fn run(command: Commands, config: &MegatoolsConfig) -> anyhow::Result<()> {
    match command {
        Commands::Install => {
            let path = install::install(config).await?;
            println!("{}", path.display());
        }
        Commands::Version => {
            let mega = Megatools::install(config).await?;
            println!("{}", mega.version_async().await?);
        }
        Commands::Filename { url } => {
            let mega = Megatools::install(config).await?;
            println!("{}", mega.filename_async(&url).await?);
        }
        Commands::Dl {
            url,
            path,
            limit_speed,
            options,
            silent,
            json,
        } => {
            let mega = Megatools::install(config).await?;
            let mut request = FetchRequest::new(url).with_options(parse_options(&options));
            if let Some(path) = path {
                request = request.with_option("path", path);
            }
            if let Some(limit) = limit_speed {
                request = request.with_option("limit_speed", limit);
            }
            if silent || json {
                request = request.with_progress(Progress::Silent);
            }

            let output = mega.execute(request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        }
    }

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<MegatoolsConfig> {
    let mut config = match &cli.config {
        Some(path) => MegatoolsConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => MegatoolsConfig::default(),
    };
    if let Some(executable) = &cli.executable {
        config = config.with_executable(executable);
    }
    Ok(config)
}

/// `name` becomes a switch, `name=value` an option with a value
fn parse_options(raw: &[String]) -> OptionSet {
    raw.iter()
        .map(|option| match option.split_once('=') {
            Some((name, value)) => (name.to_string(), OptionValue::from(value)),
            None => (option.clone(), OptionValue::Switch(true)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let options = parse_options(&[
            "reload".to_string(),
            "proxy=socks5://127.0.0.1:9050".to_string(),
            "debug=api=verbose".to_string(),
        ]);
        assert_eq!(options.get("reload"), Some(&OptionValue::Switch(true)));
        assert_eq!(
            options.get("proxy"),
            Some(&OptionValue::Text("socks5://127.0.0.1:9050".to_string()))
        );
        assert_eq!(
            options.get("debug"),
            Some(&OptionValue::Text("api=verbose".to_string()))
        );
    }

    #[test]
    fn test_cli_parses_dl() {
        let cli = Cli::try_parse_from([
            "mega",
            "--executable",
            "/opt/megatools",
            "dl",
            "https://mega.nz/file/x",
            "--limit-speed",
            "100",
            "-o",
            "no_progress",
        ])
        .unwrap();

        assert_eq!(cli.executable, Some(PathBuf::from("/opt/megatools")));
        match cli.command {
            Commands::Dl {
                url,
                limit_speed,
                options,
                silent,
                ..
            } => {
                assert_eq!(url, "https://mega.nz/file/x");
                assert_eq!(limit_speed, Some(100));
                assert_eq!(options, vec!["no_progress".to_string()]);
                assert!(!silent);
            }
            _ => panic!("Expected dl command"),
        }
    }

    #[test]
    fn test_load_config_applies_executable_flag() {
        let cli = Cli::try_parse_from(["mega", "version", "--executable", "/usr/bin/megatools"])
            .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.executable, Some(PathBuf::from("/usr/bin/megatools")));
    }
}
