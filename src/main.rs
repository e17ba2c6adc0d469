/// MELA native entry point: analyze one image from the command line.
#[cfg(not(target_arch = "wasm32"))]
fn main() -> std::process::ExitCode {
    native::run()
}

// WASM doesn't use main(), it uses wasm_bindgen's start function
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::path::{Path, PathBuf};
    use std::process::ExitCode;
    use std::rc::Rc;

    use chrono::NaiveDate;
    use clap::Parser;

    use mela::analysis::{
        AnalysisOrchestrator, AnalysisResult, ResponseContract, SideInputs, parse_crossing_date,
    };
    use mela::config::{AppConfig, ConfigError, LogLevel};
    use mela::error::AnalysisError;
    use mela::ingest::{PageOptions, SessionOutcome, UploadSession};
    use mela::media::{CandidateFile, MemoryPool};

    #[derive(Parser)]
    #[command(
        name = "mela-native",
        version,
        about = "MELA - submit a melon image for mesh analysis",
        long_about = "Submit a melon image to the configured analysis service and print \
                      its mesh metrics.\n\n\
                      The endpoint is --endpoint if given, else MELA_ENDPOINT_URL, else \
                      the config file. The access credential is read from the environment \
                      variable named in the config (MELA_API_KEY by default)."
    )]
    struct Cli {
        /// Image file to analyze.
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Date the melon was crossed (YYYY-MM-DD); must not be in the future.
        #[arg(long = "crossing-date", value_name = "DATE", value_parser = parse_date)]
        crossing_date: Option<NaiveDate>,

        /// Analysis endpoint URL (overrides MELA_ENDPOINT_URL and the config file).
        #[arg(long, value_name = "URL")]
        endpoint: Option<String>,

        /// Response contract of the endpoint (auto, metrics, mask).
        #[arg(long, value_parser = parse_contract)]
        contract: Option<ResponseContract>,

        /// Request timeout in seconds.
        #[arg(long = "timeout", value_name = "SECS")]
        timeout_secs: Option<u64>,

        /// Directory to write result images to as PNG.
        #[arg(long = "output", value_name = "DIR")]
        output: Option<PathBuf>,

        /// Log level (error, warn, info, debug, trace).
        #[arg(long = "log-level", value_parser = parse_log_level)]
        log_level: Option<LogLevel>,

        /// Config file to use instead of the default location.
        #[arg(long = "config", value_name = "PATH")]
        config: Option<PathBuf>,

        /// Save the effective settings to the default config location.
        #[arg(long = "save-config")]
        save_config: bool,
    }

    #[derive(Debug, thiserror::Error)]
    enum CliError {
        #[error(transparent)]
        Analysis(#[from] AnalysisError),

        #[error(transparent)]
        Config(#[from] ConfigError),

        #[error("Failed to read {path}: {source}")]
        Read {
            path: PathBuf,
            source: std::io::Error,
        },

        #[error("Failed to write {path}: {message}")]
        Export { path: PathBuf, message: String },

        #[error("Failed to start async runtime: {0}")]
        Runtime(std::io::Error),

        #[error("The analysis was superseded before it completed")]
        Superseded,
    }

    fn parse_date(raw: &str) -> Result<NaiveDate, String> {
        parse_crossing_date(raw).map_err(|e| e.user_message())
    }

    fn parse_contract(raw: &str) -> Result<ResponseContract, String> {
        ResponseContract::parse(raw).ok_or_else(|| "expected auto, metrics or mask".to_string())
    }

    fn parse_log_level(raw: &str) -> Result<LogLevel, String> {
        LogLevel::parse(raw).ok_or_else(|| "expected error, warn, info, debug or trace".to_string())
    }

    pub fn run() -> ExitCode {
        let cli = Cli::parse();

        let config = match load_config(&cli) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {}", e);
                return ExitCode::FAILURE;
            }
        };

        env_logger::Builder::new()
            .filter_level(config.preferences.log_level.to_level_filter())
            .format_timestamp_millis()
            .init();

        match analyze(&cli, &config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                log::error!("{}", e);
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        }
    }

    fn load_config(cli: &Cli) -> Result<AppConfig, CliError> {
        let mut config = match &cli.config {
            Some(path) => AppConfig::load_from_path(path)?,
            None => AppConfig::load_from_default_path().unwrap_or_default(),
        };

        if let Some(contract) = cli.contract {
            config.endpoint.contract = contract;
        }
        if let Some(timeout_secs) = cli.timeout_secs {
            config.endpoint.timeout_secs = timeout_secs;
        }
        if let Some(level) = cli.log_level {
            config.preferences.log_level = level;
        }
        if let Some(output) = &cli.output {
            config.preferences.output_dir = output.display().to_string();
        }
        Ok(config)
    }

    fn analyze(cli: &Cli, config: &AppConfig) -> Result<(), CliError> {
        if cli.save_config {
            let mut saved = config.clone();
            if let Some(endpoint) = &cli.endpoint {
                saved.endpoint.url = Some(endpoint.clone());
            }
            saved.save_to_default_path()?;
        }

        let candidate = CandidateFile::from_path(&cli.image).map_err(|source| CliError::Read {
            path: cli.image.clone(),
            source,
        })?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(CliError::Runtime)?;

        let client = config.client_config_for(cli.endpoint.as_deref());
        let session = UploadSession::new(Rc::new(MemoryPool::new()), PageOptions::default(), |zone| {
            AnalysisOrchestrator::from_client_config(client, zone)
        });
        session.select(Some(candidate))?;

        let inputs = SideInputs {
            crossing_date: cli.crossing_date,
        };
        let result = match runtime.block_on(session.analyze(inputs))? {
            SessionOutcome::Completed(result) => result,
            SessionOutcome::Ignored | SessionOutcome::Stale { .. } => {
                return Err(CliError::Superseded);
            }
        };

        print_result(&result);

        let output_dir = &config.preferences.output_dir;
        if !output_dir.is_empty() {
            export_images(&result, Path::new(output_dir))?;
        }
        Ok(())
    }

    fn print_result(result: &AnalysisResult) {
        println!("{}", result.summary());
        println!();
        println!("  id:               {}", result.id());
        println!("  mesh density:     {}", result.mesh_density_label());
        println!("  branch points:    {}", result.branch_points());
        println!("  mesh uniformity:  {:.3}", result.mesh_uniformity());
        if let Some(score) = result.quality_score() {
            println!("  quality score:    {:.3}", score);
        }
        if let Some(circularity) = result.circularity() {
            println!("  circularity:      {:.3}", circularity);
        }
        if let Some(days) = result.days_after_crossing() {
            println!("  days after cross: {}", days);
        }
    }

    fn export_images(result: &AnalysisResult, dir: &Path) -> Result<(), CliError> {
        std::fs::create_dir_all(dir).map_err(|e| CliError::Export {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        for (name, image) in result.images() {
            let path = dir.join(format!("{}-{}.png", result.id(), name));
            image
                .to_rgba_image()?
                .save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| CliError::Export {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            log::info!("💾 Wrote {}", path.display());
        }
        Ok(())
    }
}
