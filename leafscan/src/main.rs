use clap::Parser;
use env_logger::Builder;
use env_logger::Env;
use log::{error, info, Level};
use std::io::Write;

use leafscan::color_utils::{colors, init_color_config, symbols};
use leafscan::config::{AnalyzeCommand, AnalyzeConfig, ClassifyCommand, GlobalArgs, LabelScheme};
use leafscan::lesion_processing::run_lesion_analysis;
use leafscan::severity::{classify, severity_score};

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Measure lesions on each leaf and annotate the images
    Analyze(AnalyzeCommand),

    /// Grade a single (lesion ratio, lesion count) pair
    Classify(ClassifyCommand),

    /// Show version information
    Version,
}

#[derive(Parser)]
#[command(name = "leafscan")]
#[command(about = "Leaf lesion quantification and severity grading")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

fn get_log_level_from_verbosity(
    verbosity: clap_verbosity_flag::Verbosity<clap_verbosity_flag::ErrorLevel>,
) -> log::LevelFilter {
    let base_level = verbosity.log_level_filter();
    let adjusted_level = match base_level {
        log::LevelFilter::Off => log::LevelFilter::Off, // -qq -> OFF
        log::LevelFilter::Error => log::LevelFilter::Warn, // default -> WARN
        log::LevelFilter::Warn => log::LevelFilter::Info, // -v -> INFO
        log::LevelFilter::Info => log::LevelFilter::Debug, // -vv -> DEBUG
        log::LevelFilter::Debug => log::LevelFilter::Trace, // -vvv -> TRACE
        log::LevelFilter::Trace => log::LevelFilter::Trace, // -vvvv -> TRACE (max)
    };

    // clap-verbosity-flag reports the default and -q the same way
    if verbosity.is_silent() {
        log::LevelFilter::Error // -q -> ERROR
    } else {
        adjusted_level
    }
}

fn init_logger(cli: &Cli) {
    // If user didn't pass -v/-q and RUST_LOG is set, honor the env var.
    let use_env = !cli.global.verbosity.is_present() && std::env::var_os("RUST_LOG").is_some();

    let mut logger = if use_env {
        Builder::from_env(Env::default())
    } else {
        let mut b = Builder::new();
        b.filter_level(get_log_level_from_verbosity(cli.global.verbosity.clone()));
        b
    };

    logger
        .format(|buf, record| {
            let level_str = match record.level() {
                Level::Error => colors::error_level("ERROR"),
                Level::Warn => colors::warning_level("WARN"),
                Level::Info => colors::info_level("INFO"),
                Level::Debug => colors::debug_level("DEBUG"),
                Level::Trace => colors::trace_level("TRACE"),
            };
            writeln!(buf, "[{}] {}", level_str, record.args())
        })
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_color_config(cli.global.no_color);
    init_logger(&cli);

    match &cli.command {
        Some(Commands::Analyze(analyze_cmd)) => {
            let sources_desc = if analyze_cmd.sources.len() == 1 {
                analyze_cmd.sources[0].clone()
            } else {
                format!("{} inputs", analyze_cmd.sources.len())
            };

            info!(
                "{}Lesion analysis: {} | leaf class: {} | lesion classes: {}-{}",
                symbols::lesion_analysis_start(),
                sources_desc,
                analyze_cmd.leaf_class,
                analyze_cmd.lesion_classes.0,
                analyze_cmd.lesion_classes.1
            );

            let mut outputs = Vec::new();
            if !analyze_cmd.no_annotate {
                outputs.push("annotated-images");
            }
            if cli.global.metadata {
                outputs.push("metadata");
            }
            if analyze_cmd.summary.is_some() {
                outputs.push("summary");
            }
            if outputs.is_empty() {
                info!("   Outputs: none");
            } else {
                info!("   Outputs: {}", outputs.join(", "));
            }

            let internal_config =
                match AnalyzeConfig::from_args(cli.global.clone(), analyze_cmd.clone()) {
                    Ok(config) => config,
                    Err(e) => {
                        error!("{}Invalid configuration: {e}", symbols::operation_failed());
                        std::process::exit(1);
                    }
                };

            if let Err(e) = run_lesion_analysis(internal_config) {
                error!("{}Lesion analysis failed: {e:#}", symbols::operation_failed());
                std::process::exit(1);
            }
        }
        Some(Commands::Classify(classify_cmd)) => {
            let tier = classify(classify_cmd.ratio, classify_cmd.count);
            info!(
                "ratio {} with {} lesions (score {:.2}) -> tier {}",
                classify_cmd.ratio,
                classify_cmd.count,
                severity_score(classify_cmd.ratio, classify_cmd.count),
                tier
            );
            println!("{tier}");
        }
        Some(Commands::Version) => {
            let labels = LabelScheme::default();
            println!("leafscan v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Default labels: leaf class {}, lesion classes {}-{}",
                labels.leaf_class, labels.lesion_class_min, labels.lesion_class_max
            );
            println!("Repository: {}", env!("CARGO_PKG_REPOSITORY"));
        }
        None => {
            // Show help if no command specified
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            if let Err(e) = cmd.print_help() {
                error!("Failed to print help: {e}");
                std::process::exit(1);
            }
        }
    }
}
