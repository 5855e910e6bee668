use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rampcut_lib::commands::{export, system};
use rampcut_lib::config::{resolve_settings, SettingsOverrides};
use rampcut_lib::export::{EncodeSettings, OutputPreset, SystemRunner};
use rampcut_lib::utils::AppError;
use std::path::PathBuf;
use std::process::ExitCode;

/// Assemble speed-ramped short videos from an edit plan
#[derive(Parser)]
#[command(name = "rampcut")]
#[command(version)]
#[command(about = "Render an edit plan into one video with FFmpeg", long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that renders or assembles commands
#[derive(Args)]
struct EncodeArgs {
    /// Output preset
    #[arg(long, value_enum, default_value = "douyin")]
    preset: OutputPreset,

    /// JSON file with encoder settings (replaces the preset)
    #[arg(long)]
    settings: Option<PathBuf>,

    #[command(flatten)]
    overrides: SettingsOverrides,
}

impl EncodeArgs {
    fn resolve(&self) -> anyhow::Result<EncodeSettings> {
        Ok(resolve_settings(
            self.preset,
            self.settings.as_deref(),
            &self.overrides,
        )?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render the plan into one video
    Execute {
        /// Directory holding the source clips
        video_dir: PathBuf,

        /// Edit plan JSON
        #[arg(long)]
        plan: PathBuf,

        /// Output file name, relative to the video directory
        #[arg(short, long, default_value = "output.mp4")]
        output: String,

        #[command(flatten)]
        encode: EncodeArgs,

        /// Where the per-run scratch directory is created (default: video directory)
        #[arg(long)]
        scratch_dir: Option<PathBuf>,

        /// Write a JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,

        /// Probe the output and compare its duration with the plan
        #[arg(long)]
        verify: bool,
    },

    /// Print the commands a run would execute without running them
    Plan {
        /// Directory holding the source clips
        video_dir: PathBuf,

        /// Edit plan JSON
        #[arg(long)]
        plan: PathBuf,

        #[command(flatten)]
        encode: EncodeArgs,

        /// Write the normalized plan here
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Show duration and streams of a media file
    Probe {
        file: PathBuf,
    },

    /// Check that ffmpeg and ffprobe are installed
    Check,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "rampcut=debug,rampcut_lib=debug"
    } else if cli.quiet {
        "rampcut=warn,rampcut_lib=warn"
    } else {
        "rampcut=info,rampcut_lib=info"
    };
    rampcut_lib::init_tracing(level);

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            let (code, exit) = match err.downcast_ref::<AppError>() {
                Some(app) => (app.code(), app.exit_code()),
                None => ("ERROR", 1),
            };
            eprintln!("error[{}]: {:#}", code, err);
            ExitCode::from(exit)
        }
    }
}

fn run(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Execute {
            video_dir,
            plan,
            output,
            encode,
            scratch_dir,
            report,
            verify,
        } => {
            let request = export::ExecuteRequest {
                settings: encode.resolve()?,
                video_dir,
                plan_path: plan,
                output_name: output,
                scratch_dir,
                report_path: report,
                verify,
            };
            export::execute(&SystemRunner, &request, |line| println!("{}", line))
                .with_context(|| format!("executing plan {}", request.plan_path.display()))?;
            Ok(ExitCode::SUCCESS)
        }

        Commands::Plan {
            video_dir,
            plan,
            encode,
            save,
        } => {
            let settings = encode.resolve()?;
            let dry = export::dry_run(&video_dir, &plan, &settings, save.as_deref())
                .with_context(|| format!("planning {}", plan.display()))?;
            for clip in &dry.clips {
                let kind = if clip.speed_ramped { "speed ramp" } else { "trim" };
                println!(
                    "[{}] {} ({}, {}ms)",
                    clip.order, clip.filename, kind, clip.expected_duration_ms
                );
                println!("    {}", clip.command);
            }
            println!("Expected total duration: {}ms", dry.expected_duration_ms);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Probe { file } => {
            let summary = system::probe(&SystemRunner, &file)
                .with_context(|| format!("probing {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Check => {
            let info = system::check(&SystemRunner);
            println!("os: {} ({})", info.os, info.arch);
            for tool in &info.tools {
                match (&tool.version, &tool.error) {
                    (Some(version), _) => println!("{}: {}", tool.name, version),
                    (None, Some(error)) => println!("{}: missing ({})", tool.name, error),
                    (None, None) => println!("{}: missing", tool.name),
                }
            }
            if info.all_tools_available() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(3))
            }
        }
    }
}
