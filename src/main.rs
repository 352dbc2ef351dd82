use std::path::Path;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use pdf_mono::config::job::JobFile;
use pdf_mono::config::merged::MergedConfig;
use pdf_mono::config::{self, resolve_path};
use pdf_mono::pdf::inspector;
use pdf_mono::pipeline::job_runner::JobConfig;
use pdf_mono::pipeline::orchestrator::run_all_jobs;

const USAGE: &str = "\
Usage:
  pdf_mono <input.pdf> <output.pdf>             Convert one file with default settings
  pdf_mono --jobs <jobs.yaml>...                Run conversion jobs
  pdf_mono inspect <input.pdf> [report.md|.json] Write an inspection report
  pdf_mono --help | --version

Set RUST_LOG (e.g. RUST_LOG=debug) for more detailed logs.";

fn main() -> ExitCode {
    init_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("{USAGE}");
        return if args.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        eprintln!("pdf_mono {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match args[0].as_str() {
        "inspect" => run_inspect(&args[1..]),
        "--jobs" => run_job_files(&args[1..]),
        _ if args.len() == 2 => run_single(&args[0], &args[1]),
        _ => {
            eprintln!("ERROR: unrecognized arguments\n{USAGE}");
            ExitCode::FAILURE
        }
    }
}

/// ログ出力（stderr）。RUST_LOG未設定時は warn 以上のみ。
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_single(input: &str, output: &str) -> ExitCode {
    let job = JobConfig::new(input, output);
    report_results(&[job.clone()], run_all_jobs(&[job], 0))
}

fn run_inspect(args: &[String]) -> ExitCode {
    let (input, report_path) = match args {
        [input] => (input, None),
        [input, report] => (input, Some(report)),
        _ => {
            eprintln!("ERROR: inspect takes <input.pdf> [report.md|report.json]");
            return ExitCode::FAILURE;
        }
    };

    let report = match inspector::inspect(input) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("ERROR: Failed to inspect {input}: {e}");
            return ExitCode::FAILURE;
        }
    };

    match report_path {
        Some(path) => match report.save(path) {
            Ok(()) => {
                eprintln!("OK: {input} -> {path} ({} pages)", report.pages.len());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("ERROR: {e}");
                ExitCode::FAILURE
            }
        },
        None => {
            print!("{}", report.to_markdown());
            ExitCode::SUCCESS
        }
    }
}

fn run_job_files(job_files: &[String]) -> ExitCode {
    if job_files.is_empty() {
        eprintln!("ERROR: --jobs needs at least one job file");
        return ExitCode::FAILURE;
    }

    let mut job_configs: Vec<JobConfig> = Vec::new();
    let mut workers = 0;

    for job_file_arg in job_files {
        let job_file_path = Path::new(job_file_arg);

        // Load settings from the same directory as the job file.
        let settings = match config::load_settings_for_job(job_file_path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("ERROR: Failed to load settings for {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        let job_file = match JobFile::from_file(job_file_path) {
            Ok(jf) => jf,
            Err(e) => {
                eprintln!("ERROR: {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        // Resolve job file directory for relative paths.
        let job_dir = job_file_path.parent().unwrap_or_else(|| Path::new("."));

        for job in &job_file.jobs {
            let merged = MergedConfig::new(&settings, job);
            if let Err(e) = merged.validate() {
                eprintln!("ERROR: {job_file_arg}: job '{}': {e}", job.input);
                return ExitCode::FAILURE;
            }
            workers = workers.max(merged.parallel_workers);

            job_configs.push(JobConfig {
                input_path: resolve_path(job_dir, &job.input),
                output_path: resolve_path(job_dir, &job.output),
                pages: job.pages.clone(),
                settings: merged,
            });
        }
    }

    let results = run_all_jobs(&job_configs, workers);
    report_results(&job_configs, results)
}

fn report_results(
    job_configs: &[JobConfig],
    results: Vec<pdf_mono::error::Result<pdf_mono::pipeline::job_runner::JobResult>>,
) -> ExitCode {
    let mut has_error = false;
    for (config, result) in job_configs.iter().zip(results) {
        match result {
            Ok(job_result) => {
                eprintln!(
                    "OK: {} -> {} ({} pages, {} colors, {} images, {} separations)",
                    job_result.input_path.display(),
                    job_result.output_path.display(),
                    job_result.pages_processed,
                    job_result.colors.rewritten(),
                    job_result.images.converted,
                    job_result.separations
                );
                if job_result.images.failed > 0 {
                    eprintln!(
                        "  warning: {} image(s) could not be decoded and were left unchanged",
                        job_result.images.failed
                    );
                }
            }
            Err(e) => {
                eprintln!(
                    "ERROR: {} -> {}: {e}",
                    config.input_path.display(),
                    config.output_path.display()
                );
                has_error = true;
            }
        }
    }

    if has_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
