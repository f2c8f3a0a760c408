use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::ProgressBar;

use spot_labeler::archive;
use spot_labeler::cli::Args;
use spot_labeler::json_output::JsonMessage;
use spot_labeler::labeling::faces::RustfaceDetector;
use spot_labeler::labeling::spots::{SpotModel, StubSpotModel};
use spot_labeler::labeling::{LabelingConfig, LabelingEngine};
use spot_labeler::utils::{
    create_progress_bar, format_duration, validate_inputs, verbose_println, warn_println,
};

fn build_spot_model(args: &Args) -> Result<Box<dyn SpotModel>> {
    match &args.spot_model {
        #[cfg(feature = "backend-tract")]
        Some(path) => {
            use spot_labeler::labeling::tract_model::TractSpotModel;
            Ok(Box::new(TractSpotModel::load(path)?))
        }
        #[cfg(not(feature = "backend-tract"))]
        Some(_) => Err(anyhow::anyhow!(
            "Spot model inference requires the backend-tract feature"
        )),
        None => {
            if !args.json {
                warn_println(
                    "no spot model supplied - every selfie will be counted as no-spot",
                );
            }
            Ok(Box::new(StubSpotModel))
        }
    }
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let args = Args::parse();

    if !args.json {
        println!("{}", style("Spot Labeler").bold().blue());
        println!(
            "{}",
            style("Batch selfie classification + spot annotation").dim()
        );
        println!();
    }

    validate_inputs(&args)?;

    let config = LabelingConfig {
        confidence_threshold: args.confidence_threshold,
        parallel_jobs: if args.jobs == 0 {
            num_cpus::get()
        } else {
            args.jobs
        },
        verbose: args.verbose && !args.json,
    };

    if config.verbose {
        println!("{}", style("Configuration:").bold());
        println!("  Input archive: {}", args.input_zip.display());
        println!("  Output archive: {}", args.output_zip.display());
        println!("  Confidence threshold: {}", config.confidence_threshold);
        println!("  Parallel jobs: {}", config.parallel_jobs);
        println!("  Extensions: {:?}", args.extensions());
        println!();
    }

    // Unpack the input bundle and discover images
    let work_dir = tempfile::tempdir().context("Failed to create working directory")?;
    verbose_println(
        config.verbose,
        &format!("Extracting archive to {}", work_dir.path().display()),
    );
    let records = archive::extract(&args.input_zip, work_dir.path(), &args.extensions())?;

    if !args.json {
        println!(
            "{}",
            style(format!("Found {} image(s) in archive", records.len())).green()
        );
    }

    // Initialize the labeling engine
    let faces = Arc::new(RustfaceDetector::from_file(&args.face_model)?);
    let spot_model = build_spot_model(&args)?;
    let engine = LabelingEngine::new(config, faces, spot_model)?;

    let progress = if args.json || records.is_empty() {
        ProgressBar::hidden()
    } else {
        create_progress_bar(records.len() as u64)
    };
    progress.set_message("Labeling images");

    let report = engine.run(&records, &progress);
    progress.finish_with_message("done");

    let summary = report.summary;
    let failures = report.failures();
    let accepted = report.into_accepted();

    // Package accepted images + annotations into the output bundle
    archive::pack(&args.output_zip, &accepted)?;

    let total_time = start_time.elapsed();

    if args.json {
        for (filename, error) in &failures {
            JsonMessage::failed(filename, error);
        }
        JsonMessage::summary(&summary, total_time.as_secs_f64());
        return Ok(());
    }

    println!();
    println!("{}", style("Results Summary:").bold().green());
    println!(
        "  Accepted and labeled: {}",
        style(summary.accepted).bold().green()
    );
    println!(
        "  Skipped (not a selfie): {}",
        style(summary.skipped_not_selfie).bold().yellow()
    );
    println!(
        "  Skipped (no spot detected): {}",
        style(summary.skipped_no_spot).bold().yellow()
    );
    if summary.failed > 0 {
        println!("  Failed: {}", style(summary.failed).bold().red());
    }

    if !failures.is_empty() {
        println!();
        println!("{}", style("Errors encountered:").bold().red());
        for (i, (filename, error)) in failures.iter().enumerate() {
            println!(
                "  {}: {} - {}",
                style(format!("#{}", i + 1)).dim(),
                style(filename).bold().red(),
                error
            );
        }
    }

    println!();
    println!("{}", style("Output:").bold().blue());
    println!("  {}", args.output_zip.display());
    println!("  {}", archive::summarize(&summary));

    println!();
    println!("{}", style("Performance:").bold().blue());
    println!(
        "  Total processing time: {}",
        style(format_duration(total_time)).bold()
    );
    if !records.is_empty() {
        println!(
            "  Average time per image: {}",
            style(format_duration(total_time / records.len() as u32)).dim()
        );
    }

    Ok(())
}
