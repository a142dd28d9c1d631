use clap::Parser;
use sheet_classify::core::export::ExportMapper;
use sheet_classify::core::orchestrator::log_progress;
use sheet_classify::domain::ports::TokioSleeper;
use sheet_classify::utils::error::ErrorSeverity;
use sheet_classify::utils::monitor::SystemMonitor;
use sheet_classify::utils::{logger, validation::Validate};
use sheet_classify::{
    ClassificationEngine, ClassifierConfig, ClassifyError, CliConfig, CsvWorkbook,
    GeminiClassifier, LocalStorage, PipelineOrchestrator, RetryingBatchRunner, ZipTableWriter,
};
use std::path::Path;

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting sheet-classify");
    tracing::debug!("CLI config: {:?}", cli);

    if let Err(e) = run(cli).await {
        tracing::error!(
            "❌ Run failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        std::process::exit(exit_code);
    }
}

fn load_config(cli: &CliConfig) -> Result<ClassifierConfig, ClassifyError> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("📝 Loading configuration from {}", path);
            ClassifierConfig::from_file(path)?
        }
        None => ClassifierConfig::default(),
    };
    if let Some(batch_size) = cli.batch_size {
        config.batching.batch_size = batch_size;
    }
    if config.export.output_path.is_none() {
        config.export.output_path = Some(cli.output_path.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: CliConfig) -> Result<(), ClassifyError> {
    cli.validate()?;
    let config = load_config(&cli)?;
    let monitor = SystemMonitor::new(cli.monitor);
    if monitor.is_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let workbook = CsvWorkbook::open(&cli.input)?;
    monitor.log_phase("load");

    let taxonomy = config.taxonomy();
    let classifier = GeminiClassifier::new(config.gemini_settings(), taxonomy.clone())?;
    let runner = RetryingBatchRunner::new(classifier, TokioSleeper)
        .with_policy(config.retry_policy())
        .with_mapping(config.classifier.response_mapping)
        .with_malformed_policy(config.batching.malformed_response)
        .with_taxonomy(taxonomy.clone());
    let orchestrator = PipelineOrchestrator::new(runner, config.batching.batch_size);

    let source_name = Path::new(&cli.input)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("workbook")
        .to_string();
    let mut engine = ClassificationEngine::new(workbook, source_name, orchestrator)
        .with_matcher(config.alias_matcher())
        .with_mapper(ExportMapper::new(
            config.export.category_column.clone(),
            config.layout(),
            taxonomy,
        ));

    if cli.list_sheets {
        for sheet in engine.list_sheets()? {
            let headers = engine.select_sheet(&sheet)?;
            println!("{}: {}", sheet, headers.join(", "));
        }
        return Ok(());
    }

    match &cli.sheet {
        Some(sheet) => {
            engine.select_sheet(sheet)?;
        }
        None => {
            if engine.open()?.is_none() {
                return Err(ClassifyError::ValidationError {
                    message: "Workbook contains no sheets".to_string(),
                });
            }
        }
    }

    let column = cli.column.clone().ok_or_else(|| ClassifyError::MissingConfigError {
        field: "column".to_string(),
    })?;
    engine.select_column(&column)?;

    let reporter = tokio::spawn(log_progress(engine.subscribe()));

    let summary = engine.classify().await?;
    monitor.log_phase("classify");
    for message in engine.errors() {
        eprintln!("⚠️  {}", message);
    }
    tracing::info!(
        "📊 {} of {} batches processed, {} records classified",
        summary.processed_batches,
        summary.total_batches,
        summary.classified
    );
    let categories: Vec<String> = engine.available_categories().into_iter().collect();
    if !categories.is_empty() {
        println!("🏷️  Categories: {}", categories.join(", "));
    }

    engine.set_filters(cli.filter_state());
    engine.set_sort(cli.sort_spec());

    let output_path = config
        .export
        .output_path
        .clone()
        .unwrap_or_else(|| cli.output_path.clone());
    let writer = ZipTableWriter::new(LocalStorage::new(&output_path), &output_path);
    let written = engine.export(&writer).await?;
    monitor.log_phase("export");

    if let Err(e) = reporter.await {
        tracing::warn!("Progress reporter stopped abnormally: {}", e);
    }
    monitor.log_summary();

    println!("✅ Classification finished: {} records classified", summary.classified);
    println!("📁 Output saved to: {}", written);

    match summary.error() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
