use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use crate::application::{Evaluator, GoldEchoPredictor, PipelineOutcome, SqlPredictor};
use crate::domain::error::{AppError, Result};
use crate::domain::evaluation::{EvalReport, GoldSet};
use crate::infrastructure::bootstrap::Services;
use crate::infrastructure::config::ConfigService;

pub const USAGE: &str = "\
Usage:
  sqlsage [--config <file>] ask <question>
  sqlsage [--config <file>] eval [<gold.json>] [--pipeline] [--concurrency <n>] [--report <file>]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask {
        question: String,
    },
    Eval {
        gold_path: Option<PathBuf>,
        use_pipeline: bool,
        concurrency: usize,
        report_path: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub command: Command,
}

fn usage_error(message: &str) -> AppError {
    AppError::ValidationError(format!("{}\n\n{}", message, USAGE))
}

pub fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut config_path = None;
    let mut positional: Vec<String> = Vec::new();
    let mut use_pipeline = false;
    let mut concurrency = 1usize;
    let mut report_path = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| usage_error("--config needs a file path"))?;
                config_path = Some(PathBuf::from(value));
            }
            "--pipeline" => use_pipeline = true,
            "--concurrency" => {
                let value = iter
                    .next()
                    .ok_or_else(|| usage_error("--concurrency needs a number"))?;
                concurrency = value
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n >= 1)
                    .ok_or_else(|| usage_error("--concurrency must be a positive integer"))?;
            }
            "--report" => {
                let value = iter
                    .next()
                    .ok_or_else(|| usage_error("--report needs a file path"))?;
                report_path = Some(PathBuf::from(value));
            }
            flag if flag.starts_with("--") => {
                return Err(usage_error(&format!("Unknown option: {}", flag)))
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("ask") => {
            let question = positional.collect::<Vec<_>>().join(" ");
            if question.trim().is_empty() {
                return Err(usage_error("ask needs a question"));
            }
            Command::Ask { question }
        }
        Some("eval") => {
            let gold_path = positional.next().map(PathBuf::from);
            if let Some(extra) = positional.next() {
                return Err(usage_error(&format!("Unexpected argument: {}", extra)));
            }
            Command::Eval {
                gold_path,
                use_pipeline,
                concurrency,
                report_path,
            }
        }
        Some(other) => return Err(usage_error(&format!("Unknown command: {}", other))),
        None => return Err(usage_error("Missing command")),
    };

    Ok(CliArgs {
        config_path,
        command,
    })
}

pub async fn run<I>(args: I) -> Result<()>
where
    I: IntoIterator<Item = String>,
{
    let cli = parse_args(args)?;

    let config_service = ConfigService::new();
    let config = config_service.load(cli.config_path.as_deref())?;
    crate::init_tracing(&config.log_level);

    let services = Services::connect(config).await?;
    let result = match cli.command {
        Command::Ask { question } => ask(&services, &config_service, &question).await,
        Command::Eval {
            gold_path,
            use_pipeline,
            concurrency,
            report_path,
        } => {
            let gold = match &gold_path {
                Some(path) => {
                    let gold = GoldSet::load(path)?;
                    info!("Loaded {} gold cases from {}", gold.len(), path.display());
                    gold
                }
                None => {
                    let gold = GoldSet::bundled()?;
                    info!("Using the bundled gold set ({} cases)", gold.len());
                    gold
                }
            };

            let predictor: Arc<dyn SqlPredictor> = if use_pipeline {
                let llm = services.llm_client(&config_service)?;
                Arc::new(services.pipeline(llm))
            } else {
                Arc::new(GoldEchoPredictor::new(gold.clone()))
            };

            let evaluator = Evaluator::new(services.executor.clone(), predictor);
            let report = evaluator.evaluate_concurrent(&gold, concurrency).await;
            print_report(&report, report_path.as_deref())
        }
    };

    services.shutdown().await;
    result
}

async fn ask(services: &Services, config_service: &ConfigService, question: &str) -> Result<()> {
    let llm = services.llm_client(config_service)?;
    let outcome = services.pipeline(llm).run(question).await?;

    let json = serde_json::to_string_pretty(&outcome)?;
    println!("{}", json);

    match outcome {
        PipelineOutcome::Done { .. } => Ok(()),
        PipelineOutcome::Exhausted { last_error, .. } => Err(AppError::Internal(format!(
            "No executable SQL after retries: {}",
            last_error
        ))),
    }
}

fn print_report(report: &EvalReport, report_path: Option<&std::path::Path>) -> Result<()> {
    let s = &report.summary;
    println!("=== Evaluation Summary ===");
    println!("Total cases      : {}", s.total);
    println!("Exact matches    : {}", s.exact_match);
    println!("Semantic matches : {}", s.semantic_match);
    println!("Fails            : {}", s.fail);
    println!("Errors           : {}", s.error);
    println!("Accuracy         : {:.3}", s.accuracy);

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!();
        println!("=== Failures ===");
        for case in failures {
            println!("[{}] {}", case.verdict.as_str(), case.nl_query);
            println!("  gt  : {}", case.gt_sql);
            println!("  pred: {}", case.pred_sql);
            println!("  {}", case.details);
        }
    }

    if let Some(path) = report_path {
        std::fs::write(path, serde_json::to_string_pretty(report)?)?;
        info!("Wrote evaluation report to {}", path.display());
    }
    Ok(())
}
