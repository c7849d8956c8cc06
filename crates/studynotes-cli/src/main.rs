use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use studynotes_core::config::env_vars;
use studynotes_core::{
    Config, ConfigError, CoreError, Dispatcher, DocumentRef, NoteCollection, NoteSchema,
    NotesPipeline, OpenAiClient, ingest, purge, release,
};
use studynotes_pdf::{load_pdf, resolve_inputs};
use studynotes_reporting::{summarize, write_notes};

mod output;
mod progress;

use output::Printer;
use progress::Spinner;

/// Study assistant for lecture PDFs: ask questions with citations, or generate
/// ten validated study notes exported as JSON and Markdown.
#[derive(Parser, Debug)]
#[command(name = "studynotes", version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Model to use (overrides STUDYNOTES_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// API base URL (overrides OPENAI_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Per-request timeout in seconds (overrides STUDYNOTES_TIMEOUT)
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask questions about the given PDFs
    Ask {
        #[command(flatten)]
        sources: SourceArgs,

        /// Question to ask; repeat for several. Interactive when omitted.
        #[arg(short = 'q', long = "question")]
        questions: Vec<String>,
    },
    /// Generate exactly ten study notes from the given PDFs
    Notes {
        #[command(flatten)]
        sources: SourceArgs,

        /// Directory for notes.json and notes.md
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Topic to emphasize in the notes
        #[arg(long)]
        focus: Option<String>,
    },
    /// Delete uploaded PDFs and study vector stores left on the provider
    Cleanup,
}

#[derive(clap::Args, Debug)]
struct SourceArgs {
    /// PDF files, or directories containing PDF files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Leave the uploaded files and vector store in place afterwards
    #[arg(long)]
    keep_sources: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose);

    let printer = Printer::new(!args.no_color && std::io::stdout().is_terminal());

    // Resolve config from CLI flags > env vars > defaults
    let config = load_config(&args)?;
    let client = OpenAiClient::new(config)?;

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_for_signal.cancel();
        }
    });

    let (client, printer, cancel) = (&client, &printer, &cancel);
    match args.command {
        Command::Ask { sources, questions } => {
            with_sources(client, &sources, printer, cancel, |refs| {
                let dispatcher = Dispatcher::new(client.clone(), client.config())
                    .with_cancellation(cancel.clone());
                async move { ask(&dispatcher, &refs, &questions, printer, cancel).await }
            })
            .await
        }
        Command::Notes {
            sources,
            output_dir,
            focus,
        } => {
            with_sources(client, &sources, printer, cancel, |refs| {
                let dispatcher = Dispatcher::new(client.clone(), client.config())
                    .with_cancellation(cancel.clone());
                let schema = NoteSchema::new().with_focus(focus);
                async move {
                    notes(
                        NotesPipeline::new(dispatcher, schema),
                        &refs,
                        &output_dir,
                        printer,
                        cancel,
                    )
                    .await
                }
            })
            .await
        }
        Command::Cleanup => {
            let spinner = Spinner::new("Deleting study materials...");
            let report = purge(client).await;
            spinner.finish();
            printer.cleanup(&report?);
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(args: &Args) -> Result<Config, ConfigError> {
    let timeout = args.timeout.map(|secs| secs.to_string());
    Config::from_lookup(|var| {
        let flag = match var {
            env_vars::MODEL => args.model.clone(),
            env_vars::BASE_URL => args.base_url.clone(),
            env_vars::TIMEOUT => timeout.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(var).ok())
    })
}

/// Upload and index the input PDFs, run `body` against them, then delete
/// them again unless `--keep-sources` was given.
async fn with_sources<F, Fut>(
    client: &OpenAiClient,
    sources: &SourceArgs,
    printer: &Printer,
    cancel: &CancellationToken,
    body: F,
) -> anyhow::Result<()>
where
    F: FnOnce(Vec<DocumentRef>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let paths = resolve_inputs(&sources.inputs)?;
    let docs = paths
        .iter()
        .map(|p| load_pdf(p))
        .collect::<Result<Vec<_>, _>>()?;

    let config = client.config();
    let spinner = Spinner::new("Uploading...");
    let ingested = ingest(
        client,
        &docs,
        config.poll_interval,
        config.max_poll_attempts,
        |event| spinner.ingest_event(&event),
        cancel,
    )
    .await;
    spinner.finish();
    let refs = ingested.context("could not prepare sources")?;
    printer.success(format!("{} document(s) ready", refs.len()));

    let result = body(refs.clone()).await;

    if sources.keep_sources {
        if let Some(first) = refs.first() {
            printer.info(format!("Keeping vector store {}", first.vector_store_id));
        }
    } else {
        let report = release(client, &refs).await;
        for failure in &report.failures {
            printer.warn(format!("could not delete {}", failure));
        }
    }

    result
}

async fn ask(
    dispatcher: &Dispatcher<OpenAiClient>,
    sources: &[DocumentRef],
    questions: &[String],
    printer: &Printer,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    if !questions.is_empty() {
        for question in questions {
            printer.info(format!("Q: {}", question));
            answer(dispatcher, question, sources, printer).await?;
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        printer.prompt("\nQuestion (or 'quit'): ");
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        // EOF
        let Some(line) = line else { break };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_ascii_lowercase().as_str(), "quit" | "exit" | "q") {
            break;
        }
        match answer(dispatcher, question, sources, printer).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => break,
            Err(e) => printer.error(&e),
        }
    }
    Ok(())
}

async fn answer(
    dispatcher: &Dispatcher<OpenAiClient>,
    question: &str,
    sources: &[DocumentRef],
    printer: &Printer,
) -> Result<(), CoreError> {
    let spinner = Spinner::new("Thinking...");
    let result = dispatcher.ask(question, sources).await;
    spinner.finish();
    printer.answer(&result?);
    Ok(())
}

async fn notes(
    mut pipeline: NotesPipeline<OpenAiClient>,
    sources: &[DocumentRef],
    output_dir: &Path,
    printer: &Printer,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let mut outcome = generate(&mut pipeline, sources, false).await;
    loop {
        match outcome {
            Ok(collection) => {
                printer.summary(&summarize(&collection));
                printer.notes(&collection);
                std::fs::create_dir_all(output_dir).with_context(|| {
                    format!("could not create output directory {}", output_dir.display())
                })?;
                let written = write_notes(&collection, output_dir)?;
                pipeline.mark_exported()?;
                printer.written(&written);
                return Ok(());
            }
            Err(e) if e.is_validation_failure() => {
                printer.error(&e);
                if let Some(raw) = pipeline.rejected_payload() {
                    printer.rejected_payload(raw);
                }
                let retry = std::io::stdin().is_terminal()
                    && confirm(printer, "Regenerate? [y/N] ", cancel).await?;
                if !retry {
                    return Err(anyhow::Error::new(e).context("no notes were written"));
                }
                outcome = generate(&mut pipeline, sources, true).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn generate(
    pipeline: &mut NotesPipeline<OpenAiClient>,
    sources: &[DocumentRef],
    again: bool,
) -> Result<NoteCollection, CoreError> {
    let spinner = Spinner::new("Generating study notes...");
    let result = if again {
        pipeline.regenerate(sources).await
    } else {
        pipeline.run(sources).await
    };
    spinner.finish();
    result
}

async fn confirm(
    printer: &Printer,
    question: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<bool> {
    printer.prompt(question);
    let yes = answered_yes(BufReader::new(tokio::io::stdin()), cancel).await?;
    if cancel.is_cancelled() {
        println!();
    }
    Ok(yes)
}

/// Read one line and report whether it says yes. Cancellation counts as no.
async fn answered_yes<R>(input: R, cancel: &CancellationToken) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let line = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(false),
        line = lines.next_line() => line?,
    };
    let answer = line.unwrap_or_default();
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn yes_answers() {
        let cancel = CancellationToken::new();
        assert!(answered_yes(&b"y\n"[..], &cancel).await.unwrap());
        assert!(answered_yes(&b" YES \n"[..], &cancel).await.unwrap());
        assert!(!answered_yes(&b"n\n"[..], &cancel).await.unwrap());
        assert!(!answered_yes(&b""[..], &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn cancel_ends_pending_prompt() {
        // The writer stays open and silent, so the read never completes
        let (mut writer, reader) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });

        let yes = answered_yes(BufReader::new(reader), &cancel).await.unwrap();
        assert!(!yes);
        writer.shutdown().await.unwrap();
    }
}
