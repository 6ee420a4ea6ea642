use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Parser;

use doc_digitizer::session::{SessionManager, SubmitOutcome};
use doc_digitizer::{
    BackendClient, IdentityContext, backend, certificate, data, labels, settings,
};

#[derive(Parser, Debug)]
#[command(
    name = "doc-digitizer",
    version,
    about = "Capture document pages and submit them for digitization"
)]
struct Cli {
    /// Image files to upload as the pages of one document
    files: Vec<String>,

    /// Document name (default: Document-<timestamp>)
    #[arg(short = 'n', long = "name")]
    name: Option<String>,

    /// Override the multi-page flag (default: more than one file)
    #[arg(long = "multi-page")]
    multi_page: Option<bool>,

    /// Certificate language (default: settings [certificate] language)
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Show the certificate stored under this id and exit
    #[arg(long = "fetch")]
    fetch: Option<String>,

    /// List the citizen's documents and exit
    #[arg(long = "documents")]
    documents: bool,

    /// Citizen id used by --documents
    #[arg(long = "citizen-id")]
    citizen_id: Option<String>,

    /// Filter --documents by name or type
    #[arg(long = "search")]
    search: Option<String>,

    /// Show supported certificate languages and exit
    #[arg(long = "show-languages")]
    show_languages: bool,

    /// Show certificate labels for --lang and exit
    #[arg(long = "show-labels")]
    show_labels: bool,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Interactive mode
    #[arg(short = 'i', long = "interactive")]
    interactive: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    doc_digitizer::logging::init(cli.verbose)?;
    if cli.interactive {
        return run_interactive(cli).await;
    }

    let output = doc_digitizer::run(
        doc_digitizer::Config {
            document_name: cli.name,
            multi_page: cli.multi_page,
            lang: cli.lang,
            fetch: cli.fetch,
            documents: cli.documents,
            citizen_id: cli.citizen_id,
            search: cli.search,
            show_languages: cli.show_languages,
            show_labels: cli.show_labels,
            settings_path: cli.read_settings,
        },
        cli.files,
    )
    .await?;

    println!("{}", output);
    Ok(())
}

struct InteractiveState {
    manager: SessionManager,
    client: BackendClient,
    lang: String,
    verify_base_url: String,
    identity: IdentityContext,
}

impl InteractiveState {
    fn new(cli: &Cli) -> Result<Self> {
        let settings = settings::load_settings(cli.read_settings.as_deref().map(Path::new))?;
        let client = BackendClient::new(&settings.backend)?;
        let manager = SessionManager::new(Arc::new(client.clone()), settings.auto_reset_delay);
        if let Some(name) = cli.name.as_deref() {
            manager.set_document_name(name);
        }
        Ok(Self {
            manager,
            client,
            lang: cli
                .lang
                .clone()
                .unwrap_or_else(|| settings.certificate_language.clone()),
            verify_base_url: settings.verify_base_url,
            identity: IdentityContext::with_citizen_id(cli.citizen_id.clone().unwrap_or_default()),
        })
    }
}

async fn run_interactive(cli: Cli) -> Result<()> {
    let mut state = InteractiveState::new(&cli)?;
    println!("Interactive mode. Use /quit or /exit to finish.");
    println!("Type /help to see available commands.");

    if !cli.files.is_empty() {
        add_files(&state, &cli.files);
    }

    let mut line = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();
    loop {
        line.clear();
        print!("> ");
        io::stdout().flush()?;
        if stdin_lock.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if !input.starts_with('/') {
            eprintln!("commands start with '/'; type /help");
            continue;
        }
        match handle_interactive_command(input, &mut state, &mut stdin_lock).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(err) => eprintln!("error: {:#}", err),
        }
    }
    Ok(())
}

async fn handle_interactive_command(
    input: &str,
    state: &mut InteractiveState,
    stdin: &mut impl BufRead,
) -> Result<bool> {
    let trimmed = input.trim();
    if matches!(trimmed, "/quit" | "/exit") {
        return Ok(true);
    }
    if trimmed == "/help" {
        print_interactive_help();
        return Ok(false);
    }
    if trimmed == "/status" {
        println!("{}", doc_digitizer::format_snapshot(&state.manager.snapshot()));
        return Ok(false);
    }
    if trimmed == "/pages" {
        println!("{}", doc_digitizer::format_pages(&state.manager.snapshot()));
        return Ok(false);
    }
    if trimmed == "/submit" {
        let document_id = state.manager.document_id();
        print_submit_outcome(&document_id, state.manager.submit().await);
        return Ok(false);
    }
    if trimmed == "/new" {
        let reset = state
            .manager
            .start_new_document(|| confirm_discard(stdin).unwrap_or(false));
        if reset {
            println!("new document {}", state.manager.document_id());
        } else {
            println!("kept current document");
        }
        return Ok(false);
    }

    if let Some(arg) = trimmed.strip_prefix("/add") {
        let files = arg.split_whitespace().map(str::to_string).collect::<Vec<_>>();
        if files.is_empty() {
            return Err(anyhow!("usage: /add <file> [file...]"));
        }
        add_files(state, &files);
        return Ok(false);
    }
    if let Some(arg) = trimmed.strip_prefix("/capture") {
        let value = arg.trim();
        if value.is_empty() {
            return Err(anyhow!("usage: /capture <file>"));
        }
        let input = data::load_image(Path::new(value))?;
        let id = state.manager.capture_page(input);
        println!("captured page {}", id);
        return Ok(false);
    }
    if let Some(arg) = trimmed.strip_prefix("/remove") {
        let value = arg.trim();
        let page_id = match value.parse::<usize>() {
            Ok(number) => state
                .manager
                .page_id_at(number)
                .ok_or_else(|| anyhow!("no page {}", number))?,
            Err(_) => value.to_string(),
        };
        if state.manager.remove_page(&page_id) {
            println!("removed {}", page_id);
        } else {
            println!("unknown page {}", page_id);
        }
        return Ok(false);
    }
    if let Some(arg) = trimmed.strip_prefix("/name") {
        let value = arg.trim();
        if value.is_empty() {
            let snapshot = state.manager.snapshot();
            println!("name: {}", snapshot.document_name);
        } else {
            state.manager.set_document_name(value);
            println!("name set to {}", value);
        }
        return Ok(false);
    }
    if let Some(arg) = trimmed.strip_prefix("/multi") {
        let current = state.manager.snapshot().is_multi_page;
        let flag = parse_toggle(arg, current)?;
        state.manager.set_multi_page(flag);
        println!("multi-page: {}", flag);
        return Ok(false);
    }
    if let Some(arg) = trimmed.strip_prefix("/lang") {
        let value = arg.trim();
        if value.is_empty() {
            println!("lang: {}", state.lang);
        } else {
            state.lang = value.to_string();
            match labels::language_name(value) {
                Some(name) => println!("lang set to {} ({})", value, name),
                None => println!("lang set to {} (no label table, using defaults)", value),
            }
        }
        return Ok(false);
    }
    if let Some(arg) = trimmed.strip_prefix("/documents") {
        let documents = state.client.list_documents(&state.identity).await?;
        let matches = backend::filter_documents(&documents, arg);
        println!("{}", doc_digitizer::format_documents(&matches));
        return Ok(false);
    }
    if let Some(arg) = trimmed.strip_prefix("/citizen") {
        state.identity.set_citizen_id(arg);
        println!(
            "citizen id: {}",
            state.identity.citizen_id().unwrap_or("(unset)")
        );
        return Ok(false);
    }
    if let Some(arg) = trimmed.strip_prefix("/fetch") {
        let value = arg.trim();
        if value.is_empty() {
            return Err(anyhow!("usage: /fetch <id>"));
        }
        let certificate = certificate::load_certificate(&state.client, value, &state.lang).await?;
        println!("{}", certificate.render_text(&state.verify_base_url)?);
        return Ok(false);
    }

    eprintln!("unknown command: {}", trimmed);
    Ok(false)
}

fn add_files(state: &InteractiveState, files: &[String]) {
    let mut inputs = Vec::new();
    for file in files {
        match data::load_image(Path::new(file)) {
            Ok(input) => inputs.push(input),
            Err(err) => eprintln!("skipped {}: {:#}", file, err),
        }
    }
    let ids = state.manager.add_pages(inputs);
    println!("added {} page(s)", ids.len());
}

fn print_submit_outcome(document_id: &str, outcome: SubmitOutcome) {
    match outcome {
        SubmitOutcome::Skipped => println!("nothing to upload"),
        SubmitOutcome::InFlight => println!("an upload is already running"),
        SubmitOutcome::Completed {
            receipt,
            auto_reset,
        } => {
            println!("{}", doc_digitizer::format_receipt(document_id, &receipt));
            if auto_reset {
                println!("session will clear shortly");
            }
        }
        SubmitOutcome::Failed { message } => eprintln!("{}", message),
        SubmitOutcome::Discarded => println!("upload finished for a discarded document"),
    }
}

fn confirm_discard(stdin: &mut impl BufRead) -> Result<bool> {
    print!("Discard unsaved pages? [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    stdin.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn parse_toggle(arg: &str, current: bool) -> Result<bool> {
    let value = arg.trim();
    if value.is_empty() {
        return Ok(!current);
    }
    match value.to_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => Err(anyhow!("expected on/off/true/false/1/0")),
    }
}

fn print_interactive_help() {
    println!("Commands:");
    println!("  /quit, /exit                 Exit interactive mode");
    println!("  /add <file> [file...]        Add image files as pages");
    println!("  /capture <file>              Add one page as a camera capture");
    println!("  /remove <number|page-id>     Remove a page");
    println!("  /pages                       List pages");
    println!("  /status                      Show the current document");
    println!("  /name <name>                 Set document name (or show current)");
    println!("  /multi [on|off]              Toggle multi-page");
    println!("  /submit                      Upload the current pages");
    println!("  /new                         Start a new document");
    println!("  /lang <code>                 Set certificate language");
    println!("  /fetch <id>                  Show a stored certificate");
    println!("  /citizen <id>                Set citizen id");
    println!("  /documents [term]            List the citizen's documents");
}
