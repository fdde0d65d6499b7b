//! tutorloop CLI
//!
//! Generates programming courses with an LLM and runs them as interactive
//! lessons in the terminal.

mod ui;
mod wizard;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tutorloop_engine::session::{output_markdown, verdict_markdown};
use tutorloop_engine::{
    mask_key, suggested_models, AttemptPhase, Config, Course, CourseGenerator, CourseLength,
    CourseStore, Judge, LessonSession, ProviderRegistry, ProviderSettings, SessionState,
    StructuredCompletion, KNOWN_PROVIDERS,
};
use tutorloop_runner::LocalRunner;

/// Width of the course id column in `list`.
const ID_COLUMN_WIDTH: usize = 30;

/// tutorloop - AI-generated programming courses in your terminal
///
/// Generate a course on any topic, then work through its lessons: read the
/// slides, edit the starter file and let the AI judge check your solution.
#[derive(Parser, Debug)]
#[command(name = "tutorloop")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: ~/.tutorloop/config.json)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Directory holding generated courses
    #[arg(long, value_name = "DIR", global = true)]
    courses_dir: Option<PathBuf>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a new course on a topic
    Generate {
        /// What you want to learn, in your own language; prompts when omitted
        #[arg(value_name = "TOPIC", num_args = 0..)]
        topic: Vec<String>,

        /// Course length: short, medium or long
        #[arg(short, long, default_value_t = CourseLength::Medium)]
        length: CourseLength,
    },
    /// List generated courses
    List,
    /// Start a learning session
    Start {
        /// Course to open; prompts for one when omitted
        #[arg(value_name = "COURSE_ID")]
        course_id: Option<String>,
    },
    /// Set up a provider; runs a wizard when no flags are given
    Config {
        /// Print the current configuration and exit
        #[arg(long, conflicts_with_all = ["provider", "api_key", "model"])]
        show: bool,

        /// Provider to configure and make active
        #[arg(long)]
        provider: Option<String>,

        /// API key for the provider
        #[arg(long)]
        api_key: Option<String>,

        /// Model identifier for the provider
        #[arg(long)]
        model: Option<String>,
    },
    /// List suggested models per provider
    Models {
        /// Only show models for this provider
        #[arg(value_name = "PROVIDER")]
        provider: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (warn)
    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?cli.config, courses_dir = ?cli.courses_dir, "Starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load_from_file(&config_path)?;
    let courses_root = match cli.courses_dir {
        Some(dir) => dir,
        None => config.courses_root()?,
    };
    let store = CourseStore::new(courses_root);

    match cli.command {
        Command::Generate { topic, length } => {
            let topic = if topic.is_empty() {
                wizard::topic()?
            } else {
                topic.join(" ")
            };
            generate(&config, store, &topic, length).await
        }
        Command::List => list(&store),
        Command::Start { course_id } => start(&config, store, course_id).await,
        Command::Config {
            show,
            provider,
            api_key,
            model,
        } => {
            if show {
                print_config(&config, &config_path);
                Ok(())
            } else {
                configure(config, &config_path, provider, api_key, model)
            }
        }
        Command::Models { provider } => models(provider.as_deref()),
    }
}

/// Builds the active provider backend from the configuration.
fn build_provider(config: &Config) -> anyhow::Result<Arc<dyn StructuredCompletion>> {
    let settings = config
        .active_provider_config()
        .map_or_else(|| ProviderSettings::new("", ""), ProviderSettings::from);
    let provider = ProviderRegistry::with_defaults().build(
        &config.active_provider,
        &settings,
        config.request_timeout(),
    )?;
    Ok(provider)
}

async fn generate(
    config: &Config,
    store: CourseStore,
    topic: &str,
    length: CourseLength,
) -> anyhow::Result<()> {
    let generator = CourseGenerator::new(build_provider(config)?, store.clone());

    let spinner = ui::spinner("Generating course...");
    let result = generator.generate(topic, length).await;
    spinner.finish_and_clear();
    let course = result?;

    println!("Course created: {}", course.title);
    println!("  ID: {}", course.id);
    println!("  Lessons: {}", course.lessons.len());
    println!("  Directory: {}", store.course_dir(&course.id)?.display());
    println!();
    println!("Run `tutorloop start {}` to begin.", course.id);
    Ok(())
}

fn list(store: &CourseStore) -> anyhow::Result<()> {
    let courses = store.list()?;
    if courses.is_empty() {
        println!("No courses yet. Run `tutorloop generate <TOPIC>` to create one.");
        return Ok(());
    }

    println!("{:<ID_COLUMN_WIDTH$}  TITLE", "COURSE ID");
    for course in &courses {
        println!(
            "{:<ID_COLUMN_WIDTH$}  {}",
            ui::truncate(&course.id, ID_COLUMN_WIDTH),
            course.title
        );
    }
    Ok(())
}

async fn start(
    config: &Config,
    store: CourseStore,
    course_id: Option<String>,
) -> anyhow::Result<()> {
    let course = match course_id {
        Some(id) => store.load(&id)?,
        None => choose_course(&store)?,
    };

    let provider = build_provider(config)?;
    let runner = LocalRunner::new().with_optional_timeout(config.run_timeout());
    let course_dir = store.course_dir(&course.id)?;

    println!("[INFO] Course Directory: {}", course_dir.display());
    tracing::info!(course_id = %course.id, "Starting session");

    let mut session = LessonSession::new(
        course,
        store,
        Arc::new(runner),
        Arc::new(Judge::new(provider)),
    );
    run_session(&mut session).await
}

fn choose_course(store: &CourseStore) -> anyhow::Result<Course> {
    let courses = store.list()?;
    if courses.is_empty() {
        anyhow::bail!(
            "No courses found in '{}'\n\nSuggestion: Run `tutorloop generate <TOPIC>` first",
            store.root().display()
        );
    }
    wizard::choose_course(courses)
}

/// Drives the session until every lesson is solved.
async fn run_session(session: &mut LessonSession) -> anyhow::Result<()> {
    ui::clear_screen()?;
    loop {
        match session.state().clone() {
            SessionState::Presenting { .. } => {
                if let Some((header, markdown)) = session.current_slide() {
                    println!("{header}");
                    print!("{}", ui::render(markdown));
                }
                ui::wait_for_enter("[Enter] Next page")?;
                print!("\n\n");
                session.acknowledge()?;
            }
            SessionState::TaskShown { .. } => {
                let (header, markdown) = session.task_view()?;
                println!("{header}");
                print!("{}", ui::render(&markdown));
                session.acknowledge()?;
            }
            SessionState::Attempting { .. } => {
                ui::wait_for_enter("Edit and save the file, then hit Enter.")?;
                println!();
                attempt(session).await?;
            }
            SessionState::Judged { verdict, .. } => {
                print!("{}", ui::render(&verdict_markdown(&verdict)));
                let prompt = if verdict.is_correct {
                    "[Enter] Next Lesson"
                } else {
                    "[Enter] Retry"
                };
                ui::wait_for_enter(prompt)?;
                session.acknowledge()?;
                if verdict.is_correct {
                    ui::clear_screen()?;
                } else {
                    println!();
                }
            }
            SessionState::Finished => {
                println!("Course complete: {}", session.course().title);
                tracing::info!(attempts = session.attempts().len(), "Session finished");
                return Ok(());
            }
        }
    }
}

/// Runs one attempt; a learner program that fails to run is shown and
/// retried instead of aborting.
async fn attempt(session: &mut LessonSession) -> anyhow::Result<()> {
    let spinner = ui::spinner("Running...");
    let result = session
        .attempt_with_progress(|phase| match phase {
            AttemptPhase::Running => spinner.set_message("Running..."),
            AttemptPhase::Ran { output } => {
                spinner.suspend(|| print!("{}", ui::render(&output_markdown(output))));
            }
            AttemptPhase::Judging => spinner.set_message("Judging..."),
        })
        .await;
    spinner.finish_and_clear();

    match result {
        Ok(_) => Ok(()),
        Err(e) if e.is_learner_recoverable() => {
            if let Some(output) = e.execution_output() {
                print!("{}", ui::render(&output_markdown(output)));
            }
            eprintln!("{e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn configure(
    mut config: Config,
    path: &Path,
    provider: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    if provider.is_none() && api_key.is_none() && model.is_none() {
        if !wizard::configure(&mut config)? {
            println!("Configuration not changed.");
            return Ok(());
        }
    } else {
        apply_flags(&mut config, provider, api_key, model)?;
    }
    config.save_to_file(path)?;

    println!("Configuration saved to {}", path.display());
    println!("  Active provider: {}", config.active_provider);
    Ok(())
}

/// Updates one provider entry from command-line flags, keeping stored
/// values for flags that were not given.
fn apply_flags(
    config: &mut Config,
    provider: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    let provider = provider
        .unwrap_or_else(|| config.active_provider.clone())
        .trim()
        .to_lowercase();
    if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
        anyhow::bail!(
            "Unknown provider '{provider}'\n\nSuggestion: Use one of: {}",
            KNOWN_PROVIDERS.join(", ")
        );
    }

    let existing = config.providers.get(&provider).cloned().unwrap_or_default();
    config.set_provider(
        &provider,
        api_key.unwrap_or(existing.api_key),
        model.unwrap_or(existing.model),
    );
    Ok(())
}

/// Prints the configuration with API keys masked.
fn print_config(config: &Config, path: &Path) {
    println!("Configuration ({}):", path.display());
    println!("  Active provider: {}", config.active_provider);
    if let Some(dir) = &config.courses_dir {
        println!("  Courses directory: {}", dir.display());
    }
    if let Some(secs) = config.request_timeout_secs {
        println!("  Request timeout: {secs}s");
    }
    if let Some(secs) = config.run_timeout_secs {
        println!("  Run timeout: {secs}s");
    }
    if config.providers.is_empty() {
        println!();
        println!("No providers configured.");
        println!("Run `tutorloop config` to set one up.");
        return;
    }
    for (name, settings) in &config.providers {
        println!();
        println!("  [{name}]");
        println!("    Model: {}", settings.model);
        println!("    API key: {}", mask_key(&settings.api_key));
        if let Some(url) = &settings.base_url {
            println!("    Base URL: {url}");
        }
    }
}

fn models(provider: Option<&str>) -> anyhow::Result<()> {
    let providers: Vec<&str> = match provider {
        Some(p) => {
            if suggested_models(p).is_empty() {
                anyhow::bail!(
                    "Unknown provider '{p}'\n\nSuggestion: Use one of: {}",
                    KNOWN_PROVIDERS.join(", ")
                );
            }
            vec![p]
        }
        None => KNOWN_PROVIDERS.to_vec(),
    };

    for name in providers {
        println!("{name}:");
        for model in suggested_models(name) {
            println!("  {model}");
        }
    }
    Ok(())
}
