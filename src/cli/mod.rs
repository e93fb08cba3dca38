//! CLI argument parsing and command routing

use std::{
    io::{self, Write},
    path::PathBuf,
};

use clap::{Parser, Subcommand};

use crate::{
    assistants::{Assistant, AssistantStatus, AssistantStore},
    config::{BackendKind, Settings},
    error::Result,
    messages::Message,
    services::{BackendFactory, ChatBackend, ChatOptions},
};

/// Atelier: build and chat with custom AI assistants
#[derive(Debug, Parser)]
#[command(name = "atelier")]
#[command(about = "Build and chat with custom AI assistants", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Keep assistants in this user's store file
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Chat interactively with a backend
    Chat {
        /// Assistant to chat with
        #[arg(long)]
        assistant: Option<String>,

        /// Backend to use (ollama, anthropic/claude, openai/chatgpt, xai/grok)
        #[arg(long, default_value = "ollama")]
        backend: BackendKind,

        /// Model to use (defaults per backend)
        #[arg(long)]
        model: Option<String>,
    },

    /// Send a single prompt and print the reply
    Ask {
        /// The prompt to send
        prompt: String,

        /// Assistant to answer as
        #[arg(long)]
        assistant: Option<String>,

        /// Backend to use
        #[arg(long, default_value = "ollama")]
        backend: BackendKind,

        /// Model to use (defaults per backend)
        #[arg(long)]
        model: Option<String>,
    },

    /// Manage assistant definitions
    Assistants {
        #[command(subcommand)]
        command: AssistantCommands,
    },

    /// Manage models on the local Ollama server
    Models {
        #[command(subcommand)]
        command: ModelCommands,
    },

    /// Show which backends are ready to use
    Backends,
}

/// Assistant registry commands
#[derive(Debug, Subcommand)]
pub enum AssistantCommands {
    /// List configured assistants
    List,

    /// Create a new assistant
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        description: String,

        #[arg(long)]
        system_prompt: String,

        /// Plain-text file to attach as the knowledge base
        #[arg(long)]
        knowledge_file: Option<PathBuf>,

        /// Save as a draft instead of an active assistant
        #[arg(long)]
        draft: bool,
    },

    /// Show one assistant in full
    Show { name: String },

    /// Delete an assistant
    Delete { name: String },

    /// Export an assistant as JSON
    Export {
        name: String,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Import a previously exported assistant
    Import { file: PathBuf },
}

/// Local model management commands
#[derive(Debug, Subcommand)]
pub enum ModelCommands {
    /// List installed models
    List,

    /// Pull a model from the registry
    Pull { name: String },

    /// Remove an installed model
    Rm { name: String },
}

/// Execute a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::from_env();
    let store = AssistantStore::for_user(&settings.data_dir, cli.user.as_deref());

    match cli.command {
        Commands::Chat {
            assistant,
            backend,
            model,
        } => chat(&settings, &store, assistant, backend, model).await,
        Commands::Ask {
            prompt,
            assistant,
            backend,
            model,
        } => ask(&settings, &store, &prompt, assistant, backend, model).await,
        Commands::Assistants { command } => assistants(&store, command),
        Commands::Models { command } => models(&settings, command).await,
        Commands::Backends => backends(&settings).await,
    }
}

fn build_backend(
    settings: &Settings,
    store: &AssistantStore,
    assistant: Option<String>,
    kind: BackendKind,
    model: Option<String>,
) -> Result<(Box<dyn ChatBackend>, Option<String>, Option<Assistant>)> {
    let profile = assistant.map(|name| store.find(&name)).transpose()?;
    let system_prompt = profile.as_ref().map(Assistant::full_system_prompt);
    let backend = BackendFactory::create(settings.backend_config(kind, model))?;
    Ok((backend, system_prompt, profile))
}

async fn chat(
    settings: &Settings,
    store: &AssistantStore,
    assistant: Option<String>,
    kind: BackendKind,
    model: Option<String>,
) -> Result<()> {
    let (backend, system_prompt, profile) =
        build_backend(settings, store, assistant, kind, model)?;

    println!(
        "Chatting via {} with model '{}'. Type 'exit' to quit.",
        backend.kind().label(),
        backend.model()
    );
    if let Some(assistant) = &profile {
        println!("Assistant: {} ({})", assistant.name, assistant.description);
    }

    let mut conversation: Vec<Message> = Vec::new();
    let options = ChatOptions::default();
    let stdin = io::stdin();

    loop {
        print!("you> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        conversation.push(Message::user(line));
        match backend
            .send(&conversation, system_prompt.as_deref(), &options)
            .await
        {
            Ok(reply) => {
                println!("assistant> {}", reply.text);
                conversation.push(Message::assistant(reply.text));
            }
            Err(err) => {
                // Keep the history clean so the failed turn can be retried.
                conversation.pop();
                eprintln!("error: {err}");
            }
        }
    }

    Ok(())
}

async fn ask(
    settings: &Settings,
    store: &AssistantStore,
    prompt: &str,
    assistant: Option<String>,
    kind: BackendKind,
    model: Option<String>,
) -> Result<()> {
    let (backend, system_prompt, _) = build_backend(settings, store, assistant, kind, model)?;

    let conversation = vec![Message::user(prompt)];
    let reply = backend
        .send(&conversation, system_prompt.as_deref(), &ChatOptions::default())
        .await?;

    println!("{}", reply.text);
    Ok(())
}

fn assistants(store: &AssistantStore, command: AssistantCommands) -> Result<()> {
    match command {
        AssistantCommands::List => {
            let assistants = store.load()?;
            if assistants.is_empty() {
                println!("No assistants yet. Create one with 'atelier assistants create'.");
                return Ok(());
            }
            for assistant in assistants {
                let kb_marker = if assistant.knowledge_base.is_empty() {
                    ""
                } else {
                    " [KB]"
                };
                println!(
                    "{} ({}){}: {}",
                    assistant.name, assistant.status, kb_marker, assistant.description
                );
            }
        }
        AssistantCommands::Create {
            name,
            description,
            system_prompt,
            knowledge_file,
            draft,
        } => {
            let mut assistant = Assistant::new(name, description, system_prompt);
            if draft {
                assistant = assistant.with_status(AssistantStatus::Draft);
            }
            if let Some(path) = knowledge_file {
                assistant = assistant.with_knowledge_base(std::fs::read_to_string(path)?);
            }
            let assistant = store.add(assistant)?;
            println!("Created '{}' in {}", assistant.name, store.path().display());
        }
        AssistantCommands::Show { name } => {
            let assistant = store.find(&name)?;
            println!("Name:        {}", assistant.name);
            println!("Status:      {}", assistant.status);
            println!("Created:     {}", assistant.created_at.format("%Y-%m-%d"));
            println!("Description: {}", assistant.description);
            println!("System prompt:\n{}", assistant.system_prompt);
            if !assistant.knowledge_base.is_empty() {
                let preview: String = assistant.knowledge_base.chars().take(300).collect();
                let suffix = if assistant.knowledge_base.chars().count() > 300 {
                    "..."
                } else {
                    ""
                };
                println!("Knowledge base:\n{preview}{suffix}");
            }
        }
        AssistantCommands::Delete { name } => {
            let removed = store.remove(&name)?;
            println!("Deleted '{}'", removed.name);
        }
        AssistantCommands::Export { name, output } => {
            let document = store.export(&name)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, document)?;
                    println!("Exported '{}' to {}", name, path.display());
                }
                None => println!("{document}"),
            }
        }
        AssistantCommands::Import { file } => {
            let document = std::fs::read_to_string(file)?;
            let imported = store.import(&document)?;
            println!("Imported '{}'", imported.name);
        }
    }
    Ok(())
}

async fn models(settings: &Settings, command: ModelCommands) -> Result<()> {
    let manager = crate::services::ollama::OllamaManager::new(settings.ollama_host.clone())?;

    match command {
        ModelCommands::List => {
            let models = manager.list_models().await?;
            if models.is_empty() {
                println!("No models installed. Pull one with 'atelier models pull llama3'.");
            } else {
                for model in models {
                    println!("{model}");
                }
            }
        }
        ModelCommands::Pull { name } => {
            println!("Pulling '{name}'... this may take a few minutes.");
            let status = manager.pull_model(&name).await?;
            println!("{status}");
        }
        ModelCommands::Rm { name } => {
            manager.delete_model(&name).await?;
            println!("Removed '{name}'");
        }
    }
    Ok(())
}

async fn backends(settings: &Settings) -> Result<()> {
    let manager = crate::services::ollama::OllamaManager::new(settings.ollama_host.clone())?;
    let ollama_up = manager.is_reachable().await;

    for kind in BackendKind::ALL {
        let ready = match kind {
            BackendKind::Ollama => ollama_up,
            _ => settings.api_key_for(kind).is_some(),
        };
        let status = if ready { "ready" } else { "unconfigured" };
        println!("{:<14} {}", status, kind.label());
    }

    if !ollama_up {
        println!("\nOllama is not reachable at {}. Start it with 'ollama serve'.", settings.ollama_host);
    }
    Ok(())
}
