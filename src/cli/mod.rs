pub mod clipboard;
mod output;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::fs;
use tracing::info;

use crate::completion::{CompletionRequest, CursorPosition};
use crate::config::{AppConfig, CliOverrides};
use crate::files::language_from_filename;
use crate::models::{ConsoleOutput, ExecutionResult, SharePermission};
use crate::runner::{ConsoleBuffer, OutputSink, SUPPORTED_LANGUAGES};
use crate::store::{FileUpdate, ProjectUpdate, StoreError};
use crate::watch::run_watch_mode;
use crate::workspace::{OpenedShare, Workspace};

use clipboard::copy_to_clipboard;
use output::{
    PrintSink, print_files, print_json, print_projects, print_shares,
    print_summary, print_versions,
};

#[derive(Parser, Debug)]
#[command(
    name = "chambers",
    version,
    about = "Projects, files, code runs and AI completions for Code Chambers"
)]
pub struct Cli {
    /// Hosted backend URL
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    /// Hosted backend anon key
    #[arg(long, global = true)]
    pub backend_key: Option<String>,

    /// Code execution API base URL
    #[arg(long, global = true)]
    pub execution_url: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Completion model name
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Completion API key (stored keys are used when omitted)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Log level (error,warn,info,debug,trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Local session file
    #[arg(long, global = true)]
    pub session_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            backend_url: self.backend_url.clone(),
            backend_key: self.backend_key.clone(),
            execution_url: self.execution_url.clone(),
            completion_base_url: self.base_url.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            log_level: self.log_level.clone(),
            log_file: self.log_file.clone(),
            session_file: self.session_file.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage projects
    #[command(subcommand)]
    Projects(ProjectsCmd),
    /// Manage files in a project
    #[command(subcommand)]
    Files(FilesCmd),
    /// Save new content for a file and record a version
    Save {
        file_id: String,
        /// Read content from this path (stdin when omitted)
        #[arg(long)]
        from: Option<PathBuf>,
        /// Version description
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Run a stored file, or a local file with --path
    Run {
        #[arg(required_unless_present = "path")]
        file_id: Option<String>,
        #[arg(long, conflicts_with = "file_id")]
        path: Option<PathBuf>,
        /// Language of --path (guessed from the extension otherwise)
        #[arg(long, requires = "path", conflicts_with = "file_id")]
        language: Option<String>,
        /// Standard input passed to the program
        #[arg(long)]
        stdin: Option<String>,
        /// Print the result as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Ask for AI completions at a cursor position in a local file
    Complete {
        path: PathBuf,
        #[arg(long)]
        line: u32,
        #[arg(long)]
        column: u32,
        #[arg(long)]
        language: Option<String>,
    },
    /// Browse and restore file versions
    #[command(subcommand)]
    Versions(VersionsCmd),
    /// Create and manage share links
    #[command(subcommand)]
    Share(ShareCmd),
    /// Autosave a local file into a stored file while it is edited
    Watch {
        file_id: String,
        path: PathBuf,
        /// Show a desktop notification after each save
        #[arg(long, action = ArgAction::SetTrue)]
        notify: bool,
    },
    /// List supported languages
    Languages {
        /// Ask the execution service for its runtimes
        #[arg(long, action = ArgAction::SetTrue)]
        remote: bool,
    },
    /// Manage the completion API key
    #[command(subcommand)]
    Ai(AiCmd),
    /// Sign in, sign up or sign out
    #[command(subcommand)]
    Auth(AuthCmd),
}

#[derive(Subcommand, Debug)]
pub enum ProjectsCmd {
    List,
    Show {
        id: String,
    },
    Create {
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
    },
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum FilesCmd {
    List {
        project_id: String,
    },
    Show {
        id: String,
    },
    Create {
        project_id: String,
        name: String,
        #[arg(long)]
        language: Option<String>,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        language: Option<String>,
        /// Replace the content with this file's
        #[arg(long)]
        from: Option<PathBuf>,
    },
    Delete {
        id: String,
    },
    /// Download a file's content
    Export {
        id: String,
        /// Destination (defaults to the file name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
pub enum VersionsCmd {
    List { file_id: String },
    Restore { version_id: String },
    Delete { version_id: String },
}

#[derive(Subcommand, Debug)]
pub enum ShareCmd {
    /// Share a whole project
    Project {
        project_id: String,
        #[arg(long, default_value = "view")]
        permission: SharePermission,
        #[arg(long, action = ArgAction::SetTrue)]
        copy: bool,
    },
    /// Share one file as a read-only snippet
    Snippet {
        file_id: String,
        #[arg(long)]
        expires_in_days: Option<u32>,
        #[arg(long, action = ArgAction::SetTrue)]
        copy: bool,
    },
    /// Open a share link or token
    Open { token: String },
    /// List a project's share links
    List {
        project_id: String,
        #[arg(long, action = ArgAction::SetTrue)]
        copy: bool,
    },
    /// Deactivate a project share
    Revoke { share_id: String },
}

#[derive(Subcommand, Debug)]
pub enum AiCmd {
    SetKey { key: String },
    ClearKey,
    Status,
}

#[derive(Subcommand, Debug)]
pub enum AuthCmd {
    Login {
        username: String,
        #[arg(long, env = "CHAMBERS_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Signup {
        username: String,
        #[arg(long, env = "CHAMBERS_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        confirm: String,
    },
    Logout,
    Status,
}

#[derive(Serialize)]
struct RunReport<'a> {
    #[serde(flatten)]
    result: &'a ExecutionResult,
    console: &'a [ConsoleOutput],
}

/// Accepts a bare token or a full `{origin}/share/{token}` link.
pub fn share_token(input: &str) -> &str {
    let trimmed = input.trim().trim_end_matches('/');
    match trimmed.rsplit_once("/share/") {
        Some((_, token)) => token,
        None => trimmed,
    }
}

async fn read_content(from: Option<&Path>) -> Result<String> {
    match from {
        Some(path) => fs::read_to_string(path)
            .await
            .with_context(|| format!("read {}", path.display())),
        None => tokio::task::spawn_blocking(|| {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map(|_| buf)
        })
        .await?
        .context("read stdin"),
    }
}

fn announce_link(url: &str, copy: bool) {
    println!("{url}");
    if copy && copy_to_clipboard(url) {
        eprintln!("Link copied to clipboard.");
    }
}

pub async fn execute(cfg: AppConfig, command: Command) -> Result<ExitCode> {
    let mut ws = Workspace::open(cfg)?;
    match command {
        Command::Projects(cmd) => projects(&ws, cmd).await?,
        Command::Files(cmd) => files(&ws, cmd).await?,
        Command::Save {
            file_id,
            from,
            message,
        } => {
            let content = read_content(from.as_deref()).await?;
            let (file, version) = ws
                .save_file(&file_id, &content, message.as_deref())
                .await?;
            println!("Saved {} as version {}", file.name, version.version_number);
        }
        Command::Run {
            file_id,
            path,
            language,
            stdin,
            json,
        } => {
            // With --json the console lines are buffered into the report.
            let mut console = ConsoleBuffer::new();
            let mut printer = PrintSink;
            let sink: &mut dyn OutputSink = if json { &mut console } else { &mut printer };
            let result = match (file_id, path) {
                (Some(id), _) => ws.run_file(&id, stdin.as_deref(), sink).await?,
                (None, Some(path)) => {
                    let code = read_content(Some(&path)).await?;
                    let language = language.unwrap_or_else(|| {
                        language_from_filename(&path.to_string_lossy()).to_string()
                    });
                    ws.run_code(&code, &language, stdin.as_deref(), sink).await?
                }
                (None, None) => bail!("give a file id or --path"),
            };
            if json {
                print_json(&RunReport {
                    result: &result,
                    console: &console.entries,
                })?;
            } else {
                print_summary(&result);
            }
            if !result.succeeded() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Complete {
            path,
            line,
            column,
            language,
        } => {
            if !ws.completion_configured() {
                bail!("no completion API key; run `chambers ai set-key <KEY>`");
            }
            let code = read_content(Some(&path)).await?;
            let file_name = path.to_string_lossy().to_string();
            let language =
                language.unwrap_or_else(|| language_from_filename(&file_name).to_string());
            let suggestions = ws
                .complete(CompletionRequest {
                    code,
                    language,
                    cursor: CursorPosition { line, column },
                    file_name: Some(file_name),
                })
                .await;
            if suggestions.is_empty() {
                eprintln!("No suggestions.");
            }
            for (i, s) in suggestions.iter().enumerate() {
                println!("--- suggestion {} ({})", i + 1, s.label());
                println!("{}", s.text);
            }
        }
        Command::Versions(cmd) => versions(&ws, cmd).await?,
        Command::Share(cmd) => share(&ws, cmd).await?,
        Command::Watch {
            file_id,
            path,
            notify,
        } => run_watch_mode(&ws, &file_id, &path, notify).await?,
        Command::Languages { remote } => {
            if remote {
                for lang in ws.languages().await {
                    println!("{:<14} {:<10} {}", lang.id, lang.version, lang.aliases.join(", "));
                }
            } else {
                for lang in SUPPORTED_LANGUAGES {
                    println!("{:<12} {:<12} {}", lang.tag, lang.display_name, lang.version);
                }
            }
        }
        Command::Ai(cmd) => match cmd {
            AiCmd::SetKey { key } => {
                ws.set_api_key(&key)?;
                println!("API key saved.");
            }
            AiCmd::ClearKey => {
                ws.clear_api_key()?;
                println!("API key removed.");
            }
            AiCmd::Status => {
                if ws.completion_configured() {
                    println!("AI completions enabled ({})", ws.config.completion.model);
                } else {
                    println!("AI completions disabled: no API key.");
                }
            }
        },
        Command::Auth(cmd) => match cmd {
            AuthCmd::Login { username, password } => {
                let auth = ws.sign_in(&username, &password).await?;
                println!("Signed in as {}", auth.username().unwrap_or(&username));
            }
            AuthCmd::Signup {
                username,
                password,
                confirm,
            } => {
                ws.sign_up(&username, &password, &confirm).await?;
                println!("Account created. Signed in as {username}");
            }
            AuthCmd::Logout => {
                ws.sign_out().await?;
                println!("Signed out.");
            }
            AuthCmd::Status => match ws.user() {
                Some(user) => println!(
                    "Signed in as {} ({})",
                    user.username().unwrap_or("unknown"),
                    user.user_id
                ),
                None => println!("Not signed in."),
            },
        },
    }
    Ok(ExitCode::SUCCESS)
}

async fn projects(ws: &Workspace, cmd: ProjectsCmd) -> Result<()> {
    match cmd {
        ProjectsCmd::List => print_projects(&ws.projects.list().await?),
        ProjectsCmd::Show { id } => {
            let project = ws
                .projects
                .get(&id)
                .await?
                .ok_or_else(|| StoreError::not_found("Project", &id))?;
            println!("{} ({})", project.name, project.id);
            if let Some(d) = &project.description {
                println!("{d}");
            }
            print_files(&ws.files.list_by_project(&project.id).await?);
        }
        ProjectsCmd::Create { name, description } => {
            let project = ws.create_project(&name, description.as_deref()).await?;
            println!("Created project {} ({})", project.name, project.id);
        }
        ProjectsCmd::Update {
            id,
            name,
            description,
        } => {
            let project = ws
                .projects
                .update(&id, &ProjectUpdate { name, description })
                .await?;
            println!("Updated project {}", project.name);
        }
        ProjectsCmd::Delete { id } => {
            ws.projects.delete(&id).await?;
            println!("Deleted project {id}");
        }
    }
    Ok(())
}

async fn files(ws: &Workspace, cmd: FilesCmd) -> Result<()> {
    match cmd {
        FilesCmd::List { project_id } => print_files(&ws.files.list_by_project(&project_id).await?),
        FilesCmd::Show { id } => {
            let file = ws.load_file(&id).await?;
            print!("{}", file.content);
            if !file.content.ends_with('\n') {
                println!();
            }
        }
        FilesCmd::Create {
            project_id,
            name,
            language,
        } => {
            let file = ws
                .create_file(&project_id, &name, language.as_deref())
                .await?;
            println!("Created {} ({}, {})", file.name, file.language, file.id);
        }
        FilesCmd::Update {
            id,
            name,
            language,
            from,
        } => {
            let content = match from {
                Some(path) => Some(read_content(Some(&path)).await?),
                None => None,
            };
            let file = ws
                .files
                .update(
                    &id,
                    &FileUpdate {
                        name,
                        content,
                        language,
                    },
                )
                .await?;
            println!("Updated {}", file.name);
        }
        FilesCmd::Delete { id } => {
            ws.files.delete(&id).await?;
            println!("Deleted file {id}");
        }
        FilesCmd::Export { id, output } => {
            let file = ws.load_file(&id).await?;
            let dest = output.unwrap_or_else(|| PathBuf::from(&file.name));
            fs::write(&dest, &file.content)
                .await
                .with_context(|| format!("write {}", dest.display()))?;
            info!(file_id=%file.id, dest=%dest.display(), "file exported");
            println!("Wrote {}", dest.display());
        }
    }
    Ok(())
}

async fn versions(ws: &Workspace, cmd: VersionsCmd) -> Result<()> {
    match cmd {
        VersionsCmd::List { file_id } => print_versions(&ws.versions.list_by_file(&file_id).await?),
        VersionsCmd::Restore { version_id } => {
            let file = ws.restore_version(&version_id).await?;
            println!("Restored {} from version {version_id}", file.name);
        }
        VersionsCmd::Delete { version_id } => {
            ws.versions.delete(&version_id).await?;
            println!("Deleted version {version_id}");
        }
    }
    Ok(())
}

async fn share(ws: &Workspace, cmd: ShareCmd) -> Result<()> {
    match cmd {
        ShareCmd::Project {
            project_id,
            permission,
            copy,
        } => {
            let (share, url) = ws.share_project(&project_id, permission).await?;
            eprintln!("Share link ({}):", share.permission);
            announce_link(&url, copy);
        }
        ShareCmd::Snippet {
            file_id,
            expires_in_days,
            copy,
        } => {
            let (snippet, url) = ws.share_file(&file_id, expires_in_days).await?;
            match snippet.expires_at {
                Some(at) => eprintln!("Snippet link (expires {}):", output::short_time(at)),
                None => eprintln!("Snippet link (never expires):"),
            }
            announce_link(&url, copy);
        }
        ShareCmd::Open { token } => {
            let token = share_token(&token);
            match ws.open_link(token).await? {
                OpenedShare::Snippet(snippet) => {
                    eprintln!(
                        "{} ({}) · {} views",
                        snippet.file_name,
                        snippet.language,
                        snippet.view_count + 1
                    );
                    print!("{}", snippet.content);
                    if !snippet.content.ends_with('\n') {
                        println!();
                    }
                }
                OpenedShare::Project {
                    share,
                    project,
                    files,
                } => {
                    println!("{} ({} access)", project.name, share.permission);
                    print_files(&files);
                }
            }
        }
        ShareCmd::List { project_id, copy } => {
            let shares = ws.shares.list_by_project(&project_id).await?;
            print_shares(&shares, |t| ws.config.share_url(t));
            if copy && let Some(active) = shares.iter().find(|s| s.is_active) {
                announce_link(&ws.config.share_url(&active.share_token), true);
            }
        }
        ShareCmd::Revoke { share_id } => {
            ws.shares.deactivate(&share_id).await?;
            println!("Revoked share {share_id}");
        }
    }
    Ok(())
}
