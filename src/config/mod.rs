use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const PROJECT_CONFIG_DIR: &str = ".chambers";
pub const DEFAULT_APP_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_EXECUTION_URL: &str = "https://emkc.org/api/v2/piston";
pub const DEFAULT_COMPLETION_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_AUTOSAVE_DEBOUNCE_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub execution: ExecutionConfig,
    pub completion: CompletionConfig,
    pub http: HttpConfig,
    pub autosave: AutosaveConfig,
    /// Base of generated share links.
    pub app_origin: String,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub session_file: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    /// Usernames map to `{username}@{email_domain}` for the auth service.
    pub email_domain: String,
}

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub api_url: String,
    /// Language evaluated in-process instead of remotely.
    pub inline_language: String,
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub suggestions: u32,
    pub cache_capacity: usize,
    /// Trailing characters of the buffer that take part in the cache key.
    pub key_window: usize,
    /// Trailing characters of the buffer sent in the prompt.
    pub context_window: usize,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AutosaveConfig {
    pub debounce_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_EXECUTION_URL.to_string(),
            inline_language: "javascript".to_string(),
        }
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_COMPLETION_BASE_URL.to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            api_key: None,
            max_tokens: 100,
            temperature: 0.3,
            suggestions: 3,
            cache_capacity: 50,
            key_window: 200,
            context_window: 500,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            request_timeout_ms: 60_000,
        }
    }
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_AUTOSAVE_DEBOUNCE_MS,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig {
                email_domain: "chambers.local".to_string(),
                ..Default::default()
            },
            execution: ExecutionConfig::default(),
            completion: CompletionConfig::default(),
            http: HttpConfig::default(),
            autosave: AutosaveConfig::default(),
            app_origin: DEFAULT_APP_ORIGIN.to_string(),
            log_level: "info".to_string(),
            log_file: None,
            session_file: default_session_file(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FileConfig {
    pub app_origin: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub session_file: Option<PathBuf>,
    pub backend: Option<PartialBackendConfig>,
    pub execution: Option<PartialExecutionConfig>,
    pub completion: Option<PartialCompletionConfig>,
    pub http: Option<PartialHttpConfig>,
    pub autosave: Option<PartialAutosaveConfig>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialBackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub email_domain: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialExecutionConfig {
    pub api_url: Option<String>,
    pub inline_language: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialCompletionConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub suggestions: Option<u32>,
    pub cache_capacity: Option<usize>,
    pub key_window: Option<usize>,
    pub context_window: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialHttpConfig {
    pub connect_timeout_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PartialAutosaveConfig {
    pub debounce_ms: Option<u64>,
}

/// Values given on the command line. They win over everything else.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub backend_url: Option<String>,
    pub backend_key: Option<String>,
    pub execution_url: Option<String>,
    pub completion_base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub session_file: Option<PathBuf>,
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env(name).and_then(|v| v.parse::<T>().ok())
}

impl AppConfig {
    pub fn load(cli: CliOverrides) -> Result<Self> {
        let project_root = std::env::current_dir().context("resolve current dir")?;
        let project_cfg = load_project_config(&project_root).unwrap_or_default();
        let file_cfg = load_file_config().unwrap_or_default();
        Ok(Self::resolve(cli, project_cfg, file_cfg))
    }

    /// Merges the layers: CLI -> environment -> project file -> global file -> defaults.
    pub fn resolve(cli: CliOverrides, project_cfg: FileConfig, file_cfg: FileConfig) -> Self {
        let defaults = AppConfig::default();

        let p_backend = project_cfg.backend.clone().unwrap_or_default();
        let f_backend = file_cfg.backend.clone().unwrap_or_default();
        let backend = BackendConfig {
            url: cli
                .backend_url
                .or_else(|| env("CHAMBERS_BACKEND_URL"))
                .or(p_backend.url)
                .or(f_backend.url)
                .unwrap_or_default()
                .trim_end_matches('/')
                .to_string(),
            anon_key: cli
                .backend_key
                .or_else(|| env("CHAMBERS_BACKEND_KEY"))
                .or(p_backend.anon_key)
                .or(f_backend.anon_key)
                .unwrap_or_default(),
            email_domain: p_backend
                .email_domain
                .or(f_backend.email_domain)
                .unwrap_or(defaults.backend.email_domain),
        };

        let p_exec = project_cfg.execution.clone().unwrap_or_default();
        let f_exec = file_cfg.execution.clone().unwrap_or_default();
        let execution = ExecutionConfig {
            api_url: cli
                .execution_url
                .or_else(|| env("PISTON_API_URL"))
                .or(p_exec.api_url)
                .or(f_exec.api_url)
                .unwrap_or(defaults.execution.api_url)
                .trim_end_matches('/')
                .to_string(),
            inline_language: p_exec
                .inline_language
                .or(f_exec.inline_language)
                .unwrap_or(defaults.execution.inline_language),
        };

        let p_comp = project_cfg.completion.clone().unwrap_or_default();
        let f_comp = file_cfg.completion.clone().unwrap_or_default();
        let d_comp = defaults.completion;
        let completion = CompletionConfig {
            base_url: cli
                .completion_base_url
                .or_else(|| env("OPENAI_BASE_URL"))
                .or(p_comp.base_url)
                .or(f_comp.base_url)
                .unwrap_or(d_comp.base_url),
            model: cli
                .model
                .or_else(|| env("OPENAI_MODEL"))
                .or(p_comp.model)
                .or(f_comp.model)
                .unwrap_or(d_comp.model),
            api_key: cli
                .api_key
                .or_else(|| env("OPENAI_API_KEY"))
                .or(p_comp.api_key)
                .or(f_comp.api_key),
            max_tokens: p_comp
                .max_tokens
                .or(f_comp.max_tokens)
                .unwrap_or(d_comp.max_tokens),
            temperature: p_comp
                .temperature
                .or(f_comp.temperature)
                .unwrap_or(d_comp.temperature),
            suggestions: p_comp
                .suggestions
                .or(f_comp.suggestions)
                .unwrap_or(d_comp.suggestions),
            cache_capacity: p_comp
                .cache_capacity
                .or(f_comp.cache_capacity)
                .unwrap_or(d_comp.cache_capacity),
            key_window: p_comp
                .key_window
                .or(f_comp.key_window)
                .unwrap_or(d_comp.key_window),
            context_window: p_comp
                .context_window
                .or(f_comp.context_window)
                .unwrap_or(d_comp.context_window),
        };

        let p_http = project_cfg.http.clone().unwrap_or_default();
        let f_http = file_cfg.http.clone().unwrap_or_default();
        let http = HttpConfig {
            connect_timeout_ms: p_http
                .connect_timeout_ms
                .or(f_http.connect_timeout_ms)
                .unwrap_or(defaults.http.connect_timeout_ms),
            request_timeout_ms: p_http
                .request_timeout_ms
                .or(f_http.request_timeout_ms)
                .unwrap_or(defaults.http.request_timeout_ms),
        };

        let autosave = AutosaveConfig {
            debounce_ms: env_parse::<u64>("CHAMBERS_AUTOSAVE_DEBOUNCE_MS")
                .or(project_cfg.autosave.as_ref().and_then(|a| a.debounce_ms))
                .or(file_cfg.autosave.as_ref().and_then(|a| a.debounce_ms))
                .unwrap_or(defaults.autosave.debounce_ms),
        };

        Self {
            backend,
            execution,
            completion,
            http,
            autosave,
            app_origin: env("CHAMBERS_APP_ORIGIN")
                .or(project_cfg.app_origin)
                .or(file_cfg.app_origin)
                .unwrap_or(defaults.app_origin)
                .trim_end_matches('/')
                .to_string(),
            log_level: cli
                .log_level
                .or_else(|| env("CHAMBERS_LOG"))
                .or(project_cfg.log_level)
                .or(file_cfg.log_level)
                .unwrap_or(defaults.log_level),
            log_file: cli
                .log_file
                .or(project_cfg.log_file)
                .or(file_cfg.log_file),
            session_file: cli
                .session_file
                .or_else(|| env("CHAMBERS_SESSION_FILE").map(PathBuf::from))
                .or(project_cfg.session_file)
                .or(file_cfg.session_file)
                .unwrap_or(defaults.session_file),
        }
    }

    pub fn share_url(&self, token: &str) -> String {
        format!("{}/share/{token}", self.app_origin)
    }
}

fn default_session_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("code-chambers")
        .join("session.json")
}

pub fn load_file_config() -> Result<FileConfig> {
    use std::env;

    fn candidate_paths() -> Vec<PathBuf> {
        let mut v = Vec::new();
        if let Ok(p) = env::var("CHAMBERS_CONFIG") {
            v.push(PathBuf::from(p));
        }
        if let Ok(xdg_home) = env::var("XDG_CONFIG_HOME") {
            v.push(Path::new(&xdg_home).join("code-chambers/config.toml"));
        } else if let Ok(home) = env::var("HOME") {
            v.push(Path::new(&home).join(".config/code-chambers/config.toml"));
        }
        if let Ok(dirs) = env::var("XDG_CONFIG_DIRS") {
            for d in dirs.split(':') {
                if !d.is_empty() {
                    v.push(Path::new(d).join("code-chambers/config.toml"));
                }
            }
        }
        v
    }

    for p in candidate_paths() {
        if p.exists() {
            let s = fs::read_to_string(&p)
                .with_context(|| format!("read config file: {}", p.display()))?;
            match toml::from_str::<FileConfig>(&s) {
                Ok(cfg) => {
                    info!(path=%p.display(), "loaded config file");
                    return Ok(cfg);
                }
                Err(e) => {
                    warn!(path=%p.display(), error=%e.to_string(), "parse config failed");
                    continue;
                }
            }
        }
    }
    Ok(FileConfig::default())
}

/// Load project-specific configuration from .chambers/config.toml
pub fn load_project_config(project_root: &Path) -> Result<FileConfig> {
    let project_config_path = project_root.join(PROJECT_CONFIG_DIR).join("config.toml");

    if project_config_path.exists() {
        let s = fs::read_to_string(&project_config_path).with_context(|| {
            format!(
                "read project config file: {}",
                project_config_path.display()
            )
        })?;
        match toml::from_str::<FileConfig>(&s) {
            Ok(cfg) => {
                info!(path=%project_config_path.display(), "loaded project config file");
                Ok(cfg)
            }
            Err(e) => {
                warn!(path=%project_config_path.display(), error=%e.to_string(), "parse project config failed");
                Ok(FileConfig::default())
            }
        }
    } else {
        Ok(FileConfig::default())
    }
}
