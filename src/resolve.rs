// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Value resolution
//!
//! Each field is resolved independently from, in order: a non-empty preset
//! (used silently), a value inherited from the environment (offered for
//! reuse), and finally a prompt that may be left blank.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::config::{env, suggest, Backend, BackendSet, Defaults, LaunchMode};
use crate::prompt::Prompter;
use crate::Result;

/// Snapshot of the launcher's environment, taken once at startup
pub type EnvSnapshot = HashMap<String, String>;

/// Where a field's value will come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source<'a> {
    Preset(&'a str),
    Existing(&'a str),
    Prompt,
}

/// Pick the source for a field. Blank values count as unset.
pub fn choose_source<'a>(preset: Option<&'a str>, existing: Option<&'a str>) -> Source<'a> {
    let non_blank = |v: Option<&'a str>| v.filter(|s| !s.trim().is_empty());
    match (non_blank(preset), non_blank(existing)) {
        (Some(p), _) => Source::Preset(p),
        (None, Some(e)) => Source::Existing(e),
        (None, None) => Source::Prompt,
    }
}

/// Map a backend menu answer. `None` for anything unrecognized.
pub fn parse_backend_choice(answer: &str) -> Option<BackendSet> {
    match answer.trim() {
        "1" => Some(BackendSet::only(Backend::OpenAi)),
        "2" => Some(BackendSet::only(Backend::Ollama)),
        "3" => Some(BackendSet::both()),
        "4" => Some(BackendSet::none()),
        _ => None,
    }
}

/// Parse a host port answer. Blank selects the default port.
pub fn parse_port(answer: &str) -> std::result::Result<u16, String> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Ok(suggest::HOST_PORT);
    }
    match answer.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("'{}' is not a valid TCP port (1-65535)", answer)),
        Ok(port) => Ok(port),
    }
}

/// Whether a base URL points at the machine the launcher runs on
pub fn is_loopback_url(url: &str) -> bool {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or("");
    let host = match authority.strip_prefix('[') {
        // IPv6 literal, `[::1]:11434`
        Some(v6) => v6.split(']').next().unwrap_or(""),
        None => authority.split(':').next().unwrap_or(""),
    };
    matches!(host, "localhost" | "127.0.0.1" | "0.0.0.0" | "::1")
}

/// A resolvable string field
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub var: &'static str,
    pub label: &'static str,
    pub secret: bool,
    /// Offered at the prompt and taken when the answer is blank
    pub suggestion: Option<&'static str>,
}

pub const OPENAI_API_KEY: Field = Field {
    var: env::OPENAI_API_KEY,
    label: "OpenAI API key",
    secret: true,
    suggestion: None,
};

pub const OPENAI_MODEL: Field = Field {
    var: env::OPENAI_MODEL,
    label: "OpenAI model",
    secret: false,
    suggestion: Some(suggest::OPENAI_MODEL),
};

pub const OLLAMA_HOST: Field = Field {
    var: env::OLLAMA_HOST,
    label: "Ollama host",
    secret: false,
    suggestion: Some(suggest::OLLAMA_HOST),
};

pub const OLLAMA_MODEL: Field = Field {
    var: env::OLLAMA_MODEL,
    label: "Ollama model",
    secret: false,
    suggestion: Some(suggest::OLLAMA_MODEL),
};

pub const PIXABAY_API_KEY: Field = Field {
    var: env::PIXABAY_API_KEY,
    label: "Pixabay API key (images)",
    secret: true,
    suggestion: None,
};

pub const NEWS_API_KEY: Field = Field {
    var: env::NEWS_API_KEY,
    label: "NewsAPI key (headlines)",
    secret: true,
    suggestion: None,
};

/// Resolves fields against presets and an environment snapshot
pub struct Resolver {
    defaults: Defaults,
    env: EnvSnapshot,
}

impl Resolver {
    pub fn new(defaults: Defaults, env: EnvSnapshot) -> Self {
        Self { defaults, env }
    }

    /// Environment values still considered inherited
    pub fn env(&self) -> &EnvSnapshot {
        &self.env
    }

    fn preset(&self, var: &str) -> Option<&str> {
        let value = match var {
            env::OPENAI_API_KEY => &self.defaults.openai_api_key,
            env::OPENAI_MODEL => &self.defaults.openai_model,
            env::OLLAMA_HOST => &self.defaults.ollama_host,
            env::OLLAMA_MODEL => &self.defaults.ollama_model,
            env::PIXABAY_API_KEY => &self.defaults.pixabay_api_key,
            env::NEWS_API_KEY => &self.defaults.news_api_key,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Resolve one field. `None` means the user skipped it.
    pub fn resolve(&mut self, field: &Field, prompter: &mut dyn Prompter) -> Result<Option<String>> {
        let source = choose_source(self.preset(field.var), self.env.get(field.var).map(String::as_str));

        let reuse = match source {
            Source::Preset(value) => {
                debug!("{} taken from preset", field.var);
                return Ok(Some(value.to_string()));
            }
            Source::Existing(value) => {
                let shown = if field.secret { "****".to_string() } else { value.to_string() };
                let question = format!("Found {} in the environment ({}). Use it?", field.var, shown);
                prompter.confirm(&question, true)?.then(|| value.to_string())
            }
            Source::Prompt => None,
        };

        if let Some(value) = reuse {
            debug!("{} reused from environment", field.var);
            return Ok(Some(value));
        }

        if self.env.remove(field.var).is_some() {
            debug!("{} cleared", field.var);
        }

        let question = match field.suggestion {
            Some(s) => format!("{} [{}]:", field.label, s),
            None => format!("{} (leave blank to skip):", field.label),
        };
        let answer = if field.secret {
            prompter.ask_secret(&question)?
        } else {
            prompter.ask(&question)?
        };

        let answer = answer.trim();
        if answer.is_empty() {
            Ok(field.suggestion.map(String::from))
        } else {
            Ok(Some(answer.to_string()))
        }
    }

    /// Value for a field that is not asked about: preset, else suggestion
    pub fn fallback(&self, field: &Field) -> String {
        self.preset(field.var)
            .filter(|v| !v.trim().is_empty())
            .or(field.suggestion)
            .unwrap_or_default()
            .to_string()
    }

    /// Like [`Resolver::resolve`] for fields that always end up with a value
    pub fn resolve_required(&mut self, field: &Field, prompter: &mut dyn Prompter) -> Result<String> {
        let fallback = field.suggestion.unwrap_or_default();
        Ok(self.resolve(field, prompter)?.unwrap_or_else(|| fallback.to_string()))
    }

    /// Show the backend menu and read one choice
    pub fn select_backends(&self, prompter: &mut dyn Prompter) -> Result<BackendSet> {
        prompter.say("Which LLM backend should Panopticon use?");
        prompter.say("  1) OpenAI only");
        prompter.say("  2) Ollama only");
        prompter.say("  3) Both OpenAI and Ollama");
        prompter.say("  4) None");
        let answer = prompter.ask("Choice [1-4]:")?;

        Ok(match parse_backend_choice(&answer) {
            Some(set) => set,
            None => {
                warn!("Unrecognized backend choice '{}', using OpenAI only", answer.trim());
                prompter.say("Unrecognized choice, falling back to OpenAI only.");
                BackendSet::only(Backend::OpenAi)
            }
        })
    }

    /// Resolve the host port, re-asking until the answer is a valid port
    pub fn resolve_port(&mut self, prompter: &mut dyn Prompter) -> Result<u16> {
        if let Some(port) = self.defaults.host_port.filter(|p| *p != 0) {
            debug!("Host port taken from preset");
            return Ok(port);
        }

        if let Some(existing) = self.env.get(env::PORT).cloned() {
            match parse_port(&existing) {
                Ok(port) if !existing.trim().is_empty() => {
                    let question = format!("Found {} in the environment ({}). Use it?", env::PORT, port);
                    if prompter.confirm(&question, true)? {
                        return Ok(port);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring {}: {}", env::PORT, e),
            }
            self.env.remove(env::PORT);
        }

        loop {
            let answer = prompter.ask(&format!("Host port [{}]:", suggest::HOST_PORT))?;
            match parse_port(&answer) {
                Ok(port) => return Ok(port),
                Err(e) => {
                    warn!("{}", e);
                    prompter.say(&e);
                }
            }
        }
    }

    /// Ask about host networking where it matters
    pub fn resolve_host_network(
        &self,
        mode: LaunchMode,
        backends: BackendSet,
        ollama_host: Option<&str>,
        prompter: &mut dyn Prompter,
    ) -> Result<bool> {
        if mode != LaunchMode::Docker || !backends.contains(Backend::Ollama) {
            return Ok(false);
        }
        let default = ollama_host.map(is_loopback_url).unwrap_or(false);
        prompter.confirm(
            "Use host networking so the container can reach Ollama on this machine?",
            default,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompter;

    fn env_of(pairs: &[(&str, &str)]) -> EnvSnapshot {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_choose_source_priority() {
        assert_eq!(choose_source(Some("p"), Some("e")), Source::Preset("p"));
        assert_eq!(choose_source(Some(""), Some("e")), Source::Existing("e"));
        assert_eq!(choose_source(Some("  "), None), Source::Prompt);
        assert_eq!(choose_source(None, Some("")), Source::Prompt);
    }

    #[test]
    fn test_backend_menu_mapping() {
        assert_eq!(parse_backend_choice("1"), Some(BackendSet::only(Backend::OpenAi)));
        assert_eq!(parse_backend_choice("2"), Some(BackendSet::only(Backend::Ollama)));
        assert_eq!(parse_backend_choice(" 3 "), Some(BackendSet::both()));
        assert_eq!(parse_backend_choice("4"), Some(BackendSet::none()));
        assert_eq!(parse_backend_choice("5"), None);
        assert_eq!(parse_backend_choice(""), None);
    }

    #[test]
    fn test_unrecognized_choice_falls_back_to_openai() {
        let resolver = Resolver::new(Defaults::default(), EnvSnapshot::new());
        let mut prompter = ScriptedPrompter::new(["banana"]);
        let set = resolver.select_backends(&mut prompter).unwrap();
        assert_eq!(set, BackendSet::only(Backend::OpenAi));
        assert!(prompter.transcript().contains("falling back to OpenAI only"));
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(""), Ok(8501));
        assert_eq!(parse_port("   "), Ok(8501));
        assert_eq!(parse_port("8080"), Ok(8080));
        assert_eq!(parse_port("65535"), Ok(65535));
        assert!(parse_port("0").is_err());
        assert!(parse_port("65536").is_err());
        assert!(parse_port("http").is_err());
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback_url("http://localhost:11434"));
        assert!(is_loopback_url("http://127.0.0.1:11434/"));
        assert!(!is_loopback_url("http://panopticon-ollama:11434"));
        assert!(!is_loopback_url("https://gpu-box.lan"));
        assert!(is_loopback_url("http://[::1]:11434"));
        assert!(is_loopback_url("[::1]:11434"));
        assert!(is_loopback_url("127.0.0.1:11434"));
        assert!(!is_loopback_url("http://[fd00::5]:11434"));
    }

    #[test]
    fn test_preset_never_prompts() {
        let defaults = Defaults {
            openai_api_key: "sk-preset".to_string(),
            ..Defaults::default()
        };
        let mut resolver = Resolver::new(defaults, env_of(&[(env::OPENAI_API_KEY, "sk-env")]));
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());

        let value = resolver.resolve(&OPENAI_API_KEY, &mut prompter).unwrap();
        assert_eq!(value.as_deref(), Some("sk-preset"));
        assert!(prompter.transcript().is_empty());
    }

    #[test]
    fn test_existing_value_reused() {
        let mut resolver =
            Resolver::new(Defaults::default(), env_of(&[(env::OLLAMA_MODEL, "llama3")]));
        let mut prompter = ScriptedPrompter::new(["y"]);

        let value = resolver.resolve(&OLLAMA_MODEL, &mut prompter).unwrap();
        assert_eq!(value.as_deref(), Some("llama3"));
        assert_eq!(resolver.env().get(env::OLLAMA_MODEL).map(String::as_str), Some("llama3"));
    }

    #[test]
    fn test_declined_existing_is_cleared_before_prompt() {
        let mut resolver =
            Resolver::new(Defaults::default(), env_of(&[(env::NEWS_API_KEY, "old-key")]));
        let mut prompter = ScriptedPrompter::new(["n", ""]);

        let value = resolver.resolve(&NEWS_API_KEY, &mut prompter).unwrap();
        assert_eq!(value, None);
        assert!(!resolver.env().contains_key(env::NEWS_API_KEY));
        assert!(!prompter.transcript().contains("old-key"));
    }

    #[test]
    fn test_secret_entry_not_in_output() {
        let mut resolver = Resolver::new(Defaults::default(), EnvSnapshot::new());
        let mut prompter = ScriptedPrompter::new(["sk-typed-in"]);

        let value = resolver.resolve(&OPENAI_API_KEY, &mut prompter).unwrap();
        assert_eq!(value.as_deref(), Some("sk-typed-in"));
        assert!(!prompter.transcript().contains("sk-typed-in"));
    }

    #[test]
    fn test_blank_answer_takes_suggestion() {
        let mut resolver = Resolver::new(Defaults::default(), EnvSnapshot::new());
        let mut prompter = ScriptedPrompter::new(["", ""]);

        assert_eq!(
            resolver.resolve(&OLLAMA_HOST, &mut prompter).unwrap().as_deref(),
            Some("http://localhost:11434")
        );
        assert_eq!(resolver.resolve_required(&OPENAI_MODEL, &mut prompter).unwrap(), "gpt-4.1-mini");
    }

    #[test]
    fn test_fallback_prefers_preset() {
        let defaults = Defaults {
            ollama_model: "llama3".to_string(),
            ..Defaults::default()
        };
        let resolver = Resolver::new(defaults, EnvSnapshot::new());
        assert_eq!(resolver.fallback(&OLLAMA_MODEL), "llama3");
        assert_eq!(resolver.fallback(&OPENAI_MODEL), "gpt-4.1-mini");
        assert_eq!(resolver.fallback(&NEWS_API_KEY), "");
    }

    #[test]
    fn test_port_resolution() {
        let mut resolver = Resolver::new(Defaults::default(), EnvSnapshot::new());
        let mut prompter = ScriptedPrompter::new(["abc", "9000"]);
        assert_eq!(resolver.resolve_port(&mut prompter).unwrap(), 9000);
        assert!(prompter.transcript().contains("not a valid TCP port"));

        let mut prompter = ScriptedPrompter::new([""]);
        assert_eq!(resolver.resolve_port(&mut prompter).unwrap(), 8501);
    }

    #[test]
    fn test_port_from_preset_and_environment() {
        let defaults = Defaults { host_port: Some(7000), ..Defaults::default() };
        let mut resolver = Resolver::new(defaults, EnvSnapshot::new());
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());
        assert_eq!(resolver.resolve_port(&mut prompter).unwrap(), 7000);

        let mut resolver = Resolver::new(Defaults::default(), env_of(&[(env::PORT, "8600")]));
        let mut prompter = ScriptedPrompter::new(["", ""]);
        assert_eq!(resolver.resolve_port(&mut prompter).unwrap(), 8600);
        assert_eq!(prompter.remaining(), 1);
    }

    #[test]
    fn test_host_network_only_offered_for_docker_with_ollama() {
        let resolver = Resolver::new(Defaults::default(), EnvSnapshot::new());
        let mut prompter = ScriptedPrompter::new(Vec::<String>::new());

        let ollama = BackendSet::only(Backend::Ollama);
        assert!(!resolver
            .resolve_host_network(LaunchMode::Local, ollama, Some(suggest::OLLAMA_HOST), &mut prompter)
            .unwrap());
        assert!(!resolver
            .resolve_host_network(LaunchMode::DockerOllama, ollama, None, &mut prompter)
            .unwrap());
        assert!(!resolver
            .resolve_host_network(
                LaunchMode::Docker,
                BackendSet::only(Backend::OpenAi),
                None,
                &mut prompter
            )
            .unwrap());
        assert!(prompter.transcript().is_empty());

        let mut prompter = ScriptedPrompter::new([""]);
        assert!(resolver
            .resolve_host_network(LaunchMode::Docker, ollama, Some(suggest::OLLAMA_HOST), &mut prompter)
            .unwrap());
    }
}
