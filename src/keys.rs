// src/keys.rs
use log::{info, warn};
use std::io::{self, BufRead, Write};

use crate::config::{API_KEY_FALLBACK_VAR, API_KEY_VAR};

/// Whether the user has chosen an API key, and a way to ask them for one.
/// Nothing in the pipeline runs until `has_selected_key` is true.
pub trait KeySelector: Send + Sync {
    fn has_selected_key(&self) -> bool;
    fn open_key_selector(&self);
}

/// Reads the key from environment variables and asks for it on the terminal
/// when none of them is set. The first variable is the one a prompted key
/// is stored in.
pub struct EnvKeySelector {
    vars: Vec<String>,
}

impl EnvKeySelector {
    /// Looks in the same variables `Config::from_env` reads the key from.
    pub fn new() -> Self {
        Self {
            vars: vec![API_KEY_VAR.to_string(), API_KEY_FALLBACK_VAR.to_string()],
        }
    }

    pub fn for_var(var: &str) -> Self {
        Self {
            vars: vec![var.to_string()],
        }
    }

    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    fn key_in(&self, lookup: impl Fn(&str) -> Option<String>) -> bool {
        self.vars
            .iter()
            .any(|var| lookup(var).is_some_and(|v| !v.trim().is_empty()))
    }

    /// Prompt on stdin and export what the user types. Empty input keeps
    /// the current state.
    fn prompt_for_key(&self) -> io::Result<()> {
        print!("Paste your Gemini API key (input is not hidden), or press Enter to cancel: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().lock().read_line(&mut input)?;
        let key = input.trim();

        if key.is_empty() {
            warn!("No API key entered");
        } else {
            std::env::set_var(&self.vars[0], key);
            info!("API key stored in {} for this session", self.vars[0]);
        }
        Ok(())
    }
}

impl Default for EnvKeySelector {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySelector for EnvKeySelector {
    fn has_selected_key(&self) -> bool {
        self.key_in(|name| std::env::var(name).ok())
    }

    fn open_key_selector(&self) {
        println!("\nA paid Gemini API key is needed for video generation.");
        println!("Create one at https://aistudio.google.com/apikey");
        println!("Billing info: https://ai.google.dev/gemini-api/docs/billing\n");

        if let Err(e) = self.prompt_for_key() {
            warn!("Could not read API key from the terminal: {}", e);
        }
    }
}

/// A selector with a fixed answer, for embedding callers that manage keys
/// themselves.
pub struct PresetKey(pub bool);

impl KeySelector for PresetKey {
    fn has_selected_key(&self) -> bool {
        self.0
    }

    fn open_key_selector(&self) {}
}
