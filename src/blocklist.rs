// SPDX-License-Identifier: MIT

//! Regex blocklists for request paths and user agents.
//!
//! Rules come from plain text files, one pattern per line. A loaded pair of
//! lists is an immutable [`RuleSet`] snapshot; [`RuleStore`] publishes the
//! active snapshot behind a short-held lock so request evaluation never
//! blocks on a reload. The refresh task replaces the pair wholesale: both
//! lists load successfully or neither is swapped.

use crate::config::BlocklistConfig;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Blocklist loading error.
#[derive(Debug, thiserror::Error)]
pub enum BlocklistError {
    #[error("blocklist source {path} unavailable: {source}")]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern in {path} line {line}: {source}")]
    InvalidPattern {
        path: PathBuf,
        line: usize,
        #[source]
        source: regex::Error,
    },
}

/// Load one rule list: one regex per line, blank lines skipped, surrounding
/// whitespace trimmed. Any bad line fails the whole load.
pub fn load_rules(path: &Path) -> Result<Vec<Regex>, BlocklistError> {
    let raw = std::fs::read_to_string(path).map_err(|source| BlocklistError::Unavailable {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rules = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let pattern = line.trim();
        if pattern.is_empty() {
            continue;
        }
        let regex = Regex::new(pattern).map_err(|source| BlocklistError::InvalidPattern {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        rules.push(regex);
    }

    Ok(rules)
}

/// An immutable snapshot of both rule lists.
///
/// Rules match in file order; path rules are always consulted before
/// user-agent rules.
#[derive(Debug, Default)]
pub struct RuleSet {
    paths: Vec<Regex>,
    user_agents: Vec<Regex>,
}

impl RuleSet {
    pub fn new(paths: Vec<Regex>, user_agents: Vec<Regex>) -> Self {
        Self { paths, user_agents }
    }

    /// Load both lists from their source files.
    pub fn load(paths_file: &Path, user_agents_file: &Path) -> Result<Self, BlocklistError> {
        let paths = load_rules(paths_file)?;
        let user_agents = load_rules(user_agents_file)?;
        Ok(Self { paths, user_agents })
    }

    /// First path rule matching `path`, if any.
    pub fn matched_path_rule(&self, path: &str) -> Option<&Regex> {
        self.paths.iter().find(|r| r.is_match(path))
    }

    /// First user-agent rule matching `user_agent`, if any.
    pub fn matched_user_agent_rule(&self, user_agent: &str) -> Option<&Regex> {
        self.user_agents.iter().find(|r| r.is_match(user_agent))
    }

    pub fn path_rule_count(&self) -> usize {
        self.paths.len()
    }

    pub fn user_agent_rule_count(&self) -> usize {
        self.user_agents.len()
    }
}

/// Atomically-swapped holder of the active [`RuleSet`].
///
/// Readers clone the `Arc` under a read lock held only for the clone, so a
/// request keeps working against one snapshot for its whole evaluation even
/// if a refresh lands mid-flight.
pub struct RuleStore {
    current: RwLock<Arc<RuleSet>>,
}

impl RuleStore {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(rules)),
        }
    }

    /// Get the active snapshot.
    pub async fn current(&self) -> Arc<RuleSet> {
        self.current.read().await.clone()
    }

    /// Publish a new snapshot, replacing both lists at once.
    pub async fn replace(&self, rules: RuleSet) {
        *self.current.write().await = Arc::new(rules);
    }

    /// Reload both lists from disk every `every` until `shutdown` flips to
    /// true. A failed load of either list leaves the active snapshot
    /// untouched; the next tick retries naturally.
    pub fn spawn_refresh(
        self: Arc<Self>,
        config: BlocklistConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.refresh_interval());
            // The first tick fires immediately; the initial load already
            // happened at startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match RuleSet::load(&config.paths_file, &config.user_agents_file) {
                            Ok(rules) => {
                                info!(
                                    path_rules = rules.path_rule_count(),
                                    user_agent_rules = rules.user_agent_rule_count(),
                                    "Blocklists reloaded"
                                );
                                self.replace(rules).await;
                            }
                            Err(e) => {
                                warn!(error = %e, "Blocklist reload failed, keeping previous rules");
                            }
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Blocklist refresh task stopping");
                            return;
                        }
                    }
                }
            }
        })
    }
}
