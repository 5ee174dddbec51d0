//! Command dispatch: one inbound message in, at most one reply out.
//!
//! The dispatcher holds no state between messages. Everything persistent
//! lives behind the repository traits; the caches only shadow it. Writes go
//! to the repository first and to the cache second, and every cache failure
//! is absorbed as a miss or a skipped write.

use std::{collections::HashMap, sync::Arc};

use metrics::counter;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};

use crate::{
    application::{
        commands::{self, Command, CommandRules},
        error::CommandError,
        messenger::Messenger,
        replies::{self, WindowStat},
        repos::{CreateEntryParams, DictionaryRepo, RepoError, UsageRepo},
    },
    cache::{KeywordCache, KeywordLookup, METRIC_CACHE_ERROR, NameCache},
    domain::ranking::{KeywordTally, rank_keywords, rank_usage},
};

pub const METRIC_COMMAND_TOTAL: &str = "tallybot_command_total";

const DEFAULT_HIGHSCORE_WINDOW_DAYS: i64 = 30;
const DEFAULT_DISPLAY_NAME_TTL_SECS: u64 = 10 * 24 * 60 * 60;

/// A text message as delivered by the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Conversation scope: group, room or one-to-one user id.
    pub source: String,
    pub user_id: Option<String>,
    pub reply_token: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub rules: CommandRules,
    pub highscore_window: Duration,
    pub display_name_ttl: std::time::Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            rules: CommandRules::default(),
            highscore_window: Duration::days(DEFAULT_HIGHSCORE_WINDOW_DAYS),
            display_name_ttl: std::time::Duration::from_secs(DEFAULT_DISPLAY_NAME_TTL_SECS),
        }
    }
}

/// Collaborators shared by every command handler.
#[derive(Clone)]
pub struct CommandContext {
    pub dictionary: Arc<dyn DictionaryRepo>,
    pub usage: Arc<dyn UsageRepo>,
    pub keywords: Arc<dyn KeywordCache>,
    pub names: Arc<dyn NameCache>,
    pub messenger: Arc<dyn Messenger>,
    pub settings: DispatchSettings,
}

#[derive(Clone)]
pub struct CommandDispatcher {
    ctx: CommandContext,
}

impl CommandDispatcher {
    pub fn new(ctx: CommandContext) -> Self {
        Self { ctx }
    }

    /// Parse, run and answer one message. Never fails: errors become a
    /// reply, silence, or a log line.
    pub async fn handle(&self, message: &InboundMessage) {
        let messages = match self.execute(message).await {
            Ok(messages) => messages,
            Err(err) => match err.user_reply() {
                Some(text) => vec![text],
                None => {
                    if let CommandError::Infrastructure(repo) = &err {
                        error!(
                            source = %message.source,
                            text = %message.text,
                            error = %repo,
                            "Command aborted by repository failure"
                        );
                    }
                    return;
                }
            },
        };

        if !messages.is_empty() {
            self.send(message, &messages).await;
        }
    }

    /// Answer a join or follow event with the greeting and help text.
    pub async fn greet(&self, message: &InboundMessage) {
        self.send(message, &[replies::greeting()]).await;
    }

    /// Run a message and return the reply lines without sending them.
    ///
    /// An empty reply means the message is handled silently.
    pub async fn execute(&self, message: &InboundMessage) -> Result<Vec<String>, CommandError> {
        let command = commands::parse(&message.text, &self.ctx.settings.rules)
            .ok_or(CommandError::Validation)?;

        counter!(METRIC_COMMAND_TOTAL, "command" => command.name()).increment(1);
        debug!(source = %message.source, command = command.name(), "Dispatching command");

        let source = message.source.as_str();
        match command {
            Command::Add {
                keyword,
                description,
            } => {
                self.add(source, message.user_id.as_deref(), &keyword, &description)
                    .await
            }
            Command::Remove { keyword } => {
                self.remove(source, message.user_id.as_deref(), &keyword)
                    .await
            }
            Command::List => self.list(source).await,
            Command::Highscore => self.highscore(source).await,
            Command::Stat => self.stat(source).await,
            Command::Reset => self.reset(source).await,
            Command::Help => Ok(vec![replies::HELP.to_string()]),
            Command::Profile => Ok(self.profile(message.user_id.as_deref()).await),
            Command::Mention { keyword } => self.mention(source, &keyword).await,
        }
    }

    async fn add(
        &self,
        source: &str,
        creator: Option<&str>,
        keyword: &str,
        description: &str,
    ) -> Result<Vec<String>, CommandError> {
        let duplicate = || CommandError::Duplicate {
            keyword: keyword.to_string(),
        };

        match self.cached_lookup(source, keyword).await {
            KeywordLookup::Hit(_) => return Err(duplicate()),
            // a stale tombstone is caught by the unique constraint below
            KeywordLookup::Tombstoned => {}
            KeywordLookup::Unknown => {
                let existing = self
                    .ctx
                    .dictionary
                    .get_entry_by_keyword(source, keyword)
                    .await?;
                if let Some(entry) = existing {
                    self.cache_store(source, keyword, &entry.description).await;
                    return Err(duplicate());
                }
            }
        }

        let params = CreateEntryParams {
            source: source.to_string(),
            keyword: keyword.to_string(),
            description: description.to_string(),
            creator: creator.unwrap_or_default().to_string(),
        };
        match self.ctx.dictionary.create_entry(params).await {
            Ok(_) => {}
            Err(RepoError::Duplicate { .. }) => {
                // the cached answer was stale; replace it with the stored row
                if let Some(entry) = self
                    .ctx
                    .dictionary
                    .get_entry_by_keyword(source, keyword)
                    .await?
                {
                    self.cache_store(source, keyword, &entry.description).await;
                }
                return Err(duplicate());
            }
            Err(err) => return Err(err.into()),
        }

        info!(source, keyword, "Keyword added");
        self.cache_store(source, keyword, description).await;
        Ok(vec![replies::added(keyword)])
    }

    async fn remove(
        &self,
        source: &str,
        sender: Option<&str>,
        keyword: &str,
    ) -> Result<Vec<String>, CommandError> {
        let not_found = || CommandError::NotFound {
            keyword: keyword.to_string(),
        };

        if self.cached_lookup(source, keyword).await == KeywordLookup::Tombstoned {
            return Err(not_found());
        }

        let Some(entry) = self
            .ctx
            .dictionary
            .get_entry_by_keyword(source, keyword)
            .await?
        else {
            self.cache_tombstone(source, keyword).await;
            return Err(not_found());
        };

        if sender != Some(entry.creator.as_str()) {
            warn!(source, keyword, "Remove rejected: sender is not the creator");
            return Err(CommandError::Authorization {
                keyword: keyword.to_string(),
            });
        }

        match self.ctx.dictionary.remove_entry(source, keyword).await {
            Ok(()) => {}
            Err(RepoError::NotFound) => {
                self.cache_tombstone(source, keyword).await;
                return Err(not_found());
            }
            Err(err) => return Err(err.into()),
        }
        // the entry is gone; the cache must not outlive it even if the
        // usage cleanup below fails
        self.cache_tombstone(source, keyword).await;

        let events = self
            .ctx
            .usage
            .delete_usage_by_keyword(source, keyword)
            .await?;

        info!(source, keyword, events, "Keyword removed");
        Ok(vec![replies::removed(keyword)])
    }

    async fn list(&self, source: &str) -> Result<Vec<String>, CommandError> {
        let entries = self.ctx.dictionary.list_entries(source).await?;
        if entries.is_empty() {
            return Ok(vec![replies::NO_KEYWORDS.to_string()]);
        }

        let mut resolved: HashMap<&str, String> = HashMap::new();
        let mut names = Vec::with_capacity(entries.len());
        for entry in &entries {
            let name = match resolved.get(entry.creator.as_str()) {
                Some(name) => name.clone(),
                None => {
                    let name = self.display_name(&entry.creator).await;
                    resolved.insert(entry.creator.as_str(), name.clone());
                    name
                }
            };
            names.push(name);
        }

        Ok(vec![replies::keyword_list(&entries, &names)])
    }

    async fn highscore(&self, source: &str) -> Result<Vec<String>, CommandError> {
        let since = OffsetDateTime::now_utc() - self.ctx.settings.highscore_window;
        let events = self.ctx.usage.list_usage_since(source, since).await?;
        let ranked = rank_usage(&events);
        if ranked.is_empty() {
            return Ok(vec![replies::NO_HIGHSCORE.to_string()]);
        }

        let descriptions: HashMap<String, String> = self
            .ctx
            .dictionary
            .list_entries(source)
            .await?
            .into_iter()
            .map(|entry| (entry.keyword, entry.description))
            .collect();

        let rows: Vec<(KeywordTally, String)> = ranked
            .into_iter()
            .filter_map(|tally| {
                let description = descriptions.get(&tally.keyword)?.clone();
                Some((tally, description))
            })
            .collect();

        if rows.is_empty() {
            return Ok(vec![replies::NO_HIGHSCORE.to_string()]);
        }
        Ok(vec![replies::highscore(&rows)])
    }

    async fn stat(&self, source: &str) -> Result<Vec<String>, CommandError> {
        let now = OffsetDateTime::now_utc();
        let windows = [
            ("Last 24 hours", Duration::days(1)),
            ("Last 7 days", Duration::days(7)),
            ("Last 30 days", Duration::days(30)),
        ];
        let widest = windows
            .iter()
            .map(|(_, span)| *span)
            .max()
            .unwrap_or(Duration::days(30));

        let events = self.ctx.usage.list_usage_since(source, now - widest).await?;

        let stats: Vec<WindowStat> = windows
            .iter()
            .map(|(label, span)| {
                let since = now - *span;
                let ranked = rank_keywords(
                    events
                        .iter()
                        .filter(|event| event.created_at >= since)
                        .map(|event| event.keyword.as_str()),
                );
                WindowStat {
                    label: *label,
                    total: ranked.iter().map(|tally| tally.count).sum(),
                    top: ranked.into_iter().next(),
                }
            })
            .collect();

        Ok(vec![replies::stats(&stats)])
    }

    async fn reset(&self, source: &str) -> Result<Vec<String>, CommandError> {
        let entries = self.ctx.dictionary.delete_entries_by_source(source).await?;
        if let Err(err) = self.ctx.keywords.clear_all(source).await {
            cache_failed("clear_all", source, "", &err);
        }
        let events = self.ctx.usage.delete_usage_by_source(source).await?;

        info!(source, entries, events, "Source reset");
        Ok(vec![replies::ALL_CLEARED.to_string()])
    }

    async fn profile(&self, user_id: Option<&str>) -> Vec<String> {
        let Some(user_id) = user_id.filter(|id| !id.is_empty()) else {
            return vec![replies::PROFILE_WITHOUT_USER.to_string()];
        };

        match self.ctx.messenger.get_profile(user_id).await {
            Ok(profile) => {
                replies::profile(&profile.display_name, profile.status_message.as_deref())
            }
            Err(err) => {
                warn!(user_id, error = %err, "Profile lookup failed");
                vec![replies::PROFILE_UNAVAILABLE.to_string()]
            }
        }
    }

    async fn mention(&self, source: &str, keyword: &str) -> Result<Vec<String>, CommandError> {
        let Some(description) = self.resolve_keyword(source, keyword).await? else {
            debug!(source, keyword, "Mention of unregistered keyword ignored");
            return Ok(Vec::new());
        };

        self.ctx.usage.append_usage_event(source, keyword).await?;
        Ok(vec![replies::mentioned(keyword, &description)])
    }

    /// Read-through lookup: cache first, repository on a miss, and the
    /// repository answer written back as a description or a tombstone.
    async fn resolve_keyword(
        &self,
        source: &str,
        keyword: &str,
    ) -> Result<Option<String>, RepoError> {
        match self.cached_lookup(source, keyword).await {
            KeywordLookup::Hit(description) => return Ok(Some(description)),
            KeywordLookup::Tombstoned => return Ok(None),
            KeywordLookup::Unknown => {}
        }

        match self
            .ctx
            .dictionary
            .get_entry_by_keyword(source, keyword)
            .await?
        {
            Some(entry) => {
                self.cache_store(source, keyword, &entry.description).await;
                Ok(Some(entry.description))
            }
            None => {
                self.cache_tombstone(source, keyword).await;
                Ok(None)
            }
        }
    }

    /// Display name of a user: name cache, then the platform profile. Empty
    /// when neither can answer.
    async fn display_name(&self, user_id: &str) -> String {
        if user_id.is_empty() {
            return String::new();
        }

        match self.ctx.names.get_name(user_id).await {
            Ok(Some(name)) => return name,
            Ok(None) => {}
            Err(err) => cache_failed("get_name", "", user_id, &err),
        }

        let profile = match self.ctx.messenger.get_profile(user_id).await {
            Ok(profile) => profile,
            Err(err) => {
                debug!(user_id, error = %err, "Display name unavailable");
                return String::new();
            }
        };

        if let Err(err) = self
            .ctx
            .names
            .set_name(
                user_id,
                &profile.display_name,
                self.ctx.settings.display_name_ttl,
            )
            .await
        {
            cache_failed("set_name", "", user_id, &err);
        }
        profile.display_name
    }

    async fn cached_lookup(&self, source: &str, keyword: &str) -> KeywordLookup {
        match self.ctx.keywords.lookup(source, keyword).await {
            Ok(lookup) => lookup,
            Err(err) => {
                cache_failed("lookup", source, keyword, &err);
                KeywordLookup::Unknown
            }
        }
    }

    async fn cache_store(&self, source: &str, keyword: &str, description: &str) {
        if let Err(err) = self.ctx.keywords.store(source, keyword, description).await {
            cache_failed("store", source, keyword, &err);
        }
    }

    async fn cache_tombstone(&self, source: &str, keyword: &str) {
        if let Err(err) = self.ctx.keywords.tombstone(source, keyword).await {
            cache_failed("tombstone", source, keyword, &err);
        }
    }

    async fn send(&self, message: &InboundMessage, messages: &[String]) {
        let result = match message.reply_token.as_deref() {
            Some(token) => self.ctx.messenger.reply(token, messages).await,
            None => self.ctx.messenger.push(&message.source, messages).await,
        };
        if let Err(err) = result {
            warn!(source = %message.source, error = %err, "Failed to deliver reply");
        }
    }
}

fn cache_failed(op: &'static str, source: &str, key: &str, err: &dyn std::error::Error) {
    counter!(METRIC_CACHE_ERROR, "op" => op).increment(1);
    warn!(op, source, key, error = %err, "Cache operation failed; falling back to repository");
}
