//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tallybot::{
    application::{
        dispatcher::{CommandContext, CommandDispatcher, DispatchSettings, InboundMessage},
        messenger::{Messenger, MessengerError},
        repos::{CreateEntryParams, DictionaryRepo, RepoError, UsageRepo},
    },
    cache::{
        CacheConfig, CacheError, KeywordCache, KeywordLookup, MemoryKeywordCache, MemoryNameCache,
        NameCache,
    },
    domain::entities::{KeywordEntry, UsageEvent, UserProfile},
};
use time::OffsetDateTime;

/// Operations a fake repository should fail, keyed by trait method name.
#[derive(Default)]
struct Faults(Mutex<Vec<&'static str>>);

impl Faults {
    fn inject(&self, op: &'static str) {
        self.0.lock().expect("faults lock").push(op);
    }

    fn check(&self, op: &str, err: fn() -> RepoError) -> Result<(), RepoError> {
        if self.0.lock().expect("faults lock").iter().any(|f| *f == op) {
            return Err(err());
        }
        Ok(())
    }
}

fn connection_reset() -> RepoError {
    RepoError::Persistence("connection reset by peer".to_string())
}

#[derive(Default)]
pub struct MemoryDictionary {
    entries: Mutex<Vec<KeywordEntry>>,
    faults: Faults,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl MemoryDictionary {
    /// Make every later call of `op` fail with a persistence error.
    pub fn fail_on(&self, op: &'static str) {
        self.faults.inject(op);
    }

    pub fn calls(&self) -> usize {
        self.reads.load(Ordering::SeqCst) + self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Vec<KeywordEntry> {
        self.entries.lock().expect("dictionary lock").clone()
    }

    pub fn seed(&self, source: &str, keyword: &str, description: &str, creator: &str) {
        self.entries.lock().expect("dictionary lock").push(KeywordEntry {
            source: source.to_string(),
            keyword: keyword.to_string(),
            description: description.to_string(),
            creator: creator.to_string(),
            created_at: OffsetDateTime::now_utc(),
        });
    }
}

#[async_trait]
impl DictionaryRepo for MemoryDictionary {
    async fn create_entry(&self, params: CreateEntryParams) -> Result<KeywordEntry, RepoError> {
        self.faults.check("create_entry", connection_reset)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().expect("dictionary lock");
        if entries
            .iter()
            .any(|e| e.source == params.source && e.keyword == params.keyword)
        {
            return Err(RepoError::Duplicate {
                constraint: "dictionaries_source_keyword_key".to_string(),
            });
        }
        let entry = KeywordEntry {
            source: params.source,
            keyword: params.keyword,
            description: params.description,
            creator: params.creator,
            created_at: OffsetDateTime::now_utc(),
        };
        entries.push(entry.clone());
        Ok(entry)
    }

    async fn remove_entry(&self, source: &str, keyword: &str) -> Result<(), RepoError> {
        self.faults.check("remove_entry", connection_reset)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().expect("dictionary lock");
        let before = entries.len();
        entries.retain(|e| !(e.source == source && e.keyword == keyword));
        if entries.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn get_entry_by_keyword(
        &self,
        source: &str,
        keyword: &str,
    ) -> Result<Option<KeywordEntry>, RepoError> {
        self.faults.check("get_entry_by_keyword", connection_reset)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .entries
            .lock()
            .expect("dictionary lock")
            .iter()
            .find(|e| e.source == source && e.keyword == keyword)
            .cloned())
    }

    async fn list_entries(&self, source: &str) -> Result<Vec<KeywordEntry>, RepoError> {
        self.faults.check("list_entries", connection_reset)?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .entries
            .lock()
            .expect("dictionary lock")
            .iter()
            .filter(|e| e.source == source)
            .cloned()
            .collect())
    }

    async fn delete_entries_by_source(&self, source: &str) -> Result<u64, RepoError> {
        self.faults.check("delete_entries_by_source", connection_reset)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().expect("dictionary lock");
        let before = entries.len();
        entries.retain(|e| e.source != source);
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryUsage {
    events: Mutex<Vec<UsageEvent>>,
    faults: Faults,
}

impl MemoryUsage {
    /// Make every later call of `op` time out.
    pub fn fail_on(&self, op: &'static str) {
        self.faults.inject(op);
    }

    pub fn snapshot(&self) -> Vec<UsageEvent> {
        self.events.lock().expect("usage lock").clone()
    }

    pub fn seed_at(&self, source: &str, keyword: &str, created_at: OffsetDateTime) {
        self.events.lock().expect("usage lock").push(UsageEvent {
            source: source.to_string(),
            keyword: keyword.to_string(),
            created_at,
        });
    }
}

#[async_trait]
impl UsageRepo for MemoryUsage {
    async fn append_usage_event(
        &self,
        source: &str,
        keyword: &str,
    ) -> Result<UsageEvent, RepoError> {
        self.faults.check("append_usage_event", || RepoError::Timeout)?;
        let event = UsageEvent {
            source: source.to_string(),
            keyword: keyword.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.events.lock().expect("usage lock").push(event.clone());
        Ok(event)
    }

    async fn delete_usage_by_keyword(
        &self,
        source: &str,
        keyword: &str,
    ) -> Result<u64, RepoError> {
        self.faults.check("delete_usage_by_keyword", || RepoError::Timeout)?;
        let mut events = self.events.lock().expect("usage lock");
        let before = events.len();
        events.retain(|e| !(e.source == source && e.keyword == keyword));
        Ok((before - events.len()) as u64)
    }

    async fn delete_usage_by_source(&self, source: &str) -> Result<u64, RepoError> {
        self.faults.check("delete_usage_by_source", || RepoError::Timeout)?;
        let mut events = self.events.lock().expect("usage lock");
        let before = events.len();
        events.retain(|e| e.source != source);
        Ok((before - events.len()) as u64)
    }

    async fn list_usage_since(
        &self,
        source: &str,
        since: OffsetDateTime,
    ) -> Result<Vec<UsageEvent>, RepoError> {
        self.faults.check("list_usage_since", || RepoError::Timeout)?;
        let mut events: Vec<UsageEvent> = self
            .events
            .lock()
            .expect("usage lock")
            .iter()
            .filter(|e| e.source == source && e.created_at >= since)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Reply { token: String, messages: Vec<String> },
    Push { to: String, messages: Vec<String> },
}

#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<Sent>>,
    profiles: Mutex<Vec<UserProfile>>,
    pub profile_calls: AtomicUsize,
}

impl RecordingMessenger {
    pub fn with_profile(self, user_id: &str, display_name: &str, status: Option<&str>) -> Self {
        self.profiles.lock().expect("profiles lock").push(UserProfile {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            status_message: status.map(str::to_string),
        });
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn reply(&self, reply_token: &str, messages: &[String]) -> Result<(), MessengerError> {
        self.sent.lock().expect("sent lock").push(Sent::Reply {
            token: reply_token.to_string(),
            messages: messages.to_vec(),
        });
        Ok(())
    }

    async fn push(&self, to: &str, messages: &[String]) -> Result<(), MessengerError> {
        self.sent.lock().expect("sent lock").push(Sent::Push {
            to: to.to_string(),
            messages: messages.to_vec(),
        });
        Ok(())
    }

    async fn get_profile(&self, user_id: &str) -> Result<UserProfile, MessengerError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .lock()
            .expect("profiles lock")
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned()
            .ok_or(MessengerError::NotFound)
    }
}

/// A cache whose every operation fails.
pub struct FailingCache;

fn unavailable() -> CacheError {
    CacheError::Unavailable("connection refused".to_string())
}

#[async_trait]
impl KeywordCache for FailingCache {
    async fn lookup(&self, _: &str, _: &str) -> Result<KeywordLookup, CacheError> {
        Err(unavailable())
    }

    async fn store(&self, _: &str, _: &str, _: &str) -> Result<(), CacheError> {
        Err(unavailable())
    }

    async fn tombstone(&self, _: &str, _: &str) -> Result<(), CacheError> {
        Err(unavailable())
    }

    async fn clear_all(&self, _: &str) -> Result<usize, CacheError> {
        Err(unavailable())
    }
}

#[async_trait]
impl NameCache for FailingCache {
    async fn get_name(&self, _: &str) -> Result<Option<String>, CacheError> {
        Err(unavailable())
    }

    async fn set_name(&self, _: &str, _: &str, _: Duration) -> Result<(), CacheError> {
        Err(unavailable())
    }
}

pub struct Harness {
    pub dictionary: Arc<MemoryDictionary>,
    pub usage: Arc<MemoryUsage>,
    pub keywords: Arc<dyn KeywordCache>,
    pub messenger: Arc<RecordingMessenger>,
    pub dispatcher: CommandDispatcher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_messenger(RecordingMessenger::default())
    }

    pub fn with_messenger(messenger: RecordingMessenger) -> Self {
        let config = CacheConfig::default();
        Self::build(
            messenger,
            Arc::new(MemoryKeywordCache::new(&config)),
            Arc::new(MemoryNameCache::new(&config)),
        )
    }

    pub fn with_failing_cache() -> Self {
        Self::build(
            RecordingMessenger::default(),
            Arc::new(FailingCache),
            Arc::new(FailingCache),
        )
    }

    fn build(
        messenger: RecordingMessenger,
        keywords: Arc<dyn KeywordCache>,
        names: Arc<dyn NameCache>,
    ) -> Self {
        let dictionary = Arc::new(MemoryDictionary::default());
        let usage = Arc::new(MemoryUsage::default());
        let messenger = Arc::new(messenger);
        let dispatcher = CommandDispatcher::new(CommandContext {
            dictionary: dictionary.clone(),
            usage: usage.clone(),
            keywords: keywords.clone(),
            names,
            messenger: messenger.clone(),
            settings: DispatchSettings::default(),
        });
        Self {
            dictionary,
            usage,
            keywords,
            messenger,
            dispatcher,
        }
    }
}

pub fn message(source: &str, user_id: &str, text: &str) -> InboundMessage {
    InboundMessage {
        source: source.to_string(),
        user_id: Some(user_id.to_string()),
        reply_token: Some(format!("token-{text}")),
        text: text.to_string(),
    }
}
