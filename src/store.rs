//! The [`MailStore`] facade: one pooled connection per call, invalidation
//! events after every mutation that changes what a view would show.

use chrono::{DateTime, Utc};
use flume::Receiver;
use tracing::info;

use crate::adapters::sqlite::{
    accounts, batch, conversations, create_memory_pool, create_pool, folders, messages, schema,
    search, threads, DbPool,
};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::services::{self, EventBus, IngestOutcome, PruneReport, StoreEvent};
use crate::types::{
    Account, BodyUpdate, Conversation, Folder, FolderType, Message, MessageHeader, Page,
    SearchResult, SortOrder, UidFlags, UnifiedConversation,
};

pub struct MailStore {
    pool: DbPool,
    config: StoreConfig,
    events: EventBus,
}

impl MailStore {
    /// Open the on-disk store described by `config`, creating the schema if needed
    pub fn open(config: StoreConfig) -> Result<Self> {
        let pool = create_pool(&config)?;
        Self::with_pool(pool, config)
    }

    /// Private in-memory store, mostly for tests and previews
    pub fn in_memory() -> Result<Self> {
        let pool = create_memory_pool()?;
        Self::with_pool(pool, StoreConfig::default())
    }

    fn with_pool(pool: DbPool, config: StoreConfig) -> Result<Self> {
        {
            let conn = pool.get()?;
            schema::initialize_schema(&conn)?;
        }
        Ok(Self {
            pool,
            config,
            events: EventBus::new(),
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Receive invalidation events for every later mutation
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // ========== Accounts ==========

    pub fn upsert_account(&self, account: &Account) -> Result<()> {
        let conn = self.pool.get()?;
        accounts::upsert_account(&conn, account)
    }

    pub fn get_account(&self, account_id: &str) -> Result<Option<Account>> {
        let conn = self.pool.get()?;
        accounts::get_account(&conn, account_id)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.pool.get()?;
        accounts::list_accounts(&conn)
    }

    /// Enabling or disabling changes the unified inbox, so inbox folders are invalidated
    pub fn set_account_enabled(&self, account_id: &str, enabled: bool) -> Result<bool> {
        let conn = self.pool.get()?;
        let changed = accounts::set_account_enabled(&conn, account_id, enabled)?;
        if changed {
            let inboxes = folders::list_folders(&conn, account_id)?
                .into_iter()
                .filter(|f| f.folder_type == FolderType::Inbox)
                .map(|f| f.id);
            self.events.folders_changed(inboxes);
        }
        Ok(changed)
    }

    pub fn delete_account(&self, account_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let owned: Vec<String> = folders::list_folders(&conn, account_id)?
            .into_iter()
            .map(|f| f.id)
            .collect();
        let deleted = accounts::delete_account(&conn, account_id)?;
        if deleted {
            info!("Deleted account {} with {} folders", account_id, owned.len());
            self.events.folders_changed(owned);
        }
        Ok(deleted)
    }

    // ========== Folders ==========

    pub fn upsert_folder(&self, folder: &Folder) -> Result<()> {
        let conn = self.pool.get()?;
        folders::upsert_folder(&conn, folder)?;
        self.events.folders_changed([folder.id.as_str()]);
        Ok(())
    }

    pub fn get_folder(&self, folder_id: &str) -> Result<Option<Folder>> {
        let conn = self.pool.get()?;
        folders::get_folder(&conn, folder_id)
    }

    pub fn list_folders(&self, account_id: &str) -> Result<Vec<Folder>> {
        let conn = self.pool.get()?;
        folders::list_folders(&conn, account_id)
    }

    pub fn find_folder_by_type(&self, account_id: &str, folder_type: FolderType) -> Result<Option<Folder>> {
        let conn = self.pool.get()?;
        folders::find_folder_by_type(&conn, account_id, folder_type)
    }

    pub fn delete_folder(&self, folder_id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let deleted = folders::delete_folder(&conn, folder_id)?;
        if deleted {
            self.events.folders_changed([folder_id]);
        }
        Ok(deleted)
    }

    pub fn recount_folder(&self, folder_id: &str) -> Result<()> {
        let conn = self.pool.get()?;
        folders::recount_folder(&conn, folder_id)?;
        self.events.folders_changed([folder_id]);
        Ok(())
    }

    /// Unread badge for the unified inbox
    pub fn unified_unread_count(&self) -> Result<u32> {
        let conn = self.pool.get()?;
        folders::unified_unread_count(&conn)
    }

    // ========== Ingest and threading ==========

    /// Store a new message and thread it
    pub fn ingest_message(&self, msg: Message) -> Result<IngestOutcome> {
        let conn = self.pool.get()?;
        let outcome = services::ingest_message(&conn, msg)?;
        self.announce_ingest(std::slice::from_ref(&outcome));
        Ok(outcome)
    }

    /// Store a sync batch in order
    pub fn ingest_messages(&self, batch: Vec<Message>) -> Result<Vec<IngestOutcome>> {
        let conn = self.pool.get()?;
        let outcomes = services::ingest_messages(&conn, batch)?;
        self.announce_ingest(&outcomes);
        Ok(outcomes)
    }

    fn announce_ingest(&self, outcomes: &[IngestOutcome]) {
        self.events
            .folders_changed(outcomes.iter().map(|o| o.message.folder_id.as_str()));

        let mut by_account: Vec<(&str, Vec<String>)> = Vec::new();
        for outcome in outcomes {
            let account = outcome.message.account_id.as_str();
            match by_account.iter_mut().find(|(a, _)| *a == account) {
                Some((_, threads)) => threads.extend(outcome.touched_threads()),
                None => by_account.push((account, outcome.touched_threads())),
            }
        }
        for (account, threads) in by_account {
            self.events.threads_changed(account, threads);
        }
    }

    pub fn find_thread_id(
        &self,
        account_id: &str,
        own_id: &str,
        in_reply_to: Option<&str>,
        references: &[String],
    ) -> Result<String> {
        let conn = self.pool.get()?;
        threads::find_thread_id(&conn, account_id, own_id, in_reply_to, references)
    }

    pub fn reconcile_threads_for_new_message(
        &self,
        account_id: &str,
        msg: &Message,
    ) -> Result<threads::ReconcileOutcome> {
        let conn = self.pool.get()?;
        let outcome = threads::reconcile_threads_for_new_message(&conn, account_id, msg)?;
        if outcome.rewritten > 0 {
            let mut touched = outcome.merged.clone();
            touched.push(outcome.thread_id.clone());
            self.events.threads_changed(account_id, touched);
        }
        Ok(outcome)
    }

    // ========== Messages ==========

    /// Store a message as given, without threading it
    pub fn create_message(&self, msg: &mut Message) -> Result<()> {
        let conn = self.pool.get()?;
        messages::create_message(&conn, msg)?;
        self.events.folders_changed([msg.folder_id.as_str()]);
        Ok(())
    }

    pub fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let conn = self.pool.get()?;
        messages::get_message(&conn, id)
    }

    pub fn get_message_by_uid(&self, folder_id: &str, uid: u32) -> Result<Option<Message>> {
        let conn = self.pool.get()?;
        messages::get_message_by_uid(&conn, folder_id, uid)
    }

    pub fn update_message(&self, msg: &mut Message) -> Result<bool> {
        let conn = self.pool.get()?;
        let before = messages::get_message(&conn, &msg.id)?;
        let updated = messages::update_message(&conn, msg)?;
        if updated {
            let mut touched = vec![msg.folder_id.clone()];
            touched.extend(before.map(|m| m.folder_id));
            self.events.folders_changed(touched);
        }
        Ok(updated)
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let owner = messages::folders_of(&conn, &[id.to_string()])?;
        let deleted = messages::delete_message(&conn, id)?;
        if deleted {
            self.events.folders_changed(owner);
        }
        Ok(deleted)
    }

    pub fn delete_by_folder(&self, folder_id: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        let deleted = messages::delete_by_folder(&conn, folder_id)?;
        if deleted > 0 {
            self.events.folders_changed([folder_id]);
        }
        Ok(deleted)
    }

    pub fn delete_older_than(&self, account_id: &str, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.pool.get()?;
        let deleted = messages::delete_older_than(&conn, account_id, cutoff)?;
        if deleted > 0 {
            let owned = folders::list_folders(&conn, account_id)?.into_iter().map(|f| f.id);
            self.events.folders_changed(owned);
        }
        Ok(deleted)
    }

    /// Retention sweep over every account
    pub fn prune_expired(&self, now: DateTime<Utc>) -> Result<Vec<PruneReport>> {
        let conn = self.pool.get()?;
        let reports = services::prune_expired(&conn, self.config.default_retention_days, now)?;
        self.events
            .folders_changed(reports.iter().flat_map(|r| r.folder_ids.iter().map(String::as_str)));
        Ok(reports)
    }

    pub fn list_uids(&self, folder_id: &str) -> Result<Vec<u32>> {
        let conn = self.pool.get()?;
        messages::list_uids(&conn, folder_id)
    }

    pub fn highest_uid(&self, folder_id: &str) -> Result<Option<u32>> {
        let conn = self.pool.get()?;
        messages::highest_uid(&conn, folder_id)
    }

    pub fn uids_missing_body(&self, folder_id: &str, limit: usize) -> Result<Vec<u32>> {
        let conn = self.pool.get()?;
        messages::uids_missing_body(&conn, folder_id, limit)
    }

    pub fn list_headers(&self, folder_id: &str, order: SortOrder, page: Page) -> Result<Vec<MessageHeader>> {
        let conn = self.pool.get()?;
        messages::list_headers(&conn, folder_id, order, page)
    }

    pub fn get_smime_raw_body(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.pool.get()?;
        messages::get_smime_raw_body(&conn, id)
    }

    pub fn set_smime_raw_body(&self, id: &str, raw: Option<&[u8]>) -> Result<bool> {
        let conn = self.pool.get()?;
        messages::set_smime_raw_body(&conn, id, raw)
    }

    pub fn get_pgp_raw_body(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.pool.get()?;
        messages::get_pgp_raw_body(&conn, id)
    }

    pub fn set_pgp_raw_body(&self, id: &str, raw: Option<&[u8]>) -> Result<bool> {
        let conn = self.pool.get()?;
        messages::set_pgp_raw_body(&conn, id, raw)
    }

    pub fn clear_rendered_body(&self, id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        messages::clear_rendered_body(&conn, id)
    }

    pub fn mark_read_receipt_handled(&self, id: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        messages::mark_read_receipt_handled(&conn, id)
    }

    // ========== Conversations ==========

    pub fn list_folder_conversations(
        &self,
        folder_id: &str,
        order: SortOrder,
        page: Page,
    ) -> Result<Vec<Conversation>> {
        let conn = self.pool.get()?;
        conversations::list_folder_conversations(&conn, folder_id, order, page)
    }

    pub fn count_folder_conversations(&self, folder_id: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        conversations::count_folder_conversations(&conn, folder_id)
    }

    /// Messages of one thread across the account, oldest first. `viewing` is
    /// the type of the folder the caller is looking from.
    pub fn get_conversation(
        &self,
        account_id: &str,
        anchor: &str,
        viewing: Option<FolderType>,
    ) -> Result<Vec<Message>> {
        let conn = self.pool.get()?;
        conversations::get_conversation(&conn, account_id, anchor, viewing)
    }

    pub fn list_unified_conversations(&self, order: SortOrder, page: Page) -> Result<Vec<UnifiedConversation>> {
        let conn = self.pool.get()?;
        let enabled = accounts::list_enabled_accounts(&conn)?;
        conversations::list_unified_conversations(&conn, &enabled, order, page)
    }

    pub fn count_unified_conversations(&self) -> Result<usize> {
        let conn = self.pool.get()?;
        conversations::count_unified_conversations(&conn)
    }

    pub fn mark_conversation_read(&self, account_id: &str, thread_id: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        let updated = conversations::mark_conversation_read(&conn, account_id, thread_id)?;
        if updated > 0 {
            self.events
                .folders_changed(conversations::thread_folders(&conn, account_id, thread_id)?);
            self.events
                .threads_changed(account_id, vec![thread_id.to_string()]);
        }
        Ok(updated)
    }

    // ========== Search ==========

    fn clamp(&self, page: Page) -> Page {
        Page::new(page.offset, page.limit.min(self.config.max_search_results))
    }

    pub fn search_folder(&self, folder_id: &str, query: &str, page: Page) -> Result<(Vec<SearchResult>, usize)> {
        let conn = self.pool.get()?;
        search::search_folder(&conn, folder_id, query, self.clamp(page))
    }

    pub fn search_unified(&self, query: &str, page: Page) -> Result<(Vec<SearchResult>, usize)> {
        let conn = self.pool.get()?;
        let enabled = accounts::list_enabled_accounts(&conn)?;
        search::search_unified(&conn, &enabled, query, self.clamp(page))
    }

    // ========== Batches ==========

    pub fn update_flags_by_uid(&self, folder_id: &str, updates: &[UidFlags]) -> Result<usize> {
        let conn = self.pool.get()?;
        let matched = batch::update_flags_by_uid(&conn, folder_id, updates)?;
        if matched > 0 {
            self.events.folders_changed([folder_id]);
        }
        Ok(matched)
    }

    pub fn update_flags_by_ids(
        &self,
        ids: &[String],
        read: Option<bool>,
        starred: Option<bool>,
    ) -> Result<usize> {
        let conn = self.pool.get()?;
        let updated = batch::update_flags_by_ids(&conn, ids, read, starred)?;
        if updated > 0 {
            self.events.folders_changed(messages::folders_of(&conn, ids)?);
        }
        Ok(updated)
    }

    pub fn update_bodies(&self, updates: &[BodyUpdate]) -> Result<usize> {
        let conn = self.pool.get()?;
        let written = batch::update_bodies(&conn, updates)?;
        if written > 0 {
            let ids: Vec<String> = updates.iter().map(|u| u.id.clone()).collect();
            self.events.folders_changed(messages::folders_of(&conn, &ids)?);
        }
        Ok(written)
    }

    pub fn move_messages(&self, ids: &[String], target_folder_id: &str) -> Result<usize> {
        let conn = self.pool.get()?;
        let mut touched = messages::folders_of(&conn, ids)?;
        let moved = batch::move_messages(&conn, ids, target_folder_id)?;
        if moved > 0 {
            touched.push(target_folder_id.to_string());
            self.events.folders_changed(touched);
        }
        Ok(moved)
    }

    pub fn copy_messages(&self, ids: &[String], target_folder_id: &str) -> Result<Vec<String>> {
        let conn = self.pool.get()?;
        let created = batch::copy_messages(&conn, ids, target_folder_id)?;
        if !created.is_empty() {
            self.events.folders_changed([target_folder_id]);
        }
        Ok(created)
    }

    pub fn delete_messages(&self, ids: &[String]) -> Result<usize> {
        let conn = self.pool.get()?;
        let touched = messages::folders_of(&conn, ids)?;
        let deleted = batch::delete_messages(&conn, ids)?;
        if deleted > 0 {
            self.events.folders_changed(touched);
        }
        Ok(deleted)
    }
}
