//! Local booking-content store. Records, taxonomies, terms, attachments and
//! key-value options live in one serializable state tree; the persistence
//! strategy sits behind [`Backend`] so tests run fully in memory.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

pub type RecordId = u64;
pub type TermId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Accommodation,
    Rate,
    Unit,
    Service,
    Season,
    Attribute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub kind: RecordKind,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    pub name: String,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Taxonomy {
    pub label: String,
    #[serde(default)]
    pub terms: BTreeMap<TermId, Term>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub source_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreState {
    pub next_id: u64,
    pub records: BTreeMap<RecordId, Record>,
    pub taxonomies: BTreeMap<String, Taxonomy>,
    pub object_terms: BTreeMap<RecordId, BTreeMap<String, Vec<TermId>>>,
    pub attachments: BTreeMap<RecordId, Attachment>,
    pub options: BTreeMap<String, Value>,
}

pub trait Backend {
    fn load(&self) -> AppResult<StoreState>;
    fn persist(&self, state: &StoreState) -> AppResult<()>;
    fn store_media(&self, file_name: &str, bytes: &[u8]) -> AppResult<()>;
}

/// On-disk backend: `state.json` plus a `media/` directory for downloaded
/// photos, both under the configured state directory.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        FileBackend { dir: dir.into() }
    }

    pub fn state_file(&self) -> PathBuf {
        self.dir.join("state.json")
    }
}

impl Backend for FileBackend {
    fn load(&self) -> AppResult<StoreState> {
        let path = self.state_file();
        if !path.exists() {
            return Ok(StoreState::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        let state = serde_json::from_str(&raw)
            .map_err(|e| AppError::store(format!("corrupt state file {}: {e}", path.display())))?;
        Ok(state)
    }

    fn persist(&self, state: &StoreState) -> AppResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let raw = serde_json::to_string_pretty(state)?;
        // Write-then-rename keeps a crash from truncating the state file.
        let tmp = self.dir.join("state.json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, self.state_file())?;
        Ok(())
    }

    fn store_media(&self, file_name: &str, bytes: &[u8]) -> AppResult<()> {
        let media_dir = self.dir.join("media");
        std::fs::create_dir_all(&media_dir)?;
        std::fs::write(media_dir.join(file_name), bytes)?;
        Ok(())
    }
}

/// Volatile backend for tests: starts empty, persists nowhere.
#[derive(Default)]
pub struct MemoryBackend;

impl Backend for MemoryBackend {
    fn load(&self) -> AppResult<StoreState> {
        Ok(StoreState::default())
    }

    fn persist(&self, _state: &StoreState) -> AppResult<()> {
        Ok(())
    }

    fn store_media(&self, _file_name: &str, _bytes: &[u8]) -> AppResult<()> {
        Ok(())
    }
}

pub struct Store {
    backend: Box<dyn Backend>,
    state: StoreState,
}

impl Store {
    pub fn open(backend: Box<dyn Backend>) -> AppResult<Self> {
        let state = backend.load()?;
        Ok(Store { backend, state })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        Store {
            backend: Box::new(MemoryBackend),
            state: StoreState::default(),
        }
    }

    pub fn persist(&self) -> AppResult<()> {
        self.backend.persist(&self.state)
    }

    // Ids start at 1 so 0 can stand in for "none".
    fn alloc_id(&mut self) -> u64 {
        self.state.next_id += 1;
        self.state.next_id
    }

    // Options.

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.state.options.get(key)
    }

    pub fn set_option(&mut self, key: &str, value: Value) {
        self.state.options.insert(key.to_string(), value);
    }

    pub fn delete_option(&mut self, key: &str) {
        self.state.options.remove(key);
    }

    // Records.

    pub fn upsert_record(
        &mut self,
        kind: RecordKind,
        existing: Option<RecordId>,
        title: &str,
    ) -> RecordId {
        if let Some(id) = existing {
            if let Some(record) = self.state.records.get_mut(&id) {
                record.title = title.to_string();
                return id;
            }
        }
        let id = self.alloc_id();
        self.state.records.insert(
            id,
            Record {
                kind,
                title: title.to_string(),
                body: String::new(),
                slug: String::new(),
                meta: BTreeMap::new(),
            },
        );
        id
    }

    pub fn record(&self, id: RecordId) -> Option<&Record> {
        self.state.records.get(&id)
    }

    pub fn set_record_body(&mut self, id: RecordId, body: &str) {
        if let Some(record) = self.state.records.get_mut(&id) {
            record.body = body.to_string();
        }
    }

    pub fn set_record_slug(&mut self, id: RecordId, slug: &str) {
        if let Some(record) = self.state.records.get_mut(&id) {
            record.slug = slug.to_string();
        }
    }

    pub fn set_record_meta(&mut self, id: RecordId, key: &str, value: Value) {
        if let Some(record) = self.state.records.get_mut(&id) {
            record.meta.insert(key.to_string(), value);
        }
    }

    pub fn record_meta(&self, id: RecordId, key: &str) -> Option<&Value> {
        self.state.records.get(&id)?.meta.get(key)
    }

    pub fn find_record_by_meta(&self, kind: RecordKind, key: &str, value: &str) -> Option<RecordId> {
        self.state.records.iter().find_map(|(id, record)| {
            if record.kind != kind {
                return None;
            }
            match record.meta.get(key) {
                Some(Value::String(s)) if s == value => Some(*id),
                _ => None,
            }
        })
    }

    pub fn find_record_by_slug(&self, kind: RecordKind, slug: &str) -> Option<RecordId> {
        self.state
            .records
            .iter()
            .find_map(|(id, record)| (record.kind == kind && record.slug == slug).then_some(*id))
    }

    pub fn record_ids(&self, kind: RecordKind) -> Vec<RecordId> {
        self.state
            .records
            .iter()
            .filter(|(_, r)| r.kind == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    /// All string values a meta key takes across records of a kind. Used to
    /// list which remote UIDs are already imported.
    pub fn meta_values(&self, kind: RecordKind, key: &str) -> Vec<String> {
        self.state
            .records
            .values()
            .filter(|r| r.kind == kind)
            .filter_map(|r| match r.meta.get(key) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    // Taxonomies and terms.

    pub fn taxonomy_exists(&self, slug: &str) -> bool {
        self.state.taxonomies.contains_key(slug)
    }

    pub fn ensure_taxonomy(&mut self, slug: &str, label: &str) {
        self.state
            .taxonomies
            .entry(slug.to_string())
            .or_insert_with(|| Taxonomy {
                label: label.to_string(),
                terms: BTreeMap::new(),
            });
    }

    pub fn taxonomies_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.state
            .taxonomies
            .keys()
            .filter(|slug| slug.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn term_exists(&self, taxonomy: &str, term: TermId) -> bool {
        self.state
            .taxonomies
            .get(taxonomy)
            .is_some_and(|t| t.terms.contains_key(&term))
    }

    pub fn term_name(&self, taxonomy: &str, term: TermId) -> Option<&str> {
        self.state
            .taxonomies
            .get(taxonomy)?
            .terms
            .get(&term)
            .map(|t| t.name.as_str())
    }

    pub fn find_term_by_name(&self, taxonomy: &str, name: &str) -> Option<TermId> {
        let tax = self.state.taxonomies.get(taxonomy)?;
        tax.terms
            .iter()
            .find_map(|(id, term)| term.name.eq_ignore_ascii_case(name).then_some(*id))
    }

    pub fn find_term_by_meta(&self, taxonomy: &str, key: &str, value: &str) -> Option<TermId> {
        let tax = self.state.taxonomies.get(taxonomy)?;
        tax.terms.iter().find_map(|(id, term)| match term.meta.get(key) {
            Some(Value::String(s)) if s == value => Some(*id),
            _ => None,
        })
    }

    pub fn insert_term(&mut self, taxonomy: &str, name: &str) -> AppResult<TermId> {
        let id = self.alloc_id();
        let tax = self
            .state
            .taxonomies
            .get_mut(taxonomy)
            .ok_or_else(|| AppError::store(format!("unknown taxonomy {taxonomy}")))?;
        tax.terms.insert(
            id,
            Term {
                name: name.to_string(),
                meta: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    pub fn set_term_meta(&mut self, taxonomy: &str, term: TermId, key: &str, value: Value) {
        if let Some(t) = self
            .state
            .taxonomies
            .get_mut(taxonomy)
            .and_then(|tax| tax.terms.get_mut(&term))
        {
            t.meta.insert(key.to_string(), value);
        }
    }

    pub fn delete_term(&mut self, taxonomy: &str, term: TermId) {
        if let Some(tax) = self.state.taxonomies.get_mut(taxonomy) {
            tax.terms.remove(&term);
        }
        for assigned in self.state.object_terms.values_mut() {
            if let Some(terms) = assigned.get_mut(taxonomy) {
                terms.retain(|t| *t != term);
            }
        }
    }

    /// Replaces an object's term assignment for one taxonomy. Duplicates in
    /// the incoming list are collapsed, order preserved.
    pub fn set_object_terms(&mut self, object: RecordId, taxonomy: &str, terms: &[TermId]) {
        let mut deduped: Vec<TermId> = Vec::with_capacity(terms.len());
        for term in terms {
            if !deduped.contains(term) {
                deduped.push(*term);
            }
        }
        self.state
            .object_terms
            .entry(object)
            .or_default()
            .insert(taxonomy.to_string(), deduped);
    }

    pub fn object_terms(&self, object: RecordId, taxonomy: &str) -> Vec<TermId> {
        self.state
            .object_terms
            .get(&object)
            .and_then(|assigned| assigned.get(taxonomy))
            .cloned()
            .unwrap_or_default()
    }

    pub fn objects_in_term(&self, taxonomy: &str, term: TermId) -> Vec<RecordId> {
        self.state
            .object_terms
            .iter()
            .filter(|(_, assigned)| {
                assigned
                    .get(taxonomy)
                    .is_some_and(|terms| terms.contains(&term))
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn remove_term_from_objects(&mut self, taxonomy: &str, term: TermId) {
        for assigned in self.state.object_terms.values_mut() {
            if let Some(terms) = assigned.get_mut(taxonomy) {
                terms.retain(|t| *t != term);
            }
        }
    }

    // Attachments.

    pub fn attach_media(
        &mut self,
        file_name: &str,
        source_url: &str,
        bytes: &[u8],
    ) -> AppResult<RecordId> {
        self.backend.store_media(file_name, bytes)?;
        let id = self.alloc_id();
        self.state.attachments.insert(
            id,
            Attachment {
                file_name: file_name.to_string(),
                source_url: source_url.to_string(),
            },
        );
        Ok(id)
    }

    pub fn attachment(&self, id: RecordId) -> Option<&Attachment> {
        self.state.attachments.get(&id)
    }
}
