//! Tantivy index plumbing: schema derivation, directory layout, open/create.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tantivy::schema::{
    Field, IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions,
};
use tantivy::tokenizer::{LowerCaser, NgramTokenizer, RawTokenizer, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Term};

use crate::error::{Result, SearchError};
use crate::model::{EntitySearchDescriptor, FieldDescriptor};

/// Tokenizer for case-insensitive keywords: the whole value, lower-cased.
pub const KEYWORD_LOWER_TOKENIZER: &str = "keyword_lower";

/// Suffix of the hidden edge-n-gram field backing autocomplete.
pub const AUTOCOMPLETE_SUFFIX: &str = "__ac";

/// File holding the descriptor fingerprint the index was created with.
const FINGERPRINT_FILE: &str = "schema.fingerprint";

/// An opened physical index plus its resolved field handles.
pub struct TantivyIndex {
    pub index: Index,
    entity_type: String,
    fields: HashMap<String, Field>,
    autocomplete: HashMap<String, Field>,
    id_field: Field,
}

impl TantivyIndex {
    /// Open the index at `path`, creating it when absent.
    ///
    /// An existing index whose schema fingerprint does not match `descriptor`
    /// is wiped and recreated empty.
    pub fn open_or_create(path: &Path, descriptor: &EntitySearchDescriptor) -> Result<Self> {
        fs::create_dir_all(path)?;
        let fingerprint = format!("{:08x}", descriptor.fingerprint());
        let marker = path.join(FINGERPRINT_FILE);

        if path.join("meta.json").exists() {
            let on_disk = fs::read_to_string(&marker).unwrap_or_default();
            if on_disk.trim() != fingerprint {
                tracing::warn!(
                    entity = descriptor.entity_type(),
                    path = %path.display(),
                    expected = %fingerprint,
                    found = %on_disk.trim(),
                    "search schema changed; recreating index"
                );
                fs::remove_dir_all(path)?;
                fs::create_dir_all(path)?;
            }
        }

        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            let index = Index::create_in_dir(path, build_schema(descriptor))?;
            fs::write(&marker, &fingerprint)?;
            index
        };

        Self::from_index(index, descriptor)
    }

    /// In-memory index, for tests and throwaway use.
    pub fn create_in_ram(descriptor: &EntitySearchDescriptor) -> Result<Self> {
        Self::from_index(Index::create_in_ram(build_schema(descriptor)), descriptor)
    }

    fn from_index(index: Index, descriptor: &EntitySearchDescriptor) -> Result<Self> {
        register_tokenizers(&index, descriptor)?;
        let schema = index.schema();

        let mut fields = HashMap::new();
        let mut autocomplete = HashMap::new();
        for fd in descriptor.fields() {
            let field = schema.get_field(&fd.name).map_err(|_| {
                SearchError::Config(format!("index schema missing field `{}`", fd.name))
            })?;
            fields.insert(fd.name.clone(), field);
            if fd.autocomplete.is_some() {
                let ac_name = autocomplete_field_name(&fd.name);
                let ac = schema.get_field(&ac_name).map_err(|_| {
                    SearchError::Config(format!("index schema missing field `{ac_name}`"))
                })?;
                autocomplete.insert(fd.name.clone(), ac);
            }
        }
        let id_field = fields[descriptor.id_field_name()];

        Ok(Self {
            index,
            entity_type: descriptor.entity_type().to_string(),
            fields,
            autocomplete,
            id_field,
        })
    }

    pub fn field(&self, name: &str) -> Result<Field> {
        self.fields
            .get(name)
            .copied()
            .ok_or_else(|| SearchError::UnknownField {
                entity: self.entity_type.clone(),
                field: name.to_string(),
            })
    }

    pub fn autocomplete_field(&self, name: &str) -> Option<Field> {
        self.autocomplete.get(name).copied()
    }

    pub fn id_field(&self) -> Field {
        self.id_field
    }

    /// Key term addressing the document whose id is `id`.
    pub fn id_term(&self, descriptor: &EntitySearchDescriptor, id: &str) -> Term {
        Term::from_field_text(self.id_field, &descriptor.id_field().normalize(id))
    }

    pub fn writer(&self, heap_bytes: usize) -> Result<IndexWriter> {
        Ok(self.index.writer(heap_bytes)?)
    }

    /// A reader pinned to the latest commit at the time of the call.
    pub fn reader(&self) -> Result<IndexReader> {
        Ok(self
            .index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?)
    }
}

pub fn autocomplete_field_name(name: &str) -> String {
    format!("{name}{AUTOCOMPLETE_SUFFIX}")
}

fn autocomplete_tokenizer_name(min_gram: usize, max_gram: usize) -> String {
    format!("edge_ngram_{min_gram}_{max_gram}")
}

pub fn build_schema(descriptor: &EntitySearchDescriptor) -> Schema {
    let mut schema_builder = Schema::builder();
    for fd in descriptor.fields() {
        if fd.is_numeric() {
            let mut opts = NumericOptions::default();
            if fd.is_indexed() {
                opts = opts.set_indexed().set_fast();
            }
            if fd.store {
                opts = opts.set_stored();
            }
            schema_builder.add_i64_field(&fd.name, opts);
        } else {
            schema_builder.add_text_field(&fd.name, text_options(fd));
        }

        if let Some(ac) = fd.autocomplete {
            let indexing = TextFieldIndexing::default()
                .set_tokenizer(&autocomplete_tokenizer_name(ac.min_gram, ac.max_gram))
                .set_index_option(IndexRecordOption::Basic);
            schema_builder.add_text_field(
                &autocomplete_field_name(&fd.name),
                TextOptions::default().set_indexing_options(indexing),
            );
        }
    }
    schema_builder.build()
}

fn text_options(fd: &FieldDescriptor) -> TextOptions {
    let mut opts = TextOptions::default();
    if fd.is_indexed() {
        let indexing = if fd.keyword {
            let tokenizer = if fd.lower_case_keyword {
                KEYWORD_LOWER_TOKENIZER
            } else {
                "raw"
            };
            TextFieldIndexing::default()
                .set_tokenizer(tokenizer)
                .set_index_option(IndexRecordOption::Basic)
        } else {
            // positions are always kept so phrase queries parse
            TextFieldIndexing::default()
                .set_tokenizer("default")
                .set_index_option(IndexRecordOption::WithFreqsAndPositions)
        };
        opts = opts.set_indexing_options(indexing);
    }
    if fd.store {
        opts = opts.set_stored();
    }
    opts
}

/// Tokenizers live in memory only, so every opened `Index` needs them again.
fn register_tokenizers(index: &Index, descriptor: &EntitySearchDescriptor) -> Result<()> {
    let manager = index.tokenizers();
    manager.register(
        KEYWORD_LOWER_TOKENIZER,
        TextAnalyzer::builder(RawTokenizer::default())
            .filter(LowerCaser)
            .build(),
    );
    for fd in descriptor.fields() {
        if let Some(ac) = fd.autocomplete {
            let ngrams = NgramTokenizer::new(ac.min_gram, ac.max_gram, true)?;
            manager.register(
                &autocomplete_tokenizer_name(ac.min_gram, ac.max_gram),
                TextAnalyzer::builder(ngrams).filter(LowerCaser).build(),
            );
        }
    }
    Ok(())
}

/// Directory of the physical index for `index_name`, optionally under a tenant.
pub fn index_dir(root: &Path, index_name: &str, tenant: Option<&str>) -> Result<PathBuf> {
    match tenant {
        Some(tenant) => {
            if tenant.is_empty()
                || tenant == "."
                || tenant == ".."
                || tenant.contains(['/', '\\'])
            {
                return Err(SearchError::Config(format!("invalid tenant id `{tenant}`")));
            }
            Ok(root.join("tenants").join(tenant).join(index_name))
        }
        None => Ok(root.join(index_name)),
    }
}
