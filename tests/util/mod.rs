use std::sync::Arc;

use entity_search::indexer::SearchDocument;
use entity_search::model::{
    EntitySearchDescriptor, FieldDescriptor, NumericKind, Record, SchemaRegistry, SearchEntity,
    Value,
};
use entity_search::{SearchConfig, SearchService};
use tempfile::TempDir;

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }
}

struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[allow(dead_code)]
pub struct EnvGuard {
    key: String,
    prev: Option<String>,
}

#[allow(dead_code)]
impl EnvGuard {
    pub fn set(key: &str, val: impl AsRef<str>) -> Self {
        let prev = std::env::var(key).ok();
        unsafe { std::env::set_var(key, val.as_ref()) };
        Self {
            key: key.to_string(),
            prev,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match &self.prev {
            Some(v) => unsafe { std::env::set_var(&self.key, v) },
            None => unsafe { std::env::remove_var(&self.key) },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub code: String,
    pub pages: i32,
}

#[allow(dead_code)]
impl Book {
    pub fn new(id: &str, title: &str, code: &str, pages: i32) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            code: code.into(),
            pages,
        }
    }
}

impl Record for Book {
    fn get(&self, property: &str) -> Option<Value> {
        match property {
            "id" => Some(Value::from(&self.id)),
            "title" => Some(Value::from(&self.title)),
            "code" => Some(Value::from(&self.code)),
            "pages" => Some(Value::from(self.pages)),
            _ => None,
        }
    }
}

impl SearchEntity for Book {
    const ENTITY_TYPE: &'static str = "Book";
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

pub fn book_descriptor() -> EntitySearchDescriptor {
    EntitySearchDescriptor::builder("Book")
        .id_field(FieldDescriptor::property("id"))
        .field(FieldDescriptor::property("title").stored())
        .field(
            FieldDescriptor::property("code")
                .lower_case_keyword(None)
                .stored(),
        )
        .field(
            FieldDescriptor::property("pages")
                .numeric(NumericKind::Int32)
                .stored(),
        )
        .build()
        .expect("book descriptor")
}

#[allow(dead_code)]
pub fn registry() -> Arc<SchemaRegistry> {
    SchemaRegistry::builder()
        .register(book_descriptor())
        .expect("register Book")
        .build()
}

/// A service whose indexes live under `dir`.
#[allow(dead_code)]
pub fn service(dir: &TempDir) -> SearchService {
    SearchService::new(SearchConfig::with_root(dir.path()), registry())
}

/// The two records every orchestration test starts from.
#[allow(dead_code)]
pub fn two_books() -> Vec<Book> {
    vec![
        Book::new("1", "Lucene in Action", "B001", 475),
        Book::new("2", "Pro Search Lucene", "B002", 320),
    ]
}

#[allow(dead_code)]
pub fn numbered_books(n: usize) -> Vec<Book> {
    (0..n)
        .map(|i| {
            Book::new(
                &format!("{i:03}"),
                &format!("Volume {i} of the series"),
                &format!("V{i:03}"),
                100 + i as i32,
            )
        })
        .collect()
}

/// Upsert `books` straight through the write gateway.
#[allow(dead_code)]
pub fn index_books(service: &SearchService, books: &[Book]) {
    let descriptor = service.schema().get("Book").expect("Book registered");
    let docs: Vec<SearchDocument> = books
        .iter()
        .map(|b| SearchDocument::from_record(&descriptor, b).expect("document"))
        .collect();
    service
        .gateway()
        .upsert_many(&descriptor, &docs, false)
        .expect("upsert books");
}
