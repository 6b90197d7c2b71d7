use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use parley_db::Database;

use crate::client::{TranslateError, Translator};

type Key = (String, String);

/// Memo of translated message text, keyed by (message, target
/// language). Messages are immutable, so an entry is written once and
/// never invalidated.
///
/// A per-key in-flight lock serializes cold-cache requesters: the
/// second caller waits for the first instead of issuing a duplicate
/// upstream call.
pub struct TranslationCache {
    db: Arc<Database>,
    translator: Arc<dyn Translator>,
    in_flight: Mutex<HashMap<Key, Arc<Mutex<()>>>>,
}

impl TranslationCache {
    pub fn new(db: Arc<Database>, translator: Arc<dyn Translator>) -> Self {
        Self {
            db,
            translator,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached or freshly translated text, `None` when the
    /// message does not exist, `TranslateError::Unavailable` when the
    /// upstream fails (nothing is cached in that case, so a later call
    /// tries upstream again).
    pub async fn get_or_translate(
        &self,
        message_id: &str,
        target_language: &str,
    ) -> Result<Option<String>, TranslateError> {
        if let Some(text) = self.lookup(message_id, target_language).await? {
            return Ok(Some(text));
        }

        let key: Key = (message_id.to_string(), target_language.to_string());
        let key_lock = {
            let mut map = self.in_flight.lock().await;
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _guard = key_lock.lock().await;

        // Single exit so the in-flight entry is dropped no matter how
        // the fill ends, error paths included.
        let result = self.fill(message_id, target_language).await;
        self.finish(&key, &key_lock).await;
        result
    }

    /// Cold-cache path, runs under the per-key lock: re-check the
    /// cache, call upstream, persist the result.
    async fn fill(
        &self,
        message_id: &str,
        target_language: &str,
    ) -> Result<Option<String>, TranslateError> {
        // The previous holder may have warmed the cache while we waited.
        if let Some(text) = self.lookup(message_id, target_language).await? {
            return Ok(Some(text));
        }

        let db = self.db.clone();
        let mid = message_id.to_string();
        let message = tokio::task::spawn_blocking(move || db.get_message(&mid))
            .await
            .map_err(|e| TranslateError::Storage(anyhow::anyhow!("join error: {}", e)))??;

        let Some(message) = message else {
            return Ok(None);
        };

        let translated = self
            .translator
            .translate(&message.content, target_language)
            .await?;

        let db = self.db.clone();
        let mid = message_id.to_string();
        let lang = target_language.to_string();
        let text = translated.clone();
        tokio::task::spawn_blocking(move || db.store_translation(&mid, &lang, &text))
            .await
            .map_err(|e| TranslateError::Storage(anyhow::anyhow!("join error: {}", e)))??;

        Ok(Some(translated))
    }

    async fn lookup(
        &self,
        message_id: &str,
        target_language: &str,
    ) -> Result<Option<String>, TranslateError> {
        let db = self.db.clone();
        let mid = message_id.to_string();
        let lang = target_language.to_string();
        let hit = tokio::task::spawn_blocking(move || db.get_translation(&mid, &lang))
            .await
            .map_err(|e| TranslateError::Storage(anyhow::anyhow!("join error: {}", e)))??;
        Ok(hit)
    }

    /// Drop our in-flight entry, but only if it is still ours — a later
    /// cold requester may have installed a fresh lock for the same key.
    async fn finish(&self, key: &Key, lock: &Arc<Mutex<()>>) {
        let mut map = self.in_flight.lock().await;
        if map.get(key).is_some_and(|existing| Arc::ptr_eq(existing, lock)) {
            map.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    struct CountingTranslator {
        calls: AtomicUsize,
        delay: Duration,
        fail: bool,
    }

    impl CountingTranslator {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                fail: false,
            }
        }

        fn count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Translator for CountingTranslator {
        async fn translate(
            &self,
            text: &str,
            target_language: &str,
        ) -> Result<String, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(TranslateError::Unavailable("upstream down".into()));
            }
            Ok(format!("[{}] {}", target_language, text))
        }
    }

    fn seed_message(db: &Database, content: &str) -> String {
        let sender = db
            .resolve_user(&Uuid::new_v4().to_string(), "ext-s", "s", "", None)
            .unwrap()
            .id;
        let other = db
            .resolve_user(&Uuid::new_v4().to_string(), "ext-o", "o", "", None)
            .unwrap()
            .id;
        let cid = db
            .create_conversation(
                &Uuid::new_v4().to_string(),
                false,
                None,
                None,
                Some("key"),
                &[sender.clone(), other],
            )
            .unwrap();
        let mid = Uuid::new_v4().to_string();
        db.insert_message(&mid, &cid, &sender, content, &[]).unwrap();
        mid
    }

    #[tokio::test]
    async fn second_call_is_a_cache_hit() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mid = seed_message(&db, "hola");
        let translator = Arc::new(CountingTranslator::new());
        let cache = TranslationCache::new(db, translator.clone());

        let first = cache.get_or_translate(&mid, "en").await.unwrap().unwrap();
        let second = cache.get_or_translate(&mid, "en").await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(translator.count(), 1);
    }

    #[tokio::test]
    async fn concurrent_cold_requests_call_upstream_once() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mid = seed_message(&db, "hola");
        let translator = Arc::new(CountingTranslator {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(50),
            fail: false,
        });
        let cache = Arc::new(TranslationCache::new(db, translator.clone()));

        let (a, b) = tokio::join!(
            cache.get_or_translate(&mid, "en"),
            cache.get_or_translate(&mid, "en"),
        );

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(translator.count(), 1);
    }

    #[tokio::test]
    async fn distinct_languages_are_distinct_entries() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mid = seed_message(&db, "hola");
        let translator = Arc::new(CountingTranslator::new());
        let cache = TranslationCache::new(db, translator.clone());

        let en = cache.get_or_translate(&mid, "en").await.unwrap().unwrap();
        let fr = cache.get_or_translate(&mid, "fr").await.unwrap().unwrap();

        assert_ne!(en, fr);
        assert_eq!(translator.count(), 2);
    }

    #[tokio::test]
    async fn missing_message_yields_none() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let translator = Arc::new(CountingTranslator::new());
        let cache = TranslationCache::new(db, translator.clone());

        let result = cache
            .get_or_translate(&Uuid::new_v4().to_string(), "en")
            .await
            .unwrap();

        assert!(result.is_none());
        assert_eq!(translator.count(), 0);
    }

    #[tokio::test]
    async fn upstream_failure_leaves_cache_cold() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mid = seed_message(&db, "hola");
        let translator = Arc::new(CountingTranslator {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: true,
        });
        let cache = TranslationCache::new(db.clone(), translator.clone());

        let err = cache.get_or_translate(&mid, "en").await;
        assert!(matches!(err, Err(TranslateError::Unavailable(_))));
        assert_eq!(db.get_translation(&mid, "en").unwrap(), None);

        // Failure is not sticky, the next call goes upstream again.
        let _ = cache.get_or_translate(&mid, "en").await;
        assert_eq!(translator.count(), 2);
    }

    #[tokio::test]
    async fn failed_requests_leave_no_in_flight_entry() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mid = seed_message(&db, "hola");
        let translator = Arc::new(CountingTranslator {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: true,
        });
        let cache = TranslationCache::new(db, translator.clone());

        let err = cache.get_or_translate(&mid, "en").await;
        assert!(err.is_err());
        assert!(cache.in_flight.lock().await.is_empty());

        let none = cache
            .get_or_translate(&Uuid::new_v4().to_string(), "en")
            .await
            .unwrap();
        assert!(none.is_none());
        assert!(cache.in_flight.lock().await.is_empty());
    }
}
