use std::sync::Arc;

use parley_db::Database;
use parley_translate::TranslationCache;

use crate::storage::ObjectStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub translations: TranslationCache,
    pub storage: Arc<dyn ObjectStore>,
}
