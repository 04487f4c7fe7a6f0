//! Application state shared across handlers.

use std::sync::Arc;

use crate::db::EntityStore;
use crate::services::{CredentialService, DirectoryService, OrderService, QueryService};

/// Application state shared across all handlers.
///
/// Cheap to clone; everything lives behind one `Arc`.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn EntityStore>,
    credentials: CredentialService,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn EntityStore>, credentials: CredentialService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { store, credentials }),
        }
    }

    #[must_use]
    pub fn store(&self) -> &dyn EntityStore {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialService {
        &self.inner.credentials
    }

    #[must_use]
    pub fn orders(&self) -> OrderService<'_> {
        OrderService::new(self.store())
    }

    #[must_use]
    pub fn queries(&self) -> QueryService<'_> {
        QueryService::new(self.store())
    }

    #[must_use]
    pub fn directory(&self) -> DirectoryService<'_> {
        DirectoryService::new(self.store(), self.credentials())
    }
}
