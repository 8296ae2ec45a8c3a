use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{sync::Mutex, time::Instant};

use crate::{
    catalog::CatalogScreen, identity::IdentityProvider, management::BookingsScreen,
    store::DocumentStore,
};

pub const DEFAULT_SCREEN_IDLE: Duration = Duration::from_secs(30 * 60);

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub identities: Arc<dyn IdentityProvider>,
    pub screens: Arc<ScreenRegistry>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, identities: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            identities,
            screens: Arc::new(ScreenRegistry::default()),
        }
    }

    pub fn with_screen_idle(mut self, idle: Duration) -> Self {
        self.screens = Arc::new(ScreenRegistry::new(idle));
        self
    }
}

pub type SharedCatalogScreen = Arc<Mutex<CatalogScreen>>;
pub type SharedBookingsScreen = Arc<Mutex<BookingsScreen>>;

struct ScreenEntry {
    catalog: Option<SharedCatalogScreen>,
    bookings: Option<SharedBookingsScreen>,
    last_seen: Instant,
}

impl ScreenEntry {
    fn new(now: Instant) -> Self {
        Self {
            catalog: None,
            bookings: None,
            last_seen: now,
        }
    }

    async fn dispose(self) {
        if let Some(screen) = self.catalog {
            screen.lock().await.dispose();
        }
    }
}

/// Screens of signed-in users, keyed by email.
///
/// Entries untouched for longer than the idle limit are disposed on the next
/// access to the registry.
pub struct ScreenRegistry {
    entries: Mutex<HashMap<String, ScreenEntry>>,
    idle: Duration,
}

impl Default for ScreenRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SCREEN_IDLE)
    }
}

impl ScreenRegistry {
    pub fn new(idle: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle,
        }
    }

    async fn evict_idle(&self, entries: &mut HashMap<String, ScreenEntry>, now: Instant) {
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_seen) > self.idle)
            .map(|(email, _)| email.clone())
            .collect();
        for email in expired {
            if let Some(entry) = entries.remove(&email) {
                log::debug!("Evicting idle screens of {email}");
                entry.dispose().await;
            }
        }
    }

    /// The user's catalog screen, replacing one that was disposed.
    pub async fn catalog(&self, email: &str) -> SharedCatalogScreen {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        self.evict_idle(&mut entries, now).await;

        let entry = entries
            .entry(email.to_string())
            .or_insert_with(|| ScreenEntry::new(now));
        entry.last_seen = now;
        if let Some(screen) = &entry.catalog {
            if !screen.lock().await.is_disposed() {
                return screen.clone();
            }
        }
        let screen = Arc::new(Mutex::new(CatalogScreen::new()));
        entry.catalog = Some(screen.clone());
        screen
    }

    /// Existing screen only; `None` when the user never opened the catalog
    /// or it was evicted.
    pub async fn existing_catalog(&self, email: &str) -> Option<SharedCatalogScreen> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        self.evict_idle(&mut entries, now).await;

        let entry = entries.get_mut(email)?;
        entry.last_seen = now;
        entry.catalog.clone()
    }

    pub async fn bookings(&self, email: &str) -> SharedBookingsScreen {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        self.evict_idle(&mut entries, now).await;

        let entry = entries
            .entry(email.to_string())
            .or_insert_with(|| ScreenEntry::new(now));
        entry.last_seen = now;
        entry
            .bookings
            .get_or_insert_with(|| Arc::new(Mutex::new(BookingsScreen::new())))
            .clone()
    }

    /// Drops the user's screens. Refreshes still in flight are discarded.
    pub async fn dispose(&self, email: &str) {
        let removed = self.entries.lock().await.remove(email);
        if let Some(entry) = removed {
            entry.dispose().await;
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
