use tokio::sync::Mutex;

use crate::{
    error::PersistenceError,
    identity::Identity,
    models::{ServiceRecord, UserRecord, SERVICES, USERS},
    store::{Document, DocumentStore},
};

/// Reads the whole `services` collection in the store's native order.
///
/// Documents that no longer decode as a service are skipped with a warning
/// so one bad entry does not hide the rest of the catalog.
pub async fn load_catalog(store: &dyn DocumentStore) -> Result<Vec<ServiceRecord>, PersistenceError> {
    let docs = store.get_all(SERVICES).await?;
    Ok(docs
        .iter()
        .filter_map(|doc| match doc.decode::<ServiceRecord>() {
            Ok(service) => Some(service),
            Err(err) => {
                log::warn!("Skipping malformed service {}: {err}", doc.id);
                None
            }
        })
        .collect())
}

/// Profile name of the signed-in identity.
///
/// Looks the profile up by uid (the document key) and falls back to an
/// equality read on `email`. Never picks an arbitrary profile from the
/// collection.
pub async fn load_current_user_display_name(
    store: &dyn DocumentStore,
    identity: &Identity,
) -> Result<Option<String>, PersistenceError> {
    let doc = match store.get(USERS, &identity.uid).await? {
        Some(doc) => Some(doc),
        None => store
            .find_eq(USERS, "email", &identity.email)
            .await?
            .into_iter()
            .next(),
    };

    doc.as_ref()
        .map(Document::decode::<UserRecord>)
        .transpose()
        .map(|user| user.map(|user| user.name))
}

/// Case-insensitive substring match on the service name.
pub fn filter_services(services: &[ServiceRecord], query: &str) -> Vec<ServiceRecord> {
    let needle = query.to_lowercase();
    services
        .iter()
        .filter(|service| service.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

/// Issued when a refresh starts; decides whether its responses may still be
/// applied when they arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket(u64);

/// View-model of the customer catalog screen.
#[derive(Debug, Default)]
pub struct CatalogScreen {
    services: Vec<ServiceRecord>,
    filtered: Vec<ServiceRecord>,
    query: String,
    display_name: String,
    issued: u64,
    catalog_applied: u64,
    name_applied: u64,
    disposed: bool,
}

impl CatalogScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` once the screen is disposed.
    pub fn begin_refresh(&mut self) -> Option<RefreshTicket> {
        if self.disposed {
            return None;
        }
        self.issued += 1;
        Some(RefreshTicket(self.issued))
    }

    /// Applies a catalog response. A failure is logged and the previous list
    /// stays on screen. Returns whether the state changed.
    pub fn apply_catalog(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Vec<ServiceRecord>, PersistenceError>,
    ) -> bool {
        if !self.accepts(ticket, self.catalog_applied) {
            log::debug!("Dropping stale catalog response {ticket:?}");
            return false;
        }
        match result {
            Ok(services) => {
                self.catalog_applied = ticket.0;
                self.filtered = services.clone();
                self.services = services;
                true
            }
            Err(err) => {
                log::error!("Error fetching services: {err}");
                false
            }
        }
    }

    /// Applies a display-name response. A missing profile keeps the old name.
    pub fn apply_display_name(
        &mut self,
        ticket: RefreshTicket,
        result: Result<Option<String>, PersistenceError>,
    ) -> bool {
        if !self.accepts(ticket, self.name_applied) {
            log::debug!("Dropping stale profile response {ticket:?}");
            return false;
        }
        match result {
            Ok(name) => {
                self.name_applied = ticket.0;
                if let Some(name) = name {
                    self.display_name = name;
                }
                true
            }
            Err(err) => {
                log::error!("Error fetching user data: {err}");
                false
            }
        }
    }

    fn accepts(&self, ticket: RefreshTicket, applied: u64) -> bool {
        !self.disposed && ticket.0 > applied
    }

    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn search(&mut self) {
        self.filtered = filter_services(&self.services, &self.query);
    }

    pub fn services(&self) -> &[ServiceRecord] {
        &self.services
    }

    pub fn filtered(&self) -> &[ServiceRecord] {
        &self.filtered
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The record handed to the booking screen.
    pub fn select(&self, id: &str) -> Option<&ServiceRecord> {
        self.services.iter().find(|service| service.id == id)
    }
}

/// Refreshes a shared screen. Both reads run concurrently and each result is
/// applied as soon as it arrives; the lock is never held across I/O.
pub async fn refresh(screen: &Mutex<CatalogScreen>, store: &dyn DocumentStore, identity: &Identity) {
    let Some(ticket) = screen.lock().await.begin_refresh() else {
        return;
    };

    let catalog = async {
        let result = load_catalog(store).await;
        screen.lock().await.apply_catalog(ticket, result);
    };
    let display_name = async {
        let result = load_current_user_display_name(store, identity).await;
        screen.lock().await.apply_display_name(ticket, result);
    };
    tokio::join!(catalog, display_name);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{models::Price, testing::FlakyStore};

    fn service(id: &str, name: &str) -> ServiceRecord {
        ServiceRecord {
            id: id.to_string(),
            name: name.to_string(),
            price: Price::from("100000"),
            image_url: None,
        }
    }

    fn sample() -> Vec<ServiceRecord> {
        vec![
            service("1", "Facial"),
            service("2", "Hot Stone Massage"),
            service("3", "Deep Facial Cleanse"),
            service("4", "Manicure"),
        ]
    }

    fn guest() -> Identity {
        Identity {
            uid: "guest".to_string(),
            email: "guest@spa.test".to_string(),
        }
    }

    async fn seeded_store() -> FlakyStore {
        let store = FlakyStore::new().await;
        for name in ["Facial", "Massage"] {
            store
                .add(SERVICES, json!({ "service": name, "prices": "150000" }), "createdAt")
                .await
                .unwrap();
        }
        store
            .set(USERS, "guest", json!({ "email": "guest@spa.test", "name": "Lan", "role": "user" }))
            .await
            .unwrap();
        store
    }

    #[test]
    fn empty_query_keeps_full_catalog() {
        assert_eq!(filter_services(&sample(), ""), sample());
    }

    #[test]
    fn filter_is_sound_and_complete() {
        let services = sample();
        for query in ["facial", "FACIAL", "massage", "cure", "o", "zzz"] {
            let found = filter_services(&services, query);
            let needle = query.to_lowercase();
            for service in &services {
                let matches = service.name.to_lowercase().contains(&needle);
                assert_eq!(found.contains(service), matches, "query {query:?}");
            }
        }
    }

    #[test]
    fn search_runs_only_on_trigger() {
        let mut screen = CatalogScreen::new();
        let ticket = screen.begin_refresh().unwrap();
        screen.apply_catalog(ticket, Ok(sample()));

        screen.set_query("facial");
        assert_eq!(screen.filtered().len(), 4);

        screen.search();
        let names: Vec<_> = screen.filtered().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Facial", "Deep Facial Cleanse"]);
        assert_eq!(screen.services().len(), 4);

        screen.set_query("");
        screen.search();
        assert_eq!(screen.filtered(), screen.services());
    }

    #[test]
    fn failed_fetch_keeps_previous_catalog() {
        let mut screen = CatalogScreen::new();
        let first = screen.begin_refresh().unwrap();
        assert!(screen.apply_catalog(first, Ok(sample())));

        let second = screen.begin_refresh().unwrap();
        let applied = screen.apply_catalog(
            second,
            Err(PersistenceError::Unavailable("offline".to_string())),
        );
        assert!(!applied);
        assert_eq!(screen.services(), sample().as_slice());
    }

    #[test]
    fn older_response_does_not_overwrite_newer_one() {
        let mut screen = CatalogScreen::new();
        let older = screen.begin_refresh().unwrap();
        let newer = screen.begin_refresh().unwrap();

        assert!(screen.apply_catalog(newer, Ok(sample())));
        assert!(!screen.apply_catalog(older, Ok(Vec::new())));
        assert_eq!(screen.services().len(), 4);
    }

    #[test]
    fn disposed_screen_drops_in_flight_responses() {
        let mut screen = CatalogScreen::new();
        let ticket = screen.begin_refresh().unwrap();
        screen.dispose();

        assert!(!screen.apply_catalog(ticket, Ok(sample())));
        assert!(!screen.apply_display_name(ticket, Ok(Some("Lan".to_string()))));
        assert!(screen.services().is_empty());
        assert!(screen.begin_refresh().is_none());
    }

    #[test]
    fn select_finds_by_id() {
        let mut screen = CatalogScreen::new();
        let ticket = screen.begin_refresh().unwrap();
        screen.apply_catalog(ticket, Ok(sample()));

        assert_eq!(screen.select("2").map(|s| s.name.as_str()), Some("Hot Stone Massage"));
        assert!(screen.select("99").is_none());
    }

    #[tokio::test]
    async fn refresh_loads_catalog_and_signed_in_name() {
        let store = seeded_store().await;
        // A second profile must not leak into the header.
        store
            .set(USERS, "other", json!({ "email": "other@spa.test", "name": "Mai", "role": "user" }))
            .await
            .unwrap();

        let screen = Mutex::new(CatalogScreen::new());
        refresh(&screen, &store, &guest()).await;

        let screen = screen.lock().await;
        let names: Vec<_> = screen.services().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Facial", "Massage"]);
        assert_eq!(screen.filtered().len(), 2);
        assert_eq!(screen.display_name(), "Lan");
    }

    #[tokio::test]
    async fn refresh_during_outage_keeps_stale_state() {
        let store = seeded_store().await;
        let screen = Mutex::new(CatalogScreen::new());
        refresh(&screen, &store, &guest()).await;

        store.set_fail_reads(true);
        refresh(&screen, &store, &guest()).await;

        let screen = screen.lock().await;
        assert_eq!(screen.services().len(), 2);
        assert_eq!(screen.display_name(), "Lan");
    }

    async fn rename_guest(store: &FlakyStore, name: &str) {
        store
            .set(USERS, "guest", json!({ "email": "guest@spa.test", "name": name, "role": "user" }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_catalog_read_still_applies_display_name() {
        let store = seeded_store().await;
        let screen = Mutex::new(CatalogScreen::new());
        refresh(&screen, &store, &guest()).await;

        store
            .add(SERVICES, json!({ "service": "Manicure", "prices": "90000" }), "createdAt")
            .await
            .unwrap();
        rename_guest(&store, "Lan Nguyen").await;
        store.set_fail_lists(true);
        refresh(&screen, &store, &guest()).await;

        let screen = screen.lock().await;
        let names: Vec<_> = screen.services().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Facial", "Massage"]);
        assert_eq!(screen.display_name(), "Lan Nguyen");
    }

    #[tokio::test]
    async fn failed_profile_read_still_applies_catalog() {
        let store = seeded_store().await;
        let screen = Mutex::new(CatalogScreen::new());
        refresh(&screen, &store, &guest()).await;

        store
            .add(SERVICES, json!({ "service": "Manicure", "prices": "90000" }), "createdAt")
            .await
            .unwrap();
        rename_guest(&store, "Lan Nguyen").await;
        store.set_fail_lookups(true);
        refresh(&screen, &store, &guest()).await;

        let screen = screen.lock().await;
        assert_eq!(screen.services().len(), 3);
        assert_eq!(screen.filtered().len(), 3);
        assert_eq!(screen.display_name(), "Lan");
    }

    #[tokio::test]
    async fn display_name_falls_back_to_email_lookup() {
        let store = FlakyStore::new().await;
        store
            .set(USERS, "legacy-key", json!({ "email": "guest@spa.test", "name": "Lan", "role": "user" }))
            .await
            .unwrap();

        let name = load_current_user_display_name(&store, &guest()).await.unwrap();
        assert_eq!(name.as_deref(), Some("Lan"));
    }

    #[tokio::test]
    async fn malformed_service_documents_are_skipped() {
        let store = seeded_store().await;
        store.set(SERVICES, "broken", json!({ "prices": 10 })).await.unwrap();

        let services = load_catalog(&store).await.unwrap();
        assert_eq!(services.len(), 2);
    }
}
