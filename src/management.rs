use serde::Deserialize;
use tokio::sync::Mutex;

use crate::{
    error::{AppError, PersistenceError, ValidationError},
    identity::Identity,
    models::{BookingRecord, Price, ServiceRecord, UserRecord, BOOKINGS, CREATED_AT, SERVICES, USERS},
    store::{encode, DocumentStore},
};

/// Profile of the signed-in identity, found by email.
pub async fn load_profile(
    store: &dyn DocumentStore,
    identity: &Identity,
) -> Result<Option<UserRecord>, PersistenceError> {
    let docs = store.find_eq(USERS, "email", &identity.email).await?;
    docs.first().map(|doc| doc.decode()).transpose()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewServiceForm {
    pub name: String,
    pub price: String,
    pub image_url: Option<String>,
}

/// Adds a catalog entry. The price is kept as typed.
pub async fn add_service(
    store: &dyn DocumentStore,
    form: &NewServiceForm,
) -> Result<ServiceRecord, AppError> {
    let name = form.name.trim();
    let price = form.price.trim();
    if name.is_empty() || price.is_empty() {
        return Err(ValidationError::MissingServiceField.into());
    }

    let service = ServiceRecord {
        id: String::new(),
        name: name.to_string(),
        price: Price::from(price),
        image_url: form
            .image_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string),
    };
    let doc = store.add(SERVICES, encode(&service)?, CREATED_AT).await?;
    log::info!("Added service {}", service.name);
    Ok(doc.decode()?)
}

/// Every booking, newest first.
pub async fn list_bookings(store: &dyn DocumentStore) -> Result<Vec<BookingRecord>, PersistenceError> {
    let mut bookings = store
        .get_all(BOOKINGS)
        .await?
        .iter()
        .map(|doc| doc.decode::<BookingRecord>())
        .collect::<Result<Vec<_>, _>>()?;
    bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(bookings)
}

/// Bookings list of the admin screen. A failed read keeps the last list.
#[derive(Debug, Default)]
pub struct BookingsScreen {
    bookings: Vec<BookingRecord>,
    issued: u64,
    applied: u64,
}

impl BookingsScreen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_refresh(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Returns whether the list changed. Responses older than the last
    /// applied one are dropped.
    pub fn apply(
        &mut self,
        ticket: u64,
        result: Result<Vec<BookingRecord>, PersistenceError>,
    ) -> bool {
        if ticket <= self.applied {
            log::debug!("Dropping stale bookings response {ticket}");
            return false;
        }
        match result {
            Ok(bookings) => {
                self.applied = ticket;
                self.bookings = bookings;
                true
            }
            Err(err) => {
                log::error!("Error fetching bookings: {err}");
                false
            }
        }
    }

    pub fn bookings(&self) -> &[BookingRecord] {
        &self.bookings
    }
}

pub async fn refresh_bookings(screen: &Mutex<BookingsScreen>, store: &dyn DocumentStore) {
    let ticket = screen.lock().await.begin_refresh();
    let result = list_bookings(store).await;
    screen.lock().await.apply(ticket, result);
}
