use serde::Serialize;

use crate::{
    error::{AppError, ValidationError},
    models::{BookingRecord, Price, ServiceRecord, BOOKINGS, CREATED_AT},
    store::{encode, DocumentStore},
};

/// Rewrites `D-M-Y` as `Y-M-D` by reordering the three tokens.
///
/// There is no calendar check: `31-13-2024` becomes `2024-13-31`.
pub fn format_booking_date(text: &str) -> Result<String, ValidationError> {
    let trimmed = text.trim();
    let parts: Vec<&str> = trimmed.split('-').map(str::trim).collect();
    match parts.as_slice() {
        [day, month, year] if !day.is_empty() && !month.is_empty() && !year.is_empty() => {
            Ok(format!("{year}-{month}-{day}"))
        }
        _ => Err(ValidationError::MalformedDate(trimmed.to_string())),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewBooking<'a> {
    service_name: &'a str,
    #[serde(rename = "prices")]
    price: &'a Price,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    booking_date: String,
    booking_time: &'a str,
}

/// Validates the form and appends one booking.
///
/// The service fields are copied from `service` as handed over by the
/// catalog screen; they are not re-read and never resynchronized. Nothing is
/// written when validation fails. A failed write is returned, not retried.
pub async fn submit_booking(
    store: &dyn DocumentStore,
    date_text: &str,
    time_text: &str,
    service: &ServiceRecord,
) -> Result<BookingRecord, AppError> {
    if date_text.trim().is_empty() || time_text.trim().is_empty() {
        return Err(ValidationError::MissingBookingField.into());
    }
    let booking_date = format_booking_date(date_text)?;

    let booking = NewBooking {
        service_name: &service.name,
        price: &service.price,
        image_url: service.image_url.as_deref(),
        booking_date,
        booking_time: time_text,
    };
    let doc = store.add(BOOKINGS, encode(&booking)?, CREATED_AT).await?;
    let record: BookingRecord = doc.decode()?;

    log::info!(
        "Booked {} on {} at {}",
        record.service_name,
        record.booking_date,
        record.booking_time
    );
    Ok(record)
}

/// View-model of the booking screen: the service carried from the catalog
/// plus whatever the user typed.
#[derive(Debug, Clone)]
pub struct BookingScreen {
    service: ServiceRecord,
    date_text: String,
    time_text: String,
}

impl BookingScreen {
    pub fn new(service: ServiceRecord) -> Self {
        Self {
            service,
            date_text: String::new(),
            time_text: String::new(),
        }
    }

    pub fn with_input(mut self, date_text: impl Into<String>, time_text: impl Into<String>) -> Self {
        self.date_text = date_text.into();
        self.time_text = time_text.into();
        self
    }

    pub fn service(&self) -> &ServiceRecord {
        &self.service
    }

    pub fn date_text(&self) -> &str {
        &self.date_text
    }

    pub fn time_text(&self) -> &str {
        &self.time_text
    }

    pub async fn submit(&self, store: &dyn DocumentStore) -> Result<BookingRecord, AppError> {
        submit_booking(store, &self.date_text, &self.time_text, &self.service).await
    }
}
