use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SERVICES: &str = "services";
pub const USERS: &str = "user";
pub const BOOKINGS: &str = "bookings";

pub const CREATED_AT: &str = "createdAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

/// Catalog prices are unvalidated: older documents carry numbers, the admin
/// form stores whatever text was typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Price {
    Number(serde_json::Number),
    Text(String),
}

impl Default for Price {
    fn default() -> Self {
        Price::Text(String::new())
    }
}

impl From<&str> for Price {
    fn from(value: &str) -> Self {
        Price::Text(value.to_string())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Price::Number(value) => write!(f, "{value}"),
            Price::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(rename = "service")]
    pub name: String,
    #[serde(rename = "prices", default)]
    pub price: Price,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRecord {
    #[serde(default, skip_serializing)]
    pub id: String,
    pub service_name: String,
    #[serde(rename = "prices", default)]
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub booking_date: String,
    pub booking_time: String,
    pub created_at: DateTime<Utc>,
}
