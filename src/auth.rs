use actix_web::{
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    error::ErrorUnauthorized,
    http::{header, StatusCode},
    middleware::Next,
    web, Error, HttpMessage, HttpRequest,
};
use actix_web::cookie::{Cookie, SameSite, time::Duration};
use actix_web_httpauth::extractors::basic::BasicAuth;
use askama::Template;

use crate::{
    identity::Identity,
    models::{Role, UserRecord, USERS},
    state::AppState,
    templates::render,
};

pub const AUTH_REALM: &str = "Spa Booking";
const LOGOUT_COOKIE: &str = "spa_logged_out";

#[derive(Clone, Debug)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
}

impl AuthUser {
    pub fn identity(&self) -> Identity {
        Identity {
            uid: self.uid.clone(),
            email: self.email.clone(),
        }
    }
}

async fn authenticate(req: &ServiceRequest, credentials: &BasicAuth) -> Result<AuthUser, Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))?;
    let email = credentials.user_id();
    let password = credentials.password().unwrap_or_default();
    authenticate_credentials(state, email, password)
        .await
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))
}

/// Verifies the credentials, then reads the profile stored under the uid to
/// learn the role. An identity without a profile signs in as a plain user.
pub async fn authenticate_credentials(
    state: &AppState,
    email: &str,
    password: &str,
) -> Option<AuthUser> {
    let identity = match state.identities.verify_credentials(email, password).await {
        Ok(Some(identity)) => identity,
        Ok(None) => return None,
        Err(err) => {
            log::error!("Sign-in failed: {err}");
            return None;
        }
    };

    let profile = match state.store.get(USERS, &identity.uid).await {
        Ok(doc) => doc.and_then(|doc| doc.decode::<UserRecord>().ok()),
        Err(err) => {
            log::error!("Error fetching profile for {}: {err}", identity.email);
            return None;
        }
    };

    let (display_name, role) = match profile {
        Some(profile) => (profile.name, profile.role),
        None => {
            log::warn!("Identity {} has no profile", identity.email);
            (identity.email.clone(), Role::User)
        }
    };

    Some(AuthUser {
        uid: identity.uid,
        email: identity.email,
        display_name,
        role,
    })
}

pub async fn basic_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(user) => {
            if user.role != Role::Admin {
                return Err((ErrorUnauthorized("Admin access required"), req));
            }
            req.extensions_mut().insert(user);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

#[derive(Template)]
#[template(path = "signed_out.html")]
struct SignedOutTemplate {
    login_url: String,
}

fn session_cookie(req: &HttpRequest, value: &'static str, max_age: Duration) -> Cookie<'static> {
    let mut builder = Cookie::build(LOGOUT_COOKIE, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(max_age);
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

/// Marks the browser as signed out so cached Basic credentials are refused.
pub fn logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    session_cookie(req, "1", Duration::days(365))
}

pub fn clear_logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    session_cookie(req, "", Duration::seconds(0))
}

/// Answers 401 with the signed-out page while the logout marker is set.
pub async fn logout_guard<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: actix_web::body::MessageBody + 'static,
{
    if req.cookie(LOGOUT_COOKIE).is_some() {
        let login_target = if req.path().starts_with("/admin") { "/admin" } else { "/" };
        let mut response = render(SignedOutTemplate {
            login_url: format!("/login?next={login_target}"),
        });
        *response.status_mut() = StatusCode::UNAUTHORIZED;
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-store"),
        );
        return Ok(req.into_response(response));
    }

    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}
