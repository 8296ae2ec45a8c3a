use actix_web::{http::header, web, HttpRequest, HttpResponse, Result};
use actix_web::http::header::Header;
use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use askama::Template;
use serde::Deserialize;

use crate::{
    auth::{authenticate_credentials, clear_logout_cookie, logout_cookie, AUTH_REALM},
    models::Role,
    registration::{register, RegistrationForm},
    state::AppState,
    templates::{render, NoticeView},
};

#[derive(Template)]
#[template(path = "registered.html")]
struct RegisteredTemplate {
    email: String,
    name: String,
    notice: NoticeView,
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    email: String,
    name: String,
    notice: NoticeView,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/register")
            .route(web::get().to(show_register))
            .route(web::post().to(create_account)),
    )
    .service(web::resource("/login").route(web::get().to(login)))
    .service(web::resource("/logout").route(web::get().to(logout)))
    .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn show_register() -> Result<HttpResponse> {
    Ok(render(RegisterTemplate {
        email: String::new(),
        name: String::new(),
        notice: NoticeView::default(),
    }))
}

async fn create_account(
    state: web::Data<AppState>,
    form: web::Form<RegistrationForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    match register(state.store.as_ref(), state.identities.as_ref(), &form).await {
        Ok(user) => Ok(render(RegisteredTemplate {
            email: user.email,
            name: user.name,
            notice: NoticeView::info("Account created. Sign in with your email and password."),
        })),
        Err(err) => {
            log::warn!("Registration for {} failed: {err}", form.email);
            Ok(render(RegisterTemplate {
                email: form.email,
                name: form.name,
                notice: NoticeView::error(err.user_message()),
            }))
        }
    }
}

async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    if let Ok(auth) = Authorization::<Basic>::parse(&req) {
        let credentials = auth.into_scheme();
        let password = credentials.password().unwrap_or_default();
        if let Some(user) =
            authenticate_credentials(&state, credentials.user_id(), password).await
        {
            state.screens.dispose(&user.email).await;
        }
    }

    HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/register"))
        .cookie(logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

#[derive(Deserialize)]
struct LoginQuery {
    next: Option<String>,
}

/// Challenges for credentials, then sends the user to their home screen.
async fn login(
    state: web::Data<AppState>,
    req: HttpRequest,
    query: web::Query<LoginQuery>,
) -> HttpResponse {
    let auth = match Authorization::<Basic>::parse(&req) {
        Ok(auth) => auth,
        Err(_) => return auth_challenge(),
    };
    let credentials = auth.into_scheme();
    let email = credentials.user_id();
    let password = credentials.password().unwrap_or_default();

    let user = match authenticate_credentials(&state, email, password).await {
        Some(user) => user,
        None => return auth_challenge(),
    };

    let requested = query.next.as_deref().unwrap_or("");
    let requested = if requested.starts_with('/') && !requested.starts_with("//") {
        requested
    } else {
        ""
    };
    let redirect = match user.role {
        Role::Admin if requested.starts_with("/admin") => requested,
        Role::Admin => "/admin",
        Role::User if !requested.is_empty() && !requested.starts_with("/admin") => requested,
        Role::User => "/",
    };

    HttpResponse::SeeOther()
        .append_header((header::LOCATION, redirect))
        .cookie(clear_logout_cookie(&req))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}

fn auth_challenge() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", AUTH_REALM)))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .finish()
}
