use actix_web::{http::header, middleware::from_fn, web, HttpRequest, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use askama::Template;
use serde::Deserialize;

use crate::{
    auth::{basic_validator, logout_guard, AuthUser},
    booking::BookingScreen,
    catalog::{refresh, CatalogScreen},
    management::load_profile,
    models::{Role, ServiceRecord},
    state::AppState,
    templates::{clear_notice, render, Notice, NoticeView},
};

#[derive(Clone, Debug)]
pub(crate) struct ServiceView {
    pub id: String,
    pub position: usize,
    pub name: String,
    pub price: String,
    pub image_url: String,
    pub has_image: bool,
}

impl ServiceView {
    pub(crate) fn list(services: &[ServiceRecord]) -> Vec<Self> {
        services
            .iter()
            .enumerate()
            .map(|(index, service)| Self::from_record(index + 1, service))
            .collect()
    }

    fn from_record(position: usize, service: &ServiceRecord) -> Self {
        let image_url = service.image_url.clone().unwrap_or_default();
        Self {
            id: service.id.clone(),
            position,
            name: service.name.clone(),
            price: service.price.to_string(),
            has_image: !image_url.is_empty(),
            image_url,
        }
    }
}

#[derive(Template)]
#[template(path = "catalog.html")]
struct CatalogTemplate {
    display_name: String,
    query: String,
    services: Vec<ServiceView>,
    notice: NoticeView,
    is_admin: bool,
}

impl CatalogTemplate {
    fn from_screen(screen: &CatalogScreen, notice: NoticeView, is_admin: bool) -> Self {
        Self {
            display_name: screen.display_name().to_string(),
            query: screen.query().to_string(),
            services: ServiceView::list(screen.filtered()),
            notice,
            is_admin,
        }
    }
}

#[derive(Template)]
#[template(path = "book.html")]
struct BookingTemplate {
    service: ServiceView,
    booking_date: String,
    booking_time: String,
    notice: NoticeView,
}

impl BookingTemplate {
    fn from_screen(screen: &BookingScreen, notice: NoticeView) -> Self {
        Self {
            service: ServiceView::from_record(0, screen.service()),
            booking_date: screen.date_text().to_string(),
            booking_time: screen.time_text().to_string(),
            notice,
        }
    }
}

#[derive(Template)]
#[template(path = "profile.html")]
struct ProfileTemplate {
    found: bool,
    email: String,
    name: String,
    role: String,
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

#[derive(Deserialize)]
struct BookingForm {
    booking_date: String,
    booking_time: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/")
            .wrap(HttpAuthentication::basic(basic_validator))
            .wrap(from_fn(logout_guard))
            .route(web::get().to(catalog)),
    )
    .service(
        web::resource("/services/{id}/book")
            .wrap(HttpAuthentication::basic(basic_validator))
            .wrap(from_fn(logout_guard))
            .route(web::get().to(show_booking))
            .route(web::post().to(create_booking)),
    )
    .service(
        web::resource("/profile")
            .wrap(HttpAuthentication::basic(basic_validator))
            .wrap(from_fn(logout_guard))
            .route(web::get().to(profile)),
    );
}

fn back_to_catalog() -> HttpResponse {
    HttpResponse::SeeOther()
        .append_header((header::LOCATION, "/"))
        .finish()
}

/// Every visit refreshes the screen; a submitted `q` triggers the search.
async fn catalog(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    query: web::Query<SearchQuery>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let identity = auth.identity();
    let screen = state.screens.catalog(&identity.email).await;
    refresh(&screen, state.store.as_ref(), &identity).await;

    let pending = Notice::pending(&req);
    let template = {
        let mut screen = screen.lock().await;
        if let Some(q) = query.into_inner().q {
            screen.set_query(q);
            screen.search();
        }
        CatalogTemplate::from_screen(
            &screen,
            NoticeView::from_pending(pending),
            auth.role == Role::Admin,
        )
    };

    let mut response = render(template);
    if pending.is_some() {
        clear_notice(&mut response);
    }
    Ok(response)
}

/// The service comes from the user's catalog screen, never from storage.
async fn selected_service(state: &AppState, auth: &AuthUser, id: &str) -> Option<ServiceRecord> {
    let screen = state.screens.existing_catalog(&auth.email).await?;
    let screen = screen.lock().await;
    screen.select(id).cloned()
}

async fn show_booking(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let Some(service) = selected_service(&state, &auth, &path.into_inner()).await else {
        return Ok(back_to_catalog());
    };

    let screen = BookingScreen::new(service);
    Ok(render(BookingTemplate::from_screen(&screen, NoticeView::default())))
}

async fn create_booking(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<String>,
    form: web::Form<BookingForm>,
) -> Result<HttpResponse> {
    let Some(service) = selected_service(&state, &auth, &path.into_inner()).await else {
        return Ok(back_to_catalog());
    };

    let form = form.into_inner();
    let screen = BookingScreen::new(service).with_input(form.booking_date, form.booking_time);

    match screen.submit(state.store.as_ref()).await {
        Ok(_) => Ok(HttpResponse::SeeOther()
            .append_header((header::LOCATION, "/"))
            .cookie(Notice::BookingSaved.cookie())
            .finish()),
        Err(err) => {
            log::warn!("Booking by {} failed: {err}", auth.email);
            let notice = NoticeView::error(err.user_message());
            Ok(render(BookingTemplate::from_screen(&screen, notice)))
        }
    }
}

async fn profile(state: web::Data<AppState>, auth: web::ReqData<AuthUser>) -> Result<HttpResponse> {
    let profile = match load_profile(state.store.as_ref(), &auth.identity()).await {
        Ok(profile) => profile,
        Err(err) => {
            log::error!("Error fetching user data: {err}");
            None
        }
    };

    let template = match profile {
        Some(user) => ProfileTemplate {
            found: true,
            email: user.email,
            name: user.name,
            role: user.role.as_str().to_string(),
        },
        None => ProfileTemplate {
            found: false,
            email: auth.email.clone(),
            name: String::new(),
            role: String::new(),
        },
    };

    Ok(render(template))
}
