use actix_web::{http::header, middleware::from_fn, web, HttpRequest, HttpResponse, Result};
use actix_web_httpauth::middleware::HttpAuthentication;
use askama::Template;

use crate::{
    auth::{admin_validator, logout_guard, AuthUser},
    catalog::refresh,
    management::{add_service, refresh_bookings, NewServiceForm},
    models::BookingRecord,
    routes::customer::ServiceView,
    state::AppState,
    templates::{clear_notice, render, Notice, NoticeView},
};

#[derive(Clone, Debug)]
struct BookingView {
    service_name: String,
    price: String,
    booking_date: String,
    booking_time: String,
    created_at: String,
}

impl From<&BookingRecord> for BookingView {
    fn from(booking: &BookingRecord) -> Self {
        Self {
            service_name: booking.service_name.clone(),
            price: booking.price.to_string(),
            booking_date: booking.booking_date.clone(),
            booking_time: booking.booking_time.clone(),
            created_at: booking.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "admin_catalog.html")]
struct AdminCatalogTemplate {
    admin_name: String,
    services: Vec<ServiceView>,
    notice: NoticeView,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "admin_service_new.html")]
struct NewServiceTemplate {
    name: String,
    price: String,
    image_url: String,
    notice: NoticeView,
    is_admin: bool,
}

#[derive(Template)]
#[template(path = "admin_bookings.html")]
struct AdminBookingsTemplate {
    bookings: Vec<BookingView>,
    is_admin: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .wrap(HttpAuthentication::basic(admin_validator))
            .wrap(from_fn(logout_guard))
            .service(web::resource("").route(web::get().to(catalog)))
            .service(web::resource("/").route(web::get().to(catalog)))
            .service(
                web::resource("/services/new")
                    .route(web::get().to(show_new_service))
                    .route(web::post().to(create_service)),
            )
            .service(web::resource("/bookings").route(web::get().to(bookings))),
    );
}

/// Shares the refresh rules of the customer catalog: a failed read keeps the
/// last list the admin saw.
async fn catalog(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let screen = state.screens.catalog(&auth.email).await;
    refresh(&screen, state.store.as_ref(), &auth.identity()).await;

    let pending = Notice::pending(&req);
    let template = {
        let screen = screen.lock().await;
        let admin_name = match screen.display_name() {
            "" => auth.display_name.clone(),
            name => name.to_string(),
        };
        AdminCatalogTemplate {
            admin_name,
            services: ServiceView::list(screen.services()),
            notice: NoticeView::from_pending(pending),
            is_admin: true,
        }
    };
    let mut response = render(template);
    if pending.is_some() {
        clear_notice(&mut response);
    }
    Ok(response)
}

async fn show_new_service() -> Result<HttpResponse> {
    Ok(render(NewServiceTemplate {
        name: String::new(),
        price: String::new(),
        image_url: String::new(),
        notice: NoticeView::default(),
        is_admin: true,
    }))
}

async fn create_service(
    state: web::Data<AppState>,
    form: web::Form<NewServiceForm>,
) -> Result<HttpResponse> {
    let form = form.into_inner();
    match add_service(state.store.as_ref(), &form).await {
        Ok(_) => Ok(HttpResponse::SeeOther()
            .append_header((header::LOCATION, "/admin"))
            .cookie(Notice::ServiceAdded.cookie())
            .finish()),
        Err(err) => {
            log::warn!("Adding service failed: {err}");
            Ok(render(NewServiceTemplate {
                name: form.name,
                price: form.price,
                image_url: form.image_url.unwrap_or_default(),
                notice: NoticeView::error(err.user_message()),
                is_admin: true,
            }))
        }
    }
}

async fn bookings(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
) -> Result<HttpResponse> {
    let screen = state.screens.bookings(&auth.email).await;
    refresh_bookings(&screen, state.store.as_ref()).await;

    let bookings = screen
        .lock()
        .await
        .bookings()
        .iter()
        .map(BookingView::from)
        .collect();
    Ok(render(AdminBookingsTemplate {
        bookings,
        is_admin: true,
    }))
}
