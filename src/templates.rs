use actix_web::{
    cookie::{time::Duration, Cookie, SameSite},
    HttpRequest, HttpResponse,
};
use askama::Template;

const NOTICE_COOKIE: &str = "spa_notice";

pub fn render<T: Template>(template: T) -> HttpResponse {
    match template.render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(body),
        Err(err) => {
            log::error!("Template render error: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// One-shot messages carried across a redirect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    BookingSaved,
    ServiceAdded,
}

impl Notice {
    fn code(self) -> &'static str {
        match self {
            Notice::BookingSaved => "booking_saved",
            Notice::ServiceAdded => "service_added",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "booking_saved" => Some(Notice::BookingSaved),
            "service_added" => Some(Notice::ServiceAdded),
            _ => None,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Notice::BookingSaved => "Your booking was saved.",
            Notice::ServiceAdded => "Service added to the catalog.",
        }
    }

    pub fn cookie(self) -> Cookie<'static> {
        Cookie::build(NOTICE_COOKIE, self.code())
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(Duration::minutes(5))
            .finish()
    }

    /// Reads the pending notice, if any. Pair with [`clear_notice`].
    pub fn pending(req: &HttpRequest) -> Option<Self> {
        req.cookie(NOTICE_COOKIE)
            .and_then(|cookie| Notice::from_code(cookie.value()))
    }
}

/// Expires the notice cookie so the message is shown once.
pub fn clear_notice(response: &mut HttpResponse) {
    let cookie = Cookie::build(NOTICE_COOKIE, "")
        .path("/")
        .max_age(Duration::seconds(0))
        .finish();
    if let Err(err) = response.add_cookie(&cookie) {
        log::warn!("Could not clear notice cookie: {err}");
    }
}

/// Flattened notice for templates.
#[derive(Clone, Debug, Default)]
pub struct NoticeView {
    pub message: String,
    pub is_error: bool,
    pub visible: bool,
}

impl NoticeView {
    pub fn info(message: &str) -> Self {
        Self {
            message: message.to_string(),
            is_error: false,
            visible: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            is_error: true,
            visible: true,
        }
    }

    pub fn from_pending(notice: Option<Notice>) -> Self {
        notice.map(|notice| Self::info(notice.message())).unwrap_or_default()
    }
}
