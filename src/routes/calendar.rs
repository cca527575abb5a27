//! Merged calendar endpoint

use axum::{
    Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
};

use crate::routes::AppError;
use crate::state::AppState;

const CONTENT_TYPE: &str = "text/calendar";
const CONTENT_DISPOSITION: &str = "attachment; filename=busy-times.ics";

pub fn router() -> Router<AppState> {
    Router::new().route("/calendar", get(get_calendar))
}

/// GET /calendar - Merged busy calendar as an ICS download
async fn get_calendar(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let ics = state.aggregator().aggregate().await?;

    Ok((
        [
            (header::CONTENT_TYPE, CONTENT_TYPE),
            (header::CONTENT_DISPOSITION, CONTENT_DISPOSITION),
        ],
        ics,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use calmerge_core::MergerConfig;
    use tower::ServiceExt;

    fn config_for(sources: &[String]) -> MergerConfig {
        let mut config = MergerConfig::from_yaml_str(
            r#"
calendar_urls: [placeholder.ics]
cache_expiration_minutes: 5
local_timezone: Europe/Berlin
days_limit: 30
merge_overlapping_events: true
event_splitting_strategy: split
calendar_name: Availability
busy_events_summary: Busy
"#,
        )
        .unwrap();
        config.calendar_urls = sources.to_vec();
        config
    }

    fn app(sources: &[String]) -> Router {
        crate::routes::router(AppState::new(&config_for(sources)).unwrap())
    }

    fn request() -> Request<Body> {
        Request::builder().uri("/calendar").body(Body::empty()).unwrap()
    }

    /// A one hour event starting tomorrow, so it always falls in the window.
    fn upcoming_event_calendar() -> String {
        let start = chrono::Utc::now().date_naive() + chrono::Days::new(1);
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:TEST\r\nBEGIN:VEVENT\r\nUID:dentist\r\n\
             SUMMARY:Dentist\r\nDTSTART:{d}T100000Z\r\nDTEND:{d}T110000Z\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n",
            d = start.format("%Y%m%d")
        )
    }

    #[tokio::test]
    async fn test_calendar_is_served_as_ics_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("personal.ics");
        std::fs::write(&path, upcoming_event_calendar()).unwrap();

        let response = app(&[path.display().to_string()])
            .oneshot(request())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/calendar");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=busy-times.ics"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let ics = String::from_utf8(body.to_vec()).unwrap();
        assert!(ics.starts_with("BEGIN:VCALENDAR"));
        assert!(ics.contains("X-WR-CALNAME:Availability"));
        assert!(ics.contains("SUMMARY:Busy"));
        assert!(!ics.contains("Dentist"));
    }

    #[tokio::test]
    async fn test_no_sources_serves_empty_calendar() {
        let response = app(&[]).oneshot(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let ics = String::from_utf8(body.to_vec()).unwrap();
        assert!(!ics.contains("BEGIN:VEVENT"));
    }

    #[tokio::test]
    async fn test_failing_source_is_internal_error_with_empty_body() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ics").display().to_string();

        let response = app(&[missing]).oneshot(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let response = app(&[])
            .oneshot(Request::builder().uri("/calendars").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
